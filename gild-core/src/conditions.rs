//! Spending conditions for locked ecash:
//! [Nut-10](https://github.com/cashubtc/nuts/blob/main/10.md) structured secrets,
//! [Nut-11](https://github.com/cashubtc/nuts/blob/main/11.md) pay-to-public-key and
//! [Nut-14](https://github.com/cashubtc/nuts/blob/main/14.md) hash time locked contracts.
//!
//! A structured secret has the JSON shape `[kind, {nonce, data, tags}]`. Any
//! secret that does not parse as that shape is a plain random secret and
//! carries no conditions.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use bitcoin_hashes::{sha256, Hash};
use secp256k1::schnorr::Signature;
use secp256k1::{Keypair, Message, PublicKey, Secp256k1, SecretKey};
use serde::de::Error as DeserializerError;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::blind::BlindedMessage;
use crate::error::CoreError;
use crate::proof::{Proof, Proofs};

pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Kind of a structured secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    P2PK,
    HTLC,
}

/// Inner object of a structured secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretData {
    /// Unique random string
    pub nonce: String,
    /// Expresses the spending condition specific to each kind
    pub data: String,
    /// Additional data committed to, used for feature extensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Vec<String>>>,
}

/// A parsed `[kind, {nonce, data, tags}]` secret.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Nut10Secret {
    pub kind: Kind,
    pub secret_data: SecretData,
}

impl Nut10Secret {
    /// Parses a proof secret. Returns `None` for plain secrets whose outer
    /// shape is not the two element array of a structured secret.
    pub fn parse(secret: &str) -> Option<Self> {
        serde_json::from_str::<Self>(secret).ok()
    }

    pub fn conditions(&self) -> Result<Conditions, CoreError> {
        self.secret_data
            .tags
            .clone()
            .unwrap_or_default()
            .try_into()
    }
}

impl Serialize for Nut10Secret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_tuple(2)?;
        s.serialize_element(&self.kind)?;
        s.serialize_element(&self.secret_data)?;
        s.end()
    }
}

/// Signature flag
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum SigFlag {
    /// Requires valid signatures on all inputs. Applied even when the
    /// `sigflag` tag is absent.
    #[default]
    SigInputs,
    /// Requires valid signatures on all inputs and on all outputs.
    SigAll,
}

impl fmt::Display for SigFlag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SigAll => write!(f, "SIG_ALL"),
            Self::SigInputs => write!(f, "SIG_INPUTS"),
        }
    }
}

impl FromStr for SigFlag {
    type Err = CoreError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "SIG_ALL" => Ok(Self::SigAll),
            "SIG_INPUTS" => Ok(Self::SigInputs),
            flag => Err(CoreError::InvalidCondition(format!(
                "unknown sigflag {flag}"
            ))),
        }
    }
}

/// Optional condition tags shared by P2PK and HTLC secrets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conditions {
    /// Unix locktime after which refund keys can be used
    pub locktime: Option<u64>,
    /// Additional public keys allowed to sign
    pub pubkeys: Option<Vec<PublicKey>>,
    /// Refund keys
    pub refund_keys: Option<Vec<PublicKey>>,
    /// Number of signatures required, default 1
    pub num_sigs: Option<u64>,
    pub sig_flag: SigFlag,
}

impl Conditions {
    pub fn required_sigs(&self) -> u64 {
        self.num_sigs.unwrap_or(1)
    }
}

impl TryFrom<Vec<Vec<String>>> for Conditions {
    type Error = CoreError;

    fn try_from(tags: Vec<Vec<String>>) -> Result<Conditions, Self::Error> {
        let mut conditions = Conditions::default();
        for tag in tags {
            let kind = match tag.first() {
                Some(kind) => kind.as_str(),
                None => return Err(CoreError::InvalidCondition("empty tag".to_string())),
            };
            match kind {
                "locktime" => conditions.locktime = Some(parse_tag_value(&tag)?),
                "n_sigs" => conditions.num_sigs = Some(parse_tag_value(&tag)?),
                "sigflag" => {
                    conditions.sig_flag = tag
                        .get(1)
                        .ok_or_else(|| {
                            CoreError::InvalidCondition("sigflag tag without value".to_string())
                        })?
                        .parse()?
                }
                "pubkeys" => conditions.pubkeys = Some(parse_tag_keys(&tag)?),
                "refund" => conditions.refund_keys = Some(parse_tag_keys(&tag)?),
                // unknown tags are committed to by the secret but not enforced
                _ => {}
            }
        }
        Ok(conditions)
    }
}

fn parse_tag_value<T: FromStr>(tag: &[String]) -> Result<T, CoreError> {
    tag.get(1)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| CoreError::InvalidCondition(format!("invalid tag {tag:?}")))
}

fn parse_tag_keys(tag: &[String]) -> Result<Vec<PublicKey>, CoreError> {
    tag.iter()
        .skip(1)
        .map(|p| PublicKey::from_str(p).map_err(CoreError::Secp256k1Error))
        .collect()
}

/// Witness carried alongside a proof or blinded message. On the wire the
/// witness is a JSON object encoded as a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Witness {
    P2PK(P2PKWitness),
    Htlc(HtlcWitness),
}

impl Witness {
    pub fn signatures(&self) -> Option<&Vec<String>> {
        match self {
            Self::P2PK(witness) => Some(&witness.signatures),
            Self::Htlc(witness) => witness.signatures.as_ref(),
        }
    }

    pub fn add_signature(&mut self, signature: String) {
        match self {
            Self::P2PK(witness) => witness.signatures.push(signature),
            Self::Htlc(witness) => witness
                .signatures
                .get_or_insert_with(Vec::new)
                .push(signature),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2PKWitness {
    pub signatures: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcWitness {
    pub preimage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<String>>,
}

impl Serialize for Witness {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = match self {
            Self::P2PK(witness) => serde_json::to_string(witness),
            Self::Htlc(witness) => serde_json::to_string(witness),
        }
        .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for Witness {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let value: serde_json::Value =
            serde_json::from_str(&encoded).map_err(DeserializerError::custom)?;
        if value.get("preimage").is_some() {
            serde_json::from_value(value)
                .map(Witness::Htlc)
                .map_err(DeserializerError::custom)
        } else {
            serde_json::from_value(value)
                .map(Witness::P2PK)
                .map_err(DeserializerError::custom)
        }
    }
}

/// Signs `msg` with a BIP-340 Schnorr signature over `SHA256(msg)`.
pub fn sign_message(secret_key: &SecretKey, msg: &[u8]) -> Signature {
    let secp = Secp256k1::new();
    let hash = sha256::Hash::hash(msg);
    let message = Message::from_digest(hash.to_byte_array());
    secp.sign_schnorr(&message, &Keypair::from_secret_key(&secp, secret_key))
}

/// Verifies a BIP-340 Schnorr signature over `SHA256(msg)`.
pub fn verify_signature(pubkey: &PublicKey, msg: &[u8], signature: &Signature) -> bool {
    let secp = Secp256k1::new();
    let hash = sha256::Hash::hash(msg);
    let message = Message::from_digest(hash.to_byte_array());
    secp.verify_schnorr(signature, &message, &pubkey.x_only_public_key().0)
        .is_ok()
}

/// Counts how many of `pubkeys` have at least one valid signature over `msg`
/// among `signatures`. Each signer is counted once, so duplicated signatures
/// cannot inflate the count.
pub fn count_valid_signers(msg: &[u8], pubkeys: &[PublicKey], signatures: &[Signature]) -> u64 {
    let mut signers = HashSet::new();
    for pubkey in pubkeys {
        if signatures
            .iter()
            .any(|signature| verify_signature(pubkey, msg, signature))
        {
            signers.insert(*pubkey);
        }
    }
    signers.len() as u64
}

fn witness_signatures(witness: Option<&Witness>) -> Vec<Signature> {
    witness
        .and_then(Witness::signatures)
        .map(|signatures| {
            signatures
                .iter()
                .flat_map(|s| Signature::from_str(s))
                .collect()
        })
        .unwrap_or_default()
}

/// Constant time byte comparison; the running time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl Proof {
    /// Verifies the spending condition embedded in this proof's secret, if any.
    /// Plain secrets verify trivially.
    pub fn verify_condition(&self) -> Result<(), CoreError> {
        let secret = match Nut10Secret::parse(&self.secret) {
            Some(secret) => secret,
            None => return Ok(()),
        };
        match secret.kind {
            Kind::P2PK => self.verify_p2pk(&secret),
            Kind::HTLC => self.verify_htlc(&secret),
        }
    }

    /// NUT-11: pay to public key.
    fn verify_p2pk(&self, secret: &Nut10Secret) -> Result<(), CoreError> {
        let conditions = secret.conditions()?;
        let data_key =
            PublicKey::from_str(&secret.secret_data.data).map_err(CoreError::Secp256k1Error)?;

        let mut signers = vec![data_key];
        signers.extend(conditions.pubkeys.clone().unwrap_or_default());

        let signatures = witness_signatures(self.witness.as_ref());
        let msg = self.secret.as_bytes();

        if let Some(locktime) = conditions.locktime {
            if locktime < unix_time() {
                return match &conditions.refund_keys {
                    // after the locktime only the refund path is valid
                    Some(refund_keys) => {
                        if count_valid_signers(msg, refund_keys, &signatures) >= 1 {
                            Ok(())
                        } else {
                            Err(CoreError::ConditionsNotMet)
                        }
                    }
                    // expired lock without refund keys is spendable by anyone
                    None => Ok(()),
                };
            }
        }

        if signatures.is_empty() {
            return Err(CoreError::SignaturesNotProvided);
        }

        if count_valid_signers(msg, &signers, &signatures) >= conditions.required_sigs() {
            Ok(())
        } else {
            Err(CoreError::ConditionsNotMet)
        }
    }

    /// NUT-14: hash time locked contract.
    fn verify_htlc(&self, secret: &Nut10Secret) -> Result<(), CoreError> {
        let conditions = secret.conditions()?;
        let hash_lock =
            hex::decode(&secret.secret_data.data).map_err(CoreError::HexDecodeError)?;

        let witness = match &self.witness {
            Some(Witness::Htlc(witness)) => witness,
            _ => return Err(CoreError::SignaturesNotProvided),
        };

        let preimage = hex::decode(&witness.preimage)?;
        let preimage_hash = sha256::Hash::hash(&preimage).to_byte_array();

        if !constant_time_eq(&preimage_hash, &hash_lock) {
            // wrong preimage falls back to the refund path
            return match (conditions.locktime, &conditions.refund_keys) {
                (Some(locktime), Some(refund_keys)) if locktime < unix_time() => {
                    let signatures = witness_signatures(self.witness.as_ref());
                    if count_valid_signers(self.secret.as_bytes(), refund_keys, &signatures) >= 1 {
                        Ok(())
                    } else {
                        Err(CoreError::PreimageMismatch)
                    }
                }
                _ => Err(CoreError::PreimageMismatch),
            };
        }

        if let Some(pubkeys) = &conditions.pubkeys {
            let signatures = witness_signatures(self.witness.as_ref());
            let signed =
                count_valid_signers(secret.secret_data.nonce.as_bytes(), pubkeys, &signatures);
            if signed < conditions.required_sigs() {
                return Err(CoreError::ConditionsNotMet);
            }
        }

        Ok(())
    }
}

/// Aggregate SIG_ALL requirement over a batch of input proofs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigAllRequirement {
    pub data_key: PublicKey,
    pub signers: Vec<PublicKey>,
    pub required_sigs: u64,
}

/// Determines whether a batch of proofs is under SIG_ALL.
///
/// If any proof carries `sigflag=SIG_ALL`, every proof in the batch must carry
/// SIG_ALL with the same data key and the same required signature count.
pub fn sig_all_requirement(proofs: &Proofs) -> Result<Option<SigAllRequirement>, CoreError> {
    let mut requirement: Option<SigAllRequirement> = None;
    let mut saw_other = false;

    for proof in proofs {
        let parsed = Nut10Secret::parse(&proof.secret);
        let (data_key, conditions) = match &parsed {
            Some(secret) if secret.kind == Kind::P2PK => (
                PublicKey::from_str(&secret.secret_data.data)
                    .map_err(CoreError::Secp256k1Error)?,
                secret.conditions()?,
            ),
            _ => {
                saw_other = true;
                continue;
            }
        };

        if conditions.sig_flag != SigFlag::SigAll {
            saw_other = true;
            continue;
        }

        let mut signers = vec![data_key];
        signers.extend(conditions.pubkeys.clone().unwrap_or_default());
        let required_sigs = conditions.required_sigs();

        match &requirement {
            None => {
                requirement = Some(SigAllRequirement {
                    data_key,
                    signers,
                    required_sigs,
                })
            }
            Some(existing) => {
                if existing.data_key != data_key || existing.required_sigs != required_sigs {
                    return Err(CoreError::InvalidCondition(
                        "SIG_ALL inputs disagree on key or n_sigs".to_string(),
                    ));
                }
            }
        }
    }

    if requirement.is_some() && saw_other {
        return Err(CoreError::InvalidCondition(
            "SIG_ALL requires every input to carry SIG_ALL".to_string(),
        ));
    }

    Ok(requirement)
}

/// The message signed under SIG_ALL: every input secret concatenated with
/// every output blinded point, in batch order.
pub fn sig_all_message(proofs: &Proofs, outputs: &[BlindedMessage]) -> String {
    let mut msg = String::new();
    for proof in proofs {
        msg.push_str(&proof.secret);
    }
    for output in outputs {
        msg.push_str(&output.b_.to_string());
    }
    msg
}

/// Verifies the aggregated SIG_ALL signatures, which the first proof's witness
/// bears for the whole batch.
pub fn verify_sig_all(
    proofs: &Proofs,
    outputs: &[BlindedMessage],
    requirement: &SigAllRequirement,
) -> Result<(), CoreError> {
    let first = proofs
        .proofs()
        .first()
        .ok_or(CoreError::SignaturesNotProvided)?;
    let signatures = witness_signatures(first.witness.as_ref());
    if signatures.is_empty() {
        return Err(CoreError::SignaturesNotProvided);
    }

    let msg = sig_all_message(proofs, outputs);
    if count_valid_signers(msg.as_bytes(), &requirement.signers, &signatures)
        >= requirement.required_sigs
    {
        Ok(())
    } else {
        Err(CoreError::ConditionsNotMet)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use bitcoin_hashes::Hash;
    use pretty_assertions::assert_eq;
    use secp256k1::{PublicKey, Secp256k1, SecretKey};

    use super::{
        sig_all_message, sig_all_requirement, sign_message, verify_sig_all, verify_signature,
        HtlcWitness, Kind, Nut10Secret, P2PKWitness, SecretData, SigFlag, Witness,
    };
    use crate::blind::BlindedMessage;
    use crate::proof::{Proof, Proofs};

    fn proof_with_secret(secret: String, witness: Option<Witness>) -> Proof {
        Proof {
            amount: 1,
            keyset_id: "009a1f293253e41e".to_string(),
            secret,
            c: crate::dhke::public_key_from_hex(
                "02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904",
            )
            .expect("invalid public key"),
            witness,
        }
    }

    fn p2pk_secret(data: &str, tags: serde_json::Value) -> String {
        serde_json::to_string(&serde_json::json!([
            "P2PK",
            {
                "nonce": "859d4935c4907062a6297cf4e663e2835d90d97ecdd510745d32f6816323a41f",
                "data": data,
                "tags": tags,
            }
        ]))
        .expect("serialize secret")
    }

    #[test]
    fn test_parse_plain_secret() {
        assert!(Nut10Secret::parse("407915bc212be61a77e3e6d2aeb4c727").is_none());
        assert!(Nut10Secret::parse("[\"not a kind\"]").is_none());
    }

    #[test]
    fn test_secret_roundtrip() -> anyhow::Result<()> {
        let secret = Nut10Secret {
            kind: Kind::P2PK,
            secret_data: SecretData {
                nonce: "5d11913ee0f92fefdc82a6764fd2457a".to_string(),
                data: "026562efcfadc8e86d44da6a8adf80633d974302e62c850774db1fb36ff4cc7198"
                    .to_string(),
                tags: Some(vec![vec![
                    "key".to_string(),
                    "value1".to_string(),
                    "value2".to_string(),
                ]]),
            },
        };

        let encoded = serde_json::to_string(&secret)?;
        assert_eq!(
            encoded,
            r#"["P2PK",{"nonce":"5d11913ee0f92fefdc82a6764fd2457a","data":"026562efcfadc8e86d44da6a8adf80633d974302e62c850774db1fb36ff4cc7198","tags":[["key","value1","value2"]]}]"#
        );
        assert_eq!(Nut10Secret::parse(&encoded), Some(secret));
        Ok(())
    }

    #[test]
    fn test_verify_p2pk_single_sig() {
        // reference proof from the Nut-11 document with a valid signature
        let json = r#"{
            "amount":1,
            "secret":"[\"P2PK\",{\"nonce\":\"859d4935c4907062a6297cf4e663e2835d90d97ecdd510745d32f6816323a41f\",\"data\":\"0249098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7\",\"tags\":[[\"sigflag\",\"SIG_INPUTS\"]]}]",
            "C":"02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904",
            "id":"009a1f293253e41e",
            "witness":"{\"signatures\":[\"60f3c9b766770b46caac1d27e1ae6b77c8866ebaeba0b9489fe6a15a837eaa6fcd6eaa825499c72ac342983983fd3ba3a8a41f56677cc99ffd73da68b59e1383\"]}"
        }"#;
        let valid_proof: Proof = serde_json::from_str(json).expect("deserialize proof");
        assert!(valid_proof.verify_condition().is_ok());

        // same shape carrying a signature made over a different secret
        let json = r#"{"amount":1,"secret":"[\"P2PK\",{\"nonce\":\"859d4935c4907062a6297cf4e663e2835d90d97ecdd510745d32f6816323a41f\",\"data\":\"0249098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7\",\"tags\":[[\"sigflag\",\"SIG_INPUTS\"]]}]","C":"02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904","id":"009a1f293253e41e","witness":"{\"signatures\":[\"3426df9730d365a9d18d79bed2f3e78e9172d7107c55306ac5ddd1b2d065893366cfa24ff3c874ebf1fc22360ba5888ddf6ff5dbcb9e5f2f5a1368f7afc64f15\"]}"}"#;
        let invalid_proof: Proof = serde_json::from_str(json).expect("deserialize proof");
        assert!(invalid_proof.verify_condition().is_err());
    }

    #[test]
    fn test_verify_p2pk_multisig() {
        // two of two signatures present
        let json = r#"{"amount":0,"secret":"[\"P2PK\",{\"nonce\":\"0ed3fcb22c649dd7bbbdcca36e0c52d4f0187dd3b6a19efcc2bfbebb5f85b2a1\",\"data\":\"0249098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7\",\"tags\":[[\"pubkeys\",\"0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\",\"02142715675faf8da1ecc4d51e0b9e539fa0d52fdd96ed60dbe99adb15d6b05ad9\"],[\"n_sigs\",\"2\"],[\"sigflag\",\"SIG_INPUTS\"]]}]","C":"02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904","id":"009a1f293253e41e","witness":"{\"signatures\":[\"83564aca48c668f50d022a426ce0ed19d3a9bdcffeeaee0dc1e7ea7e98e9eff1840fcc821724f623468c94f72a8b0a7280fa9ef5a54a1b130ef3055217f467b3\",\"9a72ca2d4d5075be5b511ee48dbc5e45f259bcf4a4e8bf18587f433098a9cd61ff9737dc6e8022de57c76560214c4568377792d4c2c6432886cc7050487a1f22\"]}"}"#;
        let valid_proof: Proof = serde_json::from_str(json).expect("deserialize proof");
        assert!(valid_proof.verify_condition().is_ok());

        // only one of the two required signatures
        let json = r#"{"amount":0,"secret":"[\"P2PK\",{\"nonce\":\"0ed3fcb22c649dd7bbbdcca36e0c52d4f0187dd3b6a19efcc2bfbebb5f85b2a1\",\"data\":\"0249098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7\",\"tags\":[[\"pubkeys\",\"0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\",\"02142715675faf8da1ecc4d51e0b9e539fa0d52fdd96ed60dbe99adb15d6b05ad9\"],[\"n_sigs\",\"2\"],[\"sigflag\",\"SIG_INPUTS\"]]}]","C":"02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904","id":"009a1f293253e41e","witness":"{\"signatures\":[\"83564aca48c668f50d022a426ce0ed19d3a9bdcffeeaee0dc1e7ea7e98e9eff1840fcc821724f623468c94f72a8b0a7280fa9ef5a54a1b130ef3055217f467b3\"]}"}"#;
        let invalid_proof: Proof = serde_json::from_str(json).expect("deserialize proof");
        assert!(invalid_proof.verify_condition().is_err());
    }

    #[test]
    fn test_verify_p2pk_refund_after_locktime() {
        // locktime 21 is long past; witness carries a signature from the refund key
        let json = r#"{"amount":1,"id":"009a1f293253e41e","secret":"[\"P2PK\",{\"nonce\":\"902685f492ef3bb2ca35a47ddbba484a3365d143b9776d453947dcbf1ddf9689\",\"data\":\"026f6a2b1d709dbca78124a9f30a742985f7eddd894e72f637f7085bf69b997b9a\",\"tags\":[[\"pubkeys\",\"0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\",\"03142715675faf8da1ecc4d51e0b9e539fa0d52fdd96ed60dbe99adb15d6b05ad9\"],[\"locktime\",\"21\"],[\"n_sigs\",\"2\"],[\"refund\",\"026f6a2b1d709dbca78124a9f30a742985f7eddd894e72f637f7085bf69b997b9a\"],[\"sigflag\",\"SIG_INPUTS\"]]}]","C":"02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904","witness":"{\"signatures\":[\"710507b4bc202355c91ea3c147c0d0189c75e179d995e566336afd759cb342bcad9a593345f559d9b9e108ac2c9b5bd9f0b4b6a295028a98606a0a2e95eb54f7\"]}"}"#;
        let valid_proof: Proof = serde_json::from_str(json).expect("deserialize proof");
        assert!(valid_proof.verify_condition().is_ok());

        // same expired lock, witness signature does not match the refund key
        let json = r#"{"amount":1,"id":"009a1f293253e41e","secret":"[\"P2PK\",{\"nonce\":\"64c46e5d30df27286166814b71b5d69801704f23a7ad626b05688fbdb48dcc98\",\"data\":\"026f6a2b1d709dbca78124a9f30a742985f7eddd894e72f637f7085bf69b997b9a\",\"tags\":[[\"pubkeys\",\"0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\",\"03142715675faf8da1ecc4d51e0b9e539fa0d52fdd96ed60dbe99adb15d6b05ad9\"],[\"locktime\",\"21\"],[\"n_sigs\",\"2\"],[\"refund\",\"0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\"],[\"sigflag\",\"SIG_INPUTS\"]]}]","C":"02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904","witness":"{\"signatures\":[\"f661d3dc046d636d47cb3d06586da42c498f0300373d1c2a4f417a44252cdf3809bce207c8888f934dba0d2b1671f1b8622d526840f2d5883e571b462630c1ff\"]}"}"#;
        let invalid_proof: Proof = serde_json::from_str(json).expect("deserialize proof");
        assert!(invalid_proof.verify_condition().is_err());
    }

    #[test]
    fn test_verify_p2pk_expired_lock_without_refund_keys() {
        let secret = p2pk_secret(
            "0249098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7",
            serde_json::json!([["locktime", "21"]]),
        );
        // anyone can spend, no witness required
        let proof = proof_with_secret(secret, None);
        assert!(proof.verify_condition().is_ok());
    }

    #[test]
    fn test_verify_p2pk_missing_witness() {
        let secret = p2pk_secret(
            "0249098aa8b9d2fbec49ff8598feb17b592b986e62319a4fa488a3dc36387157a7",
            serde_json::json!([]),
        );
        let proof = proof_with_secret(secret, None);
        assert!(proof.verify_condition().is_err());
    }

    #[test]
    fn test_duplicate_signature_does_not_count_twice() -> anyhow::Result<()> {
        let secp = Secp256k1::new();
        let key_one = SecretKey::from_str(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )?;
        let key_two = SecretKey::from_str(
            "7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f7f",
        )?;

        let secret = p2pk_secret(
            &key_one.public_key(&secp).to_string(),
            serde_json::json!([
                ["pubkeys", key_two.public_key(&secp).to_string()],
                ["n_sigs", "2"]
            ]),
        );

        let signature = sign_message(&key_one, secret.as_bytes());
        let witness = Witness::P2PK(P2PKWitness {
            signatures: vec![signature.to_string(), signature.to_string()],
        });
        let proof = proof_with_secret(secret.clone(), Some(witness));
        assert!(proof.verify_condition().is_err());

        // a second distinct signer satisfies the condition
        let second = sign_message(&key_two, secret.as_bytes());
        let witness = Witness::P2PK(P2PKWitness {
            signatures: vec![signature.to_string(), second.to_string()],
        });
        let proof = proof_with_secret(secret, Some(witness));
        assert!(proof.verify_condition().is_ok());
        Ok(())
    }

    #[test]
    fn test_verify_htlc_preimage() -> anyhow::Result<()> {
        let preimage = [7u8; 32];
        let hash_lock = bitcoin_hashes::sha256::Hash::hash(&preimage);

        let secret = serde_json::to_string(&serde_json::json!([
            "HTLC",
            {
                "nonce": "da62796403af76c80cd6ce9153ed3746",
                "data": hash_lock.to_string(),
            }
        ]))?;

        let witness = Witness::Htlc(HtlcWitness {
            preimage: hex::encode(preimage),
            signatures: None,
        });
        let proof = proof_with_secret(secret.clone(), Some(witness));
        assert!(proof.verify_condition().is_ok());

        let witness = Witness::Htlc(HtlcWitness {
            preimage: hex::encode([8u8; 32]),
            signatures: None,
        });
        let proof = proof_with_secret(secret, Some(witness));
        assert!(proof.verify_condition().is_err());
        Ok(())
    }

    #[test]
    fn test_verify_htlc_with_signature() -> anyhow::Result<()> {
        let secp = Secp256k1::new();
        let key = SecretKey::from_str(
            "99590802251e78ee1051648439eedb003dc539093a48a44e7b8f2642c909ea37",
        )?;
        let preimage = [3u8; 32];
        let hash_lock = bitcoin_hashes::sha256::Hash::hash(&preimage);
        let nonce = "be1c5b87b50e6bf4cf5ac5b3e8e32a2b";

        let secret = serde_json::to_string(&serde_json::json!([
            "HTLC",
            {
                "nonce": nonce,
                "data": hash_lock.to_string(),
                "tags": [["pubkeys", key.public_key(&secp).to_string()]],
            }
        ]))?;

        // correct preimage but missing the required signature over the nonce
        let witness = Witness::Htlc(HtlcWitness {
            preimage: hex::encode(preimage),
            signatures: None,
        });
        let proof = proof_with_secret(secret.clone(), Some(witness));
        assert!(proof.verify_condition().is_err());

        let signature = sign_message(&key, nonce.as_bytes());
        let witness = Witness::Htlc(HtlcWitness {
            preimage: hex::encode(preimage),
            signatures: Some(vec![signature.to_string()]),
        });
        let proof = proof_with_secret(secret, Some(witness));
        assert!(proof.verify_condition().is_ok());
        Ok(())
    }

    #[test]
    fn test_sign_and_verify_roundtrip() -> anyhow::Result<()> {
        let secp = Secp256k1::new();
        let key = SecretKey::from_str(
            "99590802251e78ee1051648439eedb003dc539093a48a44e7b8f2642c909ea37",
        )?;
        let signature = sign_message(&key, b"some message");
        assert!(verify_signature(
            &key.public_key(&secp),
            b"some message",
            &signature
        ));
        assert!(!verify_signature(
            &key.public_key(&secp),
            b"another message",
            &signature
        ));
        Ok(())
    }

    fn sig_all_secret(nonce: &str, data: &PublicKey, n_sigs: u64) -> String {
        serde_json::to_string(&serde_json::json!([
            "P2PK",
            {
                "nonce": nonce,
                "data": data.to_string(),
                "tags": [["sigflag", "SIG_ALL"], ["n_sigs", n_sigs.to_string()]],
            }
        ]))
        .expect("serialize secret")
    }

    #[test]
    fn test_sig_all_aggregation() -> anyhow::Result<()> {
        let secp = Secp256k1::new();
        let key = SecretKey::from_str(
            "99590802251e78ee1051648439eedb003dc539093a48a44e7b8f2642c909ea37",
        )?;
        let pubkey = key.public_key(&secp);

        let mut first = proof_with_secret(sig_all_secret("6e31f0a1", &pubkey, 1), None);
        let second = proof_with_secret(sig_all_secret("9bd42722", &pubkey, 1), None);

        let outputs = vec![BlindedMessage {
            amount: 2,
            keyset_id: "009a1f293253e41e".to_string(),
            b_: crate::dhke::public_key_from_hex(
                "02634a2c2b34bec9e8a4aba4361f6bf202d7fa2365379b0840afe249a7a9d71239",
            )?,
            witness: None,
        }];

        let proofs: Proofs = vec![first.clone(), second.clone()].into();
        let requirement = sig_all_requirement(&proofs)?.expect("sig_all required");
        assert_eq!(requirement.required_sigs, 1);

        // unsigned batch must not verify
        assert!(verify_sig_all(&proofs, &outputs, &requirement).is_err());

        let msg = sig_all_message(&proofs, &outputs);
        let signature = sign_message(&key, msg.as_bytes());
        first.witness = Some(Witness::P2PK(P2PKWitness {
            signatures: vec![signature.to_string()],
        }));
        let proofs: Proofs = vec![first, second].into();
        assert!(verify_sig_all(&proofs, &outputs, &requirement).is_ok());
        Ok(())
    }

    #[test]
    fn test_sig_all_rejects_mixed_batch() -> anyhow::Result<()> {
        let secp = Secp256k1::new();
        let key = SecretKey::from_str(
            "99590802251e78ee1051648439eedb003dc539093a48a44e7b8f2642c909ea37",
        )?;
        let pubkey = key.public_key(&secp);

        let sig_all = proof_with_secret(sig_all_secret("6e31f0a1", &pubkey, 1), None);
        let plain = proof_with_secret("plain random secret".to_string(), None);

        let proofs: Proofs = vec![sig_all, plain].into();
        assert!(sig_all_requirement(&proofs).is_err());
        Ok(())
    }

    #[test]
    fn test_sig_all_flag_parsing() {
        assert_eq!("SIG_ALL".parse::<SigFlag>().ok(), Some(SigFlag::SigAll));
        assert_eq!(
            "SIG_INPUTS".parse::<SigFlag>().ok(),
            Some(SigFlag::SigInputs)
        );
        assert!("SIG_NONE".parse::<SigFlag>().is_err());
    }
}
