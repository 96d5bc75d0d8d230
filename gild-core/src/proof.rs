//! This module defines the `Proof` and `Proofs` structs, which are used for
//! representing input tokens as described in
//! [Nut-00](https://github.com/cashubtc/nuts/blob/main/00.md)
//!
//! A proof's stable identifier is `Y = hash_to_curve(secret)`, the value the
//! mint tracks for spent/pending bookkeeping.

use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;

use crate::conditions::Witness;
use crate::dhke::Dhke;
use crate::error::CoreError;

/// Upper bound on the secret, in bytes.
pub const MAX_SECRET_LENGTH: usize = 1024;

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Proof {
    pub amount: u64,
    #[serde(rename = "id")]
    pub keyset_id: String,
    pub secret: String,
    #[serde(rename = "C")]
    #[schema(value_type = String)]
    pub c: PublicKey,
    #[schema(value_type = Option<String>)]
    pub witness: Option<Witness>,
}

impl Proof {
    pub const fn new(amount: u64, secret: String, c: PublicKey, keyset_id: String) -> Self {
        Self {
            amount,
            keyset_id,
            secret,
            c,
            witness: None,
        }
    }

    /// `Y = hash_to_curve(secret)`, the identifier used for spent lookups.
    pub fn y(&self) -> Result<PublicKey, CoreError> {
        if self.secret.len() > MAX_SECRET_LENGTH {
            return Err(CoreError::SecretTooLong);
        }
        Dhke::hash_to_curve(self.secret.as_bytes())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Proofs(pub(crate) Vec<Proof>);

impl Proofs {
    pub fn new(proofs: Vec<Proof>) -> Self {
        Self(proofs)
    }

    pub const fn empty() -> Self {
        Self(vec![])
    }

    pub fn total_amount(&self) -> u64 {
        self.0.iter().map(|proof| proof.amount).sum()
    }

    pub fn proofs(&self) -> &[Proof] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `Y` of every proof, in input order.
    pub fn ys(&self) -> Result<Vec<PublicKey>, CoreError> {
        self.0.iter().map(|proof| proof.y()).collect()
    }
}

impl From<Vec<Proof>> for Proofs {
    fn from(from: Vec<Proof>) -> Self {
        Self(from)
    }
}

impl From<Proof> for Proofs {
    fn from(from: Proof) -> Self {
        Self(vec![from])
    }
}

impl<'a> IntoIterator for &'a Proofs {
    type Item = &'a Proof;
    type IntoIter = std::slice::Iter<'a, Proof>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::proof::{Proof, Proofs};

    #[test]
    fn test_proof_deserialize() -> anyhow::Result<()> {
        let js = json!(
            {
              "id": "009a1f293253e41e",
              "amount": 2,
              "secret": "407915bc212be61a77e3e6d2aeb4c727980bda51cd06a6afc29e2861768a7837",
              "C": "02c020067db727d586bc3183aecf97fcb800c3f4cc4759f69c626c9db5d8f5b5d4"
            }
        );

        let proof = serde_json::from_value::<Proof>(js)?;
        assert_eq!(proof.amount, 2);
        assert_eq!(proof.keyset_id, "009a1f293253e41e".to_string());
        assert!(proof.witness.is_none());
        assert_eq!(
            proof.c.to_string(),
            "02c020067db727d586bc3183aecf97fcb800c3f4cc4759f69c626c9db5d8f5b5d4".to_string()
        );
        Ok(())
    }

    #[test]
    fn test_y_is_stable() -> anyhow::Result<()> {
        let proof = serde_json::from_value::<Proof>(json!({
            "id": "009a1f293253e41e",
            "amount": 2,
            "secret": "407915bc212be61a77e3e6d2aeb4c727980bda51cd06a6afc29e2861768a7837",
            "C": "02c020067db727d586bc3183aecf97fcb800c3f4cc4759f69c626c9db5d8f5b5d4"
        }))?;

        let y1 = proof.y()?;
        let y2 = proof.y()?;
        assert_eq!(y1, y2);
        Ok(())
    }

    #[test]
    fn test_secret_too_long() -> anyhow::Result<()> {
        let mut proof = serde_json::from_value::<Proof>(json!({
            "id": "009a1f293253e41e",
            "amount": 2,
            "secret": "x",
            "C": "02c020067db727d586bc3183aecf97fcb800c3f4cc4759f69c626c9db5d8f5b5d4"
        }))?;
        proof.secret = "a".repeat(1025);
        assert!(proof.y().is_err());
        Ok(())
    }

    #[test]
    fn test_total_amount() {
        let c = crate::dhke::public_key_from_hex(
            "02c020067db727d586bc3183aecf97fcb800c3f4cc4759f69c626c9db5d8f5b5d4",
        )
        .expect("invalid public key");
        let proofs: Proofs = vec![
            Proof::new(1, "a".to_string(), c, "009a1f293253e41e".to_string()),
            Proof::new(4, "b".to_string(), c, "009a1f293253e41e".to_string()),
        ]
        .into();
        assert_eq!(proofs.total_amount(), 5);
        assert_eq!(proofs.len(), 2);
    }
}
