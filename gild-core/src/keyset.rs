//! This module defines the `MintKeyset` struct, which holds one denomination
//! indexed set of keypairs for a unit, as described in
//! [Nut-02](https://github.com/cashubtc/nuts/blob/main/02.md)
//!
//! A keyset carries one unit, one input fee rate and an active flag. Its id is
//! a pure function of the public keys: two keysets with identical public keys
//! have identical ids. Deactivated keysets keep validating old proofs; only
//! signing is refused for them.

use std::collections::BTreeMap;

use bitcoin_hashes::{sha256, Hash};
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::primitives::CurrencyUnit;

/// Highest power of two a freshly generated keyset signs: `2^0 ..= 2^MAX_ORDER`.
pub const DEFAULT_MAX_ORDER: u8 = 20;

const KEYSET_VERSION: &str = "00";

#[derive(Debug, Clone)]
pub struct MintKeyset {
    pub keyset_id: String,
    pub unit: CurrencyUnit,
    pub active: bool,
    pub input_fee_ppk: u64,
    pub private_keys: BTreeMap<u64, SecretKey>,
    pub public_keys: BTreeMap<u64, PublicKey>,
}

impl MintKeyset {
    /// Generates a fresh keyset with one CSPRNG sampled keypair per
    /// denomination `2^i` for `i` in `0..=max_order`.
    pub fn generate(
        unit: CurrencyUnit,
        input_fee_ppk: u64,
        max_order: u8,
    ) -> Result<Self, CoreError> {
        let secp = Secp256k1::new();
        let mut private_keys = BTreeMap::new();
        let mut public_keys = BTreeMap::new();

        for i in 0..=max_order {
            let amount = 2u64.pow(i as u32);
            let secret_key = sample_secret_key()?;
            public_keys.insert(amount, secret_key.public_key(&secp));
            private_keys.insert(amount, secret_key);
        }

        Ok(Self {
            keyset_id: derive_keyset_id(&public_keys),
            unit,
            active: true,
            input_fee_ppk,
            private_keys,
            public_keys,
        })
    }

    /// Returns the signing key for a denomination.
    pub fn private_key(&self, amount: u64) -> Result<&SecretKey, CoreError> {
        self.private_keys
            .get(&amount)
            .ok_or(CoreError::AmountNotSupported(amount))
    }

    pub fn info(&self) -> KeysetInfo {
        KeysetInfo {
            id: self.keyset_id.clone(),
            unit: self.unit.clone(),
            active: self.active,
            input_fee_ppk: self.input_fee_ppk,
        }
    }
}

/// Summary of a keyset as listed by `GET /v1/keysets`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
pub struct KeysetInfo {
    pub id: String,
    pub unit: CurrencyUnit,
    pub active: bool,
    pub input_fee_ppk: u64,
}

/// Derives a keyset id from the public keys:
/// sort by denomination ascending, concatenate the compressed key bytes,
/// SHA256, take the first 14 hex characters and prefix the version byte.
pub fn derive_keyset_id(public_keys: &BTreeMap<u64, PublicKey>) -> String {
    let pubkeys_concat = public_keys
        .values()
        .flat_map(|pubkey| pubkey.serialize())
        .collect::<Vec<u8>>();
    let hashed_pubkeys = hex::encode(sha256::Hash::hash(&pubkeys_concat).to_byte_array());
    format!("{KEYSET_VERSION}{}", &hashed_pubkeys[..14])
}

/// Checks shape only: 16 lowercase hex chars carrying the version prefix.
pub fn is_valid_keyset_id(id: &str) -> bool {
    id.len() == 16
        && id.starts_with(KEYSET_VERSION)
        && id.chars().all(|c| c.is_ascii_hexdigit())
}

fn sample_secret_key() -> Result<SecretKey, CoreError> {
    // rejection-sample until the 32 bytes form a valid scalar
    loop {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|_| CoreError::KeyGenFailed)?;
        if let Ok(key) = SecretKey::from_slice(&bytes) {
            return Ok(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::{derive_keyset_id, is_valid_keyset_id, MintKeyset, DEFAULT_MAX_ORDER};
    use crate::dhke::public_key_from_hex;
    use crate::primitives::CurrencyUnit;

    #[test]
    fn test_derive_keyset_id() -> anyhow::Result<()> {
        // reference keyset from the Nut-02 document
        let keys: BTreeMap<u64, secp256k1::PublicKey> = [
            (
                1u64,
                "03a40f20667ed53513075dc51e715ff2046cad64eb68960632269ba7f0210e38bc",
            ),
            (
                2,
                "03fd4ce5a16b65576145949e6f99f445f8249fee17c606b688b504a849cdc452de",
            ),
            (
                4,
                "02648eccfa4c026960966276fa5a4cae46ce0fd432211a4f449bf84f13aa5f8303",
            ),
            (
                8,
                "02fdfd6796bfeac490cbee12f778f867f0a2c68f6508d17c649759ea0dc3547528",
            ),
        ]
        .into_iter()
        .map(|(amount, hex)| Ok((amount, public_key_from_hex(hex)?)))
        .collect::<anyhow::Result<_>>()?;

        let id = derive_keyset_id(&keys);
        assert_eq!(id, "00456a94ab4e1c46");
        assert!(is_valid_keyset_id(&id));
        Ok(())
    }

    #[test]
    fn test_generate() -> anyhow::Result<()> {
        let keyset = MintKeyset::generate(CurrencyUnit::Sat, 100, DEFAULT_MAX_ORDER)?;

        assert_eq!(keyset.private_keys.len(), DEFAULT_MAX_ORDER as usize + 1);
        assert_eq!(keyset.public_keys.len(), DEFAULT_MAX_ORDER as usize + 1);
        assert!(keyset.active);
        assert_eq!(keyset.input_fee_ppk, 100);
        assert!(keyset.public_keys.keys().all(|a| a.is_power_of_two()));

        // id is a pure function of the public keys
        assert_eq!(keyset.keyset_id, derive_keyset_id(&keyset.public_keys));
        assert_eq!(keyset.keyset_id.len(), 16);
        assert!(keyset.keyset_id.starts_with("00"));
        Ok(())
    }

    #[test]
    fn test_generate_distinct() -> anyhow::Result<()> {
        let a = MintKeyset::generate(CurrencyUnit::Sat, 0, 4)?;
        let b = MintKeyset::generate(CurrencyUnit::Sat, 0, 4)?;
        assert_ne!(a.keyset_id, b.keyset_id);
        Ok(())
    }

    #[test]
    fn test_private_key_lookup() -> anyhow::Result<()> {
        let keyset = MintKeyset::generate(CurrencyUnit::Sat, 0, 4)?;
        assert!(keyset.private_key(8).is_ok());
        assert!(keyset.private_key(32).is_err());
        assert!(keyset.private_key(3).is_err());
        Ok(())
    }
}
