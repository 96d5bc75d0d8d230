//! This module implements Blind Diffie-Hellman Key Exchange (blind ecash) as
//! described in [Nut-00](https://github.com/cashubtc/nuts/blob/main/00.md)
//!
//! Bob (Mint):
//!```python
//! A = a*G
//! return A
//! ```
//!
//! Alice (Client):
//!```python
//! Y = hash_to_curve(secret_message)
//! r = random blinding factor
//! B'= Y + r*G
//! return B'
//! ```
//!
//! Bob:
//!```python
//! C' = a*B'
//! (= a*Y + a*r*G)
//! return C'
//!```
//!
//! Alice:
//!```python
//! C = C' - r*A
//! (= C' - a*r*G)
//! (= a*Y)
//! return C, secret_message
//!```
//!
//! Bob:
//!```python
//! Y = hash_to_curve(secret_message)
//! C == a*Y
//!```
//! If true, C must have originated from Bob

use bitcoin_hashes::{sha256, Hash};
use secp256k1::{All, Parity, PublicKey, Scalar, Secp256k1, SecretKey, XOnlyPublicKey};

use crate::error::CoreError;

const DOMAIN_SEPARATOR: &[u8; 28] = b"Secp256k1_HashToCurve_Cashu_";

#[derive(Clone, Debug)]
pub struct Dhke {
    secp: Secp256k1<All>,
}

impl Default for Dhke {
    fn default() -> Self {
        Self::new()
    }
}

impl Dhke {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    /// Maps a message deterministically to a point on the curve.
    ///
    /// `Y = PublicKey('02' || SHA256(msg_hash || counter))` where
    /// `msg_hash = SHA256(DOMAIN_SEPARATOR || message)` and `counter` is the
    /// smallest little-endian u32 producing a valid x coordinate.
    pub fn hash_to_curve(message: &[u8]) -> Result<PublicKey, CoreError> {
        let msg_hash = sha256::Hash::hash(&[DOMAIN_SEPARATOR.as_slice(), message].concat())
            .to_byte_array();

        let mut counter: u32 = 0;
        while counter < 2_u32.pow(16) {
            let mut bytes_to_hash = Vec::with_capacity(36);
            bytes_to_hash.extend_from_slice(&msg_hash);
            bytes_to_hash.extend_from_slice(&counter.to_le_bytes());
            let hash = sha256::Hash::hash(&bytes_to_hash).to_byte_array();

            match XOnlyPublicKey::from_slice(&hash) {
                Ok(pk) => return Ok(PublicKey::from_x_only_public_key(pk, Parity::Even)),
                Err(_) => counter += 1,
            }
        }

        Err(CoreError::NoCurvePoint)
    }

    /// Blind a secret (Alice step 1): `B_ = Y + r*G`
    pub fn blind(
        &self,
        secret: &[u8],
        blinding_factor: Option<SecretKey>,
    ) -> Result<(PublicKey, SecretKey), CoreError> {
        let y = Self::hash_to_curve(secret)?;
        let r = blinding_factor.unwrap_or_else(|| SecretKey::new(&mut rand::thread_rng()));
        let b = y.combine(&PublicKey::from_secret_key(&self.secp, &r))?;
        Ok((b, r))
    }

    /// Sign a blinded message (Bob step 2): `C_ = k*B_`
    pub fn sign_blinded(&self, k: &SecretKey, b: &PublicKey) -> Result<PublicKey, CoreError> {
        b.mul_tweak(&self.secp, &Scalar::from(*k))
            .map_err(CoreError::Secp256k1Error)
    }

    /// Unblind a signature (Alice step 3): `C = C_ - r*A`
    pub fn unblind(
        &self,
        c_: PublicKey,
        r: &SecretKey,
        a: &PublicKey,
    ) -> Result<PublicKey, CoreError> {
        c_.combine(
            &a.mul_tweak(&self.secp, &Scalar::from(*r))?
                .negate(&self.secp),
        )
        .map_err(CoreError::Secp256k1Error)
    }

    /// Verify an unblinded signature against a secret: `C == k*hash_to_curve(secret)`
    pub fn verify(
        &self,
        k: &SecretKey,
        c: &PublicKey,
        secret: &[u8],
    ) -> Result<bool, CoreError> {
        let y = Self::hash_to_curve(secret)?;
        Ok(*c == y.mul_tweak(&self.secp, &Scalar::from(*k))?)
    }
}

/// `e = SHA256(uncompressed(R1) || uncompressed(R2) || uncompressed(A) || uncompressed(C_))`
/// with each key hex encoded, as required for DLEQ proofs in
/// [Nut-12](https://github.com/cashubtc/nuts/blob/main/12.md)
pub fn hash_e<I>(public_keys: I) -> [u8; 32]
where
    I: IntoIterator<Item = PublicKey>,
{
    let mut e = String::new();
    for public_key in public_keys {
        e.push_str(&hex::encode(public_key.serialize_uncompressed()));
    }
    sha256::Hash::hash(e.as_bytes()).to_byte_array()
}

pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, CoreError> {
    let bytes = hex::decode(hex_key)?;
    PublicKey::from_slice(&bytes).map_err(CoreError::Secp256k1Error)
}
