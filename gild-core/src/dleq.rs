//! DLEQ proofs for offline signature validation as described in
//! [Nut-12](https://github.com/cashubtc/nuts/blob/main/12.md)
//!
//! The mint proves that the `C_` it returns was signed with the same private
//! key `a` as its published public key `A`:
//!
//! ```python
//! r = random nonce
//! R1 = r*G
//! R2 = r*B'
//! e = hash(R1, R2, A, C')
//! s = r + e*a
//! ```

use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};

use crate::dhke::hash_e;
use crate::error::CoreError;

/// DLEQ proof attached to a blind signature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlindSignatureDleq {
    pub e: SecretKey,
    pub s: SecretKey,
}

/// Produces the DLEQ proof for a signature `C_ = a*B_`.
pub fn calculate_dleq(
    c_: &PublicKey,
    b_: &PublicKey,
    mint_secret_key: &SecretKey,
) -> Result<BlindSignatureDleq, CoreError> {
    let secp = Secp256k1::new();

    let r = SecretKey::new(&mut rand::thread_rng());
    let r1 = r.public_key(&secp);
    let r2 = b_.mul_tweak(&secp, &Scalar::from(r))?;

    let e = hash_e([r1, r2, mint_secret_key.public_key(&secp), *c_]);
    let e_key = SecretKey::from_slice(&e)?;

    let s1 = e_key.mul_tweak(&Scalar::from(*mint_secret_key))?;
    let s = r.add_tweak(&Scalar::from(s1))?;

    Ok(BlindSignatureDleq { e: e_key, s })
}

/// Checks a DLEQ proof against the blinded message, the signature and the
/// mint's public key:
///
/// ```python
/// R1 = s*G - e*A
/// R2 = s*B' - e*C'
/// e == hash(R1, R2, A, C')
/// ```
pub fn verify_dleq(
    b_: &PublicKey,
    c_: &PublicKey,
    e: &SecretKey,
    s: &SecretKey,
    mint_pubkey: &PublicKey,
) -> Result<(), CoreError> {
    let secp = Secp256k1::new();
    let e_scalar = Scalar::from(*e);
    let s_scalar = Scalar::from(*s);

    let e_a = mint_pubkey.mul_tweak(&secp, &e_scalar)?;
    let r1 = s.public_key(&secp).combine(&e_a.negate(&secp))?;

    let s_b = b_.mul_tweak(&secp, &s_scalar)?;
    let e_c = c_.mul_tweak(&secp, &e_scalar)?;
    let r2 = s_b.combine(&e_c.negate(&secp))?;

    if hash_e([r1, r2, *mint_pubkey, *c_]) != e.secret_bytes() {
        return Err(CoreError::InvalidDleqProof);
    }
    Ok(())
}
