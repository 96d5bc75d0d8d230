//! Storage entities owned by the mint: spent and pending proofs, mint and
//! melt quotes, and the append-only blind signature record backing restore.

use gild_core::blind::BlindedSignature;
use gild_core::dhke::public_key_from_hex;
use gild_core::dleq::BlindSignatureDleq;
use gild_core::primitives::{CurrencyUnit, MeltQuoteState, MintQuoteState};
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::MintError;

/// A terminally spent proof, keyed by `Y = hash_to_curve(secret)` (hex).
/// Spent rows are never deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentProof {
    pub y: String,
    pub keyset_id: String,
    pub amount: u64,
    pub witness: Option<String>,
    pub spent_at: u64,
}

/// A proof locked to an in-flight melt. Either promoted to a [`SpentProof`]
/// on Lightning success or removed on failure or expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingProof {
    pub y: String,
    pub keyset_id: String,
    pub amount: u64,
    pub quote_id: Option<String>,
    pub created_at: u64,
    pub expires_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintQuote {
    pub quote_id: String,
    pub unit: CurrencyUnit,
    pub amount: u64,
    /// bolt11 payment request backing the quote
    pub request: String,
    pub payment_hash: String,
    pub state: MintQuoteState,
    pub expiry: u64,
    pub issued_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeltQuote {
    pub quote_id: String,
    pub unit: CurrencyUnit,
    pub amount: u64,
    pub request: String,
    pub fee_reserve: u64,
    pub state: MeltQuoteState,
    pub payment_preimage: Option<String>,
    pub fee_paid: Option<u64>,
    pub expiry: u64,
    pub mpp_amount_msat: Option<u64>,
}

/// Append-only record of an issued blind signature, indexed by the blinded
/// message `B_` (hex). Enables Nut-09 restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindSignatureRecord {
    pub b_: String,
    pub keyset_id: String,
    pub amount: u64,
    pub c_: String,
    pub dleq_e: Option<String>,
    pub dleq_s: Option<String>,
}

impl BlindSignatureRecord {
    pub fn new(b_: String, signature: &BlindedSignature) -> Self {
        Self {
            b_,
            keyset_id: signature.keyset_id.clone(),
            amount: signature.amount,
            c_: signature.c_.to_string(),
            dleq_e: signature
                .dleq
                .as_ref()
                .map(|dleq| dleq.e.display_secret().to_string()),
            dleq_s: signature
                .dleq
                .as_ref()
                .map(|dleq| dleq.s.display_secret().to_string()),
        }
    }

    pub fn signature(&self) -> Result<BlindedSignature, MintError> {
        let dleq = match (&self.dleq_e, &self.dleq_s) {
            (Some(e), Some(s)) => Some(BlindSignatureDleq {
                e: SecretKey::from_str(e).map_err(|_| MintError::InvalidSignature)?,
                s: SecretKey::from_str(s).map_err(|_| MintError::InvalidSignature)?,
            }),
            _ => None,
        };
        Ok(BlindedSignature {
            amount: self.amount,
            keyset_id: self.keyset_id.clone(),
            c_: public_key_from_hex(&self.c_).map_err(|_| MintError::InvalidSignature)?,
            dleq,
        })
    }
}

pub fn unix_time_now() -> u64 {
    chrono::Utc::now().timestamp() as u64
}
