//! This module defines the `BlindedMessage` and `BlindedSignature` structs, which
//! are used for representing blinded messages and signatures in Cashu as described
//! in [Nut-00](https://github.com/cashubtc/nuts/blob/main/00.md)
//!
//! The `TotalAmount` trait provides a `total_amount` method for summing a batch
//! of either type.

use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;

use crate::conditions::Witness;
use crate::dleq::BlindSignatureDleq;

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct BlindedMessage {
    pub amount: u64,
    #[serde(rename = "id")]
    pub keyset_id: String,
    #[serde(rename = "B_")]
    #[schema(value_type = String)]
    pub b_: PublicKey,
    #[schema(value_type = Option<String>)]
    pub witness: Option<Witness>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct BlindedSignature {
    pub amount: u64,
    #[serde(rename = "id")]
    pub keyset_id: String,
    #[serde(rename = "C_")]
    #[schema(value_type = String)]
    pub c_: PublicKey,
    #[schema(value_type = Option<Object>)]
    pub dleq: Option<BlindSignatureDleq>,
}

pub trait TotalAmount {
    fn total_amount(&self) -> u64;
}

impl TotalAmount for Vec<BlindedSignature> {
    fn total_amount(&self) -> u64 {
        self.iter().fold(0, |acc, x| acc + x.amount)
    }
}

impl TotalAmount for Vec<BlindedMessage> {
    fn total_amount(&self) -> u64 {
        self.iter().fold(0, |acc, x| acc + x.amount)
    }
}

impl TotalAmount for [BlindedMessage] {
    fn total_amount(&self) -> u64 {
        self.iter().fold(0, |acc, x| acc + x.amount)
    }
}
