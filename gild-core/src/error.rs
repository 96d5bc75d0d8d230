//! This module defines the `CoreError` enum, which represents the possible errors
//! that can occur in the gild core library.
//!
//! All of the variants implement the `Error` trait via `thiserror`, which allows
//! them to be used with the `?` operator for easy error propagation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Secp256k1Error {0}")]
    Secp256k1Error(#[from] secp256k1::Error),

    #[error("HexDecodeError {0}")]
    HexDecodeError(#[from] hex::FromHexError),

    #[error("SerdeJsonError {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("Invalid keyset id")]
    InvalidKeysetId,

    #[error("No curve point found for message")]
    NoCurvePoint,

    #[error("Key generation failed")]
    KeyGenFailed,

    #[error("Amount {0} is not supported by the keyset")]
    AmountNotSupported(u64),

    #[error("Token could not be verified")]
    TokenNotVerified,

    #[error("Secret exceeds the maximum length")]
    SecretTooLong,

    #[error("Invalid spending condition: {0}")]
    InvalidCondition(String),

    #[error("Witness signatures not provided")]
    SignaturesNotProvided,

    #[error("Spending conditions are not met")]
    ConditionsNotMet,

    #[error("Preimage does not match the hash lock")]
    PreimageMismatch,

    #[error("Invalid DLEQ proof")]
    InvalidDleqProof,
}
