//! The mint error type and its mapping onto the Nut-00 wire format.
//!
//! Every error a handler can surface carries the protocol error code of the
//! Nut documents. Internal failures are collapsed to a generic detail with
//! code 0 so that storage or backend internals never leak to wallets.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gild_core::error::CoreError;
use serde_json::json;
use thiserror::Error;
use tracing::{event, Level};

use crate::lightning::error::LightningError;

#[derive(Error, Debug)]
pub enum MintError {
    // cryptographic
    #[error("Token could not be verified")]
    InvalidSignature,

    #[error("Blinded message has already been signed")]
    BlindedMessageAlreadySigned,

    // double spend; also covers collisions with pending proofs
    #[error("Token already spent")]
    TokenAlreadySpent { ys: Vec<String> },

    // balance
    #[error("Transaction is not balanced: inputs {inputs}, outputs {outputs}, fee {fee}")]
    TransactionNotBalanced {
        inputs: u64,
        outputs: u64,
        fee: u64,
    },

    #[error("Sum of output amounts {outputs} does not match quote amount {expected}")]
    AmountMismatch { outputs: u64, expected: u64 },

    #[error("Amount {0} is outside of the allowed range [{1}, {2}]")]
    AmountOutsideLimit(u64, u64, u64),

    // structural
    #[error("Duplicate inputs provided")]
    DuplicateInputs,

    #[error("Duplicate outputs provided")]
    DuplicateOutputs,

    #[error("Inputs include multiple units")]
    MultipleUnits,

    #[error("Inputs and outputs are not of the same unit")]
    InputOutputUnitMismatch,

    #[error("Amountless invoices are not supported")]
    AmountlessNotSupported,

    #[error("Unit {0} is not supported")]
    UnitNotSupported(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // keysets
    #[error("Keyset {0} is not known")]
    KeysetUnknown(String),

    #[error("Keyset {0} is inactive")]
    KeysetInactive(String),

    // quotes
    #[error("Quote {0} not found")]
    QuoteNotFound(String),

    #[error("Quote has not been paid")]
    QuoteNotPaid,

    #[error("Tokens have already been issued for quote")]
    TokensAlreadyIssued,

    #[error("Minting is disabled")]
    MintingDisabled,

    #[error("Lightning payment failed")]
    LightningPaymentFailed,

    #[error("Quote is pending")]
    QuotePending,

    #[error("Invoice is already paid")]
    InvoiceAlreadyPaid,

    #[error("Quote has expired")]
    QuoteExpired,

    // internal
    #[error("DB Error {0}")]
    Db(#[from] sqlx::Error),

    #[error("Lightning Error {0}")]
    Lightning(#[from] LightningError),

    #[error("Crypto error {0}")]
    Crypto(#[from] CoreError),

    #[error("Key generation failed")]
    KeyGenFailed,

    #[error("Serde Error {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MintError {
    /// Nut-00 error code. Zero means an internal or unspecified failure.
    pub fn code(&self) -> u64 {
        match self {
            Self::BlindedMessageAlreadySigned => 10002,
            Self::InvalidSignature => 10003,
            Self::TokenAlreadySpent { .. } => 11001,
            Self::TransactionNotBalanced { .. } => 11002,
            Self::UnitNotSupported(_) => 11005,
            Self::AmountOutsideLimit(..) => 11006,
            Self::DuplicateInputs => 11007,
            Self::DuplicateOutputs => 11008,
            Self::MultipleUnits => 11009,
            Self::InputOutputUnitMismatch => 11010,
            Self::AmountlessNotSupported => 11011,
            Self::AmountMismatch { .. } => 11012,
            Self::KeysetUnknown(_) => 12001,
            Self::KeysetInactive(_) => 12002,
            Self::QuoteNotPaid => 20001,
            Self::TokensAlreadyIssued => 20002,
            Self::MintingDisabled => 20003,
            Self::LightningPaymentFailed => 20004,
            Self::QuotePending => 20005,
            Self::InvoiceAlreadyPaid => 20006,
            Self::QuoteExpired => 20007,
            _ => 0,
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Db(_) | Self::Serialization(_) | Self::KeyGenFailed
        )
    }
}

impl IntoResponse for MintError {
    fn into_response(self) -> Response {
        event!(Level::ERROR, "error in mint: {:?}", self);

        let (status, detail) = if self.is_internal() {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        } else {
            (StatusCode::BAD_REQUEST, self.to_string())
        };

        let body = Json(json!({
            "detail": detail,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
