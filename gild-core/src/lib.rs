//! Protocol library for the gild mint: BDHKE crypto, keysets, proofs,
//! spending conditions and the request/response types of the v1 cashu API.

pub mod amount;
pub mod blind;
pub mod conditions;
pub mod dhke;
pub mod dleq;
pub mod error;
pub mod fees;
pub mod keyset;
pub mod primitives;
pub mod proof;
