//! Storage abstraction for the mint.
//!
//! Each method is one atomic operation: implementations wrap multi-row writes
//! in a transaction and rely on storage-level unique constraints on the proof
//! identifier `Y` for double-spend defense. An in-memory pre-check is never
//! the authority.

use async_trait::async_trait;
use gild_core::keyset::MintKeyset;
use gild_core::primitives::{MeltQuoteState, ProofStateEntry};

use crate::error::MintError;
use crate::model::{BlindSignatureRecord, MeltQuote, MintQuote, PendingProof, SpentProof};

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait Database: Send + Sync {
    // --- keysets

    async fn add_keyset(&self, keyset: &MintKeyset) -> Result<(), MintError>;

    /// Loads every keyset ever generated, including deactivated ones.
    async fn get_keysets(&self) -> Result<Vec<MintKeyset>, MintError>;

    async fn set_keyset_active(&self, keyset_id: &str, active: bool) -> Result<(), MintError>;

    // --- spent and pending proofs

    /// Inserts all rows or none. Fails with [`MintError::TokenAlreadySpent`]
    /// listing the offending `Y`s when any row collides with a spent or
    /// pending proof.
    async fn mark_spent(&self, proofs: &[SpentProof]) -> Result<(), MintError>;

    /// Same atomicity and uniqueness as [`Database::mark_spent`], across both
    /// the spent and pending namespaces.
    async fn mark_pending(&self, proofs: &[PendingProof]) -> Result<(), MintError>;

    /// Single transaction: delete the pending rows for the given spent rows'
    /// `Y`s and insert the spent rows. Used only on Lightning success.
    async fn promote_pending_to_spent(&self, proofs: &[SpentProof]) -> Result<(), MintError>;

    /// Releases pending proofs after a confirmed Lightning failure.
    async fn remove_pending(&self, ys: &[String]) -> Result<(), MintError>;

    /// The pending proofs locked to a melt quote, for reconciliation.
    async fn get_pending_proofs_by_quote(
        &self,
        quote_id: &str,
    ) -> Result<Vec<PendingProof>, MintError>;

    /// Spend state per `Y`, input order preserved. A pending row whose
    /// `expires_at` is before `now` reports as unspent.
    async fn proof_states(
        &self,
        ys: &[String],
        now: u64,
    ) -> Result<Vec<ProofStateEntry>, MintError>;

    /// Deletes pending rows with `expires_at < now`, returning the count.
    async fn sweep_expired_pending(&self, now: u64) -> Result<u64, MintError>;

    // --- mint quotes

    async fn add_mint_quote(&self, quote: &MintQuote) -> Result<(), MintError>;

    async fn get_mint_quote(&self, quote_id: &str) -> Result<Option<MintQuote>, MintError>;

    /// Compare-and-swap `UNPAID -> PAID`. Returns whether the transition won.
    async fn mark_mint_quote_paid(&self, quote_id: &str) -> Result<bool, MintError>;

    /// Compare-and-swap `PAID -> ISSUED`. Returns whether the transition won.
    async fn mark_mint_quote_issued(
        &self,
        quote_id: &str,
        issued_at: u64,
    ) -> Result<bool, MintError>;

    async fn delete_expired_mint_quotes(&self, now: u64) -> Result<u64, MintError>;

    // --- melt quotes

    async fn add_melt_quote(&self, quote: &MeltQuote) -> Result<(), MintError>;

    async fn get_melt_quote(&self, quote_id: &str) -> Result<Option<MeltQuote>, MintError>;

    /// Compare-and-swap on the melt quote state. Returns whether the
    /// transition won.
    async fn set_melt_quote_state(
        &self,
        quote_id: &str,
        expected: MeltQuoteState,
        new_state: MeltQuoteState,
    ) -> Result<bool, MintError>;

    /// Compare-and-swap `PENDING -> PAID`, recording preimage and fee.
    async fn mark_melt_quote_paid(
        &self,
        quote_id: &str,
        payment_preimage: Option<&str>,
        fee_paid: Option<u64>,
    ) -> Result<bool, MintError>;

    /// Melt quotes stuck `PENDING`, for startup reconciliation.
    async fn get_pending_melt_quotes(&self) -> Result<Vec<MeltQuote>, MintError>;

    async fn delete_expired_melt_quotes(&self, now: u64) -> Result<u64, MintError>;

    // --- blind signatures (restore index)

    /// Appends records; a `B_` that was already signed fails the whole batch
    /// with [`MintError::BlindedMessageAlreadySigned`].
    async fn add_blind_signatures(
        &self,
        records: &[BlindSignatureRecord],
    ) -> Result<(), MintError>;

    /// Stored records per `B_`, input order preserved.
    async fn get_blind_signatures(
        &self,
        bs: &[String],
    ) -> Result<Vec<Option<BlindSignatureRecord>>, MintError>;
}
