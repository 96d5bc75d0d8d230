//! The mint itself: keyset cache, blind signer, proof validation and the
//! swap/mint/melt orchestrators, each in its own module.

use std::collections::BTreeMap;
use std::sync::Arc;

use gild_core::dhke::Dhke;
use gild_core::keyset::{MintKeyset, DEFAULT_MAX_ORDER};
use tokio::sync::RwLock;
use tracing::instrument;

use crate::config::{MintConfig, MINT_UNIT};
use crate::database::Database;
use crate::error::MintError;
use crate::lightning::Lightning;
use crate::model::unix_time_now;

mod conditions;
mod issue;
mod keysets;
mod melt;
mod signer;
mod swap;
mod verification;

pub use verification::{ProofRejection, ValidationOutcome};

#[derive(Clone)]
pub struct Mint {
    pub db: Arc<dyn Database>,
    pub lightning: Arc<dyn Lightning>,
    pub config: MintConfig,
    pub(crate) dhke: Dhke,
    /// Authoritative read cache over all keysets; writes go through
    /// [`Mint::generate_keyset`] and [`Mint::deactivate_keyset`] which update
    /// store and cache together.
    pub(crate) keysets: Arc<RwLock<BTreeMap<String, MintKeyset>>>,
}

impl Mint {
    /// Loads all keysets from storage and makes sure an active keyset exists
    /// for the mint unit, generating one if necessary.
    pub async fn init(
        db: Arc<dyn Database>,
        lightning: Arc<dyn Lightning>,
        config: MintConfig,
    ) -> Result<Self, MintError> {
        let mint = Self {
            db,
            lightning,
            config,
            dhke: Dhke::new(),
            keysets: Arc::new(RwLock::new(BTreeMap::new())),
        };

        let stored = mint.db.get_keysets().await?;
        {
            let mut cache = mint.keysets.write().await;
            for keyset in stored {
                cache.insert(keyset.keyset_id.clone(), keyset);
            }
        }

        if mint.get_active_keyset(&MINT_UNIT).await.is_none() {
            mint.generate_keyset(MINT_UNIT, 0, DEFAULT_MAX_ORDER).await?;
        }

        mint.reconcile_pending_melts().await?;
        Ok(mint)
    }

    /// Periodic housekeeping: expired unpaid quotes are dropped and expired
    /// pending proofs released.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn sweep_expired(&self) -> Result<(), MintError> {
        let now = unix_time_now();
        let mint_quotes = self.db.delete_expired_mint_quotes(now).await?;
        let melt_quotes = self.db.delete_expired_melt_quotes(now).await?;
        let pending = self.db.sweep_expired_pending(now).await?;
        if mint_quotes + melt_quotes + pending > 0 {
            tracing::info!(
                "swept {mint_quotes} mint quotes, {melt_quotes} melt quotes, {pending} pending proofs"
            );
        }
        Ok(())
    }
}
