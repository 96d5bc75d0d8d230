//! Keyset management: generation, rotation and cached reads.

use gild_core::keyset::{KeysetInfo, MintKeyset};
use gild_core::primitives::CurrencyUnit;
use secp256k1::SecretKey;
use tracing::instrument;

use super::Mint;
use crate::error::MintError;

impl Mint {
    /// Generates and activates a fresh keyset for a unit, persisting it before
    /// it becomes visible to readers. Any previously active keyset for the
    /// unit is deactivated in the same cache update.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn generate_keyset(
        &self,
        unit: CurrencyUnit,
        input_fee_ppk: u64,
        max_order: u8,
    ) -> Result<MintKeyset, MintError> {
        let keyset = MintKeyset::generate(unit.clone(), input_fee_ppk, max_order)
            .map_err(|_| MintError::KeyGenFailed)?;

        let mut cache = self.keysets.write().await;
        self.db.add_keyset(&keyset).await?;

        let previous: Vec<String> = cache
            .values()
            .filter(|k| k.unit == unit && k.active)
            .map(|k| k.keyset_id.clone())
            .collect();
        for keyset_id in previous {
            self.db.set_keyset_active(&keyset_id, false).await?;
            if let Some(old) = cache.get_mut(&keyset_id) {
                old.active = false;
            }
        }

        cache.insert(keyset.keyset_id.clone(), keyset.clone());
        tracing::info!("generated keyset {} for unit {unit}", keyset.keyset_id);
        Ok(keyset)
    }

    /// Stops signing with a keyset. Proofs of the keyset keep validating.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn deactivate_keyset(&self, keyset_id: &str) -> Result<(), MintError> {
        let mut cache = self.keysets.write().await;
        self.db.set_keyset_active(keyset_id, false).await?;
        match cache.get_mut(keyset_id) {
            Some(keyset) => {
                keyset.active = false;
                Ok(())
            }
            None => Err(MintError::KeysetUnknown(keyset_id.to_string())),
        }
    }

    pub async fn get_active_keyset(&self, unit: &CurrencyUnit) -> Option<MintKeyset> {
        let cache = self.keysets.read().await;
        cache
            .values()
            .find(|keyset| keyset.unit == *unit && keyset.active)
            .cloned()
    }

    pub async fn get_keyset_by_id(&self, keyset_id: &str) -> Option<MintKeyset> {
        let cache = self.keysets.read().await;
        cache.get(keyset_id).cloned()
    }

    pub async fn get_keyset_infos(&self) -> Vec<KeysetInfo> {
        let cache = self.keysets.read().await;
        cache.values().map(MintKeyset::info).collect()
    }

    /// The signing key of a keyset for one denomination.
    pub async fn get_private_key(
        &self,
        keyset_id: &str,
        amount: u64,
    ) -> Result<SecretKey, MintError> {
        let cache = self.keysets.read().await;
        let keyset = cache
            .get(keyset_id)
            .ok_or_else(|| MintError::KeysetUnknown(keyset_id.to_string()))?;
        keyset
            .private_key(amount)
            .map(|key| *key)
            .map_err(|_| MintError::InvalidSignature)
    }
}
