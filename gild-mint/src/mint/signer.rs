//! Blind signing and the Nut-09 restore index.

use gild_core::blind::{BlindedMessage, BlindedSignature};
use gild_core::dleq::calculate_dleq;
use tracing::instrument;

use super::Mint;
use crate::error::MintError;
use crate::model::BlindSignatureRecord;

impl Mint {
    /// Signs a batch of blinded messages, recording every signature by its
    /// `B_` for later restore. Order preserving. Fails with
    /// [`MintError::KeysetInactive`] when a message names a rotated keyset and
    /// with [`MintError::BlindedMessageAlreadySigned`] when a `B_` was signed
    /// before.
    #[instrument(level = "debug", skip_all, err)]
    pub async fn sign_blinded_messages(
        &self,
        outputs: &[BlindedMessage],
    ) -> Result<Vec<BlindedSignature>, MintError> {
        let mut signatures = Vec::with_capacity(outputs.len());
        let mut records = Vec::with_capacity(outputs.len());

        for output in outputs {
            let keyset = self
                .get_keyset_by_id(&output.keyset_id)
                .await
                .ok_or_else(|| MintError::KeysetUnknown(output.keyset_id.clone()))?;
            if !keyset.active {
                return Err(MintError::KeysetInactive(output.keyset_id.clone()));
            }

            let private_key = keyset
                .private_key(output.amount)
                .map_err(|_| MintError::InvalidSignature)?;
            let c_ = self
                .dhke
                .sign_blinded(private_key, &output.b_)
                .map_err(|_| MintError::InvalidSignature)?;
            let dleq = calculate_dleq(&c_, &output.b_, private_key)
                .map_err(|_| MintError::InvalidSignature)?;

            let signature = BlindedSignature {
                amount: output.amount,
                keyset_id: output.keyset_id.clone(),
                c_,
                dleq: Some(dleq),
            };
            records.push(BlindSignatureRecord::new(
                output.b_.to_string(),
                &signature,
            ));
            signatures.push(signature);
        }

        self.db.add_blind_signatures(&records).await?;
        Ok(signatures)
    }

    /// Nut-09: returns the previously issued signatures for the subset of
    /// `outputs` whose `B_` is known, in request order.
    #[instrument(level = "debug", skip_all, err)]
    pub async fn restore_signatures(
        &self,
        outputs: &[BlindedMessage],
    ) -> Result<(Vec<BlindedMessage>, Vec<BlindedSignature>), MintError> {
        let bs: Vec<String> = outputs.iter().map(|o| o.b_.to_string()).collect();
        let records = self.db.get_blind_signatures(&bs).await?;

        let mut found_outputs = Vec::new();
        let mut signatures = Vec::new();
        for (output, record) in outputs.iter().zip(records) {
            if let Some(record) = record {
                found_outputs.push(output.clone());
                signatures.push(record.signature()?);
            }
        }
        Ok((found_outputs, signatures))
    }
}
