//! Shared request validation: format and duplicate checks, unit checks,
//! fee computation and the proof validator.

use std::collections::{HashMap, HashSet};

use gild_core::blind::BlindedMessage;
use gild_core::fees::calculate_input_fee;
use gild_core::primitives::{CurrencyUnit, ProofState};
use gild_core::proof::{Proof, Proofs};
use secp256k1::PublicKey;
use tracing::instrument;

use super::Mint;
use crate::error::MintError;
use crate::model::unix_time_now;

/// Why a single proof was rejected by [`Mint::validate_proofs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofRejection {
    AlreadySpent,
    Pending,
    UnknownKeyset,
    InvalidDenomination,
    InvalidSignature,
}

impl Mint {
    pub(crate) fn check_inputs_unique(inputs: &Proofs) -> Result<(), MintError> {
        let mut secrets = HashSet::new();
        if !inputs.into_iter().all(|proof| secrets.insert(&proof.secret)) {
            return Err(MintError::DuplicateInputs);
        }
        Ok(())
    }

    pub(crate) fn check_outputs_unique(outputs: &[BlindedMessage]) -> Result<(), MintError> {
        let mut blinded = HashSet::new();
        if !outputs.iter().all(|output| blinded.insert(output.b_)) {
            return Err(MintError::DuplicateOutputs);
        }
        Ok(())
    }

    /// All input keysets must exist and agree on one unit. Inactive keysets
    /// stay spendable.
    pub(crate) async fn inputs_unit(&self, inputs: &Proofs) -> Result<CurrencyUnit, MintError> {
        let mut units = HashSet::new();
        for proof in inputs {
            let keyset = self
                .get_keyset_by_id(&proof.keyset_id)
                .await
                .ok_or_else(|| MintError::KeysetUnknown(proof.keyset_id.clone()))?;
            units.insert(keyset.unit);
        }
        if units.len() > 1 {
            return Err(MintError::MultipleUnits);
        }
        units.into_iter().next().ok_or_else(|| {
            MintError::InvalidRequest("no inputs provided".to_string())
        })
    }

    /// Output keysets must exist, be active and agree on one unit.
    pub(crate) async fn outputs_unit(
        &self,
        outputs: &[BlindedMessage],
    ) -> Result<CurrencyUnit, MintError> {
        let mut units = HashSet::new();
        for output in outputs {
            let keyset = self
                .get_keyset_by_id(&output.keyset_id)
                .await
                .ok_or_else(|| MintError::KeysetUnknown(output.keyset_id.clone()))?;
            if !keyset.active {
                return Err(MintError::KeysetInactive(output.keyset_id.clone()));
            }
            if !keyset.public_keys.contains_key(&output.amount) {
                return Err(MintError::InvalidRequest(format!(
                    "amount {} is not a denomination of keyset {}",
                    output.amount, output.keyset_id
                )));
            }
            units.insert(keyset.unit);
        }
        if units.len() > 1 {
            return Err(MintError::MultipleUnits);
        }
        units.into_iter().next().ok_or_else(|| {
            MintError::InvalidRequest("no outputs provided".to_string())
        })
    }

    /// Nut-02 input fee over the proofs, summed per keyset with one ceiling.
    pub(crate) async fn input_fee(&self, inputs: &Proofs) -> Result<u64, MintError> {
        let mut proofs_count: HashMap<String, u64> = HashMap::new();
        for proof in inputs {
            *proofs_count.entry(proof.keyset_id.clone()).or_default() += 1;
        }

        let mut keyset_fees = HashMap::new();
        for keyset_id in proofs_count.keys() {
            let keyset = self
                .get_keyset_by_id(keyset_id)
                .await
                .ok_or_else(|| MintError::KeysetUnknown(keyset_id.clone()))?;
            keyset_fees.insert(keyset_id.clone(), keyset.input_fee_ppk);
        }

        calculate_input_fee(&proofs_count, &keyset_fees)
            .map_err(|_| MintError::KeysetUnknown("unknown".to_string()))
    }

    /// The proof validator: derives each `Y`, rejects duplicates within the
    /// batch, checks the spent/pending store, resolves the keyset and key and
    /// verifies `k*Y == C`. Returns valid and rejected proofs separately so
    /// callers can map errors precisely; they are expected to fail the whole
    /// request on any rejection.
    #[instrument(level = "debug", skip_all, err)]
    pub async fn validate_proofs(
        &self,
        proofs: &Proofs,
    ) -> Result<ValidationOutcome, MintError> {
        Self::check_inputs_unique(proofs)?;

        let ys = proofs.ys().map_err(|_| MintError::InvalidSignature)?;
        let y_hex: Vec<String> = ys.iter().map(|y| y.to_string()).collect();
        let states = self.db.proof_states(&y_hex, unix_time_now()).await?;

        let mut valid = Vec::new();
        let mut rejected = Vec::new();

        for ((proof, y), state) in proofs.into_iter().zip(&ys).zip(&states) {
            match state.state {
                ProofState::Spent => {
                    rejected.push((proof.clone(), ProofRejection::AlreadySpent));
                    continue;
                }
                ProofState::Pending => {
                    rejected.push((proof.clone(), ProofRejection::Pending));
                    continue;
                }
                ProofState::Unspent => {}
            }

            let keyset = match self.get_keyset_by_id(&proof.keyset_id).await {
                Some(keyset) => keyset,
                None => {
                    rejected.push((proof.clone(), ProofRejection::UnknownKeyset));
                    continue;
                }
            };

            let private_key = match keyset.private_key(proof.amount) {
                Ok(key) => *key,
                Err(_) => {
                    rejected.push((proof.clone(), ProofRejection::InvalidDenomination));
                    continue;
                }
            };

            match self.dhke.verify(&private_key, &proof.c, proof.secret.as_bytes()) {
                Ok(true) => valid.push((proof.clone(), *y)),
                _ => rejected.push((proof.clone(), ProofRejection::InvalidSignature)),
            }
        }

        Ok(ValidationOutcome { valid, rejected })
    }

    /// Fails the whole batch on the first rejection, mapping it to the wire
    /// error. A pending proof surfaces as already spent, which wallets treat
    /// the same way.
    pub(crate) async fn ensure_proofs_valid(
        &self,
        proofs: &Proofs,
    ) -> Result<Vec<PublicKey>, MintError> {
        let outcome = self.validate_proofs(proofs).await?;
        if let Some((proof, rejection)) = outcome.rejected.first() {
            let err = match rejection {
                ProofRejection::AlreadySpent | ProofRejection::Pending => {
                    MintError::TokenAlreadySpent {
                        ys: vec![proof.y().map_err(|_| MintError::InvalidSignature)?.to_string()],
                    }
                }
                ProofRejection::UnknownKeyset => {
                    MintError::KeysetUnknown(proof.keyset_id.clone())
                }
                ProofRejection::InvalidDenomination | ProofRejection::InvalidSignature => {
                    MintError::InvalidSignature
                }
            };
            return Err(err);
        }
        Ok(outcome.valid.into_iter().map(|(_, y)| y).collect())
    }
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub valid: Vec<(Proof, PublicKey)>,
    pub rejected: Vec<(Proof, ProofRejection)>,
}

#[cfg(test)]
mod tests {
    use gild_core::primitives::CurrencyUnit;
    use pretty_assertions::assert_eq;

    use crate::error::MintError;
    use crate::mint::tests::{make_proofs, test_mint};
    use crate::mint::ProofRejection;
    use crate::model::SpentProof;

    #[tokio::test]
    async fn test_validate_accepts_forged_by_mint_key() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let proofs = make_proofs(&mint, &[4, 8]).await?;

        let outcome = mint.validate_proofs(&proofs).await?;
        assert_eq!(outcome.valid.len(), 2);
        assert!(outcome.rejected.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_validate_rejects_wrong_signature() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let proofs = make_proofs(&mint, &[4]).await?;

        let mut tampered = proofs.proofs().to_vec();
        tampered[0].secret = "a different secret".to_string();
        let outcome = mint.validate_proofs(&tampered.into()).await?;
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].1, ProofRejection::InvalidSignature);
        Ok(())
    }

    #[tokio::test]
    async fn test_validate_rejects_spent() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let proofs = make_proofs(&mint, &[4]).await?;
        let y = proofs.proofs()[0].y()?.to_string();

        mint.db
            .mark_spent(&[SpentProof {
                y,
                keyset_id: proofs.proofs()[0].keyset_id.clone(),
                amount: 4,
                witness: None,
                spent_at: 1,
            }])
            .await?;

        let outcome = mint.validate_proofs(&proofs).await?;
        assert_eq!(outcome.rejected[0].1, ProofRejection::AlreadySpent);

        // callers collapse any rejection into the wire error
        assert!(matches!(
            mint.ensure_proofs_valid(&proofs).await,
            Err(MintError::TokenAlreadySpent { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_proof_surfaces_as_already_spent() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let proofs = make_proofs(&mint, &[4]).await?;
        let y = proofs.proofs()[0].y()?.to_string();

        mint.db
            .mark_pending(&[crate::model::PendingProof {
                y,
                keyset_id: proofs.proofs()[0].keyset_id.clone(),
                amount: 4,
                quote_id: None,
                created_at: crate::model::unix_time_now(),
                expires_at: crate::model::unix_time_now() + 300,
            }])
            .await?;

        let outcome = mint.validate_proofs(&proofs).await?;
        assert_eq!(outcome.rejected[0].1, ProofRejection::Pending);

        // a proof locked to an in-flight melt reports the double spend code,
        // not a dedicated pending error
        assert!(matches!(
            mint.ensure_proofs_valid(&proofs).await,
            Err(MintError::TokenAlreadySpent { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_validate_rejects_duplicates_in_batch() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let proofs = make_proofs(&mint, &[4]).await?;
        let duplicated = vec![proofs.proofs()[0].clone(), proofs.proofs()[0].clone()];

        assert!(matches!(
            mint.validate_proofs(&duplicated.into()).await,
            Err(MintError::DuplicateInputs)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_validate_rejects_unknown_keyset() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let proofs = make_proofs(&mint, &[4]).await?;

        let mut foreign = proofs.proofs().to_vec();
        foreign[0].keyset_id = "00ffffffffffffff".to_string();
        let outcome = mint.validate_proofs(&foreign.into()).await?;
        assert_eq!(outcome.rejected[0].1, ProofRejection::UnknownKeyset);
        Ok(())
    }

    #[tokio::test]
    async fn test_input_fee_uses_keyset_ppk() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        // rotate to a fee-carrying keyset
        mint.generate_keyset(CurrencyUnit::Sat, 100, 8).await?;
        let proofs = make_proofs(&mint, &[1, 2, 4]).await?;

        assert_eq!(mint.input_fee(&proofs).await?, 1);
        Ok(())
    }
}
