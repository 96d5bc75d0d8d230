//! The swap orchestrator: spend inputs, issue fresh outputs, atomically.

use gild_core::blind::{BlindedSignature, TotalAmount};
use gild_core::conditions::Witness;
use gild_core::primitives::PostSwapRequest;
use tracing::instrument;

use super::Mint;
use crate::error::MintError;
use crate::model::{unix_time_now, SpentProof};

impl Mint {
    /// Validates the whole transaction, marks the inputs spent and only then
    /// signs the outputs. On a double spend anywhere in the batch the store
    /// rejects atomically and nothing is signed.
    #[instrument(level = "debug", skip_all, err)]
    pub async fn process_swap(
        &self,
        request: &PostSwapRequest,
    ) -> Result<Vec<BlindedSignature>, MintError> {
        let inputs = &request.inputs;
        let outputs = &request.outputs;

        if inputs.is_empty() {
            return Err(MintError::InvalidRequest("no inputs provided".to_string()));
        }
        if outputs.is_empty() {
            return Err(MintError::InvalidRequest("no outputs provided".to_string()));
        }

        Self::check_inputs_unique(inputs)?;
        Self::check_outputs_unique(outputs)?;

        let input_unit = self.inputs_unit(inputs).await?;
        let output_unit = self.outputs_unit(outputs).await?;
        if input_unit != output_unit {
            return Err(MintError::InputOutputUnitMismatch);
        }

        let fee = self.input_fee(inputs).await?;
        let inputs_total = inputs.total_amount();
        let outputs_total = outputs.total_amount();
        if inputs_total.checked_sub(fee) != Some(outputs_total) {
            return Err(MintError::TransactionNotBalanced {
                inputs: inputs_total,
                outputs: outputs_total,
                fee,
            });
        }

        let ys = self.ensure_proofs_valid(inputs).await?;
        self.verify_spending_conditions(inputs, outputs)?;

        let spent_at = unix_time_now();
        let spent_rows: Vec<SpentProof> = inputs
            .into_iter()
            .zip(&ys)
            .map(|(proof, y)| SpentProof {
                y: y.to_string(),
                keyset_id: proof.keyset_id.clone(),
                amount: proof.amount,
                witness: proof.witness.as_ref().map(witness_string),
                spent_at,
            })
            .collect();
        self.db.mark_spent(&spent_rows).await?;

        // The inputs are terminally spent at this point. A signing failure now
        // is an internal error; the wallet recovers its outputs via restore.
        self.sign_blinded_messages(outputs).await.map_err(|err| {
            tracing::error!("signing failed after inputs were marked spent: {err:?}");
            err
        })
    }
}

pub(crate) fn witness_string(witness: &Witness) -> String {
    serde_json::to_string(witness).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use gild_core::primitives::{PostSwapRequest, ProofState};
    use pretty_assertions::assert_eq;

    use crate::error::MintError;
    use crate::mint::tests::{blinded_outputs, make_proofs, test_mint};

    #[tokio::test]
    async fn test_swap_success_marks_inputs_spent() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let inputs = make_proofs(&mint, &[4, 8]).await?;
        let keyset_id = inputs.proofs()[0].keyset_id.clone();
        let ys: Vec<String> = inputs.ys()?.iter().map(|y| y.to_string()).collect();

        let request = PostSwapRequest {
            inputs,
            outputs: blinded_outputs(&keyset_id, &[4, 8]),
        };
        let signatures = mint.process_swap(&request).await?;

        assert_eq!(signatures.len(), 2);
        assert_eq!(signatures[0].amount, 4);
        assert_eq!(signatures[1].amount, 8);

        let states = mint.db.proof_states(&ys, 0).await?;
        assert!(states.iter().all(|s| s.state == ProofState::Spent));
        Ok(())
    }

    #[tokio::test]
    async fn test_swap_double_spend_rejected_without_signing() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let inputs = make_proofs(&mint, &[4, 8]).await?;
        let keyset_id = inputs.proofs()[0].keyset_id.clone();

        let request = PostSwapRequest {
            inputs: inputs.clone(),
            outputs: blinded_outputs(&keyset_id, &[4, 8]),
        };
        mint.process_swap(&request).await?;

        // reusing any input must fail and issue nothing
        let replay = PostSwapRequest {
            inputs,
            outputs: blinded_outputs(&keyset_id, &[4, 8]),
        };
        let result = mint.process_swap(&replay).await;
        assert!(matches!(result, Err(MintError::TokenAlreadySpent { .. })));

        let (found, _) = mint.restore_signatures(&replay.outputs).await?;
        assert!(found.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_swap_unbalanced_rejected() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let inputs = make_proofs(&mint, &[4, 8]).await?;
        let keyset_id = inputs.proofs()[0].keyset_id.clone();

        let request = PostSwapRequest {
            inputs,
            outputs: blinded_outputs(&keyset_id, &[4, 4]),
        };
        let result = mint.process_swap(&request).await;
        assert!(matches!(
            result,
            Err(MintError::TransactionNotBalanced { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_swap_with_input_fee_balances_after_fee() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        // 100 ppk keyset: two inputs cost one sat of fee
        mint.generate_keyset(gild_core::primitives::CurrencyUnit::Sat, 100, 8)
            .await?;
        let inputs = make_proofs(&mint, &[4, 8]).await?;
        let keyset_id = inputs.proofs()[0].keyset_id.clone();

        // 12 in - 1 fee = 11 out
        let request = PostSwapRequest {
            inputs: inputs.clone(),
            outputs: blinded_outputs(&keyset_id, &[8, 2, 1]),
        };
        assert!(mint.process_swap(&request).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_swap_duplicate_outputs_rejected() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let inputs = make_proofs(&mint, &[4]).await?;
        let keyset_id = inputs.proofs()[0].keyset_id.clone();

        let output = blinded_outputs(&keyset_id, &[2])[0].clone();
        let mut duplicate = output.clone();
        duplicate.amount = 2;
        let request = PostSwapRequest {
            inputs,
            outputs: vec![output, duplicate],
        };
        assert!(matches!(
            mint.process_swap(&request).await,
            Err(MintError::DuplicateOutputs)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_swap_unit_mismatch_rejected() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let usd = mint
            .generate_keyset(gild_core::primitives::CurrencyUnit::Usd, 0, 8)
            .await?;
        let inputs = make_proofs(&mint, &[4]).await?;

        let request = PostSwapRequest {
            inputs,
            outputs: blinded_outputs(&usd.keyset_id, &[4]),
        };
        assert!(matches!(
            mint.process_swap(&request).await,
            Err(MintError::InputOutputUnitMismatch)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_swap_multiple_input_units_rejected() -> anyhow::Result<()> {
        use gild_core::dhke::Dhke;
        use gild_core::proof::Proof;

        let mint = test_mint().await?;
        let usd = mint
            .generate_keyset(gild_core::primitives::CurrencyUnit::Usd, 0, 8)
            .await?;
        let sat_inputs = make_proofs(&mint, &[4]).await?;

        // forge a valid usd proof alongside the sat one
        let dhke = Dhke::new();
        let secret = "1e92f5c0a38a54c5a4b2b27b5c98c0f7".to_string();
        let y = Dhke::hash_to_curve(secret.as_bytes())?;
        let c = dhke.sign_blinded(usd.private_key(4)?, &y)?;
        let usd_proof = Proof::new(4, secret, c, usd.keyset_id.clone());

        let mut inputs = sat_inputs.proofs().to_vec();
        inputs.push(usd_proof);
        let keyset_id = inputs[0].keyset_id.clone();

        let request = PostSwapRequest {
            inputs: inputs.into(),
            outputs: blinded_outputs(&keyset_id, &[8]),
        };
        assert!(matches!(
            mint.process_swap(&request).await,
            Err(MintError::MultipleUnits)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_swap_empty_inputs_rejected() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let request = PostSwapRequest {
            inputs: gild_core::proof::Proofs::empty(),
            outputs: vec![],
        };
        assert!(mint.process_swap(&request).await.is_err());
        Ok(())
    }
}
