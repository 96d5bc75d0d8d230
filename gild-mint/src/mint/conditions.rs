//! Batch-level spending condition enforcement. Per-proof P2PK and HTLC
//! verification lives in the core crate; this module wires in the SIG_ALL
//! aggregation over a whole transaction.

use gild_core::blind::BlindedMessage;
use gild_core::conditions::{sig_all_requirement, verify_sig_all};
use gild_core::error::CoreError;
use gild_core::proof::Proofs;
use tracing::instrument;

use super::Mint;
use crate::error::MintError;

impl Mint {
    /// Verifies the spending conditions of every input. If any input demands
    /// SIG_ALL, the whole batch including `outputs` is covered by the
    /// aggregated signature on the first input's witness, and the per-input
    /// check is skipped for the rest.
    #[instrument(level = "debug", skip_all, err)]
    pub(crate) fn verify_spending_conditions(
        &self,
        inputs: &Proofs,
        outputs: &[BlindedMessage],
    ) -> Result<(), MintError> {
        let requirement = sig_all_requirement(inputs).map_err(condition_error)?;

        if let Some(requirement) = requirement {
            return verify_sig_all(inputs, outputs, &requirement).map_err(condition_error);
        }

        for proof in inputs {
            proof.verify_condition().map_err(condition_error)?;
        }
        Ok(())
    }
}

fn condition_error(err: CoreError) -> MintError {
    match err {
        CoreError::InvalidCondition(detail) => MintError::InvalidRequest(detail),
        _ => MintError::InvalidSignature,
    }
}
