//! Melt quotes and the melt orchestrator: lock inputs pending, pay over
//! Lightning, then promote to spent or roll back. The only path where ecash
//! state and an external payment must stay in lockstep.

use gild_core::blind::{BlindedMessage, BlindedSignature};
use gild_core::fees::{calculate_change_amounts, overpaid_fees};
use gild_core::primitives::{
    CurrencyUnit, MeltQuoteState, PostMeltBolt11Request, PostMeltQuoteBolt11Request,
    PostMeltQuoteBolt11Response,
};
use gild_core::proof::Proofs;
use secp256k1::PublicKey;
use tracing::instrument;

use super::issue::generate_quote_id;
use super::swap::witness_string;
use super::Mint;
use crate::config::MINT_UNIT;
use crate::error::MintError;
use crate::lightning::error::LightningError;
use crate::lightning::{PayInvoiceResult, PaymentStatus};
use crate::model::{unix_time_now, MeltQuote, PendingProof, SpentProof};

impl Mint {
    /// Creates a melt quote for a bolt11 invoice. Under MPP the partial
    /// amount from the request options replaces the invoice amount.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn create_melt_quote(
        &self,
        request: &PostMeltQuoteBolt11Request,
    ) -> Result<PostMeltQuoteBolt11Response, MintError> {
        if request.unit != MINT_UNIT {
            return Err(MintError::UnitNotSupported(request.unit.to_string()));
        }

        let invoice = self.lightning.decode_invoice(&request.request).await?;

        let mpp_amount_msat = request.options.and_then(|options| options.mpp).map(|mpp| mpp.amount);
        let amount_sat = match mpp_amount_msat {
            Some(partial_msat) => {
                if partial_msat == 0 {
                    return Err(MintError::InvalidRequest(
                        "mpp amount must be positive".to_string(),
                    ));
                }
                if let Some(invoice_msat) = invoice.amount_msat {
                    if partial_msat > invoice_msat {
                        return Err(MintError::InvalidRequest(
                            "mpp amount exceeds invoice amount".to_string(),
                        ));
                    }
                }
                partial_msat / 1000
            }
            None => invoice
                .amount_msat
                .ok_or(MintError::AmountlessNotSupported)?
                / 1000,
        };
        if amount_sat == 0 {
            return Err(MintError::InvalidRequest(
                "invoice amount is below one satoshi".to_string(),
            ));
        }

        // an invoice this mint already paid out must not be quoted again
        if let Ok(payment) = self.lightning.get_payment_status(&invoice.payment_hash).await {
            if payment.status == PaymentStatus::Succeeded {
                return Err(MintError::InvoiceAlreadyPaid);
            }
        }

        let quote = MeltQuote {
            quote_id: generate_quote_id(),
            unit: request.unit.clone(),
            amount: amount_sat,
            request: request.request.clone(),
            fee_reserve: self.config.lightning_fee.fee_reserve(amount_sat),
            state: MeltQuoteState::Unpaid,
            payment_preimage: None,
            fee_paid: None,
            expiry: unix_time_now() + self.config.quotes.quote_ttl_secs,
            mpp_amount_msat,
        };
        self.db.add_melt_quote(&quote).await?;

        Ok(melt_quote_response(&quote, None))
    }

    /// Reports the quote state. A quote stuck `PENDING` is reconciled against
    /// the backend's payment state first.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn check_melt_quote(
        &self,
        quote_id: &str,
    ) -> Result<PostMeltQuoteBolt11Response, MintError> {
        let quote = self
            .db
            .get_melt_quote(quote_id)
            .await?
            .ok_or_else(|| MintError::QuoteNotFound(quote_id.to_string()))?;

        let quote = if quote.state == MeltQuoteState::Pending {
            self.reconcile_melt_quote(quote).await?
        } else {
            quote
        };
        Ok(melt_quote_response(&quote, None))
    }

    /// The melt orchestrator. After the inputs are locked pending, the
    /// payment attempt and its settlement run on a detached task so that a
    /// caller hanging up cannot leave the quote half settled.
    #[instrument(level = "debug", skip_all, fields(quote_id = %request.quote), err)]
    pub async fn process_melt(
        &self,
        request: &PostMeltBolt11Request,
    ) -> Result<PostMeltQuoteBolt11Response, MintError> {
        let quote = self
            .db
            .get_melt_quote(&request.quote)
            .await?
            .ok_or_else(|| MintError::QuoteNotFound(request.quote.clone()))?;
        match quote.state {
            MeltQuoteState::Pending => return Err(MintError::QuotePending),
            MeltQuoteState::Paid => return Err(MintError::InvoiceAlreadyPaid),
            MeltQuoteState::Unpaid => {}
        }
        if quote.expiry < unix_time_now() {
            return Err(MintError::QuoteExpired);
        }

        let inputs = &request.inputs;
        if inputs.is_empty() {
            return Err(MintError::InvalidRequest("no inputs provided".to_string()));
        }
        Self::check_inputs_unique(inputs)?;
        let blank_outputs = request.outputs.clone().unwrap_or_default();
        Self::check_outputs_unique(&blank_outputs)?;

        let input_unit = self.inputs_unit(inputs).await?;
        if input_unit != quote.unit {
            return Err(MintError::InputOutputUnitMismatch);
        }

        let input_fees = self.input_fee(inputs).await?;
        let inputs_total = inputs.total_amount();
        let required = quote.amount + quote.fee_reserve + input_fees;
        if inputs_total < required {
            return Err(MintError::TransactionNotBalanced {
                inputs: inputs_total,
                outputs: required,
                fee: input_fees,
            });
        }

        // blank outputs take part in SIG_ALL aggregation
        self.verify_spending_conditions(inputs, &blank_outputs)?;
        let ys = self.ensure_proofs_valid(inputs).await?;

        // lock the quote, then the proofs
        if !self
            .db
            .set_melt_quote_state(&quote.quote_id, MeltQuoteState::Unpaid, MeltQuoteState::Pending)
            .await?
        {
            return Err(MintError::QuotePending);
        }

        let now = unix_time_now();
        let pending_rows: Vec<PendingProof> = inputs
            .into_iter()
            .zip(&ys)
            .map(|(proof, y)| PendingProof {
                y: y.to_string(),
                keyset_id: proof.keyset_id.clone(),
                amount: proof.amount,
                quote_id: Some(quote.quote_id.clone()),
                created_at: now,
                expires_at: now + self.config.quotes.pending_ttl_secs,
            })
            .collect();
        if let Err(err) = self.db.mark_pending(&pending_rows).await {
            self.db
                .set_melt_quote_state(
                    &quote.quote_id,
                    MeltQuoteState::Pending,
                    MeltQuoteState::Unpaid,
                )
                .await?;
            return Err(err);
        }

        // From here on the payment attempt must conclude even if the caller
        // goes away; the detached task owns the settlement.
        let mint = self.clone();
        let inputs = inputs.clone();
        let task = tokio::spawn(async move {
            mint.pay_and_settle(quote, inputs, ys, blank_outputs).await
        });
        // a crashed settle task leaves the locks in place for reconciliation
        task.await.map_err(|_| MintError::QuotePending)?
    }

    async fn pay_and_settle(
        &self,
        quote: MeltQuote,
        inputs: Proofs,
        ys: Vec<PublicKey>,
        blank_outputs: Vec<BlindedMessage>,
    ) -> Result<PostMeltQuoteBolt11Response, MintError> {
        let pay_result = self
            .lightning
            .pay_invoice(
                &quote.request,
                quote.fee_reserve,
                self.config.quotes.pay_timeout_secs,
            )
            .await;

        let input_fees = self.input_fee(&inputs).await?;
        let spent_rows: Vec<SpentProof> = inputs
            .into_iter()
            .zip(&ys)
            .map(|(proof, y)| SpentProof {
                y: y.to_string(),
                keyset_id: proof.keyset_id.clone(),
                amount: proof.amount,
                witness: proof.witness.as_ref().map(witness_string),
                spent_at: unix_time_now(),
            })
            .collect();

        match pay_result {
            Ok(PayInvoiceResult {
                status: PaymentStatus::Succeeded,
                preimage,
                fee_sat,
                ..
            }) => {
                self.settle_melt_success(
                    &quote,
                    spent_rows,
                    preimage.as_deref(),
                    fee_sat,
                    input_fees,
                    &blank_outputs,
                )
                .await
            }
            Ok(PayInvoiceResult {
                status: PaymentStatus::Failed,
                ..
            }) => {
                self.revert_melt(&quote, &ys).await?;
                Err(MintError::LightningPaymentFailed)
            }
            // still in flight at timeout, or the backend's outcome is
            // unknown: keep everything locked and let reconciliation decide
            Ok(PayInvoiceResult {
                status: PaymentStatus::Pending,
                ..
            }) => Err(MintError::QuotePending),
            Err(err) => {
                tracing::warn!(
                    "payment outcome for quote {} unknown: {err:?}",
                    quote.quote_id
                );
                Err(MintError::QuotePending)
            }
        }
    }

    /// Lightning success: promote pending to spent and issue overpaid change
    /// into the provided blank outputs, re-labelled to the active keyset.
    async fn settle_melt_success(
        &self,
        quote: &MeltQuote,
        spent_rows: Vec<SpentProof>,
        preimage: Option<&str>,
        fee_sat: Option<u64>,
        input_fees: u64,
        blank_outputs: &[BlindedMessage],
    ) -> Result<PostMeltQuoteBolt11Response, MintError> {
        self.db.promote_pending_to_spent(&spent_rows).await?;

        let fee_paid = fee_sat.unwrap_or(0);
        self.db
            .mark_melt_quote_paid(&quote.quote_id, preimage, Some(fee_paid))
            .await?;

        let inputs_total: u64 = spent_rows.iter().map(|row| row.amount).sum();
        let overpaid = overpaid_fees(inputs_total, quote.amount, fee_paid, input_fees);
        let change = self
            .sign_change_outputs(&quote.unit, overpaid, blank_outputs)
            .await?;

        let mut settled = quote.clone();
        settled.state = MeltQuoteState::Paid;
        settled.payment_preimage = preimage.map(|p| p.to_string());
        settled.fee_paid = Some(fee_paid);
        Ok(melt_quote_response(&settled, change))
    }

    async fn revert_melt(&self, quote: &MeltQuote, ys: &[PublicKey]) -> Result<(), MintError> {
        let y_hex: Vec<String> = ys.iter().map(|y| y.to_string()).collect();
        self.db.remove_pending(&y_hex).await?;
        self.db
            .set_melt_quote_state(
                &quote.quote_id,
                MeltQuoteState::Pending,
                MeltQuoteState::Unpaid,
            )
            .await?;
        Ok(())
    }

    /// Binary decomposition of the overpaid amount into the blank outputs.
    /// When fewer blank outputs were provided than the decomposition needs,
    /// the largest denominations win.
    async fn sign_change_outputs(
        &self,
        unit: &CurrencyUnit,
        overpaid: u64,
        blank_outputs: &[BlindedMessage],
    ) -> Result<Option<Vec<BlindedSignature>>, MintError> {
        if overpaid == 0 || blank_outputs.is_empty() {
            return Ok(None);
        }

        let active = self
            .get_active_keyset(unit)
            .await
            .ok_or_else(|| MintError::UnitNotSupported(unit.to_string()))?;

        let mut amounts = calculate_change_amounts(overpaid);
        if amounts.len() > blank_outputs.len() {
            amounts = amounts.split_off(amounts.len() - blank_outputs.len());
        }

        let outputs: Vec<BlindedMessage> = blank_outputs
            .iter()
            .zip(&amounts)
            .map(|(output, amount)| BlindedMessage {
                amount: *amount,
                keyset_id: active.keyset_id.clone(),
                b_: output.b_,
                witness: None,
            })
            .collect();

        Ok(Some(self.sign_blinded_messages(&outputs).await?))
    }

    /// Resolves a quote stuck `PENDING` using the backend's payment state.
    /// Used by quote checks and by startup recovery.
    pub(crate) async fn reconcile_melt_quote(
        &self,
        quote: MeltQuote,
    ) -> Result<MeltQuote, MintError> {
        let invoice = self.lightning.decode_invoice(&quote.request).await?;
        let pending = self.db.get_pending_proofs_by_quote(&quote.quote_id).await?;

        match self.lightning.get_payment_status(&invoice.payment_hash).await {
            Ok(PayInvoiceResult {
                status: PaymentStatus::Succeeded,
                preimage,
                fee_sat,
                ..
            }) => {
                let spent_at = unix_time_now();
                let spent_rows: Vec<SpentProof> = pending
                    .iter()
                    .map(|row| SpentProof {
                        y: row.y.clone(),
                        keyset_id: row.keyset_id.clone(),
                        amount: row.amount,
                        witness: None,
                        spent_at,
                    })
                    .collect();
                self.db.promote_pending_to_spent(&spent_rows).await?;
                let fee_paid = fee_sat.unwrap_or(0);
                self.db
                    .mark_melt_quote_paid(&quote.quote_id, preimage.as_deref(), Some(fee_paid))
                    .await?;

                let mut settled = quote;
                settled.state = MeltQuoteState::Paid;
                settled.payment_preimage = preimage;
                settled.fee_paid = Some(fee_paid);
                Ok(settled)
            }
            Ok(PayInvoiceResult {
                status: PaymentStatus::Failed,
                ..
            }) => {
                let ys: Vec<String> = pending.iter().map(|row| row.y.clone()).collect();
                self.db.remove_pending(&ys).await?;
                self.db
                    .set_melt_quote_state(
                        &quote.quote_id,
                        MeltQuoteState::Pending,
                        MeltQuoteState::Unpaid,
                    )
                    .await?;
                let mut reverted = quote;
                reverted.state = MeltQuoteState::Unpaid;
                Ok(reverted)
            }
            // the payment was never handed to the backend
            Err(MintError::Lightning(LightningError::PaymentNotFound(_))) => {
                let ys: Vec<String> = pending.iter().map(|row| row.y.clone()).collect();
                self.db.remove_pending(&ys).await?;
                self.db
                    .set_melt_quote_state(
                        &quote.quote_id,
                        MeltQuoteState::Pending,
                        MeltQuoteState::Unpaid,
                    )
                    .await?;
                let mut reverted = quote;
                reverted.state = MeltQuoteState::Unpaid;
                Ok(reverted)
            }
            // still in flight or backend unreachable: keep the lock
            _ => Ok(quote),
        }
    }

    /// Startup recovery: every melt quote left `PENDING` by a previous run is
    /// re-dispatched through the backend's payment state.
    #[instrument(level = "debug", skip(self), err)]
    pub(crate) async fn reconcile_pending_melts(&self) -> Result<(), MintError> {
        let pending = self.db.get_pending_melt_quotes().await?;
        for quote in pending {
            let quote_id = quote.quote_id.clone();
            match self.reconcile_melt_quote(quote).await {
                Ok(resolved) => {
                    tracing::info!(
                        "reconciled pending melt quote {quote_id} to {}",
                        resolved.state
                    )
                }
                Err(err) => {
                    tracing::warn!("could not reconcile melt quote {quote_id}: {err:?}")
                }
            }
        }
        Ok(())
    }
}

fn melt_quote_response(
    quote: &MeltQuote,
    change: Option<Vec<BlindedSignature>>,
) -> PostMeltQuoteBolt11Response {
    PostMeltQuoteBolt11Response {
        quote: quote.quote_id.clone(),
        amount: quote.amount,
        fee_reserve: quote.fee_reserve,
        state: quote.state,
        expiry: quote.expiry,
        payment_preimage: quote.payment_preimage.clone(),
        change,
    }
}
