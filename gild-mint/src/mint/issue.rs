//! Mint quotes and quote-gated issuance.

use gild_core::blind::TotalAmount;
use gild_core::primitives::{
    MintQuoteState, PostMintBolt11Request, PostMintBolt11Response, PostMintQuoteBolt11Request,
    PostMintQuoteBolt11Response,
};
use rand::RngCore;
use tracing::instrument;

use super::Mint;
use crate::config::MINT_UNIT;
use crate::error::MintError;
use crate::lightning::InvoiceStatus;
use crate::model::{unix_time_now, MintQuote};

/// 16 random bytes, hex encoded.
pub(crate) fn generate_quote_id() -> String {
    let mut id = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut id);
    hex::encode(id)
}

impl Mint {
    /// Creates a mint quote: requests an invoice over the Lightning backend
    /// and persists the quote as `UNPAID`.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn create_mint_quote(
        &self,
        request: &PostMintQuoteBolt11Request,
    ) -> Result<PostMintQuoteBolt11Response, MintError> {
        if request.unit != MINT_UNIT {
            return Err(MintError::UnitNotSupported(request.unit.to_string()));
        }
        let limits = &self.config.limits;
        if request.amount < limits.mint_min_sat || request.amount > limits.mint_max_sat {
            return Err(MintError::AmountOutsideLimit(
                request.amount,
                limits.mint_min_sat,
                limits.mint_max_sat,
            ));
        }

        let memo = request.description.clone().unwrap_or_default();
        let invoice = self
            .lightning
            .create_invoice(
                request.amount,
                &memo,
                self.config.quotes.quote_ttl_secs as u32,
            )
            .await?;

        let quote = MintQuote {
            quote_id: generate_quote_id(),
            unit: request.unit.clone(),
            amount: request.amount,
            request: invoice.payment_request,
            payment_hash: invoice.payment_hash,
            state: MintQuoteState::Unpaid,
            expiry: unix_time_now() + self.config.quotes.quote_ttl_secs,
            issued_at: None,
        };
        self.db.add_mint_quote(&quote).await?;

        Ok(quote_response(&quote))
    }

    /// Reports the quote state, polling the backend while the quote is
    /// `UNPAID`. Checking a `PAID` quote twice returns the same response.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn check_mint_quote(
        &self,
        quote_id: &str,
    ) -> Result<PostMintQuoteBolt11Response, MintError> {
        let quote = self.refresh_mint_quote(quote_id).await?;
        Ok(quote_response(&quote))
    }

    /// Issues tokens against a paid quote. Signing happens before the quote
    /// transitions to `ISSUED`, so a failed signing leaves the quote `PAID`
    /// and the wallet may retry.
    #[instrument(level = "debug", skip_all, fields(quote_id = %request.quote), err)]
    pub async fn process_mint(
        &self,
        request: &PostMintBolt11Request,
    ) -> Result<PostMintBolt11Response, MintError> {
        let quote = self.refresh_mint_quote(&request.quote).await?;
        match quote.state {
            MintQuoteState::Unpaid => return Err(MintError::QuoteNotPaid),
            MintQuoteState::Issued => return Err(MintError::TokensAlreadyIssued),
            MintQuoteState::Paid => {}
        }

        let outputs = &request.outputs;
        if outputs.is_empty() {
            return Err(MintError::InvalidRequest("no outputs provided".to_string()));
        }
        Self::check_outputs_unique(outputs)?;
        let unit = self.outputs_unit(outputs).await?;
        if unit != quote.unit {
            return Err(MintError::InputOutputUnitMismatch);
        }

        let outputs_total = outputs.total_amount();
        if outputs_total != quote.amount {
            return Err(MintError::AmountMismatch {
                outputs: outputs_total,
                expected: quote.amount,
            });
        }

        let signatures = self.sign_blinded_messages(outputs).await?;

        if !self
            .db
            .mark_mint_quote_issued(&quote.quote_id, unix_time_now())
            .await?
        {
            // a concurrent mint of the same quote won the transition after we
            // signed; the signatures above are the double issuance
            tracing::error!(
                "quote {} was issued concurrently; signatures were created twice",
                quote.quote_id
            );
            return Err(MintError::TokensAlreadyIssued);
        }

        Ok(PostMintBolt11Response { signatures })
    }

    /// Loads a mint quote and folds in the backend's view while it is
    /// `UNPAID`. Expired unpaid quotes surface as [`MintError::QuoteExpired`].
    async fn refresh_mint_quote(&self, quote_id: &str) -> Result<MintQuote, MintError> {
        let mut quote = self
            .db
            .get_mint_quote(quote_id)
            .await?
            .ok_or_else(|| MintError::QuoteNotFound(quote_id.to_string()))?;

        if quote.state == MintQuoteState::Unpaid {
            match self
                .lightning
                .get_invoice_status(&quote.payment_hash)
                .await?
            {
                InvoiceStatus::Paid => {
                    self.db.mark_mint_quote_paid(&quote.quote_id).await?;
                    quote.state = MintQuoteState::Paid;
                }
                InvoiceStatus::Expired | InvoiceStatus::Cancelled => {
                    return Err(MintError::QuoteExpired);
                }
                InvoiceStatus::Pending => {
                    if quote.expiry < unix_time_now() {
                        return Err(MintError::QuoteExpired);
                    }
                }
            }
        }
        Ok(quote)
    }
}

fn quote_response(quote: &MintQuote) -> PostMintQuoteBolt11Response {
    PostMintQuoteBolt11Response {
        quote: quote.quote_id.clone(),
        request: quote.request.clone(),
        state: quote.state,
        expiry: quote.expiry,
    }
}

#[cfg(test)]
mod tests {
    use gild_core::primitives::{
        CurrencyUnit, MintQuoteState, PostMintBolt11Request, PostMintQuoteBolt11Request,
    };
    use pretty_assertions::assert_eq;

    use super::generate_quote_id;
    use crate::error::MintError;
    use crate::mint::tests::{blinded_outputs, test_mint, test_mint_with_lightning};

    fn quote_request(amount: u64) -> PostMintQuoteBolt11Request {
        PostMintQuoteBolt11Request {
            amount,
            unit: CurrencyUnit::Sat,
            description: None,
        }
    }

    #[test]
    fn test_quote_id_shape() {
        let id = generate_quote_id();
        assert_eq!(id.len(), 32);
        assert_ne!(id, generate_quote_id());
    }

    #[tokio::test]
    async fn test_mint_quote_lifecycle() -> anyhow::Result<()> {
        let (mint, lightning) = test_mint_with_lightning().await?;

        let quote = mint.create_mint_quote(&quote_request(100)).await?;
        assert_eq!(quote.state, MintQuoteState::Unpaid);

        // still unpaid on first check
        let checked = mint.check_mint_quote(&quote.quote).await?;
        assert_eq!(checked.state, MintQuoteState::Unpaid);

        // backend reports the invoice as settled
        let stored = mint.db.get_mint_quote(&quote.quote).await?.expect("quote");
        lightning.settle_invoice(&stored.payment_hash).await;
        let checked = mint.check_mint_quote(&quote.quote).await?;
        assert_eq!(checked.state, MintQuoteState::Paid);

        // checking a paid quote twice returns the same response
        let again = mint.check_mint_quote(&quote.quote).await?;
        assert_eq!(again.state, MintQuoteState::Paid);
        assert_eq!(again.quote, checked.quote);
        Ok(())
    }

    #[tokio::test]
    async fn test_mint_round_trip() -> anyhow::Result<()> {
        let (mint, lightning) = test_mint_with_lightning().await?;
        let keyset = mint
            .get_active_keyset(&CurrencyUnit::Sat)
            .await
            .expect("active keyset");

        let quote = mint.create_mint_quote(&quote_request(100)).await?;
        let stored = mint.db.get_mint_quote(&quote.quote).await?.expect("quote");

        // minting an unpaid quote is refused
        let request = PostMintBolt11Request {
            quote: quote.quote.clone(),
            outputs: blinded_outputs(&keyset.keyset_id, &[64, 32, 4]),
        };
        assert!(matches!(
            mint.process_mint(&request).await,
            Err(MintError::QuoteNotPaid)
        ));

        lightning.settle_invoice(&stored.payment_hash).await;
        let response = mint.process_mint(&request).await?;
        assert_eq!(response.signatures.len(), 3);

        // re-minting the issued quote is refused with the precise error
        let retry = PostMintBolt11Request {
            quote: quote.quote.clone(),
            outputs: blinded_outputs(&keyset.keyset_id, &[64, 32, 4]),
        };
        assert!(matches!(
            mint.process_mint(&retry).await,
            Err(MintError::TokensAlreadyIssued)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_mint_wrong_output_sum_rejected() -> anyhow::Result<()> {
        let (mint, lightning) = test_mint_with_lightning().await?;
        let keyset = mint
            .get_active_keyset(&CurrencyUnit::Sat)
            .await
            .expect("active keyset");

        let quote = mint.create_mint_quote(&quote_request(100)).await?;
        let stored = mint.db.get_mint_quote(&quote.quote).await?.expect("quote");
        lightning.settle_invoice(&stored.payment_hash).await;

        let request = PostMintBolt11Request {
            quote: quote.quote.clone(),
            outputs: blinded_outputs(&keyset.keyset_id, &[64, 32]),
        };
        assert!(matches!(
            mint.process_mint(&request).await,
            Err(MintError::AmountMismatch { .. })
        ));

        // the failed attempt must not consume the quote
        let checked = mint.check_mint_quote(&quote.quote).await?;
        assert_eq!(checked.state, MintQuoteState::Paid);
        Ok(())
    }

    #[tokio::test]
    async fn test_mint_quote_amount_limits() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let result = mint.create_mint_quote(&quote_request(0)).await;
        assert!(matches!(result, Err(MintError::AmountOutsideLimit(..))));

        let result = mint
            .create_mint_quote(&quote_request(u64::MAX / 2))
            .await;
        assert!(matches!(result, Err(MintError::AmountOutsideLimit(..))));
        Ok(())
    }

    #[tokio::test]
    async fn test_mint_quote_wrong_unit() -> anyhow::Result<()> {
        let mint = test_mint().await?;
        let request = PostMintQuoteBolt11Request {
            amount: 100,
            unit: CurrencyUnit::Usd,
            description: None,
        };
        assert!(matches!(
            mint.create_mint_quote(&request).await,
            Err(MintError::UnitNotSupported(_))
        ));
        Ok(())
    }
}
