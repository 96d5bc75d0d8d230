//! An in-process Lightning backend that issues real signed bolt11 invoices
//! and settles them on request. Drives unit tests and local development; the
//! pay outcome is scriptable per test.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin_hashes::{sha256, Hash};
use lightning_invoice::{Bolt11Invoice, Currency, InvoiceBuilder, PaymentSecret};
use rand::RngCore;
use secp256k1::{All, Secp256k1, SecretKey};
use tokio::sync::Mutex;

use super::error::LightningError;
use super::{
    CreateInvoiceResult, InvoiceStatus, Lightning, PayInvoiceResult, PaymentStatus,
};
use crate::error::MintError;
use crate::model::unix_time_now;

/// Outcome the fake backend reports for `pay_invoice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayBehavior {
    Succeed,
    Fail,
    StayPending,
}

struct FakeInvoice {
    preimage: [u8; 32],
    paid: bool,
    expiry: u64,
}

pub struct FakeLightning {
    secp: Secp256k1<All>,
    node_key: SecretKey,
    invoices: Mutex<HashMap<String, FakeInvoice>>,
    payments: Mutex<HashMap<String, PayInvoiceResult>>,
    pay_behavior: Mutex<PayBehavior>,
    fee_sat: Mutex<u64>,
}

impl Default for FakeLightning {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLightning {
    pub fn new() -> Self {
        Self::with_fee(0)
    }

    pub fn with_fee(fee_sat: u64) -> Self {
        Self {
            secp: Secp256k1::new(),
            node_key: SecretKey::new(&mut rand::thread_rng()),
            invoices: Mutex::new(HashMap::new()),
            payments: Mutex::new(HashMap::new()),
            pay_behavior: Mutex::new(PayBehavior::Succeed),
            fee_sat: Mutex::new(fee_sat),
        }
    }

    pub async fn set_pay_behavior(&self, behavior: PayBehavior) {
        *self.pay_behavior.lock().await = behavior;
    }

    /// Routing fee the next successful payment reports, clamped by the
    /// caller's fee limit.
    pub async fn set_fee(&self, fee_sat: u64) {
        *self.fee_sat.lock().await = fee_sat;
    }

    /// Settles an invoice this backend issued, as if the payer had paid it.
    pub async fn settle_invoice(&self, payment_hash: &str) -> bool {
        let mut invoices = self.invoices.lock().await;
        match invoices.get_mut(payment_hash) {
            Some(invoice) => {
                invoice.paid = true;
                true
            }
            None => false,
        }
    }

    /// Resolves a payment that was left pending, for reconciliation tests.
    pub async fn resolve_pending_payment(&self, payment_hash: &str, status: PaymentStatus) {
        let fee_sat = *self.fee_sat.lock().await;
        let result = PayInvoiceResult {
            status,
            preimage: matches!(status, PaymentStatus::Succeeded)
                .then(|| hex::encode(rand_preimage())),
            fee_sat: matches!(status, PaymentStatus::Succeeded).then_some(fee_sat),
            error: None,
        };
        self.payments
            .lock()
            .await
            .insert(payment_hash.to_string(), result);
    }
}

fn rand_preimage() -> [u8; 32] {
    let mut preimage = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut preimage);
    preimage
}

#[async_trait]
impl Lightning for FakeLightning {
    async fn create_invoice(
        &self,
        amount_sat: u64,
        memo: &str,
        expiry_secs: u32,
    ) -> Result<CreateInvoiceResult, MintError> {
        let preimage = rand_preimage();
        let payment_hash = sha256::Hash::hash(&preimage);

        let mut payment_secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut payment_secret);

        let invoice = InvoiceBuilder::new(Currency::Regtest)
            .description(memo.to_string())
            .payment_hash(payment_hash)
            .payment_secret(PaymentSecret(payment_secret))
            .amount_milli_satoshis(amount_sat * 1000)
            .current_timestamp()
            .min_final_cltv_expiry_delta(18)
            .expiry_time(Duration::from_secs(expiry_secs as u64))
            .build_signed(|hash| self.secp.sign_ecdsa_recoverable(hash, &self.node_key))
            .map_err(|err| LightningError::CreateInvoice(err.to_string()))?;

        let expiry = (invoice.duration_since_epoch() + invoice.expiry_time()).as_secs();
        let payment_hash = payment_hash.to_string();
        self.invoices.lock().await.insert(
            payment_hash.clone(),
            FakeInvoice {
                preimage,
                paid: false,
                expiry,
            },
        );

        Ok(CreateInvoiceResult {
            payment_request: invoice.to_string(),
            payment_hash,
            expiry,
        })
    }

    async fn get_invoice_status(&self, payment_hash: &str) -> Result<InvoiceStatus, MintError> {
        let invoices = self.invoices.lock().await;
        let invoice = invoices
            .get(payment_hash)
            .ok_or_else(|| LightningError::InvoiceNotFound(payment_hash.to_string()))?;
        if invoice.paid {
            Ok(InvoiceStatus::Paid)
        } else if invoice.expiry < unix_time_now() {
            Ok(InvoiceStatus::Expired)
        } else {
            Ok(InvoiceStatus::Pending)
        }
    }

    async fn pay_invoice(
        &self,
        payment_request: &str,
        max_fee_sat: u64,
        _timeout_secs: u64,
    ) -> Result<PayInvoiceResult, MintError> {
        let invoice = Bolt11Invoice::from_str(payment_request)
            .map_err(|_| LightningError::DecodeInvoice(payment_request.to_string()))?;
        let payment_hash = invoice.payment_hash().to_string();

        let preimage = self
            .invoices
            .lock()
            .await
            .get(&payment_hash)
            .map(|i| i.preimage)
            .unwrap_or_else(rand_preimage);

        let fee_sat = *self.fee_sat.lock().await;
        let result = match *self.pay_behavior.lock().await {
            PayBehavior::Succeed => PayInvoiceResult {
                status: PaymentStatus::Succeeded,
                preimage: Some(hex::encode(preimage)),
                fee_sat: Some(fee_sat.min(max_fee_sat)),
                error: None,
            },
            PayBehavior::Fail => PayInvoiceResult {
                status: PaymentStatus::Failed,
                preimage: None,
                fee_sat: None,
                error: Some("no route".to_string()),
            },
            PayBehavior::StayPending => PayInvoiceResult {
                status: PaymentStatus::Pending,
                preimage: None,
                fee_sat: None,
                error: None,
            },
        };

        self.payments
            .lock()
            .await
            .insert(payment_hash, result.clone());
        Ok(result)
    }

    async fn get_payment_status(
        &self,
        payment_hash: &str,
    ) -> Result<PayInvoiceResult, MintError> {
        self.payments
            .lock()
            .await
            .get(payment_hash)
            .cloned()
            .ok_or_else(|| LightningError::PaymentNotFound(payment_hash.to_string()).into())
    }

    async fn get_node_pubkey(&self) -> Result<String, MintError> {
        Ok(self.node_key.public_key(&self.secp).to_string())
    }

    async fn is_ready(&self) -> Result<bool, MintError> {
        Ok(true)
    }

    async fn get_balance(&self) -> Result<u64, MintError> {
        Ok(21_000_000)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{FakeLightning, PayBehavior};
    use crate::lightning::{InvoiceStatus, Lightning, PaymentStatus};

    #[tokio::test]
    async fn test_invoice_lifecycle() -> anyhow::Result<()> {
        let lightning = FakeLightning::new();
        let created = lightning.create_invoice(42, "memo", 3600).await?;

        assert_eq!(
            lightning.get_invoice_status(&created.payment_hash).await?,
            InvoiceStatus::Pending
        );
        assert!(lightning.settle_invoice(&created.payment_hash).await);
        assert_eq!(
            lightning.get_invoice_status(&created.payment_hash).await?,
            InvoiceStatus::Paid
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_node_identity_and_balance() -> anyhow::Result<()> {
        let lightning = FakeLightning::new();
        let pubkey = lightning.get_node_pubkey().await?;
        assert_eq!(pubkey.len(), 66);
        assert!(lightning.is_ready().await?);
        assert!(lightning.get_balance().await? > 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_pay_behaviors() -> anyhow::Result<()> {
        let lightning = FakeLightning::with_fee(3);
        let created = lightning.create_invoice(100, "", 3600).await?;

        let result = lightning
            .pay_invoice(&created.payment_request, 10, 60)
            .await?;
        assert_eq!(result.status, PaymentStatus::Succeeded);
        assert_eq!(result.fee_sat, Some(3));
        assert!(result.preimage.is_some());

        lightning.set_pay_behavior(PayBehavior::Fail).await;
        let result = lightning
            .pay_invoice(&created.payment_request, 10, 60)
            .await?;
        assert_eq!(result.status, PaymentStatus::Failed);

        // the recorded outcome is queryable afterwards
        let status = lightning.get_payment_status(&created.payment_hash).await?;
        assert_eq!(status.status, PaymentStatus::Failed);
        Ok(())
    }
}
