//! The Lightning backend capability the mint is built against. The mint holds
//! only payment hashes and preimages as opaque handles; invoices and payments
//! are owned by the backend.

use std::str::FromStr;

use async_trait::async_trait;
use lightning_invoice::{Bolt11Invoice, Bolt11InvoiceDescriptionRef};
use serde::{Deserialize, Serialize};

use crate::error::MintError;

pub mod error;
pub mod fake;

#[cfg(test)]
use mockall::automock;

use self::error::LightningError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoiceResult {
    pub payment_request: String,
    pub payment_hash: String,
    /// unix timestamp at which the invoice expires
    pub expiry: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInvoice {
    pub payment_hash: String,
    pub amount_msat: Option<u64>,
    pub description: Option<String>,
    /// unix timestamp at which the invoice expires
    pub expiry: u64,
    /// payee node public key
    pub destination: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Succeeded,
    Failed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayInvoiceResult {
    pub status: PaymentStatus,
    pub preimage: Option<String>,
    pub fee_sat: Option<u64>,
    pub error: Option<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Lightning: Send + Sync {
    async fn create_invoice(
        &self,
        amount_sat: u64,
        memo: &str,
        expiry_secs: u32,
    ) -> Result<CreateInvoiceResult, MintError>;

    async fn get_invoice_status(&self, payment_hash: &str) -> Result<InvoiceStatus, MintError>;

    /// Attempts the payment, spending at most `max_fee_sat` on routing fees
    /// and giving up after `timeout_secs`. A result with
    /// [`PaymentStatus::Pending`] means the payment is still in flight.
    async fn pay_invoice(
        &self,
        payment_request: &str,
        max_fee_sat: u64,
        timeout_secs: u64,
    ) -> Result<PayInvoiceResult, MintError>;

    /// Resolves the state of a previously attempted payment.
    async fn get_payment_status(&self, payment_hash: &str)
        -> Result<PayInvoiceResult, MintError>;

    async fn get_node_pubkey(&self) -> Result<String, MintError>;

    async fn is_ready(&self) -> Result<bool, MintError>;

    /// Node balance in satoshis.
    async fn get_balance(&self) -> Result<u64, MintError>;

    async fn decode_invoice(&self, payment_request: &str) -> Result<DecodedInvoice, MintError> {
        decode_bolt11(payment_request)
    }
}

pub fn decode_bolt11(payment_request: &str) -> Result<DecodedInvoice, MintError> {
    let invoice = Bolt11Invoice::from_str(payment_request)
        .map_err(|_| LightningError::DecodeInvoice(payment_request.to_string()))?;

    let description = match invoice.description() {
        Bolt11InvoiceDescriptionRef::Direct(description) => Some(description.to_string()),
        Bolt11InvoiceDescriptionRef::Hash(_) => None,
    };

    Ok(DecodedInvoice {
        payment_hash: invoice.payment_hash().to_string(),
        amount_msat: invoice.amount_milli_satoshis(),
        description,
        expiry: (invoice.duration_since_epoch() + invoice.expiry_time()).as_secs(),
        destination: invoice.recover_payee_pub_key().to_string(),
    })
}
