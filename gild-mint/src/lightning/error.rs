use thiserror::Error;

#[derive(Error, Debug)]
pub enum LightningError {
    #[error("Failed to decode payment request {0}")]
    DecodeInvoice(String),

    #[error("Invoice not found for hash {0}")]
    InvoiceNotFound(String),

    #[error("Payment not found for hash {0}")]
    PaymentNotFound(String),

    #[error("Failed to create invoice: {0}")]
    CreateInvoice(String),

    #[error("Lightning backend error: {0}")]
    Backend(String),
}
