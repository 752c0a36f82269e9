//! Fake Wallet Error

use thiserror::Error;

/// Fake Wallet Error
#[derive(Debug, Error)]
pub enum Error {
    /// Invoice amount not defined
    #[error("Unknown invoice amount")]
    UnknownInvoiceAmount,
    /// Unknown invoice
    #[error("Unknown invoice")]
    UnknownInvoice,
    /// No channel receiver
    #[error("No channel receiver")]
    NoReceiver,
    /// Scripted payment failure
    #[error("Payment failed")]
    PaymentFailed,
    /// Invoice could not be built
    #[error("Could not create invoice: {0}")]
    Invoice(String),
    /// Serde Error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl From<Error> for cmk_common::lightning::Error {
    fn from(e: Error) -> Self {
        Self::Lightning(Box::new(e))
    }
}
