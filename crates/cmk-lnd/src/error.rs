//! LND Errors

use thiserror::Error;

/// LND Error
#[derive(Debug, Error)]
pub enum Error {
    /// Invoice amount not defined
    #[error("Unknown invoice amount")]
    UnknownInvoiceAmount,
    /// Unknown invoice
    #[error("Unknown invoice")]
    UnknownInvoice,
    /// Connection error
    #[error("LND connection error")]
    Connection,
    /// Invalid hash
    #[error("Invalid hash")]
    InvalidHash,
    /// Invoice already expired when it was requested
    #[error("Invoice expiry is in the past")]
    ExpiryInPast,
    /// Invoice state reported by LND is not known
    #[error("Unknown invoice state: {0}")]
    UnknownInvoiceState(i32),
    /// Payment failed
    #[error("LND payment failed")]
    PaymentFailed,
    /// Unknown payment status
    #[error("LND unknown payment status")]
    UnknownPaymentStatus,
    /// Rpc error
    #[error(transparent)]
    Rpc(#[from] fedimint_tonic_lnd::tonic::Status),
}

impl From<Error> for cmk_common::lightning::Error {
    fn from(e: Error) -> Self {
        Self::Lightning(Box::new(e))
    }
}
