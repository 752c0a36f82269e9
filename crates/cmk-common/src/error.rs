//! Errors

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::nuts::Id;
use crate::Amount;

/// CMK Error
#[derive(Debug, Error)]
pub enum Error {
    // Input errors
    /// Keyset derivation path is malformed
    #[error("Invalid derivation path: `{0}`")]
    InvalidDerivationPath(String),
    /// Amount is not a denomination of the keyset
    #[error("Invalid amount: `{0}`")]
    InvalidAmount(Amount),
    /// Amount overflow
    #[error("Amount Overflow")]
    AmountOverflow,
    /// Duplicate proofs provided
    #[error("Duplicate Inputs")]
    DuplicateInputs,
    /// Duplicate output
    #[error("Duplicate outputs")]
    DuplicateOutputs,
    /// Unsupported unit
    #[error("Unit unsupported")]
    UnsupportedUnit,
    /// Inputs and outputs are not of the same unit
    #[error("Inputs and outputs are not of the same unit")]
    UnitMismatch,
    /// Multiple units provided
    #[error("Cannot have multiple units")]
    MultipleUnits,
    /// Amount is outside of allowed range
    #[error("Amount must be between `{0}` and `{1}` is `{2}`")]
    AmountOutofLimitRange(Amount, Amount, Amount),
    /// BlindedMessage is already signed
    #[error("Blinded Message is already signed")]
    BlindedMessageAlreadySigned,
    /// Bolt11 invoice does not have amount
    #[error("Invoice Amount undefined")]
    InvoiceAmountUndefined,
    /// Quote id is not a uuid
    #[error(transparent)]
    QuoteId(#[from] uuid::Error),

    // Verification errors
    /// Proof signature does not verify against the keyset
    #[error("Token not verified")]
    TokenNotVerified,
    /// Unknown Keyset
    #[error("Unknown Keyset: `{0}`")]
    UnknownKeySet(Id),
    /// Inactive Keyset
    #[error("Inactive Keyset")]
    InactiveKeyset,
    /// Mint does not have a key for amount
    #[error("No Key for Amount")]
    AmountKey,

    // Double spend errors
    /// Token is already spent
    #[error("Token Already Spent")]
    TokenAlreadySpent,
    /// Token is pending in another operation
    #[error("Token Pending")]
    TokenPending,

    // Conservation errors
    /// Transaction unbalanced
    #[error("Inputs: `{0}`, Outputs: `{1}`, Expected Fee: `{2}`")]
    TransactionUnbalanced(u64, u64, u64),
    /// Inputs do not cover amount, fee reserve and input fee
    #[error("Insufficient inputs: `{0}`, needed: `{1}`")]
    InsufficientInputs(u64, u64),

    // Quote errors
    /// Quote is not known
    #[error("Unknown quote")]
    UnknownQuote,
    /// Quote is not paid
    #[error("Quote not paid")]
    UnpaidQuote,
    /// Quote is pending
    #[error("Quote pending")]
    PendingQuote,
    /// ecash already issued for quote
    #[error("Quote already issued")]
    IssuedQuote,
    /// Quote has already been paid
    #[error("Quote is already paid")]
    PaidQuote,
    /// Quote is expired
    #[error("Expired quote: Expired: `{0}`, Time: `{1}`")]
    ExpiredQuote(u64, u64),

    // Lightning errors
    /// Payment failed
    #[error("Payment failed")]
    PaymentFailed,
    /// Invoice already paid
    #[error("Request already paid")]
    RequestAlreadyPaid,
    /// Lightning backend error
    #[error(transparent)]
    Lightning(#[from] crate::lightning::Error),

    // Storage errors
    /// Database error
    #[error(transparent)]
    Database(crate::database::Error),

    // Protocol errors surfaced from the cashu crate
    /// DHKE error
    #[error(transparent)]
    DHKE(#[from] crate::dhke::Error),
    /// Amount Error
    #[error(transparent)]
    AmountError(#[from] crate::amount::Error),
    /// NUT00 Error
    #[error(transparent)]
    NUT00(#[from] crate::nuts::nut00::Error),
    /// NUT01 Error
    #[error(transparent)]
    NUT01(#[from] crate::nuts::nut01::Error),
    /// NUT02 Error
    #[error(transparent)]
    NUT02(#[from] crate::nuts::nut02::Error),
    /// NUT04 Error
    #[error(transparent)]
    NUT04(#[from] crate::nuts::nut04::Error),
    /// NUT05 Error
    #[error(transparent)]
    NUT05(#[from] crate::nuts::nut05::Error),
    /// NUT12 Error
    #[error(transparent)]
    NUT12(#[from] crate::nuts::nut12::Error),
    /// Secret error
    #[error(transparent)]
    Secret(#[from] crate::secret::Error),
    /// Parse invoice error
    #[error(transparent)]
    Invoice(#[from] lightning_invoice::ParseOrSemanticError),
    /// Internal Error
    #[error("Internal Error")]
    Internal,
}

/// Category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request: bad amounts, units, points or duplicates
    Input,
    /// Proof or keyset failed verification
    Verification,
    /// Proof is spent or in use by another operation
    DoubleSpend,
    /// Amounts of inputs and outputs do not add up
    Conservation,
    /// Quote is unknown or not in the state the operation needs
    QuoteState,
    /// Lightning backend failure
    Lightning,
    /// Storage failure
    Storage,
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDerivationPath(_)
            | Self::InvalidAmount(_)
            | Self::AmountOverflow
            | Self::DuplicateInputs
            | Self::DuplicateOutputs
            | Self::UnsupportedUnit
            | Self::UnitMismatch
            | Self::MultipleUnits
            | Self::AmountOutofLimitRange(..)
            | Self::BlindedMessageAlreadySigned
            | Self::InvoiceAmountUndefined
            | Self::QuoteId(_)
            | Self::AmountError(_)
            | Self::NUT00(_)
            | Self::NUT01(_)
            | Self::NUT02(_)
            | Self::NUT04(_)
            | Self::NUT05(_)
            | Self::Secret(_)
            | Self::Invoice(_) => ErrorKind::Input,
            Self::TokenNotVerified
            | Self::UnknownKeySet(_)
            | Self::InactiveKeyset
            | Self::AmountKey
            | Self::NUT12(_) => ErrorKind::Verification,
            Self::DHKE(crate::dhke::Error::TokenNotVerified) => ErrorKind::Verification,
            Self::DHKE(_) => ErrorKind::Input,
            Self::TokenAlreadySpent | Self::TokenPending => ErrorKind::DoubleSpend,
            Self::TransactionUnbalanced(..) | Self::InsufficientInputs(..) => {
                ErrorKind::Conservation
            }
            Self::UnknownQuote
            | Self::UnpaidQuote
            | Self::PendingQuote
            | Self::IssuedQuote
            | Self::PaidQuote
            | Self::ExpiredQuote(..) => ErrorKind::QuoteState,
            Self::PaymentFailed | Self::RequestAlreadyPaid | Self::Lightning(_) => {
                ErrorKind::Lightning
            }
            Self::Database(_) | Self::Internal => ErrorKind::Storage,
        }
    }
}

/// CMK Error Response
///
/// See NUT definition in [00](https://github.com/cashubtc/nuts/blob/main/00.md)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error Code
    pub code: ErrorCode,
    /// Human readable description
    #[serde(default)]
    pub detail: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code: {}, detail: {}", self.code, self.detail)
    }
}

impl ErrorResponse {
    /// Create new [`ErrorResponse`]
    pub fn new(code: ErrorCode, detail: String) -> Self {
        Self { code, detail }
    }

    /// Error response from json
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(json)?;

        Self::from_value(value)
    }

    /// Error response from json Value
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match serde_json::from_value::<ErrorResponse>(value.clone()) {
            Ok(res) => Ok(res),
            Err(_) => Ok(Self {
                code: ErrorCode::Unknown(999),
                detail: value.to_string(),
            }),
        }
    }
}

impl From<Error> for ErrorResponse {
    fn from(err: Error) -> ErrorResponse {
        let code = match &err {
            Error::TokenNotVerified | Error::DHKE(crate::dhke::Error::TokenNotVerified) => {
                ErrorCode::TokenNotVerified
            }
            Error::NUT12(_) => ErrorCode::TokenNotVerified,
            Error::TokenAlreadySpent => ErrorCode::TokenAlreadySpent,
            Error::TokenPending => ErrorCode::TokenPending,
            Error::BlindedMessageAlreadySigned => ErrorCode::BlindedMessageAlreadySigned,
            Error::TransactionUnbalanced(..)
            | Error::InsufficientInputs(..)
            | Error::AmountOverflow => ErrorCode::TransactionUnbalanced,
            Error::AmountOutofLimitRange(..) => ErrorCode::AmountOutofLimitRange,
            Error::DuplicateInputs => ErrorCode::DuplicateInputs,
            Error::DuplicateOutputs => ErrorCode::DuplicateOutputs,
            Error::MultipleUnits => ErrorCode::MultipleUnits,
            Error::UnitMismatch => ErrorCode::UnitMismatch,
            Error::UnsupportedUnit => ErrorCode::UnsupportedUnit,
            Error::UnknownKeySet(_) | Error::AmountKey => ErrorCode::KeysetNotFound,
            Error::InactiveKeyset => ErrorCode::KeysetInactive,
            Error::UnpaidQuote => ErrorCode::QuoteNotPaid,
            Error::IssuedQuote => ErrorCode::TokensAlreadyIssued,
            Error::PaymentFailed | Error::Lightning(_) => ErrorCode::LightningError,
            Error::PendingQuote => ErrorCode::QuotePending,
            Error::PaidQuote | Error::RequestAlreadyPaid => ErrorCode::InvoiceAlreadyPaid,
            Error::ExpiredQuote(..) => ErrorCode::QuoteExpired,
            _ => ErrorCode::Unknown(50000),
        };

        let detail = match &err {
            Error::TransactionUnbalanced(inputs_total, outputs_total, fee_expected) => format!(
                "Inputs: {inputs_total}, Outputs: {outputs_total}, expected_fee: {fee_expected}"
            ),
            _ => err.to_string(),
        };

        ErrorResponse { code, detail }
    }
}

impl From<crate::database::Error> for Error {
    fn from(db_error: crate::database::Error) -> Self {
        use crate::state::Error as StateError;

        match db_error {
            crate::database::Error::AttemptUpdateSpentProof
            | crate::database::Error::AttemptRemoveSpentProof => Self::TokenAlreadySpent,
            crate::database::Error::UnknownQuote => Self::UnknownQuote,
            crate::database::Error::InvalidStateTransition(state) => match state {
                StateError::Pending => Self::TokenPending,
                StateError::AlreadySpent => Self::TokenAlreadySpent,
                StateError::QuotePending => Self::PendingQuote,
                StateError::QuoteUnpaid => Self::UnpaidQuote,
                StateError::AlreadyPaid => Self::PaidQuote,
                StateError::AlreadyIssued => Self::IssuedQuote,
                state => Self::Database(crate::database::Error::InvalidStateTransition(state)),
            },
            db_error => Self::Database(db_error),
        }
    }
}

/// Possible Error Codes
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ErrorCode {
    /// Proof verification failed (10001)
    TokenNotVerified,
    /// Proofs already spent (11001)
    TokenAlreadySpent,
    /// Proofs are pending (11002)
    TokenPending,
    /// Outputs already signed (11003)
    BlindedMessageAlreadySigned,
    /// Transaction is not balanced (11005)
    TransactionUnbalanced,
    /// Amount outside of limit range (11006)
    AmountOutofLimitRange,
    /// Duplicate inputs provided (11007)
    DuplicateInputs,
    /// Duplicate outputs provided (11008)
    DuplicateOutputs,
    /// Inputs/Outputs of multiple units (11009)
    MultipleUnits,
    /// Inputs and outputs not of same unit (11010)
    UnitMismatch,
    /// Unit in request is not supported (11013)
    UnsupportedUnit,
    /// Keyset is not known (12001)
    KeysetNotFound,
    /// Keyset is inactive, cannot sign messages (12002)
    KeysetInactive,
    /// Quote request is not paid (20001)
    QuoteNotPaid,
    /// Quote has already been issued (20002)
    TokensAlreadyIssued,
    /// Lightning payment failed (20004)
    LightningError,
    /// Quote is pending (20005)
    QuotePending,
    /// Invoice already paid (20006)
    InvoiceAlreadyPaid,
    /// Quote is expired (20007)
    QuoteExpired,
    /// Unknown error code
    Unknown(u16),
}

impl ErrorCode {
    /// Error code from u16
    pub fn from_code(code: u16) -> Self {
        match code {
            10001 => Self::TokenNotVerified,
            11001 => Self::TokenAlreadySpent,
            11002 => Self::TokenPending,
            11003 => Self::BlindedMessageAlreadySigned,
            11005 => Self::TransactionUnbalanced,
            11006 => Self::AmountOutofLimitRange,
            11007 => Self::DuplicateInputs,
            11008 => Self::DuplicateOutputs,
            11009 => Self::MultipleUnits,
            11010 => Self::UnitMismatch,
            11013 => Self::UnsupportedUnit,
            12001 => Self::KeysetNotFound,
            12002 => Self::KeysetInactive,
            20001 => Self::QuoteNotPaid,
            20002 => Self::TokensAlreadyIssued,
            20004 => Self::LightningError,
            20005 => Self::QuotePending,
            20006 => Self::InvoiceAlreadyPaid,
            20007 => Self::QuoteExpired,
            _ => Self::Unknown(code),
        }
    }

    /// Error code to u16
    pub fn to_code(&self) -> u16 {
        match self {
            Self::TokenNotVerified => 10001,
            Self::TokenAlreadySpent => 11001,
            Self::TokenPending => 11002,
            Self::BlindedMessageAlreadySigned => 11003,
            Self::TransactionUnbalanced => 11005,
            Self::AmountOutofLimitRange => 11006,
            Self::DuplicateInputs => 11007,
            Self::DuplicateOutputs => 11008,
            Self::MultipleUnits => 11009,
            Self::UnitMismatch => 11010,
            Self::UnsupportedUnit => 11013,
            Self::KeysetNotFound => 12001,
            Self::KeysetInactive => 12002,
            Self::QuoteNotPaid => 20001,
            Self::TokensAlreadyIssued => 20002,
            Self::LightningError => 20004,
            Self::QuotePending => 20005,
            Self::InvoiceAlreadyPaid => 20006,
            Self::QuoteExpired => 20007,
            Self::Unknown(code) => *code,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(self.to_code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = u16::deserialize(deserializer)?;

        Ok(ErrorCode::from_code(code))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_code())
    }
}

/// Return early with an error if a condition is not satisfied
#[macro_export]
macro_rules! ensure_cmk {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
