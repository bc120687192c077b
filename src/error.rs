//! Error types for the autosend tool

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for autosend
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    // Rule validation errors
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Address is not in your wallet: {0}")]
    AddressNotMine(String),

    #[error("Invalid proportion {proportion} for destination {address} (must be between 0 and 1)")]
    InvalidProportion {
        address: String,
        proportion: Decimal,
    },

    #[error("Proportions should add to 1 (got {0})")]
    ProportionSum(Decimal),

    #[error("Negative fee? What are you trying to pull?")]
    NegativeFee,

    #[error("Minimum balance to execute ({minimum}) must be more than the fee ({fee})")]
    MinimumNotAboveFee { minimum: Decimal, fee: Decimal },

    #[error("A rule already exists for address '{0}'. To redefine it, first delete it.")]
    DuplicateRule(String),

    #[error("No rule exists for address '{0}'")]
    NoSuchRule(String),

    #[error("Unknown rule kind: {0}")]
    UnknownRuleKind(String),

    #[error("Invalid destination '{0}' (expected ADDRESS:PROPORTION)")]
    InvalidDestination(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_) | Error::RpcTimeout(_) | Error::RpcConnection(_)
        )
    }

    /// Check if this error is a rule validation failure
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidAddress(_)
                | Error::AddressNotMine(_)
                | Error::InvalidProportion { .. }
                | Error::ProportionSum(_)
                | Error::NegativeFee
                | Error::MinimumNotAboveFee { .. }
                | Error::DuplicateRule(_)
                | Error::NoSuchRule(_)
                | Error::UnknownRuleKind(_)
                | Error::InvalidDestination(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
