use thiserror::Error;

/// Failure taxonomy of the safety-net.
///
/// None of these abort a liquidation pipeline on their own: they are logged
/// and folded into alert content. Only a failed price validation gates the
/// caller, and that is reported as a [`crate::PriceValidationResult`].
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Price validation failed: {0}")]
    PriceValidation(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Blacklist transaction failed for {mint}: {reason}")]
    BlacklistTx { mint: String, reason: String },

    #[error("Alert delivery failed: {0}")]
    AlertDelivery(String),

    #[error("Coordination store unavailable: {0}")]
    CoordinationStore(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for SentinelError
pub type Result<T> = std::result::Result<T, SentinelError>;

impl SentinelError {
    /// Wrap a coordination store failure.
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::CoordinationStore(err.to_string())
    }

    /// Wrap a durable store failure.
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}
