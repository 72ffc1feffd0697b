//! Broker error types.

/// Errors that can occur talking to the brokerage or its local stores.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("order error: {0}")]
    Order(String),

    #[error("authentication error: {0}")]
    Auth(String),

    /// The bearer credential was rejected as expired, and the single
    /// refresh-and-retry has already been spent.
    #[error("credential expired")]
    CredentialExpired,

    #[error("invalid upstream payload: {0}")]
    InvalidPayload(String),

    #[error("rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("credential store error: {0}")]
    Store(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        BrokerError::InvalidPayload(e.to_string())
    }
}
