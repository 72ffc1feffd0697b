//! Error types for the rebalancer.

use std::path::PathBuf;

use folio_broker::BrokerError;

/// All errors that can occur during rebalancer operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("portfolio file error: {0}")]
    Portfolio(String),

    #[error("failed to read portfolio file {path}: {source}")]
    PortfolioRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write portfolio file {path}: {source}")]
    PortfolioWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse portfolio JSON: {0}")]
    PortfolioParse(#[from] serde_json::Error),

    #[error("invalid portfolio: {0}")]
    Validation(#[from] folio::ValidationError),

    #[error("brokerage error: {0}")]
    Broker(#[from] BrokerError),

    #[error("price cache error: {0}")]
    Cache(String),

    #[error("execution aborted: {0}")]
    Aborted(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
