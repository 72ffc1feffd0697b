//! TOML configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use folio::Exchange;
use folio_broker::credential::DEFAULT_SKEW_SECS;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub account: AccountConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    pub quotes: QuotesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub base_url: String,
    pub app_key: String,
    pub app_secret: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// 8-digit account number.
    pub number: String,
    /// 2-digit product code.
    pub product_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_credential_file")]
    pub file: String,
    #[serde(default = "default_skew")]
    pub skew_secs: i64,
}

fn default_credential_file() -> String {
    "./data/credential.json".into()
}
fn default_skew() -> i64 {
    DEFAULT_SKEW_SECS
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            file: default_credential_file(),
            skew_secs: default_skew(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotesConfig {
    /// Candidate exchanges for foreign tickers, probed in order.
    #[serde(default = "default_exchanges")]
    pub exchanges: Vec<Exchange>,
    /// Routing exchange for foreign orders with no observed listing.
    #[serde(default = "default_order_exchange")]
    pub default_order_exchange: Exchange,
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
    /// Domestic currency units per one foreign unit.
    pub usd_rate: Decimal,
}

fn default_exchanges() -> Vec<Exchange> {
    Exchange::DEFAULT_SCAN.to_vec()
}
fn default_order_exchange() -> Exchange {
    Exchange::DEFAULT_ROUTE
}
fn default_cache_file() -> String {
    "./data/prices.json".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "executions.jsonl".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        if self.connection.base_url.trim().is_empty() {
            return Err(Error::Config("base_url must not be empty".into()));
        }
        if self.connection.app_key.is_empty() || self.connection.app_secret.is_empty() {
            return Err(Error::Config("app_key and app_secret are required".into()));
        }
        if self.connection.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be > 0".into()));
        }
        if !all_digits(&self.account.number, 8) {
            return Err(Error::Config("account number must be 8 digits".into()));
        }
        if !all_digits(&self.account.product_code, 2) {
            return Err(Error::Config("account product_code must be 2 digits".into()));
        }
        if self.credentials.skew_secs < 0 {
            return Err(Error::Config("skew_secs must be >= 0".into()));
        }
        if self.quotes.exchanges.is_empty() {
            return Err(Error::Config("quotes.exchanges must not be empty".into()));
        }
        if self.quotes.usd_rate <= Decimal::ZERO {
            return Err(Error::Config("usd_rate must be > 0".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.connection.timeout_secs)
    }

    pub fn skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.credentials.skew_secs)
    }

    pub fn credential_path(&self) -> PathBuf {
        PathBuf::from(&self.credentials.file)
    }

    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(&self.quotes.cache_file)
    }

    /// Full path to the execution audit log.
    pub fn audit_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}
