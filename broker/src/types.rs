//! Shared broker types: credentials, quote requests, orders, balances.

use chrono::{DateTime, Duration, Utc};
use folio::{Exchange, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Explicit outcome of an upstream call that reached the brokerage.
///
/// Transport failures are `Err(BrokerError)`; everything the brokerage
/// actually answered is one of these variants, so callers branch on a tag
/// instead of inspecting error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    /// A usable payload.
    Data(T),
    /// The call succeeded but carried nothing (unknown ticker, no close).
    Empty,
    /// The bearer credential was rejected as expired.
    Expired,
}

impl<T> Reply<T> {
    pub fn data(self) -> Option<T> {
        match self {
            Reply::Data(t) => Some(t),
            Reply::Empty | Reply::Expired => None,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Reply::Expired)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        match self {
            Reply::Data(t) => Reply::Data(f(t)),
            Reply::Empty => Reply::Empty,
            Reply::Expired => Reply::Expired,
        }
    }
}

/// Opaque bearer token with an absolute expiry. Replaced wholesale on refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Usable at `now` with at least `skew` to spare.
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at > now + skew
    }

    pub fn expires_in(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Market-specific identifier for a quote request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuoteId {
    Domestic(String),
    Foreign { ticker: String, exchange: Exchange },
}

impl QuoteId {
    pub fn ticker(&self) -> &str {
        match self {
            QuoteId::Domestic(t) => t,
            QuoteId::Foreign { ticker, .. } => ticker,
        }
    }

    pub fn exchange(&self) -> Option<Exchange> {
        match self {
            QuoteId::Domestic(_) => None,
            QuoteId::Foreign { exchange, .. } => Some(*exchange),
        }
    }
}

impl std::fmt::Display for QuoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteId::Domestic(t) => write!(f, "{t}"),
            QuoteId::Foreign { ticker, exchange } => write!(f, "{ticker}@{exchange}"),
        }
    }
}

/// Current-price payload as the quote source reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuote {
    /// Display name; empty when the endpoint does not carry one.
    pub name: String,
    pub price: Decimal,
    /// Listing currency, when the endpoint reports it.
    pub currency: Option<String>,
}

/// A normalized order handed to the placement client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRequest {
    pub ticker: String,
    pub side: Side,
    pub quantity: u64,
    pub currency: String,
    /// Routing exchange for foreign orders.
    pub exchange: Option<Exchange>,
}

/// Brokerage acknowledgement of an order request.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    /// `"0"` on success.
    pub status_code: String,
    pub message_code: String,
    pub message: String,
    pub order_no: Option<String>,
    pub raw: serde_json::Value,
}

impl OrderAck {
    pub const SUCCESS: &'static str = "0";

    pub fn is_success(&self) -> bool {
        self.status_code == Self::SUCCESS
    }
}

/// One position as the brokerage reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceEntry {
    pub ticker: String,
    pub name: String,
    pub quantity: Decimal,
    pub exchange: Option<Exchange>,
}
