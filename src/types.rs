//! Core types: Market classification, Exchange, currency codes.

use std::fmt;
use std::str::FromStr;

/// Currency of domestic listings.
pub const DOMESTIC_CURRENCY: &str = "KRW";

/// Currency of foreign listings.
pub const FOREIGN_CURRENCY: &str = "USD";

/// Length of a domestic ticker code (e.g. `005930`).
pub const DOMESTIC_TICKER_LEN: usize = 6;

/// Which upstream quote source and currency apply to a ticker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Market {
    Domestic,
    Foreign,
}

impl Market {
    /// Classify a ticker by shape: exactly 6 characters is domestic,
    /// anything else is foreign.
    #[inline]
    pub fn classify(ticker: &str) -> Self {
        if ticker.chars().count() == DOMESTIC_TICKER_LEN {
            Market::Domestic
        } else {
            Market::Foreign
        }
    }

    /// Default currency for listings in this market.
    pub fn currency(self) -> &'static str {
        match self {
            Market::Domestic => DOMESTIC_CURRENCY,
            Market::Foreign => FOREIGN_CURRENCY,
        }
    }

    pub fn is_foreign(self) -> bool {
        self == Market::Foreign
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Domestic => write!(f, "domestic"),
            Market::Foreign => write!(f, "foreign"),
        }
    }
}

/// Foreign exchange a ticker can be quoted on and routed to.
///
/// Each exchange has two codes: a short quote code used by the price
/// endpoints and a routing code used when placing orders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Exchange {
    Nasdaq,
    Nyse,
    Amex,
}

impl Exchange {
    /// Default candidate ordering for quote probes.
    pub const DEFAULT_SCAN: [Exchange; 3] = [Exchange::Nasdaq, Exchange::Nyse, Exchange::Amex];

    /// Routing fallback when no exchange is known for a foreign ticker.
    pub const DEFAULT_ROUTE: Exchange = Exchange::Nasdaq;

    pub fn quote_code(self) -> &'static str {
        match self {
            Exchange::Nasdaq => "NAS",
            Exchange::Nyse => "NYS",
            Exchange::Amex => "AMS",
        }
    }

    pub fn order_code(self) -> &'static str {
        match self {
            Exchange::Nasdaq => "NASD",
            Exchange::Nyse => "NYSE",
            Exchange::Amex => "AMEX",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.quote_code())
    }
}

/// Error returned when an exchange code is not recognised.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown exchange code: {0}")]
pub struct UnknownExchange(pub String);

impl FromStr for Exchange {
    type Err = UnknownExchange;

    /// Accepts either the quote code or the routing code, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NAS" | "NASD" | "NASDAQ" => Ok(Exchange::Nasdaq),
            "NYS" | "NYSE" => Ok(Exchange::Nyse),
            "AMS" | "AMEX" => Ok(Exchange::Amex),
            _ => Err(UnknownExchange(s.to_string())),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Exchange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.quote_code())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Exchange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}
