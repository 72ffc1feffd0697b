//! Brokerage collaborators for folio.
//!
//! Each upstream concern sits behind a narrow trait so production clients and
//! test doubles are interchangeable:
//!
//! - [`AuthClient`]: issues bearer credentials
//! - [`QuoteSource`]: current and historical prices per market
//! - [`OrderPlacement`]: cash orders
//! - [`BalanceSource`] / [`AccountSync`]: post-execution account refresh
//!
//! Implementations:
//!
//! - **Mock** ([`mock`]): scripted responses with call recording
//! - **KIS** (feature `kis`): blocking REST client for the brokerage's open API

pub mod credential;
pub mod error;
pub mod mock;
pub mod types;

#[cfg(feature = "kis")]
pub mod kis;

pub use credential::{
    CredentialManager, CredentialProvider, CredentialStore, Credentials, FileCredentialStore,
    MemoryCredentialStore,
};
pub use error::BrokerError;
pub use types::*;

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Issues a new bearer credential. Called only when the cached one is stale.
pub trait AuthClient {
    fn request_credential(&self) -> Result<Credential, BrokerError>;
}

/// Upstream price source for both markets.
pub trait QuoteSource {
    /// Current price for one market-specific identifier.
    fn fetch(&self, id: &QuoteId) -> Result<Reply<RawQuote>, BrokerError>;

    /// Close on `date` (or the last trading day before it).
    fn fetch_historical(
        &self,
        id: &QuoteId,
        date: NaiveDate,
    ) -> Result<Reply<Decimal>, BrokerError>;

    /// Secondary display-name lookup for domestic tickers.
    fn lookup_name(&self, ticker: &str) -> Result<Reply<String>, BrokerError>;
}

/// Submits cash orders. Must answer `Reply::Expired` on a rejected token so
/// the caller can refresh and retry once.
pub trait OrderPlacement {
    fn place_order(&self, order: &OrderRequest) -> Result<Reply<OrderAck>, BrokerError>;
}

/// Current positions across both markets.
pub trait BalanceSource {
    fn balances(&self) -> Result<Vec<BalanceEntry>, BrokerError>;
}

/// Refreshes local account state after orders went out.
pub trait AccountSync {
    fn sync_account(&self) -> Result<(), BrokerError>;
}

impl<T: QuoteSource + ?Sized> QuoteSource for &T {
    fn fetch(&self, id: &QuoteId) -> Result<Reply<RawQuote>, BrokerError> {
        (**self).fetch(id)
    }

    fn fetch_historical(
        &self,
        id: &QuoteId,
        date: NaiveDate,
    ) -> Result<Reply<Decimal>, BrokerError> {
        (**self).fetch_historical(id, date)
    }

    fn lookup_name(&self, ticker: &str) -> Result<Reply<String>, BrokerError> {
        (**self).lookup_name(ticker)
    }
}

impl<T: OrderPlacement + ?Sized> OrderPlacement for &T {
    fn place_order(&self, order: &OrderRequest) -> Result<Reply<OrderAck>, BrokerError> {
        (**self).place_order(order)
    }
}

impl<T: BalanceSource + ?Sized> BalanceSource for &T {
    fn balances(&self) -> Result<Vec<BalanceEntry>, BrokerError> {
        (**self).balances()
    }
}

impl<T: AccountSync + ?Sized> AccountSync for &T {
    fn sync_account(&self) -> Result<(), BrokerError> {
        (**self).sync_account()
    }
}
