//! # folio
//!
//! Portfolio model and group rebalance calculator for a multi-account
//! securities portfolio split into target-weighted groups.
//!
//! ## Features
//!
//! - **Ticker classification**: 6-character codes are domestic, anything else foreign
//! - **Exact decimals**: every price and amount is a [`rust_decimal::Decimal`]
//! - **Group differences**: current value vs. target share of the total basis
//! - **Recommendations**: greedy foreign-first sells, single domestic-first buy per group
//!
//! ## Quick Start
//!
//! ```
//! use folio::{GroupSnapshot, Holding, PortfolioSnapshot, Side, sell_recommendations};
//! use rust_decimal::Decimal;
//!
//! let snapshot = PortfolioSnapshot::new(vec![
//!     GroupSnapshot::new(
//!         "us-equity",
//!         Decimal::from(50),
//!         vec![Holding::new("SPY", Decimal::from(40), Decimal::from(2_000_000))],
//!     ),
//!     GroupSnapshot::new("kr-bonds", Decimal::from(50), vec![]),
//! ]);
//!
//! let sells = sell_recommendations(&snapshot);
//! assert_eq!(sells.len(), 1);
//! assert_eq!(sells[0].action, Side::Sell);
//! assert_eq!(sells[0].amount, Decimal::from(1_000_000));
//! assert_eq!(sells[0].quantity, Some(Decimal::from(20)));
//! ```
//!
//! ## Classification
//!
//! ```
//! use folio::Market;
//!
//! assert_eq!(Market::classify("005930"), Market::Domestic);
//! assert_eq!(Market::classify("AAPL"), Market::Foreign);
//! assert_eq!(Market::Foreign.currency(), "USD");
//! ```

mod error;
pub mod quote;
pub mod rebalance;
mod side;
mod snapshot;
mod types;

pub use rust_decimal::Decimal;

// Re-export public API
pub use error::ValidationError;
pub use quote::{CachedPrice, ChangeRates, Quote};
pub use rebalance::{
    GroupDifference, RebalancePlan, Recommendation, buy_recommendations, group_differences,
    sell_recommendations,
};
pub use side::Side;
pub use snapshot::{GroupSnapshot, Holding, PortfolioSnapshot};
pub use types::{
    DOMESTIC_CURRENCY, DOMESTIC_TICKER_LEN, Exchange, FOREIGN_CURRENCY, Market, UnknownExchange,
};
