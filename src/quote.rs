//! Quotes, cached price records, and period change rates.

use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::types::{Exchange, Market};

/// A resolved price for one ticker. Immutable once produced.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quote {
    pub ticker: String,
    pub name: String,
    pub price: Decimal,
    pub market: Market,
    pub currency: String,
    pub exchange: Option<Exchange>,
}

impl Quote {
    /// Zero-priced stand-in returned when every upstream probe failed.
    ///
    /// Valuation treats it as a holding worth nothing instead of aborting
    /// the whole portfolio.
    pub fn placeholder(ticker: &str) -> Self {
        let market = Market::classify(ticker);
        Self {
            ticker: ticker.to_string(),
            name: String::new(),
            price: Decimal::ZERO,
            market,
            currency: market.currency().to_string(),
            exchange: None,
        }
    }

    #[inline]
    pub fn is_priced(&self) -> bool {
        !self.price.is_zero()
    }

    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// One row of the daily price cache, keyed by `(ticker, date)`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CachedPrice {
    pub ticker: String,
    pub date: NaiveDate,
    pub price: Decimal,
    pub currency: String,
    pub name: String,
    pub exchange: Option<Exchange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CachedPrice {
    pub fn from_quote(quote: &Quote, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            ticker: quote.ticker.clone(),
            date,
            price: quote.price,
            currency: quote.currency.clone(),
            name: quote.name.clone(),
            exchange: quote.exchange,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_quote(&self) -> Quote {
        Quote {
            ticker: self.ticker.clone(),
            name: self.name.clone(),
            price: self.price,
            market: Market::classify(&self.ticker),
            currency: self.currency.clone(),
            exchange: self.exchange,
        }
    }
}

/// Price change over trailing periods, in percent.
///
/// A period is `None` when either close is missing (zero).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangeRates {
    pub one_year: Option<Decimal>,
    pub six_months: Option<Decimal>,
    pub one_month: Option<Decimal>,
}

impl ChangeRates {
    /// Build from the close at the reference date and the three past closes.
    pub fn from_closes(
        base: Decimal,
        year_ago: Decimal,
        half_ago: Decimal,
        month_ago: Decimal,
    ) -> Self {
        Self {
            one_year: change_pct(base, year_ago),
            six_months: change_pct(base, half_ago),
            one_month: change_pct(base, month_ago),
        }
    }
}

/// Dates of the 1y, 6m, and 1m lookback closes for `as_of`.
///
/// Month arithmetic clamps to the last valid day (Mar 31 − 1m = Feb 28/29).
pub fn lookback_dates(as_of: NaiveDate) -> [NaiveDate; 3] {
    let back = |months: u32| as_of.checked_sub_months(Months::new(months)).unwrap_or(as_of);
    [back(12), back(6), back(1)]
}

/// Percent change from `past` to `base`, rounded to 2 decimal places.
pub fn change_pct(base: Decimal, past: Decimal) -> Option<Decimal> {
    if base.is_zero() || past.is_zero() {
        return None;
    }
    Some(((base - past) / past * Decimal::ONE_HUNDRED).round_dp(2))
}
