//! Prices a portfolio file into a snapshot the calculator can consume.

use folio::{DOMESTIC_CURRENCY, Exchange, GroupSnapshot, Holding, PortfolioSnapshot, Quote};
use folio_broker::QuoteSource;
use log::warn;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use crate::cache::PriceCache;
use crate::error::{Error, Result};
use crate::portfolio::PortfolioFile;
use crate::resolver::QuoteResolver;

/// A priced portfolio plus what resolution observed along the way.
#[derive(Debug, Clone)]
pub struct Valuation {
    pub snapshot: PortfolioSnapshot,
    /// Listing exchange per foreign ticker, for order routing.
    pub exchanges: FxHashMap<String, Exchange>,
    pub quotes: Vec<Quote>,
}

impl Valuation {
    /// Tickers that could not be priced and were valued at zero.
    pub fn unpriced(&self) -> impl Iterator<Item = &str> {
        self.quotes
            .iter()
            .filter(|q| !q.is_priced())
            .map(|q| q.ticker.as_str())
    }
}

/// Price every holding and convert foreign-currency values with `usd_rate`.
pub fn value_portfolio<Q: QuoteSource, C: PriceCache>(
    file: &PortfolioFile,
    resolver: &mut QuoteResolver<Q, C>,
    usd_rate: Decimal,
) -> Result<Valuation> {
    if usd_rate <= Decimal::ZERO {
        return Err(Error::Config(format!("usd_rate must be > 0, got {usd_rate}")));
    }

    let mut exchanges = FxHashMap::default();
    let mut quotes = Vec::new();
    let mut groups = Vec::with_capacity(file.groups.len());

    for group in &file.groups {
        let mut holdings = Vec::with_capacity(group.holdings.len());
        for entry in &group.holdings {
            let quote = resolver.resolve(&entry.ticker, entry.exchange);
            if !quote.is_priced() {
                warn!("{} valued at zero", entry.ticker);
            }

            let rate = if quote.currency == DOMESTIC_CURRENCY {
                Decimal::ONE
            } else {
                usd_rate
            };
            let value = entry.quantity * quote.price * rate;

            let mut holding =
                Holding::new(&entry.ticker, entry.quantity, value).with_currency(&quote.currency);
            if quote.has_name() {
                holding = holding.with_name(&quote.name);
            }
            holdings.push(holding);

            if let Some(exchange) = quote.exchange.or(entry.exchange) {
                exchanges.insert(entry.ticker.clone(), exchange);
            }
            quotes.push(quote);
        }
        groups.push(GroupSnapshot::new(&group.name, group.target_pct, holdings));
    }

    let mut snapshot = PortfolioSnapshot::new(groups);
    if let Some(cash) = file.cash {
        snapshot = snapshot.with_cash(cash);
    }
    snapshot.validate()?;

    Ok(Valuation {
        snapshot,
        exchanges,
        quotes,
    })
}
