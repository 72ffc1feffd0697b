//! Resilient quote resolution over the brokerage quote source.
//!
//! Lookup order for a current price: in-process memo, then the daily cache
//! keyed by `(ticker, today)`, then live probes. Live failures never reach
//! the caller; the worst outcome is a zero-priced placeholder, which is
//! neither cached nor memoized so the next call retries.
//!
//! Foreign tickers are probed sequentially across the candidate exchanges.
//! A preferred exchange goes first and short-circuits on any priced answer;
//! otherwise the scan stops at the first priced answer carrying a display
//! name, falling back to the first priced answer seen.

use chrono::{Local, NaiveDate, Utc};
use folio::quote::lookback_dates;
use folio::{CachedPrice, ChangeRates, Exchange, Market, Quote};
use folio_broker::{QuoteId, QuoteSource, RawQuote, Reply};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use crate::cache::PriceCache;

/// Resolves current and historical prices with fallback and caching.
pub struct QuoteResolver<Q, C> {
    source: Q,
    cache: C,
    exchanges: Vec<Exchange>,
    memo: FxHashMap<(String, Option<Exchange>), Quote>,
    today: Option<NaiveDate>,
}

impl<Q: QuoteSource, C: PriceCache> QuoteResolver<Q, C> {
    pub fn new(source: Q, cache: C) -> Self {
        Self {
            source,
            cache,
            exchanges: Exchange::DEFAULT_SCAN.to_vec(),
            memo: FxHashMap::default(),
            today: None,
        }
    }

    /// Candidate exchanges for foreign tickers, in probe order.
    pub fn with_exchanges(mut self, exchanges: Vec<Exchange>) -> Self {
        self.exchanges = exchanges;
        self
    }

    /// Pin the calendar date used for cache keys.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn source(&self) -> &Q {
        &self.source
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Current quote for `ticker`. Never fails.
    pub fn resolve(&mut self, ticker: &str, preferred: Option<Exchange>) -> Quote {
        let memo_key = (ticker.to_string(), preferred);
        if let Some(quote) = self.memo.get(&memo_key) {
            debug!("{ticker}: memo hit");
            return quote.clone();
        }

        let today = self.today();
        match self.cache.get(ticker, today) {
            Ok(Some(record)) => {
                debug!("{ticker}: cache hit for {today}");
                let quote = record.to_quote();
                if quote.is_priced() {
                    self.memo.insert(memo_key, quote.clone());
                }
                return quote;
            }
            Ok(None) => {}
            Err(e) => warn!("{ticker}: price cache unreadable, fetching live: {e}"),
        }

        let quote = match Market::classify(ticker) {
            Market::Domestic => self.resolve_domestic(ticker),
            Market::Foreign => self.resolve_foreign(ticker, preferred),
        };

        if quote.is_priced() {
            let record = CachedPrice::from_quote(&quote, today, Utc::now());
            if let Err(e) = self.cache.upsert(record) {
                warn!("{ticker}: failed to cache price: {e}");
            }
            self.memo.insert(memo_key, quote.clone());
        } else {
            warn!("{ticker}: no price from any source, valuing at zero");
        }
        quote
    }

    fn resolve_domestic(&self, ticker: &str) -> Quote {
        let id = QuoteId::Domestic(ticker.to_string());
        let raw = match self.source.fetch(&id) {
            Ok(Reply::Data(raw)) if !raw.price.is_zero() => raw,
            Ok(reply) => {
                debug!("{ticker}: domestic source returned no price ({reply:?})");
                return Quote::placeholder(ticker);
            }
            Err(e) => {
                warn!("{ticker}: domestic quote failed: {e}");
                return Quote::placeholder(ticker);
            }
        };

        let mut quote = to_quote(ticker, raw, None);
        if !quote.has_name() {
            match self.source.lookup_name(ticker) {
                Ok(Reply::Data(name)) => quote.name = name,
                Ok(_) => debug!("{ticker}: no display name available"),
                Err(e) => debug!("{ticker}: name lookup failed: {e}"),
            }
        }
        quote
    }

    fn candidates(&self, preferred: Option<Exchange>) -> Vec<Exchange> {
        let mut list = Vec::with_capacity(self.exchanges.len() + 1);
        list.extend(preferred);
        list.extend(self.exchanges.iter().copied().filter(|e| Some(*e) != preferred));
        list
    }

    fn resolve_foreign(&self, ticker: &str, preferred: Option<Exchange>) -> Quote {
        let mut fallback: Option<Quote> = None;

        for exchange in self.candidates(preferred) {
            let id = QuoteId::Foreign {
                ticker: ticker.to_string(),
                exchange,
            };
            let raw = match self.source.fetch(&id) {
                Ok(Reply::Data(raw)) if !raw.price.is_zero() => raw,
                Ok(reply) => {
                    debug!("{id}: no price ({reply:?}), trying next exchange");
                    continue;
                }
                Err(e) => {
                    debug!("{id}: {e}, trying next exchange");
                    continue;
                }
            };

            let quote = to_quote(ticker, raw, Some(exchange));
            if preferred == Some(exchange) || quote.has_name() {
                return quote;
            }
            if fallback.is_none() {
                fallback = Some(quote);
            }
        }

        match fallback {
            Some(quote) => {
                info!("{ticker}: no named listing, using price from {:?}", quote.exchange);
                quote
            }
            None => Quote::placeholder(ticker),
        }
    }

    /// Close for `ticker` on `date` (or the last trading day before it).
    /// Zero when no source has one.
    pub fn resolve_historical(
        &mut self,
        ticker: &str,
        date: NaiveDate,
        preferred: Option<Exchange>,
    ) -> Decimal {
        match self.cache.get(ticker, date) {
            Ok(Some(record)) => {
                debug!("{ticker}: cached close for {date}");
                return record.price;
            }
            Ok(None) => {}
            Err(e) => warn!("{ticker}: price cache unreadable, fetching live: {e}"),
        }

        let market = Market::classify(ticker);
        let ids: Vec<QuoteId> = match market {
            Market::Domestic => vec![QuoteId::Domestic(ticker.to_string())],
            Market::Foreign => self
                .candidates(preferred)
                .into_iter()
                .map(|exchange| QuoteId::Foreign {
                    ticker: ticker.to_string(),
                    exchange,
                })
                .collect(),
        };

        let mut found = None;
        for id in ids {
            match self.source.fetch_historical(&id, date) {
                Ok(Reply::Data(close)) if !close.is_zero() => {
                    found = Some((close, id.exchange()));
                    break;
                }
                Ok(reply) => debug!("{id}: no close for {date} ({reply:?})"),
                Err(e) => debug!("{id}: close for {date} failed: {e}"),
            }
        }

        let Some((close, exchange)) = found else {
            warn!("{ticker}: no close for {date}");
            return Decimal::ZERO;
        };

        // Today's row belongs to the live quote, whose close is not final yet.
        if date < self.today() {
            let now = Utc::now();
            let record = CachedPrice {
                ticker: ticker.to_string(),
                date,
                price: close,
                currency: market.currency().to_string(),
                name: String::new(),
                exchange,
                created_at: now,
                updated_at: now,
            };
            if let Err(e) = self.cache.upsert(record) {
                warn!("{ticker}: failed to cache close for {date}: {e}");
            }
        }
        close
    }

    /// Percentage change from closes 1 year, 6 months, and 1 month before
    /// `as_of` to the close at `as_of`.
    pub fn change_rates(
        &mut self,
        ticker: &str,
        as_of: NaiveDate,
        preferred: Option<Exchange>,
    ) -> ChangeRates {
        let base = self.resolve_historical(ticker, as_of, preferred);
        let [year, half, month] = lookback_dates(as_of);
        let year = self.resolve_historical(ticker, year, preferred);
        let half = self.resolve_historical(ticker, half, preferred);
        let month = self.resolve_historical(ticker, month, preferred);
        ChangeRates::from_closes(base, year, half, month)
    }
}

fn to_quote(ticker: &str, raw: RawQuote, exchange: Option<Exchange>) -> Quote {
    let market = Market::classify(ticker);
    Quote {
        ticker: ticker.to_string(),
        name: raw.name.trim().to_string(),
        price: raw.price,
        market,
        currency: raw
            .currency
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| market.currency().to_string()),
        exchange,
    }
}
