//! Post-execution account resynchronization into the portfolio file.

use std::path::{Path, PathBuf};

use folio_broker::{AccountSync, BalanceEntry, BalanceSource, BrokerError};
use log::{info, warn};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use crate::portfolio::PortfolioFile;

/// Quantity changes applied by one sync.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// `(ticker, old, new)` for every holding whose quantity changed.
    pub updated: Vec<(String, Decimal, Decimal)>,
    /// Tickers held at the brokerage but not listed in the file.
    pub unknown: Vec<String>,
}

/// Rewrite holding quantities from brokerage balances.
///
/// Only tickers the file already lists are touched; a listed ticker missing
/// from the balances drops to zero.
pub fn apply_balances(file: &mut PortfolioFile, balances: &[BalanceEntry]) -> SyncReport {
    let held: FxHashMap<&str, Decimal> = balances
        .iter()
        .map(|b| (b.ticker.as_str(), b.quantity))
        .collect();

    let mut report = SyncReport::default();
    for holding in file.holdings_mut() {
        let new = held.get(holding.ticker.as_str()).copied().unwrap_or(Decimal::ZERO);
        if new != holding.quantity {
            report
                .updated
                .push((holding.ticker.clone(), holding.quantity, new));
            holding.quantity = new;
        }
    }

    for b in balances {
        if !file.holdings().any(|h| h.ticker == b.ticker) {
            report.unknown.push(b.ticker.clone());
        }
    }
    report
}

/// Account sync backed by a portfolio file and a balance source.
pub struct PortfolioSync<B> {
    source: B,
    path: PathBuf,
}

impl<B: BalanceSource> PortfolioSync<B> {
    pub fn new(source: B, path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<B: BalanceSource> AccountSync for PortfolioSync<B> {
    fn sync_account(&self) -> Result<(), BrokerError> {
        let balances = self.source.balances()?;
        let mut file = PortfolioFile::load(&self.path)
            .map_err(|e| BrokerError::Other(format!("sync: {e}")))?;

        let report = apply_balances(&mut file, &balances);
        for ticker in &report.unknown {
            warn!("{ticker} is held at the brokerage but not in the portfolio file");
        }
        for (ticker, old, new) in &report.updated {
            info!("{ticker}: quantity {old} -> {new}");
        }

        if !report.updated.is_empty() {
            file.save(&self.path)
                .map_err(|e| BrokerError::Other(format!("sync: {e}")))?;
        }
        info!(
            "Account synced: {} holdings updated, {} unknown",
            report.updated.len(),
            report.unknown.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_broker::mock::MockBroker;
    use rust_decimal_macros::dec;

    fn file_json() -> &'static str {
        r#"{"groups": [
            {"name": "US", "target_pct": 50, "holdings": [
                {"ticker": "SPY", "quantity": 3},
                {"ticker": "QQQ", "quantity": 2}
            ]},
            {"name": "KR", "target_pct": 50, "holdings": [
                {"ticker": "005930", "quantity": 10}
            ]}
        ]}"#
    }

    fn entry(ticker: &str, quantity: Decimal) -> BalanceEntry {
        BalanceEntry {
            ticker: ticker.into(),
            name: String::new(),
            quantity,
            exchange: None,
        }
    }

    #[test]
    fn applies_known_tickers_only() {
        let mut file = PortfolioFile::from_json(file_json()).unwrap();
        let balances = vec![
            entry("SPY", dec!(1)),
            entry("005930", dec!(10)),
            entry("TSLA", dec!(4)),
        ];
        let report = apply_balances(&mut file, &balances);

        assert_eq!(
            report.updated,
            vec![
                ("SPY".to_string(), dec!(3), dec!(1)),
                ("QQQ".to_string(), dec!(2), Decimal::ZERO),
            ]
        );
        assert_eq!(report.unknown, vec!["TSLA".to_string()]);
        assert_eq!(file.holdings().count(), 3, "unknown tickers are not added");
    }

    #[test]
    fn sync_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        std::fs::write(&path, file_json()).unwrap();

        let broker = MockBroker::builder()
            .with_balance("SPY", dec!(5))
            .with_balance("QQQ", dec!(2))
            .with_balance("005930", dec!(12))
            .build();
        PortfolioSync::new(&broker, &path).sync_account().unwrap();

        let file = PortfolioFile::load(&path).unwrap();
        let qty: Vec<_> = file.holdings().map(|h| h.quantity).collect();
        assert_eq!(qty, vec![dec!(5), dec!(2), dec!(12)]);
    }

    #[test]
    fn missing_file_is_sync_error() {
        let broker = MockBroker::builder().build();
        let sync = PortfolioSync::new(&broker, "/nonexistent/portfolio.json");
        assert!(matches!(sync.sync_account(), Err(BrokerError::Other(_))));
    }
}
