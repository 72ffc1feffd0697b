//! Portfolio file (portfolio.json) loading, validation, and saving.

use std::collections::HashSet;
use std::path::Path;

use folio::Exchange;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Groups with target weights and their holdings, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioFile {
    /// Uninvested cash in the domestic currency, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash: Option<Decimal>,
    pub groups: Vec<GroupEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub name: String,
    /// Target weight in percent (0–100).
    pub target_pct: Decimal,
    #[serde(default)]
    pub holdings: Vec<HoldingEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingEntry {
    pub ticker: String,
    pub quantity: Decimal,
    /// Listing exchange hint for foreign tickers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<Exchange>,
}

impl PortfolioFile {
    /// Load and validate a portfolio file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::PortfolioRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let file: PortfolioFile = serde_json::from_str(json)?;
        file.validate()?;
        Ok(file)
    }

    /// Write the file back, pretty-printed.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| Error::PortfolioWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Validate the portfolio definition.
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(Error::Portfolio("groups list is empty".into()));
        }

        let mut names = HashSet::new();
        let mut tickers = HashSet::new();
        let mut target_sum = Decimal::ZERO;

        for g in &self.groups {
            if g.name.trim().is_empty() {
                return Err(Error::Portfolio("empty group name".into()));
            }
            if !names.insert(g.name.as_str()) {
                return Err(Error::Portfolio(format!("duplicate group: {}", g.name)));
            }
            if g.target_pct < Decimal::ZERO || g.target_pct > Decimal::ONE_HUNDRED {
                return Err(Error::Portfolio(format!(
                    "target for {} ({}%) outside 0..=100",
                    g.name, g.target_pct
                )));
            }
            target_sum += g.target_pct;

            for h in &g.holdings {
                if h.ticker.trim().is_empty() {
                    return Err(Error::Portfolio(format!("empty ticker in group {}", g.name)));
                }
                if !tickers.insert(h.ticker.as_str()) {
                    return Err(Error::Portfolio(format!("duplicate ticker: {}", h.ticker)));
                }
                if h.quantity < Decimal::ZERO {
                    return Err(Error::Portfolio(format!(
                        "negative quantity for {}",
                        h.ticker
                    )));
                }
            }
        }

        if target_sum > Decimal::ONE_HUNDRED {
            return Err(Error::Portfolio(format!(
                "group targets sum to {target_sum}% (> 100%)"
            )));
        }
        if let Some(cash) = self.cash {
            if cash < Decimal::ZERO {
                return Err(Error::Portfolio("cash must be >= 0".into()));
            }
        }
        Ok(())
    }

    /// Every holding across all groups.
    pub fn holdings(&self) -> impl Iterator<Item = &HoldingEntry> {
        self.groups.iter().flat_map(|g| g.holdings.iter())
    }

    pub fn holdings_mut(&mut self) -> impl Iterator<Item = &mut HoldingEntry> {
        self.groups.iter_mut().flat_map(|g| g.holdings.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn valid_json() -> &'static str {
        r#"{
            "cash": 500000,
            "groups": [
                {
                    "name": "US equity",
                    "target_pct": 60,
                    "holdings": [
                        { "ticker": "SPY", "quantity": 3, "exchange": "NYS" },
                        { "ticker": "QQQ", "quantity": 2 }
                    ]
                },
                {
                    "name": "KR equity",
                    "target_pct": 40,
                    "holdings": [{ "ticker": "005930", "quantity": 10 }]
                }
            ]
        }"#
    }

    #[test]
    fn parse_valid() {
        let file = PortfolioFile::from_json(valid_json()).unwrap();
        assert_eq!(file.cash, Some(dec!(500000)));
        assert_eq!(file.groups.len(), 2);
        assert_eq!(file.groups[0].holdings[0].exchange, Some(Exchange::Nyse));
        assert_eq!(file.holdings().count(), 3);
    }

    #[test]
    fn reject_empty_groups() {
        let result = PortfolioFile::from_json(r#"{"groups": []}"#);
        assert!(matches!(result, Err(Error::Portfolio(_))));
    }

    #[test]
    fn reject_duplicate_group() {
        let json = r#"{"groups": [
            {"name": "A", "target_pct": 10},
            {"name": "A", "target_pct": 10}
        ]}"#;
        assert!(PortfolioFile::from_json(json).is_err());
    }

    #[test]
    fn reject_ticker_in_two_groups() {
        let json = r#"{"groups": [
            {"name": "A", "target_pct": 10, "holdings": [{"ticker": "SPY", "quantity": 1}]},
            {"name": "B", "target_pct": 10, "holdings": [{"ticker": "SPY", "quantity": 1}]}
        ]}"#;
        let err = PortfolioFile::from_json(json).unwrap_err();
        assert!(err.to_string().contains("duplicate ticker"));
    }

    #[test]
    fn reject_target_sum_over_100() {
        let json = r#"{"groups": [
            {"name": "A", "target_pct": 70},
            {"name": "B", "target_pct": 40}
        ]}"#;
        assert!(PortfolioFile::from_json(json).is_err());
    }

    #[test]
    fn reject_target_out_of_range() {
        let json = r#"{"groups": [{"name": "A", "target_pct": -5}]}"#;
        assert!(PortfolioFile::from_json(json).is_err());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        let file = PortfolioFile::from_json(valid_json()).unwrap();
        file.save(&path).unwrap();
        assert_eq!(PortfolioFile::load(&path).unwrap(), file);
    }

    #[test]
    fn missing_file() {
        let result = PortfolioFile::load(Path::new("/nonexistent/portfolio.json"));
        assert!(matches!(result, Err(Error::PortfolioRead { .. })));
    }
}
