//! Priced portfolio snapshot: groups of holdings with target weights.
//!
//! All monetary values are in the domestic (base) currency; foreign holdings
//! are converted before they reach the snapshot.

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::types::{DOMESTIC_CURRENCY, Market};

/// One priced position inside a group.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Holding {
    pub ticker: String,
    pub name: Option<String>,
    /// Share count. May be fractional for some brokers.
    pub quantity: Decimal,
    /// Market value in base currency.
    pub value: Decimal,
    /// Listing currency (not the currency of `value`).
    pub currency: String,
}

impl Holding {
    pub fn new(ticker: &str, quantity: Decimal, value: Decimal) -> Self {
        Self {
            ticker: ticker.to_string(),
            name: None,
            quantity,
            value,
            currency: Market::classify(ticker).currency().to_string(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }

    /// Listed in a currency other than the base currency.
    pub fn is_foreign_currency(&self) -> bool {
        self.currency != DOMESTIC_CURRENCY
    }

    /// Shares worth `amount` at this holding's unit value, if it is priced.
    ///
    /// Multiplies before dividing so whole-share amounts stay exact.
    pub fn shares_for(&self, amount: Decimal) -> Option<Decimal> {
        if self.quantity.is_zero() || self.value.is_zero() {
            None
        } else {
            Some(amount * self.quantity / self.value)
        }
    }
}

/// A named allocation bucket with a target percentage of the portfolio.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupSnapshot {
    pub name: String,
    /// Target share of the total basis, in percent (0–100).
    pub target_pct: Decimal,
    pub holdings: Vec<Holding>,
}

impl GroupSnapshot {
    pub fn new(name: &str, target_pct: Decimal, holdings: Vec<Holding>) -> Self {
        Self {
            name: name.to_string(),
            target_pct,
            holdings,
        }
    }

    pub fn current_value(&self) -> Decimal {
        self.holdings.iter().map(|h| h.value).sum()
    }
}

/// Whole-portfolio view handed to the rebalance calculator.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortfolioSnapshot {
    pub groups: Vec<GroupSnapshot>,
    /// Uninvested cash in base currency, when known.
    pub cash: Option<Decimal>,
}

impl PortfolioSnapshot {
    pub fn new(groups: Vec<GroupSnapshot>) -> Self {
        Self { groups, cash: None }
    }

    pub fn with_cash(mut self, cash: Decimal) -> Self {
        self.cash = Some(cash);
        self
    }

    /// Sum of every holding's value.
    pub fn stock_value(&self) -> Decimal {
        self.groups.iter().map(GroupSnapshot::current_value).sum()
    }

    /// Stock value plus cash, if cash is known.
    pub fn total_assets(&self) -> Option<Decimal> {
        self.cash.map(|cash| self.stock_value() + cash)
    }

    /// Basis for target values: total assets when available, else stock value.
    pub fn total_basis(&self) -> Decimal {
        self.total_assets().unwrap_or_else(|| self.stock_value())
    }

    /// Check target percentages and group names.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut sum = Decimal::ZERO;
        for (i, group) in self.groups.iter().enumerate() {
            if group.name.trim().is_empty() {
                return Err(ValidationError::EmptyGroupName);
            }
            if self.groups[..i].iter().any(|g| g.name == group.name) {
                return Err(ValidationError::DuplicateGroup(group.name.clone()));
            }
            if group.target_pct < Decimal::ZERO || group.target_pct > Decimal::ONE_HUNDRED {
                return Err(ValidationError::TargetOutOfRange {
                    group: group.name.clone(),
                    target_pct: group.target_pct,
                });
            }
            sum += group.target_pct;
        }
        if sum > Decimal::ONE_HUNDRED {
            return Err(ValidationError::TargetSumExceeded(sum));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot() -> PortfolioSnapshot {
        PortfolioSnapshot::new(vec![
            GroupSnapshot::new(
                "equity",
                dec!(60),
                vec![
                    Holding::new("005930", dec!(10), dec!(700000)),
                    Holding::new("SPY", dec!(2), dec!(1300000)),
                ],
            ),
            GroupSnapshot::new(
                "bonds",
                dec!(40),
                vec![Holding::new("148070", dec!(5), dec!(500000))],
            ),
        ])
    }

    #[test]
    fn basis_without_cash_is_stock_value() {
        let snap = snapshot();
        assert_eq!(snap.stock_value(), dec!(2500000));
        assert_eq!(snap.total_assets(), None);
        assert_eq!(snap.total_basis(), dec!(2500000));
    }

    #[test]
    fn basis_with_cash_is_total_assets() {
        let snap = snapshot().with_cash(dec!(500000));
        assert_eq!(snap.total_assets(), Some(dec!(3000000)));
        assert_eq!(snap.total_basis(), dec!(3000000));
    }

    #[test]
    fn holding_currency_follows_ticker() {
        assert!(Holding::new("SPY", dec!(1), dec!(1)).is_foreign_currency());
        assert!(!Holding::new("005930", dec!(1), dec!(1)).is_foreign_currency());
        assert!(!Holding::new("SPY", dec!(1), dec!(1)).with_currency("KRW").is_foreign_currency());
    }

    #[test]
    fn shares_for_requires_price_and_quantity() {
        let spy = Holding::new("SPY", dec!(4), dec!(100));
        assert_eq!(spy.shares_for(dec!(50)), Some(dec!(2)));
        assert_eq!(Holding::new("SPY", dec!(0), dec!(100)).shares_for(dec!(50)), None);
        assert_eq!(Holding::new("SPY", dec!(4), dec!(0)).shares_for(dec!(50)), None);
    }

    #[test]
    fn shares_for_thirds_is_exact() {
        let h = Holding::new("QQQ", dec!(3), dec!(300));
        assert_eq!(h.shares_for(dec!(100)), Some(dec!(1)));
    }

    #[test]
    fn validate_accepts_partial_targets() {
        let mut snap = snapshot();
        snap.groups[1].target_pct = dec!(30);
        assert!(snap.validate().is_ok());
    }

    #[test]
    fn validate_rejects_overallocation() {
        let mut snap = snapshot();
        snap.groups[1].target_pct = dec!(41);
        assert_eq!(snap.validate(), Err(ValidationError::TargetSumExceeded(dec!(101))));
    }

    #[test]
    fn validate_rejects_duplicate_group() {
        let mut snap = snapshot();
        snap.groups[1].name = "equity".into();
        assert!(matches!(snap.validate(), Err(ValidationError::DuplicateGroup(_))));
    }

    #[test]
    fn validate_rejects_negative_target() {
        let mut snap = snapshot();
        snap.groups[0].target_pct = dec!(-1);
        assert!(matches!(snap.validate(), Err(ValidationError::TargetOutOfRange { .. })));
    }
}
