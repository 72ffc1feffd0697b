//! Group rebalance calculator.
//!
//! Compares each group's current value with its target share of the total
//! basis and turns the gap into sell and buy recommendations:
//!
//! - **Sells** come only from overweight groups. The overweight amount is
//!   allocated greedily across holdings, foreign-currency holdings first,
//!   each absorbing at most its own value.
//! - **Buys** come only from underweight groups. The whole underweight amount
//!   goes to the first holding after ordering domestic-first.
//!
//! Groups exactly at target produce nothing.

use std::cmp::Reverse;

use rust_decimal::Decimal;

use crate::side::Side;
use crate::snapshot::{GroupSnapshot, Holding, PortfolioSnapshot};

/// Gap between a group's current value and its target value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupDifference {
    pub group: String,
    pub current_value: Decimal,
    pub target_value: Decimal,
    /// `current_value - target_value`; positive means overweight.
    pub difference: Decimal,
}

impl GroupDifference {
    pub fn is_overweight(&self) -> bool {
        self.difference > Decimal::ZERO
    }

    pub fn is_underweight(&self) -> bool {
        self.difference < Decimal::ZERO
    }
}

/// A suggested trade before quantities are normalized into orders.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Recommendation {
    pub ticker: String,
    pub action: Side,
    /// Monetary amount in base currency.
    pub amount: Decimal,
    /// Dense rank starting at 1.
    pub priority: u32,
    pub currency: String,
    /// Estimated (possibly fractional) share count.
    pub quantity: Option<Decimal>,
    pub name: Option<String>,
    pub group: Option<String>,
}

impl Recommendation {
    fn for_holding(
        holding: &Holding,
        group: &str,
        action: Side,
        amount: Decimal,
        quantity: Option<Decimal>,
    ) -> Self {
        Self {
            ticker: holding.ticker.clone(),
            action,
            amount,
            priority: 0,
            currency: holding.currency.clone(),
            quantity,
            name: holding.name.clone(),
            group: Some(group.to_string()),
        }
    }
}

/// Differences for every group, in snapshot order.
pub fn group_differences(snapshot: &PortfolioSnapshot) -> Vec<GroupDifference> {
    let basis = snapshot.total_basis();
    snapshot
        .groups
        .iter()
        .map(|group| {
            let current_value = group.current_value();
            let target_value = basis * group.target_pct / Decimal::ONE_HUNDRED;
            GroupDifference {
                group: group.name.clone(),
                current_value,
                target_value,
                difference: current_value - target_value,
            }
        })
        .collect()
}

/// Sell recommendations for overweight groups.
///
/// Priority restarts at 1 in each group and follows the allocation order.
/// An unpriced holding still gets a row, for zero and with no quantity.
pub fn sell_recommendations(snapshot: &PortfolioSnapshot) -> Vec<Recommendation> {
    let mut out = Vec::new();

    for (group, diff) in snapshot.groups.iter().zip(group_differences(snapshot)) {
        if !diff.is_overweight() {
            continue;
        }

        let mut remaining = diff.difference;
        let mut priority = 1;
        for holding in ordered_holdings(group, true) {
            if remaining <= Decimal::ZERO {
                break;
            }
            let allocated = remaining.min(holding.value);
            // Multiply first so whole-share allocations stay exact.
            let quantity = if holding.value.is_zero() {
                None
            } else {
                Some(allocated * holding.quantity / holding.value)
            };

            let mut rec =
                Recommendation::for_holding(holding, &group.name, Side::Sell, allocated, quantity);
            rec.priority = priority;
            out.push(rec);

            priority += 1;
            remaining -= allocated;
        }
    }

    out
}

/// Buy recommendations for underweight groups, one per group.
///
/// Ranked by amount, largest shortfall first.
pub fn buy_recommendations(snapshot: &PortfolioSnapshot) -> Vec<Recommendation> {
    let mut out: Vec<Recommendation> = snapshot
        .groups
        .iter()
        .zip(group_differences(snapshot))
        .filter(|(_, diff)| diff.is_underweight())
        .filter_map(|(group, diff)| {
            let holding = ordered_holdings(group, false).into_iter().next()?;
            let amount = -diff.difference;
            let quantity = holding.shares_for(amount);
            Some(Recommendation::for_holding(
                holding,
                &group.name,
                Side::Buy,
                amount,
                quantity,
            ))
        })
        .collect();

    out.sort_by_key(|rec| Reverse(rec.amount));
    for (i, rec) in out.iter_mut().enumerate() {
        rec.priority = i as u32 + 1;
    }
    out
}

/// Holdings with one currency class first, original order kept within a class.
fn ordered_holdings(group: &GroupSnapshot, foreign_first: bool) -> Vec<&Holding> {
    let mut holdings: Vec<&Holding> = group.holdings.iter().collect();
    holdings.sort_by_key(|h| h.is_foreign_currency() != foreign_first);
    holdings
}

/// Differences and both recommendation lists computed from one snapshot.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RebalancePlan {
    pub differences: Vec<GroupDifference>,
    pub sells: Vec<Recommendation>,
    pub buys: Vec<Recommendation>,
}

impl RebalancePlan {
    pub fn compute(snapshot: &PortfolioSnapshot) -> Self {
        Self {
            differences: group_differences(snapshot),
            sells: sell_recommendations(snapshot),
            buys: buy_recommendations(snapshot),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sells.is_empty() && self.buys.is_empty()
    }

    /// Sells followed by buys.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.sells.iter().chain(self.buys.iter()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn group(name: &str, pct: Decimal, holdings: Vec<Holding>) -> GroupSnapshot {
        GroupSnapshot::new(name, pct, holdings)
    }

    #[test]
    fn overweight_foreign_holding_sells_half() {
        let snap = PortfolioSnapshot::new(vec![
            group("us", dec!(50), vec![Holding::new("SPY", dec!(40), dec!(2000000))]),
            group("cash-like", dec!(50), vec![]),
        ]);

        let diffs = group_differences(&snap);
        assert_eq!(diffs[0].target_value, dec!(1000000));
        assert_eq!(diffs[0].difference, dec!(1000000));

        let sells = sell_recommendations(&snap);
        assert_eq!(sells.len(), 1);
        assert_eq!(sells[0].ticker, "SPY");
        assert_eq!(sells[0].amount, dec!(1000000));
        assert_eq!(sells[0].quantity, Some(dec!(20)));
        assert_eq!(sells[0].priority, 1);
        assert_eq!(sells[0].currency, "USD");
        assert_eq!(sells[0].group.as_deref(), Some("us"));
    }

    #[test]
    fn cash_joins_the_basis() {
        let snap = PortfolioSnapshot::new(vec![group(
            "all",
            dec!(50),
            vec![Holding::new("005930", dec!(10), dec!(1000))],
        )])
        .with_cash(dec!(1000));

        let diffs = group_differences(&snap);
        assert_eq!(diffs[0].target_value, dec!(1000));
        assert_eq!(diffs[0].difference, Decimal::ZERO);
        assert!(sell_recommendations(&snap).is_empty());
        assert!(buy_recommendations(&snap).is_empty());
    }

    #[test]
    fn sells_foreign_first_then_domestic() {
        // basis 1000, target 20% → overweight 600 in "mixed"
        let snap = PortfolioSnapshot::new(vec![
            group(
                "mixed",
                dec!(20),
                vec![
                    Holding::new("005930", dec!(10), dec!(500)),
                    Holding::new("QQQ", dec!(3), dec!(300)),
                ],
            ),
            group("other", dec!(80), vec![Holding::new("148070", dec!(2), dec!(200))]),
        ]);

        let sells = sell_recommendations(&snap);
        assert_eq!(sells.len(), 2);
        assert_eq!(sells[0].ticker, "QQQ");
        assert_eq!(sells[0].amount, dec!(300));
        assert_eq!(sells[0].quantity, Some(dec!(3)));
        assert_eq!(sells[0].priority, 1);
        assert_eq!(sells[1].ticker, "005930");
        assert_eq!(sells[1].amount, dec!(300));
        assert_eq!(sells[1].quantity, Some(dec!(6)));
        assert_eq!(sells[1].priority, 2);
    }

    #[test]
    fn sell_allocation_stops_when_exhausted() {
        let snap = PortfolioSnapshot::new(vec![
            group(
                "us",
                dec!(80),
                vec![
                    Holding::new("SPY", dec!(10), dec!(500)),
                    Holding::new("QQQ", dec!(10), dec!(500)),
                ],
            ),
            group("kr", dec!(20), vec![]),
        ]);

        let sells = sell_recommendations(&snap);
        assert_eq!(sells.len(), 1);
        assert_eq!(sells[0].ticker, "SPY");
        assert_eq!(sells[0].amount, dec!(200));
    }

    #[test]
    fn one_share_overweight_is_exactly_one_share() {
        // basis 1000, target 20% → overweight 100, one SPY share is worth 100
        let snap = PortfolioSnapshot::new(vec![
            group("a", dec!(20), vec![Holding::new("SPY", dec!(3), dec!(300))]),
            group("b", dec!(80), vec![Holding::new("005930", dec!(7), dec!(700))]),
        ]);

        let sells = sell_recommendations(&snap);
        assert_eq!(sells.len(), 1);
        assert_eq!(sells[0].amount, dec!(100));
        assert_eq!(sells[0].quantity, Some(dec!(1)));
        assert_eq!(sells[0].quantity.map(|q| q.floor()), Some(dec!(1)));
    }

    #[test]
    fn one_third_buy_is_exact() {
        // basis 900, "a" target 50% → short 150, three shares at 50
        let snap = PortfolioSnapshot::new(vec![
            group("a", dec!(50), vec![Holding::new("069500", dec!(6), dec!(300))]),
            group("b", dec!(50), vec![Holding::new("SPY", dec!(6), dec!(600))]),
        ]);

        let buys = buy_recommendations(&snap);
        assert_eq!(buys[0].amount, dec!(150));
        assert_eq!(buys[0].quantity, Some(dec!(3)));
    }

    #[test]
    fn unpriced_holding_emits_row_without_quantity() {
        let snap = PortfolioSnapshot::new(vec![
            group(
                "us",
                dec!(50),
                vec![
                    Holding::new("ZZZZ", dec!(10), dec!(0)),
                    Holding::new("SPY", dec!(10), dec!(1000)),
                ],
            ),
            group("kr", dec!(50), vec![]),
        ]);

        // basis 1000, target 50% → overweight 500
        let sells = sell_recommendations(&snap);
        assert_eq!(sells.len(), 2);
        assert_eq!(sells[0].ticker, "ZZZZ");
        assert_eq!(sells[0].amount, Decimal::ZERO);
        assert_eq!(sells[0].quantity, None);
        assert_eq!(sells[0].priority, 1);
        assert_eq!(sells[1].ticker, "SPY");
        assert_eq!(sells[1].amount, dec!(500));
        assert_eq!(sells[1].quantity, Some(dec!(5)));
        assert_eq!(sells[1].priority, 2);
    }

    #[test]
    fn buy_goes_to_first_domestic_holding() {
        let snap = PortfolioSnapshot::new(vec![
            group(
                "growth",
                dec!(60),
                vec![
                    Holding::new("QQQ", dec!(1), dec!(100)),
                    Holding::new("091160", dec!(10), dec!(100)),
                    Holding::new("305720", dec!(10), dec!(100)),
                ],
            ),
            group("bonds", dec!(40), vec![Holding::new("148070", dec!(7), dec!(700))]),
        ]);

        // basis 1000: growth target 600, current 300 → short 300
        let buys = buy_recommendations(&snap);
        assert_eq!(buys.len(), 1);
        assert_eq!(buys[0].ticker, "091160");
        assert_eq!(buys[0].action, Side::Buy);
        assert_eq!(buys[0].amount, dec!(300));
        assert_eq!(buys[0].quantity, Some(dec!(30)));
        assert_eq!(buys[0].priority, 1);
    }

    #[test]
    fn buys_ranked_by_shortfall() {
        let snap = PortfolioSnapshot::new(vec![
            group("a", dec!(20), vec![Holding::new("069500", dec!(1), dec!(100))]),
            group("b", dec!(30), vec![Holding::new("102110", dec!(1), dec!(100))]),
            group("c", dec!(50), vec![Holding::new("SPY", dec!(8), dec!(800))]),
        ]);

        let buys = buy_recommendations(&snap);
        assert_eq!(buys.len(), 2);
        assert_eq!(buys[0].ticker, "102110");
        assert_eq!(buys[0].amount, dec!(200));
        assert_eq!(buys[0].priority, 1);
        assert_eq!(buys[1].ticker, "069500");
        assert_eq!(buys[1].amount, dec!(100));
        assert_eq!(buys[1].priority, 2);
    }

    #[test]
    fn underweight_group_without_holdings_yields_nothing() {
        let snap = PortfolioSnapshot::new(vec![
            group("empty", dec!(50), vec![]),
            group("full", dec!(50), vec![Holding::new("SPY", dec!(1), dec!(100))]),
        ]);
        assert!(buy_recommendations(&snap).is_empty());
    }

    #[test]
    fn unpriced_buy_target_has_no_quantity() {
        let snap = PortfolioSnapshot::new(vec![
            group("new", dec!(50), vec![Holding::new("069500", dec!(0), dec!(0))]),
            group("old", dec!(50), vec![Holding::new("SPY", dec!(1), dec!(100))]),
        ]);
        let buys = buy_recommendations(&snap);
        assert_eq!(buys.len(), 1);
        assert_eq!(buys[0].amount, dec!(50));
        assert_eq!(buys[0].quantity, None);
    }

    #[test]
    fn plan_lists_sells_before_buys() {
        let snap = PortfolioSnapshot::new(vec![
            group("kr", dec!(50), vec![Holding::new("069500", dec!(1), dec!(100))]),
            group("us", dec!(50), vec![Holding::new("SPY", dec!(9), dec!(900))]),
        ]);
        let plan = RebalancePlan::compute(&snap);
        let recs = plan.recommendations();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].action, Side::Sell);
        assert_eq!(recs[1].action, Side::Buy);
        assert!(!plan.is_empty());
    }
}
