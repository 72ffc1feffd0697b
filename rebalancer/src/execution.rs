//! Execution orchestrator: recommendations → intents → orders → sync.
//!
//! A run moves through `Planned → (DryRun | Submitting → Submitted) →
//! Reconciling → Done`. Orders are attempted at most once each (plus the
//! gateway's single expired-credential retry) and one failure never stops
//! the rest.

use std::fmt;

use folio::{Exchange, Market, Recommendation, Side};
use folio_broker::{AccountSync, BrokerError, OrderRequest};
use log::{error, info, warn};
use rust_decimal::prelude::ToPrimitive;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::broker::OrderGateway;
use crate::error::{Error, Result};

/// A normalized, integer-quantity order ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderIntent {
    pub ticker: String,
    pub side: Side,
    pub quantity: u64,
    pub currency: String,
    /// Routing exchange; set for foreign tickers only.
    pub exchange: Option<Exchange>,
}

impl OrderIntent {
    pub fn to_request(&self) -> OrderRequest {
        OrderRequest {
            ticker: self.ticker.clone(),
            side: self.side,
            quantity: self.quantity,
            currency: self.currency.clone(),
            exchange: self.exchange,
        }
    }
}

impl fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.side, self.quantity, self.ticker)?;
        if let Some(ex) = self.exchange {
            write!(f, " @{}", ex.order_code())?;
        }
        Ok(())
    }
}

/// Executable intents (sells first) plus the ones floored to zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntentPlan {
    pub intents: Vec<OrderIntent>,
    pub skipped: Vec<OrderIntent>,
}

/// Decimal places kept before a quantity is floored to whole shares.
const QUANTITY_DP: u32 = 8;

/// Floor each recommendation's share quantity and split executable from
/// skipped intents.
///
/// Foreign intents route to `exchanges[ticker]` when present, else to
/// `default_route`. The result is stably sorted so every sell precedes
/// every buy.
pub fn build_intents(
    recommendations: &[Recommendation],
    exchanges: &FxHashMap<String, Exchange>,
    default_route: Exchange,
) -> IntentPlan {
    let mut plan = IntentPlan::default();

    for rec in recommendations {
        let market = Market::classify(&rec.ticker);
        // Round away division residue (0.999...) before flooring.
        let quantity = rec
            .quantity
            .and_then(|q| q.round_dp(QUANTITY_DP).floor().to_u64())
            .unwrap_or(0);
        let currency = if rec.currency.is_empty() {
            market.currency().to_string()
        } else {
            rec.currency.clone()
        };
        let exchange = market.is_foreign().then(|| {
            exchanges
                .get(&rec.ticker)
                .copied()
                .unwrap_or(default_route)
        });

        let intent = OrderIntent {
            ticker: rec.ticker.clone(),
            side: rec.action,
            quantity,
            currency,
            exchange,
        };
        if quantity == 0 {
            plan.skipped.push(intent);
        } else {
            plan.intents.push(intent);
        }
    }

    plan.intents.sort_by_key(|i| i.side.execution_rank());
    plan
}

/// Outcome of one intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
        })
    }
}

/// Append-only record of what was attempted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub intent: OrderIntent,
    pub status: ExecutionStatus,
    pub message: String,
    /// Upstream payload, when the brokerage answered.
    pub raw: Option<serde_json::Value>,
}

impl ExecutionResult {
    pub fn skipped(intent: OrderIntent) -> Self {
        Self {
            intent,
            status: ExecutionStatus::Skipped,
            message: String::new(),
            raw: None,
        }
    }
}

/// Per-run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Planned,
    DryRun,
    Submitting,
    Submitted,
    Reconciling,
    Done,
}

impl RunState {
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Planned, DryRun)
                | (Planned, Submitting)
                | (Submitting, Submitted)
                | (DryRun, Reconciling)
                | (Submitted, Reconciling)
                | (Reconciling, Done)
        )
    }
}

/// What a run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub state: RunState,
    pub dry_run: bool,
    pub intents: Vec<OrderIntent>,
    pub skipped: Vec<OrderIntent>,
    /// One per submitted intent, in submission order.
    pub results: Vec<ExecutionResult>,
    /// Set when the post-execution account sync failed.
    pub sync_warning: Option<String>,
}

impl ExecutionSummary {
    pub fn succeeded(&self) -> usize {
        self.count(ExecutionStatus::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(ExecutionStatus::Failed)
    }

    fn count(&self, status: ExecutionStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// Durable sink for execution records. Write failures abort the run.
pub trait ExecutionLog {
    fn run_started(&mut self, plan: &IntentPlan) -> Result<()>;
    fn record(&mut self, result: &ExecutionResult) -> Result<()>;
    fn run_completed(&mut self, summary: &ExecutionSummary) -> Result<()>;
}

/// In-memory log; keeps every record and the final summary.
#[derive(Debug, Default)]
pub struct MemoryLog {
    pub started: usize,
    pub records: Vec<ExecutionResult>,
    pub completed: Option<ExecutionSummary>,
}

impl MemoryLog {
    pub fn is_empty(&self) -> bool {
        self.started == 0 && self.records.is_empty() && self.completed.is_none()
    }
}

impl ExecutionLog for MemoryLog {
    fn run_started(&mut self, _plan: &IntentPlan) -> Result<()> {
        self.started += 1;
        Ok(())
    }

    fn record(&mut self, result: &ExecutionResult) -> Result<()> {
        self.records.push(result.clone());
        Ok(())
    }

    fn run_completed(&mut self, summary: &ExecutionSummary) -> Result<()> {
        self.completed = Some(summary.clone());
        Ok(())
    }
}

/// Drives one rebalance run through the gateway, account sync, and log.
pub struct Executor<G, S, L> {
    gateway: G,
    sync: S,
    log: L,
    default_route: Exchange,
    state: RunState,
}

impl<G: OrderGateway, S: AccountSync, L: ExecutionLog> Executor<G, S, L> {
    pub fn new(gateway: G, sync: S, log: L) -> Self {
        Self {
            gateway,
            sync,
            log,
            default_route: Exchange::DEFAULT_ROUTE,
            state: RunState::Planned,
        }
    }

    /// Routing exchange for foreign tickers missing from the exchange map.
    pub fn with_default_route(mut self, exchange: Exchange) -> Self {
        self.default_route = exchange;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn into_log(self) -> L {
        self.log
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid transition {:?} -> {next:?}",
            self.state
        );
        info!("Run state: {:?} -> {next:?}", self.state);
        self.state = next;
    }

    /// Build intents and, unless `dry_run`, submit them in order.
    ///
    /// A dry run touches neither the gateway, the sync, nor the log.
    /// Authentication failures and log write failures abort the run;
    /// every other per-order failure is recorded and processing continues.
    pub fn execute(
        &mut self,
        recommendations: &[Recommendation],
        dry_run: bool,
        exchanges: &FxHashMap<String, Exchange>,
    ) -> Result<ExecutionSummary> {
        self.state = RunState::Planned;
        let plan = build_intents(recommendations, exchanges, self.default_route);
        info!(
            "Planned {} intents ({} skipped)",
            plan.intents.len(),
            plan.skipped.len()
        );

        if dry_run {
            self.advance(RunState::DryRun);
            self.advance(RunState::Reconciling);
            self.advance(RunState::Done);
            return Ok(ExecutionSummary {
                state: self.state,
                dry_run: true,
                intents: plan.intents,
                skipped: plan.skipped,
                results: Vec::new(),
                sync_warning: None,
            });
        }

        self.advance(RunState::Submitting);
        self.log.run_started(&plan)?;
        for intent in &plan.skipped {
            self.log.record(&ExecutionResult::skipped(intent.clone()))?;
        }

        let mut results = Vec::with_capacity(plan.intents.len());
        for intent in &plan.intents {
            let result = self.submit(intent)?;
            self.log.record(&result)?;
            results.push(result);
        }
        self.advance(RunState::Submitted);

        self.advance(RunState::Reconciling);
        let sync_warning = match self.sync.sync_account() {
            Ok(()) => None,
            Err(e) => {
                warn!("Account sync failed after execution: {e}");
                Some(e.to_string())
            }
        };
        self.advance(RunState::Done);

        let summary = ExecutionSummary {
            state: self.state,
            dry_run: false,
            intents: plan.intents,
            skipped: plan.skipped,
            results,
            sync_warning,
        };
        self.log.run_completed(&summary)?;
        info!(
            "Run complete: {} succeeded, {} failed, {} skipped",
            summary.succeeded(),
            summary.failed(),
            summary.skipped.len()
        );
        Ok(summary)
    }

    fn submit(&self, intent: &OrderIntent) -> Result<ExecutionResult> {
        match self.gateway.submit(&intent.to_request()) {
            Ok(ack) if ack.is_success() => {
                info!("{intent}: accepted ({})", ack.order_no.as_deref().unwrap_or("-"));
                Ok(ExecutionResult {
                    intent: intent.clone(),
                    status: ExecutionStatus::Success,
                    message: ack.message,
                    raw: Some(ack.raw),
                })
            }
            Ok(ack) => {
                warn!("{intent}: rejected {} {}", ack.message_code, ack.message);
                Ok(ExecutionResult {
                    intent: intent.clone(),
                    status: ExecutionStatus::Failed,
                    message: format!("{} {}", ack.message_code, ack.message)
                        .trim()
                        .to_string(),
                    raw: Some(ack.raw),
                })
            }
            Err(e @ BrokerError::Auth(_)) => {
                error!("{intent}: authentication failed, aborting run: {e}");
                Err(Error::Broker(e))
            }
            Err(e) => {
                error!("{intent}: {e}");
                Ok(ExecutionResult {
                    intent: intent.clone(),
                    status: ExecutionStatus::Failed,
                    message: e.to_string(),
                    raw: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn rec(ticker: &str, action: Side, quantity: Option<Decimal>) -> Recommendation {
        Recommendation {
            ticker: ticker.into(),
            action,
            amount: dec!(100000),
            priority: 1,
            currency: String::new(),
            quantity,
            name: None,
            group: None,
        }
    }

    #[test]
    fn floors_and_skips_zero() {
        let recs = vec![
            rec("005930", Side::Buy, Some(dec!(2.9))),
            rec("SPY", Side::Sell, Some(dec!(0.7))),
            rec("QQQ", Side::Buy, None),
        ];
        let plan = build_intents(&recs, &FxHashMap::default(), Exchange::Nasdaq);
        assert_eq!(plan.intents.len(), 1);
        assert_eq!(plan.intents[0].quantity, 2);
        assert_eq!(plan.skipped.len(), 2);
        assert!(plan.skipped.iter().all(|i| i.quantity == 0));
    }

    #[test]
    fn division_residue_is_not_a_lost_share() {
        let recs = vec![
            rec("SPY", Side::Sell, Some(dec!(0.9999999999999999999999999999))),
            rec("005930", Side::Buy, Some(dec!(2.9999999999999999999999999999))),
        ];
        let plan = build_intents(&recs, &FxHashMap::default(), Exchange::Nasdaq);
        let qty: Vec<_> = plan.intents.iter().map(|i| i.quantity).collect();
        assert_eq!(qty, vec![1, 3]);
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn one_share_sell_from_calculator_is_submitted() {
        use folio::{GroupSnapshot, Holding, PortfolioSnapshot, RebalancePlan};

        // basis 1000, "a" target 20% → overweight 100 = one SPY share
        let snap = PortfolioSnapshot::new(vec![
            GroupSnapshot::new("a", dec!(20), vec![Holding::new("SPY", dec!(3), dec!(300))]),
            GroupSnapshot::new("b", dec!(80), vec![Holding::new("005930", dec!(7), dec!(700))]),
        ]);
        let recs = RebalancePlan::compute(&snap).recommendations();
        let plan = build_intents(&recs, &FxHashMap::default(), Exchange::Nasdaq);

        assert_eq!(plan.intents[0].ticker, "SPY");
        assert_eq!(plan.intents[0].side, Side::Sell);
        assert_eq!(plan.intents[0].quantity, 1);
        assert!(plan.skipped.iter().all(|i| i.ticker != "SPY"));
    }

    #[test]
    fn unpriced_sell_row_is_skipped() {
        use folio::{GroupSnapshot, Holding, PortfolioSnapshot, RebalancePlan};

        let snap = PortfolioSnapshot::new(vec![
            GroupSnapshot::new(
                "us",
                dec!(50),
                vec![
                    Holding::new("ZZZZ", dec!(10), Decimal::ZERO),
                    Holding::new("SPY", dec!(10), dec!(1000)),
                ],
            ),
            GroupSnapshot::new("kr", dec!(50), vec![]),
        ]);
        let recs = RebalancePlan::compute(&snap).recommendations();
        let plan = build_intents(&recs, &FxHashMap::default(), Exchange::Nasdaq);

        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].ticker, "ZZZZ");
        assert_eq!(plan.intents.len(), 1);
        assert_eq!(plan.intents[0].quantity, 5);
    }

    #[test]
    fn sells_precede_buys_stably() {
        let recs = vec![
            rec("005930", Side::Buy, Some(dec!(1))),
            rec("SPY", Side::Sell, Some(dec!(1))),
            rec("000660", Side::Buy, Some(dec!(1))),
            rec("QQQ", Side::Sell, Some(dec!(1))),
        ];
        let plan = build_intents(&recs, &FxHashMap::default(), Exchange::Nasdaq);
        let order: Vec<_> = plan.intents.iter().map(|i| i.ticker.as_str()).collect();
        assert_eq!(order, vec!["SPY", "QQQ", "005930", "000660"]);
    }

    #[test]
    fn currency_and_routing_defaults() {
        let mut exchanges = FxHashMap::default();
        exchanges.insert("SPY".to_string(), Exchange::Nyse);
        let recs = vec![
            rec("SPY", Side::Sell, Some(dec!(1))),
            rec("QQQ", Side::Sell, Some(dec!(1))),
            rec("005930", Side::Buy, Some(dec!(1))),
        ];
        let plan = build_intents(&recs, &exchanges, Exchange::Amex);
        assert_eq!(plan.intents[0].exchange, Some(Exchange::Nyse));
        assert_eq!(plan.intents[1].exchange, Some(Exchange::Amex));
        assert_eq!(plan.intents[1].currency, "USD");
        assert_eq!(plan.intents[2].exchange, None);
        assert_eq!(plan.intents[2].currency, "KRW");
    }

    #[test]
    fn explicit_currency_kept() {
        let mut r = rec("SPY", Side::Sell, Some(dec!(1)));
        r.currency = "KRW".into();
        let plan = build_intents(&[r], &FxHashMap::default(), Exchange::Nasdaq);
        assert_eq!(plan.intents[0].currency, "KRW");
    }

    #[test]
    fn state_transitions() {
        use RunState::*;
        assert!(Planned.can_advance_to(DryRun));
        assert!(Planned.can_advance_to(Submitting));
        assert!(Submitted.can_advance_to(Reconciling));
        assert!(!Planned.can_advance_to(Done));
        assert!(!DryRun.can_advance_to(Submitting));
        assert!(!Done.can_advance_to(Planned));
    }

    #[test]
    fn intent_display() {
        let intent = OrderIntent {
            ticker: "SPY".into(),
            side: Side::Sell,
            quantity: 3,
            currency: "USD".into(),
            exchange: Some(Exchange::Nyse),
        };
        assert_eq!(intent.to_string(), "SELL 3 SPY @NYSE");
    }
}
