//! Post-execution reconciliation: compare actual group weights vs target.

use folio::PortfolioSnapshot;
use rust_decimal::{Decimal, MathematicalOps};
use serde::Serialize;

/// Reconciliation report comparing actual vs target weights.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub entries: Vec<ReconcileEntry>,
    /// Root-mean-square of the per-group differences, in percentage points.
    pub tracking_error_pct: Decimal,
}

/// One group's reconciliation entry.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileEntry {
    pub group: String,
    pub target_pct: Decimal,
    pub actual_pct: Decimal,
    pub diff_pct: Decimal,
    pub value: Decimal,
}

/// Compare each group's share of the total basis against its target.
pub fn reconcile(snapshot: &PortfolioSnapshot) -> ReconcileReport {
    let basis = snapshot.total_basis();
    let mut entries = Vec::with_capacity(snapshot.groups.len());
    let mut sum_sq = Decimal::ZERO;

    for group in &snapshot.groups {
        let value = group.current_value();
        let actual_pct = if basis.is_zero() {
            Decimal::ZERO
        } else {
            value / basis * Decimal::ONE_HUNDRED
        };
        let diff_pct = actual_pct - group.target_pct;
        sum_sq += diff_pct * diff_pct;

        entries.push(ReconcileEntry {
            group: group.name.clone(),
            target_pct: group.target_pct,
            actual_pct: actual_pct.round_dp(2),
            diff_pct: diff_pct.round_dp(2),
            value,
        });
    }

    let n = Decimal::from(entries.len().max(1));
    let tracking_error_pct = (sum_sq / n).sqrt().unwrap_or_default().round_dp(3);

    ReconcileReport {
        entries,
        tracking_error_pct,
    }
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "RECONCILIATION:")?;
        writeln!(
            f,
            "  {:16} {:>10} {:>10} {:>10} {:>16}",
            "Group", "Target%", "Actual%", "Diff%", "Value"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "  {:16} {:>9.2}% {:>9.2}% {:>+9.2}% {:>16.0}",
                e.group, e.target_pct, e.actual_pct, e.diff_pct, e.value,
            )?;
        }
        writeln!(f, "\n  Tracking error: {:.3}%", self.tracking_error_pct)?;
        Ok(())
    }
}
