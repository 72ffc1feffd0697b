//! JSONL execution audit trail.
//!
//! Each live run appends events to the audit file, one JSON object per
//! line, flushed as written.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::execution::{ExecutionLog, ExecutionResult, ExecutionSummary, IntentPlan};

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

impl ExecutionLog for AuditLog {
    fn run_started(&mut self, plan: &IntentPlan) -> Result<()> {
        self.log(
            "run_started",
            serde_json::json!({
                "intents": plan.intents.len(),
                "skipped": plan.skipped.len(),
            }),
        )
    }

    fn record(&mut self, result: &ExecutionResult) -> Result<()> {
        let intent = &result.intent;
        self.log(
            "execution",
            serde_json::json!({
                "ticker": intent.ticker,
                "side": intent.side.as_str(),
                "quantity": intent.quantity,
                "currency": intent.currency,
                "exchange": intent.exchange.map(|e| e.order_code()),
                "status": result.status,
                "message": result.message,
                "raw": result.raw,
            }),
        )
    }

    fn run_completed(&mut self, summary: &ExecutionSummary) -> Result<()> {
        self.log(
            "run_completed",
            serde_json::json!({
                "submitted": summary.results.len(),
                "succeeded": summary.succeeded(),
                "failed": summary.failed(),
                "skipped": summary.skipped.len(),
                "sync_warning": summary.sync_warning,
            }),
        )
    }
}
