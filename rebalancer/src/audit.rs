//! JSONL audit trail logging.
//!
//! Each rebalancer run appends events to an audit.jsonl file,
//! one JSON object per line. The trail is also read back to enforce the
//! model's trading cooldown.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use balancer::{PricedOrder, SolvedPortfolio};
use balancer_broker::{Fill, OrderId};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::jsonl::JsonlWriter;
use crate::rebalance::Outcome;
use crate::snapshot::Directory;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// The fields read back from a trail line.
#[derive(Debug, Deserialize)]
struct AuditRecord {
    event: String,
    ts: DateTime<Utc>,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: JsonlWriter,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: JsonlWriter::open(path)?,
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        self.writer.append([&entry])
    }
}

/// Timestamp of the most recent `event` in the trail at `path`.
///
/// A missing file means no history. Lines that do not parse are skipped.
pub fn last_event_time(path: &Path, event: &str) -> Result<Option<DateTime<Utc>>> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut last = None;
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditRecord>(&line) {
            Ok(record) if record.event == event => {
                last = last.max(Some(record.ts));
            }
            Ok(_) => {}
            Err(e) => warn!("{}:{}: unreadable audit line: {e}", path.display(), n + 1),
        }
    }
    Ok(last)
}

/// Convenience: log a run start event.
pub fn log_run_started(
    audit: &mut AuditLog,
    mode: &str,
    model_file: &str,
    account: &str,
) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "mode": mode,
            "model_file": model_file,
            "account": account,
        }),
    )
}

/// Convenience: log one solved iteration.
pub fn log_iteration_solved(
    audit: &mut AuditLog,
    run: usize,
    solved: &SolvedPortfolio,
    directory: &Directory,
) -> Result<()> {
    let lines: Vec<_> = solved
        .positions
        .iter()
        .map(|l| {
            serde_json::json!({
                "instrument": directory.label(l.instrument),
                "qty": l.quantity,
                "price": l.price.map(|p| p.as_dollars()),
                "percent_held": l.percent_held,
                "percent_target": l.percent_target,
                "percent_deviation": l.percent_deviation,
                "out_of_band": l.out_of_band,
                "optimal_order": l.optimal_order,
            })
        })
        .collect();

    audit.log(
        "iteration_solved",
        serde_json::json!({
            "run": run,
            "total_value": solved.total_value as f64 / 100.0,
            "cash": solved.cash.value_held as f64 / 100.0,
            "out_of_band": solved.is_out_of_band(),
            "lines": lines,
        }),
    )
}

/// Convenience: log an order batch accepted by the broker.
pub fn log_orders_submitted(
    audit: &mut AuditLog,
    run: usize,
    orders: &[PricedOrder],
    ids: &[OrderId],
    directory: &Directory,
) -> Result<()> {
    let order_data: Vec<_> = orders
        .iter()
        .zip(ids)
        .map(|(o, id)| {
            serde_json::json!({
                "order_id": id.0,
                "instrument": directory.label(o.instrument),
                "side": o.side().to_string(),
                "shares": o.shares(),
                "limit": o.limit.as_dollars(),
            })
        })
        .collect();

    audit.log(
        "orders_submitted",
        serde_json::json!({ "run": run, "orders": order_data }),
    )
}

/// Convenience: log the fills collected after settlement.
pub fn log_fills_collected(audit: &mut AuditLog, run: usize, fills: &[Fill]) -> Result<()> {
    audit.log(
        "fills_collected",
        serde_json::json!({ "run": run, "fills": fills }),
    )
}

/// Convenience: log run completion.
pub fn log_run_finished(audit: &mut AuditLog, outcome: &Outcome) -> Result<()> {
    audit.log(
        "run_finished",
        serde_json::json!({
            "outcome": outcome.name(),
            "detail": outcome.to_string(),
        }),
    )
}
