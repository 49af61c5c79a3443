//! Rebalance history: one row per line per loop iteration.
//!
//! The history drives stagnation detection and the deviation trend report,
//! and is mirrored to an append-only JSONL file.

use std::collections::BTreeMap;
use std::path::Path;

use balancer::SolvedPortfolio;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::jsonl::JsonlWriter;
use crate::snapshot::Directory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Position,
    Cash,
}

/// One line of one iteration.
///
/// Non-finite values are written to JSON as `null` and read back as NaN:
/// an unpriced line has NaN held and deviation, a holding against a zero
/// target has an infinite deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub identifier: String,
    #[serde(rename = "type")]
    pub kind: LineKind,
    #[serde(deserialize_with = "nan_if_null")]
    pub percent_held: f64,
    pub percent_target: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub percent_deviation: f64,
    pub run: usize,
    pub timestamp: DateTime<Utc>,
}

fn nan_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Append-only in-memory history for one rebalance run.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
    runs: usize,
}

/// Deviation as displayed: NaN shows as 0, infinity as 100.
pub fn display_deviation(deviation: f64) -> f64 {
    if deviation.is_nan() {
        0.0
    } else if deviation.is_infinite() {
        100.0
    } else {
        deviation
    }
}

impl History {
    /// Number of iterations recorded so far.
    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Append one iteration, one row per line plus the cash row.
    /// Unpriced lines are kept with NaN held and deviation.
    ///
    /// Returns the rows just added.
    pub fn record(
        &mut self,
        solved: &SolvedPortfolio,
        directory: &Directory,
        at: DateTime<Utc>,
    ) -> &[HistoryEntry] {
        self.runs += 1;
        let start = self.entries.len();

        for line in &solved.positions {
            self.entries.push(HistoryEntry {
                identifier: directory.label(line.instrument),
                kind: LineKind::Position,
                percent_held: line.percent_held.unwrap_or(f64::NAN),
                percent_target: line.percent_target,
                percent_deviation: line.percent_deviation.unwrap_or(f64::NAN),
                run: self.runs,
                timestamp: at,
            });
        }
        self.entries.push(HistoryEntry {
            identifier: solved.cash.currency.clone(),
            kind: LineKind::Cash,
            percent_held: solved.cash.percent_held,
            percent_target: solved.cash.percent_target,
            percent_deviation: solved.cash.percent_deviation,
            run: self.runs,
            timestamp: at,
        });

        &self.entries[start..]
    }

    /// Mean displayed deviation of each recorded iteration, oldest first.
    ///
    /// Deviations are clamped with [`display_deviation`], so a line held
    /// against a zero target weighs 100 and the mean stays finite.
    pub fn mean_deviations(&self) -> Vec<f64> {
        let mut sums = vec![(0.0f64, 0usize); self.runs];
        for entry in &self.entries {
            let slot = &mut sums[entry.run - 1];
            slot.0 += display_deviation(entry.percent_deviation);
            slot.1 += 1;
        }
        sums.into_iter()
            .map(|(sum, n)| if n == 0 { 0.0 } else { sum / n as f64 })
            .collect()
    }

    /// True once `window` iterations exist and the trailing `window` means are
    /// all exactly equal.
    pub fn is_stagnant(&self, window: usize) -> bool {
        if window == 0 || self.runs < window {
            return false;
        }
        let means = self.mean_deviations();
        let tail = &means[means.len() - window..];
        tail.iter().all(|m| *m == tail[0])
    }

    /// Per-identifier deviation over runs, clamped for display.
    pub fn trend(&self) -> BTreeMap<&str, Vec<f64>> {
        let mut trend: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for entry in &self.entries {
            trend
                .entry(entry.identifier.as_str())
                .or_default()
                .push(display_deviation(entry.percent_deviation));
        }
        trend
    }
}

/// Append-only JSONL mirror of the history.
pub struct HistoryLog {
    writer: JsonlWriter,
}

impl HistoryLog {
    /// Open (or create) the history file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: JsonlWriter::open(path)?,
        })
    }

    pub fn append(&mut self, rows: &[HistoryEntry]) -> Result<()> {
        self.writer.append(rows)
    }
}
