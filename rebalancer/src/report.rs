//! Human-readable progress reports.
//!
//! The loop talks to a [`Reporter`]; the CLI uses [`TerminalReporter`],
//! tests can plug in their own sink.

use std::fmt::Write as _;
use std::io::{self, Write};

use balancer::{Price, PricedOrder, SolvedPortfolio};
use balancer_broker::Fill;
use log::warn;

use crate::history::{History, display_deviation};
use crate::rebalance::Outcome;
use crate::snapshot::Directory;

/// Sink for per-iteration progress.
pub trait Reporter {
    /// Positions table and cash line for one solved iteration.
    fn iteration(&mut self, run: usize, solved: &SolvedPortfolio, directory: &Directory);

    /// Orders about to be submitted (or withheld, on a dry run).
    fn orders(&mut self, orders: &[PricedOrder], directory: &Directory);

    /// Fills collected after settlement.
    fn fills(&mut self, fills: &[Fill], directory: &Directory);

    /// Deviation trend per identifier across all iterations so far.
    fn trend(&mut self, history: &History);

    fn finished(&mut self, outcome: &Outcome);
}

/// Plain-text tables written to a terminal (or any writer).
pub struct TerminalReporter<W: Write> {
    out: W,
}

impl TerminalReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> TerminalReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|()| self.out.flush()) {
            warn!("Report output failed: {e}");
        }
    }
}

fn dollars(cents: i64) -> String {
    Price(cents).to_string()
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "-".into(), |v| format!("{v:.2}"))
}

fn band(out: bool) -> &'static str {
    if out { "OUT" } else { "ok" }
}

impl<W: Write> Reporter for TerminalReporter<W> {
    fn iteration(&mut self, run: usize, solved: &SolvedPortfolio, directory: &Directory) {
        let mut s = String::new();
        let _ = writeln!(
            s,
            "\nRUN {run}: total {}, tolerance {:.2}%",
            dollars(solved.total_value),
            solved.tolerance_percent
        );
        let _ = writeln!(
            s,
            "  {:10} {:>8} {:>10} {:>13} {:>7} {:>7} {:>8} {:>4} {:>8}",
            "Instrument", "Qty", "Price", "Held", "%Held", "%Target", "%Dev", "Band", "Optimal"
        );
        for line in &solved.positions {
            let _ = writeln!(
                s,
                "  {:10} {:>8} {:>10} {:>13} {:>7} {:>7.2} {:>8} {:>4} {:>8}",
                directory.label(line.instrument),
                line.quantity,
                line.price.map_or_else(|| "-".into(), |p| p.to_string()),
                line.value_held.map_or_else(|| "-".into(), dollars),
                pct(line.percent_held),
                line.percent_target,
                pct(line.percent_deviation.map(display_deviation)),
                band(line.out_of_band),
                line.optimal_order,
            );
        }
        let cash = &solved.cash;
        let _ = writeln!(
            s,
            "  {:10} {:>8} {:>10} {:>13} {:>7.2} {:>7.2} {:>8.2} {:>4}",
            cash.currency,
            "",
            "",
            dollars(cash.value_held),
            cash.percent_held,
            cash.percent_target,
            display_deviation(cash.percent_deviation),
            band(cash.out_of_band),
        );
        self.emit(&s);
    }

    fn orders(&mut self, orders: &[PricedOrder], directory: &Directory) {
        let mut s = String::from("\nORDERS:\n");
        let _ = writeln!(
            s,
            "  {:>3}  {:4} {:10} {:>8} {:>10} {:>13}",
            "#", "Side", "Instrument", "Shares", "Limit", "Value"
        );
        for (i, o) in orders.iter().enumerate() {
            let _ = writeln!(
                s,
                "  {:>3}  {:4} {:10} {:>8} {:>10} {:>13}",
                i + 1,
                o.side().to_string(),
                directory.label(o.instrument),
                o.shares(),
                o.limit.to_string(),
                dollars(o.value),
            );
        }
        self.emit(&s);
    }

    fn fills(&mut self, fills: &[Fill], directory: &Directory) {
        if fills.is_empty() {
            self.emit("\nFILLS: none\n");
            return;
        }
        let mut s = String::from("\nFILLS:\n");
        for f in fills {
            let _ = writeln!(
                s,
                "  {:>6}  {:4} {:10} {:>8} @ {}",
                f.order_id.to_string(),
                f.side.to_string(),
                directory.label(f.instrument),
                f.quantity,
                f.avg_fill_price,
            );
        }
        self.emit(&s);
    }

    fn trend(&mut self, history: &History) {
        if history.runs() < 2 {
            return;
        }
        let mut s = String::from("\nDEVIATION TREND (%):\n");
        for (identifier, devs) in history.trend() {
            let series: Vec<String> = devs.iter().map(|d| format!("{d:.1}")).collect();
            let _ = writeln!(s, "  {:10} {}", identifier, series.join(" -> "));
        }
        self.emit(&s);
    }

    fn finished(&mut self, outcome: &Outcome) {
        self.emit(&format!("\n{outcome}\n"));
    }
}
