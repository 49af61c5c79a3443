//! Target solver: target values, target share counts, deviation and optimal orders.
//!
//! Pure arithmetic over a [`PricedPortfolio`]. No limits are applied here;
//! see [`constrain`](crate::constrain) for that.

use crate::pricing::{PricedLine, PricedPortfolio};
use crate::types::{Cents, InstrumentId, Price, Shares};

/// A position line with its target and unconstrained order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolvedLine {
    pub instrument: InstrumentId,
    pub quantity: Shares,
    pub price: Option<Price>,
    pub value_held: Option<Cents>,
    pub percent_held: Option<f64>,
    pub percent_target: f64,
    /// `percent_target / 100 * total_value`, in cents.
    pub value_target: f64,
    /// `floor(value_target / price)`. `None` when unpriced.
    pub position_target: Option<Shares>,
    /// `None` when unpriced; `+inf` when held against a zero target.
    pub percent_deviation: Option<f64>,
    pub out_of_band: bool,
    /// `position_target - quantity`; negative sells. Zero when unpriced.
    pub optimal_order: Shares,
    /// `price * optimal_order`, in cents.
    pub optimal_order_value: Cents,
}

/// The cash summary row. Cash is never traded directly.
#[derive(Clone, Debug, PartialEq)]
pub struct SolvedCash {
    pub currency: String,
    pub value_held: Cents,
    pub percent_held: f64,
    pub percent_target: f64,
    pub value_target: f64,
    /// `floor(value_target)` at a price of one unit.
    pub position_target: Cents,
    pub percent_deviation: f64,
    pub out_of_band: bool,
    /// Residual cash after every optimal order fills: display only.
    pub optimal_value: Cents,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SolvedPortfolio {
    pub positions: Vec<SolvedLine>,
    pub cash: SolvedCash,
    pub total_value: Cents,
    pub tolerance_percent: f64,
}

impl SolvedPortfolio {
    /// True when any line, cash included, sits outside the tolerance band.
    pub fn is_out_of_band(&self) -> bool {
        self.cash.out_of_band || self.positions.iter().any(|l| l.out_of_band)
    }

    /// Look up a solved line by instrument.
    pub fn line(&self, instrument: InstrumentId) -> Option<&SolvedLine> {
        self.positions.iter().find(|l| l.instrument == instrument)
    }
}

/// `100 * |held - target| / target`.
///
/// A zero target has no defined relative deviation: an empty line counts as
/// on target (0), anything held counts as fully out of band (`+inf`).
pub fn percent_deviation(value_held: f64, value_target: f64) -> f64 {
    if value_target == 0.0 {
        return if value_held == 0.0 { 0.0 } else { f64::INFINITY };
    }
    100.0 * ((value_held - value_target) / value_target).abs()
}

fn solve_line(line: &PricedLine, total_value: Cents, tolerance_percent: f64) -> SolvedLine {
    let value_target = line.percent_target / 100.0 * total_value as f64;

    let (position_target, percent_deviation) = match (line.price, line.value_held) {
        (Some(price), Some(held)) => {
            let target = (value_target / price.0 as f64).floor() as Shares;
            (Some(target), Some(percent_deviation(held as f64, value_target)))
        }
        _ => (None, None),
    };

    let out_of_band = percent_deviation.is_some_and(|d| d > tolerance_percent);
    let optimal_order = position_target.map_or(0, |t| t - line.quantity);
    let optimal_order_value = line.price.map_or(0, |p| p.0 * optimal_order);

    SolvedLine {
        instrument: line.instrument,
        quantity: line.quantity,
        price: line.price,
        value_held: line.value_held,
        percent_held: line.percent_held,
        percent_target: line.percent_target,
        value_target,
        position_target,
        percent_deviation,
        out_of_band,
        optimal_order,
        optimal_order_value,
    }
}

/// Solve every line of a priced portfolio against its tolerance band.
pub fn solve(priced: PricedPortfolio) -> SolvedPortfolio {
    let total_value = priced.total_value;
    let tolerance = priced.tolerance_percent;

    let positions: Vec<SolvedLine> = priced
        .positions
        .iter()
        .map(|line| solve_line(line, total_value, tolerance))
        .collect();

    let post_trade_value: Cents = positions
        .iter()
        .filter_map(|l| l.price.map(|p| (l.quantity + l.optimal_order) * p.0))
        .sum();

    let cash = priced.cash;
    let cash_target = cash.percent_target / 100.0 * total_value as f64;
    let cash_deviation = percent_deviation(cash.value_held as f64, cash_target);

    SolvedPortfolio {
        positions,
        cash: SolvedCash {
            currency: cash.currency,
            value_held: cash.value_held,
            percent_held: cash.percent_held,
            percent_target: cash.percent_target,
            value_target: cash_target,
            position_target: cash_target.floor() as Cents,
            percent_deviation: cash_deviation,
            out_of_band: cash_deviation > tolerance,
            optimal_value: total_value - post_trade_value,
        },
        total_value,
        tolerance_percent: tolerance,
    }
}
