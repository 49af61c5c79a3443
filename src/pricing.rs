//! Portfolio valuation: attach prices, held values and weights to merged lines.

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::merge::MergedPortfolio;
use crate::quote::Quote;
use crate::types::{Cents, InstrumentId, Price, Shares};

/// A merged line with its market valuation.
///
/// `price`, `value_held` and `percent_held` are `None` when no usable quote
/// was available; such lines never trade.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricedLine {
    pub instrument: InstrumentId,
    pub quantity: Shares,
    pub avg_cost: f64,
    pub percent_target: f64,
    pub price: Option<Price>,
    pub value_held: Option<Cents>,
    pub percent_held: Option<f64>,
}

/// Cash valued at a fixed price of 1.
#[derive(Clone, Debug, PartialEq)]
pub struct PricedCash {
    pub currency: String,
    pub value_held: Cents,
    pub percent_target: f64,
    pub percent_held: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PricedPortfolio {
    pub positions: Vec<PricedLine>,
    pub cash: PricedCash,
    /// Cash plus every priced position. Unpriced lines contribute nothing.
    pub total_value: Cents,
    pub tolerance_percent: f64,
}

impl PricedPortfolio {
    /// Lines that could not be valued.
    pub fn unpriced(&self) -> impl Iterator<Item = &PricedLine> {
        self.positions.iter().filter(|l| l.price.is_none())
    }
}

/// Round to two decimals.
#[inline]
pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `100 * value / total`, rounded to 2 decimals. A zero total weighs everything at 0%.
fn weight(value: Cents, total: Cents) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(100.0 * value as f64 / total as f64)
}

/// Value the merged portfolio against a batch of quotes.
///
/// Each instrument is valued at [`Quote::valuation_price`]. A missing or
/// unusable quote leaves the line unpriced rather than worth zero, and is
/// logged.
pub fn price_portfolio(merged: MergedPortfolio, quotes: &[Quote]) -> PricedPortfolio {
    let prices: FxHashMap<InstrumentId, Option<Price>> = quotes
        .iter()
        .map(|q| (q.instrument, q.valuation_price()))
        .collect();

    let mut positions: Vec<PricedLine> = merged
        .positions
        .iter()
        .map(|line| {
            let price = prices.get(&line.instrument).copied().flatten();
            match price {
                Some(p) => debug!("Instrument {}: valued at {p}", line.instrument),
                None => warn!(
                    "Instrument {}: no usable price (stage=pricing), excluded from trading",
                    line.instrument
                ),
            }
            PricedLine {
                instrument: line.instrument,
                quantity: line.quantity,
                avg_cost: line.avg_cost,
                percent_target: line.percent_target,
                price,
                value_held: price.map(|p| line.quantity * p.0),
                percent_held: None,
            }
        })
        .collect();

    let cash_value = merged.cash.balance;
    let total_value = cash_value + positions.iter().filter_map(|l| l.value_held).sum::<Cents>();

    for line in &mut positions {
        line.percent_held = line.value_held.map(|v| weight(v, total_value));
    }

    PricedPortfolio {
        positions,
        cash: PricedCash {
            currency: merged.cash.currency,
            value_held: cash_value,
            percent_target: merged.cash.percent_target,
            percent_held: weight(cash_value, total_value),
        },
        total_value,
        tolerance_percent: merged.tolerance_percent,
    }
}
