//! Order constrainer: clip optimal orders to liquidity and notional limits.
//!
//! Deterministic and side-effect free apart from logging, so the same solved
//! portfolio and volumes always produce the same orders.

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::solver::SolvedPortfolio;
use crate::types::{Cents, InstrumentId, Shares};

/// Per-run trading limits.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrderLimits {
    /// Fraction of median daily volume tradable in one run (0.02 = 2%).
    pub daily_vol_pct_limit: f64,
    /// Orders at or below this notional are dropped, in cents.
    pub min_order_value: Cents,
    /// Orders are capped at this notional, in cents.
    pub max_order_value: Cents,
    /// Never sell.
    pub buy_only: bool,
}

impl Default for OrderLimits {
    fn default() -> Self {
        Self {
            daily_vol_pct_limit: 0.02,
            min_order_value: 1_000_00,
            max_order_value: 10_000_00,
            buy_only: false,
        }
    }
}

/// A whole-share order that respects [`OrderLimits`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstrainedOrder {
    pub instrument: InstrumentId,
    /// Signed: negative sells.
    pub quantity: Shares,
    /// Signed notional at the valuation price, in cents.
    pub value: Cents,
}

/// Shares tradable today: `floor(volume * pct)`.
///
/// A missing or malformed volume means nothing is tradable.
pub fn volume_constraint(volume: Option<f64>, daily_vol_pct_limit: f64) -> Shares {
    match volume {
        Some(v) if v.is_finite() && v > 0.0 => (v * daily_vol_pct_limit).floor().max(0.0) as Shares,
        _ => 0,
    }
}

/// Clip every solved line's optimal order to the given limits.
///
/// `volumes` maps instrument to median daily traded volume. A portfolio that
/// is already inside its tolerance band yields no orders.
pub fn constrain_orders(
    solved: &SolvedPortfolio,
    volumes: &FxHashMap<InstrumentId, f64>,
    limits: &OrderLimits,
) -> Vec<ConstrainedOrder> {
    if !solved.is_out_of_band() {
        return Vec::new();
    }

    let mut orders = Vec::new();

    for line in &solved.positions {
        let Some(price) = line.price.filter(|p| p.is_positive()) else {
            continue;
        };
        if line.optimal_order_value == 0 {
            continue;
        }

        let volume = volumes.get(&line.instrument).copied();
        if volume.is_none() {
            warn!(
                "Instrument {}: no volume history (stage=constrain), treating as untradable",
                line.instrument
            );
        }
        let max_shares = volume_constraint(volume, limits.daily_vol_pct_limit);

        let capped_value = line.optimal_order_value.abs().min(limits.max_order_value);
        let capped_value = if capped_value > limits.min_order_value {
            capped_value
        } else {
            0
        };

        let shares = max_shares.min(capped_value / price.0);
        let value = shares * price.0;

        let (shares, value) = if line.optimal_order_value < 0 {
            (-shares, -value)
        } else {
            (shares, value)
        };

        if limits.buy_only && value < 0 {
            debug!("Instrument {}: sell dropped (buy_only)", line.instrument);
            continue;
        }
        if shares == 0 && value == 0 {
            continue;
        }
        // Whole-share rounding or the volume cap can pull an order back under the floor.
        if value.abs() <= limits.min_order_value {
            debug!(
                "Instrument {}: {} after rounding is at or below the order floor, dropped",
                line.instrument, value
            );
            continue;
        }

        debug!(
            "Instrument {}: optimal {} -> constrained {} (vol cap {})",
            line.instrument, line.optimal_order, shares, max_shares
        );
        orders.push(ConstrainedOrder {
            instrument: line.instrument,
            quantity: shares,
            value,
        });
    }

    orders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{SolvedCash, SolvedLine};
    use crate::types::Price;

    fn line(n: i64, optimal_order: Shares, price: i64) -> SolvedLine {
        SolvedLine {
            instrument: InstrumentId(n),
            quantity: 0,
            price: Some(Price(price)),
            value_held: Some(0),
            percent_held: Some(0.0),
            percent_target: 0.0,
            value_target: 0.0,
            position_target: Some(optimal_order),
            percent_deviation: Some(100.0),
            out_of_band: true,
            optimal_order,
            optimal_order_value: optimal_order * price,
        }
    }

    fn solved(lines: Vec<SolvedLine>) -> SolvedPortfolio {
        SolvedPortfolio {
            positions: lines,
            cash: SolvedCash {
                currency: "USD".into(),
                value_held: 0,
                percent_held: 0.0,
                percent_target: 0.0,
                value_target: 0.0,
                position_target: 0,
                percent_deviation: 0.0,
                out_of_band: false,
                optimal_value: 0,
            },
            total_value: 0,
            tolerance_percent: 5.0,
        }
    }

    fn volumes(pairs: &[(i64, f64)]) -> FxHashMap<InstrumentId, f64> {
        pairs.iter().map(|&(n, v)| (InstrumentId(n), v)).collect()
    }

    fn limits(min: Cents, max: Cents) -> OrderLimits {
        OrderLimits {
            daily_vol_pct_limit: 0.02,
            min_order_value: min,
            max_order_value: max,
            buy_only: false,
        }
    }

    #[test]
    fn below_floor_is_dropped() {
        // -40 sh @ $100 = -$4,000; floor $5,000 → dropped entirely
        let orders = constrain_orders(
            &solved(vec![line(1, -40, 100_00)]),
            &volumes(&[(1, 10_000.0)]),
            &limits(5_000_00, 10_000_00),
        );
        assert!(orders.is_empty());
    }

    #[test]
    fn volume_cap_is_not_binding() {
        let orders = constrain_orders(
            &solved(vec![line(1, -40, 100_00)]),
            &volumes(&[(1, 10_000.0)]),
            &limits(1_000_00, 10_000_00),
        );
        assert_eq!(
            orders,
            vec![ConstrainedOrder {
                instrument: InstrumentId(1),
                quantity: -40,
                value: -4_000_00,
            }]
        );
    }

    #[test]
    fn volume_cap_binds() {
        // 500 * 0.02 = 10 shares max
        let orders = constrain_orders(
            &solved(vec![line(1, 80, 50_00)]),
            &volumes(&[(1, 500.0)]),
            &limits(100_00, 10_000_00),
        );
        assert_eq!(orders[0].quantity, 10);
        assert_eq!(orders[0].value, 500_00);
    }

    #[test]
    fn max_value_caps_and_rounds_down() {
        // 300 sh @ $70 = $21,000, capped to $10,000 → 142 sh = $9,940
        let orders = constrain_orders(
            &solved(vec![line(1, 300, 70_00)]),
            &volumes(&[(1, 1_000_000.0)]),
            &limits(1_000_00, 10_000_00),
        );
        assert_eq!(orders[0].quantity, 142);
        assert_eq!(orders[0].value, 9_940_00);
    }

    #[test]
    fn rounding_below_floor_is_dropped() {
        // $1,100 passes the $1,000 floor, but 1 whole share @ $600 does not
        let orders = constrain_orders(
            &solved(vec![line(1, 2, 600_00)]),
            &volumes(&[(1, 100_000.0)]),
            &limits(1_000_00, 1_100_00),
        );
        assert!(orders.is_empty());
    }

    #[test]
    fn missing_volume_means_no_order() {
        let orders = constrain_orders(
            &solved(vec![line(1, 50, 100_00)]),
            &volumes(&[]),
            &limits(0, 10_000_00),
        );
        assert!(orders.is_empty());
    }

    #[test]
    fn buy_only_drops_sells() {
        let mut l = limits(0, 10_000_00);
        l.buy_only = true;
        let orders = constrain_orders(
            &solved(vec![line(1, -20, 100_00), line(2, 20, 100_00)]),
            &volumes(&[(1, 100_000.0), (2, 100_000.0)]),
            &l,
        );
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].instrument, InstrumentId(2));
        assert!(orders[0].value > 0);
    }

    #[test]
    fn in_band_portfolio_yields_nothing() {
        let mut l = line(1, 50, 100_00);
        l.out_of_band = false;
        let orders = constrain_orders(
            &solved(vec![l]),
            &volumes(&[(1, 100_000.0)]),
            &limits(0, 10_000_00),
        );
        assert!(orders.is_empty());
    }

    #[test]
    fn volume_constraint_edge_cases() {
        assert_eq!(volume_constraint(Some(10_000.0), 0.02), 200);
        assert_eq!(volume_constraint(Some(49.0), 0.02), 0);
        assert_eq!(volume_constraint(None, 0.02), 0);
        assert_eq!(volume_constraint(Some(f64::NAN), 0.02), 0);
        assert_eq!(volume_constraint(Some(-5.0), 0.02), 0);
    }
}
