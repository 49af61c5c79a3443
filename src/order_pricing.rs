//! Order pricer: attach a midpoint limit to constrained orders.

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::constrain::ConstrainedOrder;
use crate::quote::Quote;
use crate::side::Side;
use crate::types::{Cents, InstrumentId, Price, Shares};

/// A constrained order with an executable limit price.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PricedOrder {
    pub instrument: InstrumentId,
    /// Signed: negative sells.
    pub quantity: Shares,
    pub limit: Price,
    /// `quantity * limit`, in cents.
    pub value: Cents,
}

impl PricedOrder {
    pub fn side(&self) -> Side {
        Side::from_signed(self.value)
    }

    /// Unsigned share count to submit.
    pub fn shares(&self) -> u64 {
        self.quantity.unsigned_abs()
    }
}

/// Limit prices for every quote that survives filtering.
///
/// A quote survives when it is two-sided with usable sizes and its relative
/// spread is strictly below `spread_tolerance`.
pub fn limit_prices(quotes: &[Quote], spread_tolerance: f64) -> FxHashMap<InstrumentId, Price> {
    let mut limits = FxHashMap::default();
    for quote in quotes {
        let Some(spread) = quote.relative_spread() else {
            debug!("Instrument {}: quote incomplete, skipped", quote.instrument);
            continue;
        };
        if spread >= spread_tolerance {
            debug!(
                "Instrument {}: spread {:.4} >= {:.4}, skipped",
                quote.instrument, spread, spread_tolerance
            );
            continue;
        }
        if let Some(mid) = quote.midpoint() {
            limits.insert(quote.instrument, mid);
        }
    }
    limits
}

/// Price constrained orders at the bid/ask midpoint.
///
/// Returns `None` when there is nothing to price or no quote survives
/// filtering. Orders whose own quote was filtered out are dropped.
pub fn price_orders(
    orders: &[ConstrainedOrder],
    quotes: &[Quote],
    spread_tolerance: f64,
) -> Option<Vec<PricedOrder>> {
    if orders.is_empty() {
        debug!("No order quantities to price");
        return None;
    }

    let limits = limit_prices(quotes, spread_tolerance);
    if limits.is_empty() {
        warn!("No usable quotes for {} orders (stage=order_pricing)", orders.len());
        return None;
    }

    let priced = orders
        .iter()
        .filter_map(|order| match limits.get(&order.instrument) {
            Some(&limit) => Some(PricedOrder {
                instrument: order.instrument,
                quantity: order.quantity,
                limit,
                value: order.quantity * limit.0,
            }),
            None => {
                warn!(
                    "Instrument {}: no usable quote (stage=order_pricing), order withheld",
                    order.instrument
                );
                None
            }
        })
        .collect();

    Some(priced)
}
