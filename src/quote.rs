//! Raw broker quotes and the validity rules applied to them.
//!
//! Quotes arrive as the broker reports them: dollar floats, possibly missing,
//! possibly carrying the `-1` "no data" sentinel. Nothing here defaults a bad
//! field to zero; every accessor returns `None` instead.

use chrono::{DateTime, Utc};

use crate::types::{InstrumentId, Price};

/// A top-of-book snapshot for one instrument.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quote {
    pub instrument: InstrumentId,
    pub bid: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask: Option<f64>,
    pub ask_size: Option<f64>,
    pub last: Option<f64>,
    pub close: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

/// A field is usable when present, finite and strictly positive.
/// This rejects the `-1` sentinel as well as zero.
#[inline]
fn usable(field: Option<f64>) -> Option<f64> {
    field.filter(|v| v.is_finite() && *v > 0.0)
}

impl Quote {
    /// `(bid, ask)` when bid, ask and both sizes are usable.
    pub fn two_sided(&self) -> Option<(f64, f64)> {
        let bid = usable(self.bid)?;
        let ask = usable(self.ask)?;
        usable(self.bid_size)?;
        usable(self.ask_size)?;
        Some((bid, ask))
    }

    /// `(ask - bid) / ask` for a usable two-sided quote.
    pub fn relative_spread(&self) -> Option<f64> {
        self.two_sided().map(|(bid, ask)| (ask - bid) / ask)
    }

    /// Bid/ask midpoint rounded to the cent.
    pub fn midpoint(&self) -> Option<Price> {
        let (bid, ask) = self.two_sided()?;
        Price::from_dollars((ask + bid) / 2.0).filter(|p| p.is_positive())
    }

    /// Price used to value a holding: the close, else the midpoint.
    pub fn valuation_price(&self) -> Option<Price> {
        usable(self.close)
            .and_then(Price::from_dollars)
            .filter(|p| p.is_positive())
            .or_else(|| self.midpoint())
    }
}
