//! Core types: Price, InstrumentId, Instrument

use std::fmt;

/// Price in cents.
///
/// `Price(10050)` represents $100.50.
/// Observed prices and values are kept fixed-point; only derived targets go through `f64`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Price(pub i64);

impl Price {
    pub const ZERO: Price = Price(0);

    /// Convert a dollar amount to cents, rounding to the nearest cent.
    ///
    /// Returns `None` for non-finite input.
    pub fn from_dollars(dollars: f64) -> Option<Price> {
        if !dollars.is_finite() {
            return None;
        }
        Some(Price((dollars * 100.0).round() as i64))
    }

    /// Dollar value as a float (display and ratio math only).
    #[inline]
    pub fn as_dollars(self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dollars = self.0 / 100;
        let cents = (self.0 % 100).abs();
        if self.0 < 0 {
            write!(f, "-${}.{:02}", dollars.abs(), cents)
        } else {
            write!(f, "${}.{:02}", dollars, cents)
        }
    }
}

/// Opaque broker contract identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct InstrumentId(pub i64);

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolved tradable instrument. Symbol, exchange and currency are display-only.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instrument {
    pub id: InstrumentId,
    pub symbol: String,
    pub exchange: String,
    pub currency: String,
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.symbol, self.exchange, self.id)
    }
}

/// Signed share count. Positive = long / buy, negative = short / sell.
pub type Shares = i64;

/// Money amount in cents.
pub type Cents = i64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_ordering() {
        assert!(Price(100) < Price(200));
        assert!(Price(-50) < Price(50));
    }

    #[test]
    fn price_display() {
        assert_eq!(format!("{}", Price(10050)), "$100.50");
        assert_eq!(format!("{}", Price(5)), "$0.05");
        assert_eq!(format!("{}", Price(-250)), "-$2.50");
    }

    #[test]
    fn price_from_dollars_rounds_to_cent() {
        assert_eq!(Price::from_dollars(100.006), Some(Price(10001)));
        assert_eq!(Price::from_dollars(99.994), Some(Price(9999)));
        assert_eq!(Price::from_dollars(f64::NAN), None);
        assert_eq!(Price::from_dollars(f64::INFINITY), None);
    }

    #[test]
    fn instrument_display() {
        let inst = Instrument {
            id: InstrumentId(265598),
            symbol: "AAPL".into(),
            exchange: "SMART".into(),
            currency: "USD".into(),
        };
        assert_eq!(format!("{inst}"), "AAPL (SMART:265598)");
    }
}
