//! Shared broker types: instrument specs, positions, orders, fills.

use std::fmt;

use balancer::{Instrument, InstrumentId, PositionLine, Price, PricedOrder, Shares, Side};
use chrono::{DateTime, Utc};

/// An instrument as named in a target model, before contract resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub exchange: String,
    pub currency: String,
}

impl fmt::Display for InstrumentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.symbol, self.exchange, self.currency)
    }
}

/// Broker-level position in one account.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub instrument: Instrument,
    /// Positive = long, negative = short.
    pub quantity: Shares,
    /// Average cost per share in dollars. Informational only.
    pub avg_cost: f64,
}

impl Position {
    /// The engine's view of this position.
    pub fn line(&self) -> PositionLine {
        PositionLine {
            instrument: self.instrument.id,
            quantity: self.quantity,
            avg_cost: self.avg_cost,
        }
    }
}

/// Opaque order ID returned by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A day limit order to submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOrder {
    pub instrument: InstrumentId,
    pub side: Side,
    /// Always positive; direction is carried by `side`.
    pub quantity: u64,
    pub limit: Price,
}

impl From<&PricedOrder> for LimitOrder {
    fn from(order: &PricedOrder) -> Self {
        Self {
            instrument: order.instrument,
            side: order.side(),
            quantity: order.shares(),
            limit: order.limit,
        }
    }
}

/// An execution reported by the broker.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub quantity: u64,
    pub avg_fill_price: Price,
    pub time: DateTime<Utc>,
}

impl Fill {
    /// Signed notional in cents: buys positive, sells negative.
    pub fn value(&self) -> i64 {
        self.side.sign() * self.quantity as i64 * self.avg_fill_price.0
    }
}
