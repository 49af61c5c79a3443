//! Broker trait and implementations for balancer.
//!
//! Provides a generic `Broker` trait that abstracts over the brokerage the
//! rebalancer trades through, and a scoped [`Session`] that holds a
//! connection for exactly one logical operation.
//!
//! Implementations:
//!
//! - **Paper** ([`paper::PaperBroker`]): in-process simulator seeded from a
//!   market file, used by the CLI and by integration tests.

pub mod error;
pub mod paper;
pub mod session;
pub mod types;

pub use error::BrokerError;
pub use session::Session;
pub use types::*;

use balancer::{CashBalance, Instrument, InstrumentId, Quote};

/// A broker connection that can report account state, price instruments
/// and execute limit orders. Every call blocks until the broker answers.
pub trait Broker {
    /// Connect to the broker.
    fn connect(&mut self) -> Result<(), BrokerError>;

    /// Disconnect gracefully.
    fn disconnect(&mut self) -> Result<(), BrokerError>;

    /// Accounts this login may trade.
    fn managed_accounts(&self) -> Result<Vec<String>, BrokerError>;

    /// Settled cash in the account's base currency.
    fn cash_balance(&self, account: &str) -> Result<CashBalance, BrokerError>;

    /// Get all current positions in an account.
    fn positions(&self, account: &str) -> Result<Vec<Position>, BrokerError>;

    /// Resolve model instrument specs to broker contracts, in input order.
    fn resolve_instruments(&self, specs: &[InstrumentSpec]) -> Result<Vec<Instrument>, BrokerError>;

    /// Top-of-book snapshot for a batch of instruments.
    ///
    /// Instruments the broker has no data for are omitted.
    fn quotes(&self, ids: &[InstrumentId]) -> Result<Vec<Quote>, BrokerError>;

    /// Median daily traded volume over the last `days` sessions.
    fn historical_volume(
        &self,
        ids: &[InstrumentId],
        days: u32,
    ) -> Result<Vec<(InstrumentId, f64)>, BrokerError>;

    /// Submit a day limit order. Returns order ID.
    fn submit_limit_order(&self, account: &str, order: &LimitOrder) -> Result<OrderId, BrokerError>;

    /// Every fill reported for the account during this connection.
    fn fills(&self, account: &str) -> Result<Vec<Fill>, BrokerError>;

    /// Cancel every open order across all accounts.
    fn cancel_all_orders(&self) -> Result<(), BrokerError>;
}
