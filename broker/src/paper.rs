//! Paper broker: an in-process simulator implementing the `Broker` trait.
//!
//! Fills limit orders at their limit price according to a [`FillMode`] and
//! books the result into its own cash and positions, so a rebalance loop run
//! against it converges the way it would against a live account.
//!
//! ```ignore
//! use balancer::InstrumentId;
//! use balancer_broker::paper::{FillMode, PaperBroker};
//!
//! let broker = PaperBroker::builder()
//!     .fill_mode(FillMode::Full)
//!     .with_account("DU111111", 100_000_00)
//!     .with_instrument(InstrumentId(1), "AAA", 100.0, 50_000.0)
//!     .with_position("DU111111", InstrumentId(1), 100, 90.0)
//!     .build();
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use balancer::{
    CashBalance, Cents, Instrument, InstrumentId, Price, Quote, Shares, Side,
};
use chrono::Utc;
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::Broker;
use crate::error::BrokerError;
use crate::types::*;

/// How the paper broker handles submitted orders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// Orders fill completely at the limit price.
    #[default]
    Full,
    /// Orders fill the given fraction (e.g., 0.5 = 50%); the rest rests until cancelled.
    Partial(f64),
    /// Orders are accepted but never fill.
    None,
    /// All orders are rejected.
    Reject,
}

// ============================================================================
// Market file
// ============================================================================

/// A market file: accounts, listed instruments and the fill mode.
///
/// ```toml
/// fill_mode = "full"
///
/// [[accounts]]
/// id = "DU111111"
/// cash = 25000.0
/// positions = [{ symbol = "AAA", quantity = 100, avg_cost = 90.0 }]
///
/// [[instruments]]
/// id = 1
/// symbol = "AAA"
/// bid = 99.95
/// ask = 100.05
/// close = 100.0
/// volume = 50000
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Market {
    #[serde(default)]
    pub fill_mode: FillMode,
    #[serde(default)]
    pub accounts: Vec<MarketAccount>,
    #[serde(default)]
    pub instruments: Vec<MarketInstrument>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MarketAccount {
    pub id: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Cash in dollars.
    pub cash: f64,
    #[serde(default)]
    pub positions: Vec<MarketPosition>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MarketPosition {
    pub symbol: String,
    pub quantity: Shares,
    #[serde(default)]
    pub avg_cost: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MarketInstrument {
    pub id: i64,
    pub symbol: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    #[serde(default = "default_size")]
    pub bid_size: f64,
    #[serde(default = "default_size")]
    pub ask_size: f64,
    pub last: Option<f64>,
    pub close: Option<f64>,
    /// Median daily volume in shares.
    #[serde(default)]
    pub volume: f64,
}

fn default_currency() -> String {
    "USD".into()
}

fn default_exchange() -> String {
    "SMART".into()
}

fn default_size() -> f64 {
    100.0
}

// ============================================================================
// Builder
// ============================================================================

/// A recorded order submission for assertion in tests.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedOrder {
    pub account: String,
    pub order_id: OrderId,
    pub order: LimitOrder,
}

#[derive(Clone, Debug)]
struct Listing {
    instrument: Instrument,
    quote: Quote,
    volume: f64,
}

#[derive(Clone, Debug)]
struct Holding {
    quantity: Shares,
    avg_cost: f64,
}

#[derive(Clone, Debug)]
struct PaperAccount {
    id: String,
    currency: String,
    cash: Cents,
    holdings: FxHashMap<InstrumentId, Holding>,
    fills: Vec<Fill>,
}

#[derive(Clone, Debug)]
struct OpenOrder {
    id: OrderId,
    account: String,
    remaining: u64,
}

/// Builder for `PaperBroker`.
pub struct PaperBrokerBuilder {
    fill_mode: FillMode,
    accounts: Vec<PaperAccount>,
    listings: Vec<Listing>,
    fail_submit_after: Option<usize>,
}

impl PaperBrokerBuilder {
    pub fn fill_mode(mut self, mode: FillMode) -> Self {
        self.fill_mode = mode;
        self
    }

    /// Add a USD account holding `cash` cents.
    pub fn with_account(mut self, id: &str, cash: Cents) -> Self {
        self.accounts.push(PaperAccount {
            id: id.to_string(),
            currency: default_currency(),
            cash,
            holdings: FxHashMap::default(),
            fills: Vec::new(),
        });
        self
    }

    /// Add a position to a previously added account. Unknown accounts are ignored.
    pub fn with_position(
        mut self,
        account: &str,
        instrument: InstrumentId,
        quantity: Shares,
        avg_cost: f64,
    ) -> Self {
        if let Some(acct) = self.accounts.iter_mut().find(|a| a.id == account) {
            acct.holdings.insert(instrument, Holding { quantity, avg_cost });
        }
        self
    }

    /// List an instrument with a one-cent-wide book around `close` dollars.
    pub fn with_instrument(mut self, id: InstrumentId, symbol: &str, close: f64, volume: f64) -> Self {
        let quote = Quote {
            instrument: id,
            bid: Some(close - 0.01),
            bid_size: Some(default_size()),
            ask: Some(close + 0.01),
            ask_size: Some(default_size()),
            last: Some(close),
            close: Some(close),
            time: None,
        };
        self.listings.push(Listing {
            instrument: Instrument {
                id,
                symbol: symbol.to_string(),
                exchange: default_exchange(),
                currency: default_currency(),
            },
            quote,
            volume,
        });
        self
    }

    /// Replace the quote of a listed instrument.
    pub fn with_quote(mut self, quote: Quote) -> Self {
        if let Some(listing) = self
            .listings
            .iter_mut()
            .find(|l| l.instrument.id == quote.instrument)
        {
            listing.quote = quote;
        }
        self
    }

    /// Accept `n` submissions, then fail every later one with a connection error.
    pub fn fail_submit_after(mut self, n: usize) -> Self {
        self.fail_submit_after = Some(n);
        self
    }

    pub fn build(mut self) -> PaperBroker {
        self.listings.sort_by_key(|l| l.instrument.id);
        PaperBroker {
            connected: false,
            sessions: 0,
            fill_mode: self.fill_mode,
            listings: self.listings,
            fail_submit_after: self.fail_submit_after,
            state: Mutex::new(State {
                accounts: self.accounts,
                open: Vec::new(),
                next_order_id: 1,
                submitted: Vec::new(),
                cancel_calls: 0,
            }),
        }
    }
}

// ============================================================================
// Broker
// ============================================================================

#[derive(Debug)]
struct State {
    accounts: Vec<PaperAccount>,
    open: Vec<OpenOrder>,
    next_order_id: u64,
    submitted: Vec<RecordedOrder>,
    cancel_calls: usize,
}

impl State {
    fn account_mut(&mut self, id: &str) -> Result<&mut PaperAccount, BrokerError> {
        self.accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| BrokerError::UnknownAccount(id.to_string()))
    }
}

/// A simulated broker that books fills into its own accounts.
pub struct PaperBroker {
    connected: bool,
    sessions: usize,
    fill_mode: FillMode,
    listings: Vec<Listing>,
    fail_submit_after: Option<usize>,
    state: Mutex<State>,
}

impl PaperBroker {
    pub fn builder() -> PaperBrokerBuilder {
        PaperBrokerBuilder {
            fill_mode: FillMode::Full,
            accounts: Vec::new(),
            listings: Vec::new(),
            fail_submit_after: None,
        }
    }

    /// Seed a paper broker from a parsed market file.
    pub fn from_market(market: Market) -> Result<Self, BrokerError> {
        let mut builder = Self::builder().fill_mode(market.fill_mode);

        for inst in &market.instruments {
            let id = InstrumentId(inst.id);
            builder.listings.push(Listing {
                instrument: Instrument {
                    id,
                    symbol: inst.symbol.clone(),
                    exchange: inst.exchange.clone(),
                    currency: inst.currency.clone(),
                },
                quote: Quote {
                    instrument: id,
                    bid: inst.bid,
                    bid_size: Some(inst.bid_size),
                    ask: inst.ask,
                    ask_size: Some(inst.ask_size),
                    last: inst.last,
                    close: inst.close,
                    time: None,
                },
                volume: inst.volume,
            });
        }

        for acct in market.accounts {
            let cash = Price::from_dollars(acct.cash)
                .ok_or_else(|| BrokerError::Data(format!("account {}: invalid cash", acct.id)))?;
            let mut holdings = FxHashMap::default();
            for pos in acct.positions {
                let id = builder
                    .listings
                    .iter()
                    .find(|l| l.instrument.symbol == pos.symbol)
                    .map(|l| l.instrument.id)
                    .ok_or_else(|| {
                        BrokerError::UnknownInstrument(format!(
                            "{} (account {})",
                            pos.symbol, acct.id
                        ))
                    })?;
                holdings.insert(
                    id,
                    Holding {
                        quantity: pos.quantity,
                        avg_cost: pos.avg_cost,
                    },
                );
            }
            builder.accounts.push(PaperAccount {
                id: acct.id,
                currency: acct.currency,
                cash: cash.0,
                holdings,
                fills: Vec::new(),
            });
        }

        Ok(builder.build())
    }

    /// Get all orders that were submitted (for assertion in tests).
    pub fn submitted_orders(&self) -> Vec<RecordedOrder> {
        self.state().submitted.clone()
    }

    /// Number of `cancel_all_orders` calls so far.
    pub fn cancel_calls(&self) -> usize {
        self.state().cancel_calls
    }

    /// Number of `connect` calls so far.
    pub fn sessions_opened(&self) -> usize {
        self.sessions
    }

    /// Orders still resting (not filled, not cancelled).
    pub fn open_orders(&self) -> Vec<OrderId> {
        self.state().open.iter().map(|o| o.id).collect()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.connected {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    fn listing(&self, id: InstrumentId) -> Option<&Listing> {
        self.listings
            .binary_search_by_key(&id, |l| l.instrument.id)
            .ok()
            .map(|i| &self.listings[i])
    }

    /// Shares filled immediately for an order of `quantity`.
    fn immediate_fill(&self, quantity: u64) -> u64 {
        match self.fill_mode {
            FillMode::Full => quantity,
            FillMode::Partial(frac) => ((quantity as f64) * frac.clamp(0.0, 1.0)).floor() as u64,
            FillMode::None | FillMode::Reject => 0,
        }
    }
}

fn book_fill(account: &mut PaperAccount, fill: Fill) {
    let signed = fill.side.sign() * fill.quantity as Shares;
    account.cash -= signed * fill.avg_fill_price.0;

    let holding = account.holdings.entry(fill.instrument).or_insert(Holding {
        quantity: 0,
        avg_cost: 0.0,
    });
    let new_quantity = holding.quantity + signed;
    if fill.side == Side::Buy && new_quantity > 0 {
        let cost = holding.avg_cost * holding.quantity.max(0) as f64
            + fill.avg_fill_price.as_dollars() * fill.quantity as f64;
        holding.avg_cost = cost / new_quantity as f64;
    }
    holding.quantity = new_quantity;
    if new_quantity == 0 {
        account.holdings.remove(&fill.instrument);
    }
    account.fills.push(fill);
}

impl Broker for PaperBroker {
    fn connect(&mut self) -> Result<(), BrokerError> {
        self.connected = true;
        self.sessions += 1;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.connected = false;
        Ok(())
    }

    fn managed_accounts(&self) -> Result<Vec<String>, BrokerError> {
        self.ensure_connected()?;
        Ok(self.state().accounts.iter().map(|a| a.id.clone()).collect())
    }

    fn cash_balance(&self, account: &str) -> Result<CashBalance, BrokerError> {
        self.ensure_connected()?;
        let mut state = self.state();
        let acct = state.account_mut(account)?;
        Ok(CashBalance {
            currency: acct.currency.clone(),
            balance: acct.cash,
        })
    }

    fn positions(&self, account: &str) -> Result<Vec<Position>, BrokerError> {
        self.ensure_connected()?;
        let mut state = self.state();
        let acct = state.account_mut(account)?;

        let mut positions: Vec<Position> = acct
            .holdings
            .iter()
            .filter(|(_, h)| h.quantity != 0)
            .map(|(&id, h)| Position {
                instrument: self.listing(id).map_or_else(
                    || Instrument {
                        id,
                        symbol: id.to_string(),
                        exchange: default_exchange(),
                        currency: acct.currency.clone(),
                    },
                    |l| l.instrument.clone(),
                ),
                quantity: h.quantity,
                avg_cost: h.avg_cost,
            })
            .collect();
        positions.sort_by_key(|p| p.instrument.id);
        Ok(positions)
    }

    fn resolve_instruments(&self, specs: &[InstrumentSpec]) -> Result<Vec<Instrument>, BrokerError> {
        self.ensure_connected()?;
        specs
            .iter()
            .map(|spec| {
                self.listings
                    .iter()
                    .find(|l| {
                        l.instrument.symbol == spec.symbol && l.instrument.currency == spec.currency
                    })
                    .map(|l| {
                        debug!("Resolved {spec} -> {}", l.instrument);
                        l.instrument.clone()
                    })
                    .ok_or_else(|| BrokerError::UnknownInstrument(spec.to_string()))
            })
            .collect()
    }

    fn quotes(&self, ids: &[InstrumentId]) -> Result<Vec<Quote>, BrokerError> {
        self.ensure_connected()?;
        let now = Utc::now();
        Ok(ids
            .iter()
            .filter_map(|&id| self.listing(id))
            .map(|l| Quote {
                time: Some(now),
                ..l.quote.clone()
            })
            .collect())
    }

    fn historical_volume(
        &self,
        ids: &[InstrumentId],
        days: u32,
    ) -> Result<Vec<(InstrumentId, f64)>, BrokerError> {
        self.ensure_connected()?;
        debug!("Volume lookback: {days} days over {} instruments", ids.len());
        Ok(ids
            .iter()
            .filter_map(|&id| self.listing(id).map(|l| (id, l.volume)))
            .collect())
    }

    fn submit_limit_order(&self, account: &str, order: &LimitOrder) -> Result<OrderId, BrokerError> {
        self.ensure_connected()?;
        let mut state = self.state();

        if self
            .fail_submit_after
            .is_some_and(|n| state.submitted.len() >= n)
        {
            return Err(BrokerError::Connection("paper: connection lost".into()));
        }
        if self.fill_mode == FillMode::Reject {
            return Err(BrokerError::Order("paper: order rejected".into()));
        }
        if self.listing(order.instrument).is_none() {
            return Err(BrokerError::UnknownInstrument(order.instrument.to_string()));
        }
        state.account_mut(account)?;

        let id = OrderId(state.next_order_id);
        state.next_order_id += 1;
        state.submitted.push(RecordedOrder {
            account: account.to_string(),
            order_id: id,
            order: *order,
        });

        let filled = self.immediate_fill(order.quantity);
        let acct = state.account_mut(account)?;
        if filled > 0 {
            book_fill(
                acct,
                Fill {
                    order_id: id,
                    instrument: order.instrument,
                    side: order.side,
                    quantity: filled,
                    avg_fill_price: order.limit,
                    time: Utc::now(),
                },
            );
        }
        info!(
            "Paper {} {} {} @ {} -> {} filled",
            id, order.side, order.quantity, order.limit, filled
        );

        let remaining = order.quantity - filled;
        if remaining > 0 {
            state.open.push(OpenOrder {
                id,
                account: account.to_string(),
                remaining,
            });
        }
        Ok(id)
    }

    fn fills(&self, account: &str) -> Result<Vec<Fill>, BrokerError> {
        self.ensure_connected()?;
        let mut state = self.state();
        Ok(state.account_mut(account)?.fills.clone())
    }

    fn cancel_all_orders(&self) -> Result<(), BrokerError> {
        self.ensure_connected()?;
        let mut state = self.state();
        state.cancel_calls += 1;
        for order in state.open.drain(..) {
            warn!(
                "Paper {} cancelled with {} unfilled (account {})",
                order.id, order.remaining, order.account
            );
        }
        Ok(())
    }
}
