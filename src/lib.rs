// Allow our dollar.cents digit grouping convention (e.g., 100_00 = $100.00)
#![allow(clippy::inconsistent_digit_grouping)]

//! # balancer
//!
//! Deterministic rebalancing arithmetic: take a target allocation and a live
//! portfolio snapshot, and work out which whole-share orders move the
//! portfolio back inside its tolerance band without breaching liquidity or
//! notional limits.
//!
//! Every stage is a pure function over typed tables, so each stage's output
//! can be inspected and tested on its own:
//!
//! | stage | function | output |
//! |-------|----------|--------|
//! | merge | [`merge`] | [`MergedPortfolio`] |
//! | value | [`price_portfolio`] | [`PricedPortfolio`] |
//! | solve | [`solve`] | [`SolvedPortfolio`] |
//! | constrain | [`constrain_orders`] | [`ConstrainedOrder`]s |
//! | limit | [`price_orders`] | [`PricedOrder`]s |
//!
//! ## Quick Start
//!
//! ```
//! use balancer::*;
//! use rustc_hash::FxHashMap;
//!
//! let aaa = InstrumentId(1);
//! let targets = Targets::new(vec![TargetLine { instrument: aaa, percent: 60.0 }], 40.0, 5.0).unwrap();
//!
//! let held = [PositionLine { instrument: aaa, quantity: 100, avg_cost: 90.0 }];
//! let cash = CashBalance { currency: "USD".into(), balance: 0 };
//! let merged = merge(&held, &cash, &targets);
//!
//! let quote = Quote { instrument: aaa, close: Some(100.0), ..Default::default() };
//! let solved = solve(price_portfolio(merged, &[quote]));
//!
//! assert_eq!(solved.total_value, 10_000_00);
//! assert_eq!(solved.positions[0].position_target, Some(60));
//! assert_eq!(solved.positions[0].optimal_order, -40);
//! assert!(solved.is_out_of_band());
//!
//! let volumes: FxHashMap<InstrumentId, f64> = [(aaa, 10_000.0)].into_iter().collect();
//! let orders = constrain_orders(&solved, &volumes, &OrderLimits::default());
//! assert_eq!(orders[0].quantity, -40);
//! ```
//!
//! ## Money
//!
//! Observed amounts are integer cents ([`Price`], [`Cents`]). Targets that
//! are inherently fractional (`value_target`) are `f64` cents. Percents are
//! `0..=100`.

pub mod constrain;
mod error;
pub mod merge;
pub mod order_pricing;
pub mod pricing;
pub mod quote;
mod side;
pub mod solver;
mod types;

pub use constrain::{ConstrainedOrder, OrderLimits, constrain_orders, volume_constraint};
pub use error::TargetError;
pub use merge::{
    CashBalance, MergedPortfolio, PositionLine, TargetLine, TargetedCash, TargetedLine, Targets,
    merge,
};
pub use order_pricing::{PricedOrder, limit_prices, price_orders};
pub use pricing::{PricedCash, PricedLine, PricedPortfolio, price_portfolio};
pub use quote::Quote;
pub use side::Side;
pub use solver::{SolvedCash, SolvedLine, SolvedPortfolio, percent_deviation, solve};
pub use types::{Cents, Instrument, InstrumentId, Price, Shares};
