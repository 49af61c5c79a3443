//! balancer-rebalancer: drives a brokerage account toward a target model.
//!
//! Reads a YAML target model, snapshots the account through a [`Broker`],
//! solves for optimal orders with the `balancer` core, constrains and prices
//! them, then submits limit orders and repeats until every line is inside
//! its tolerance band. Every step is written to a JSONL audit trail.
//!
//! [`Broker`]: balancer_broker::Broker

pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
pub mod history;
pub mod jsonl;
pub mod model;
pub mod rebalance;
pub mod report;
pub mod snapshot;

pub use config::Config;
pub use error::{Error, Result};
pub use rebalance::{Outcome, Rebalancer, RunOptions, select_account};
