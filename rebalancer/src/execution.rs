//! Execution controller: submit → settle → collect fills → cancel.
//!
//! One invocation walks `Idle → Submitted → Waiting → Reconciled → Done`
//! inside a single broker session. A [`CancelGuard`] issues the global
//! cancel on every exit path, including a submission failure halfway
//! through the batch.

use std::thread;
use std::time::Duration;

use balancer::PricedOrder;
use balancer_broker::{Broker, BrokerError, Fill, LimitOrder, OrderId, Session};
use log::{debug, error, info, warn};
use rustc_hash::FxHashSet;

use crate::error::{BrokerContext, Result, Stage};

/// What one execution pass submitted and got back.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// Broker ids, in the order the orders were submitted.
    pub order_ids: Vec<OrderId>,
    /// Fills belonging to this batch only. May be empty.
    pub fills: Vec<Fill>,
}

/// Cancels every open order when dropped, unless [`complete`](Self::complete)d.
struct CancelGuard<'a, B: Broker + ?Sized> {
    broker: &'a B,
    armed: bool,
}

impl<'a, B: Broker + ?Sized> CancelGuard<'a, B> {
    fn new(broker: &'a B) -> Self {
        Self {
            broker,
            armed: true,
        }
    }

    /// Issue the cancel now and report its result.
    fn complete(mut self) -> std::result::Result<(), BrokerError> {
        self.armed = false;
        self.broker.cancel_all_orders()
    }
}

impl<B: Broker + ?Sized> Drop for CancelGuard<'_, B> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Execution interrupted; cancelling open orders");
            if let Err(e) = self.broker.cancel_all_orders() {
                error!("Cancel after failed execution also failed: {e}");
            }
        }
    }
}

/// Submit `orders`, wait `settlement`, collect this batch's fills and cancel
/// whatever is still open.
///
/// Returns `None` when there is nothing to submit. A broker failure during
/// submission aborts the pass; open orders are still cancelled.
pub fn execute<B: Broker + ?Sized>(
    broker: &mut B,
    account: &str,
    orders: &[PricedOrder],
    settlement: Duration,
) -> Result<Option<ExecutionReport>> {
    if orders.is_empty() {
        debug!("No priced orders to execute");
        return Ok(None);
    }

    let session = Session::open(broker).at(Stage::Execution, account)?;
    let guard = CancelGuard::new(&*session);

    // Idle -> Submitted
    let mut order_ids = Vec::with_capacity(orders.len());
    for order in orders {
        let limit = LimitOrder::from(order);
        let id = session
            .submit_limit_order(account, &limit)
            .at(Stage::Execution, account)?;
        info!(
            "Submitted {} {} {} {} @ {}",
            id, limit.side, limit.quantity, limit.instrument, limit.limit
        );
        order_ids.push(id);
    }

    // Submitted -> Waiting
    info!(
        "Waiting {}s for {} orders to settle",
        settlement.as_secs(),
        order_ids.len()
    );
    thread::sleep(settlement);

    // Waiting -> Reconciled
    let batch: FxHashSet<OrderId> = order_ids.iter().copied().collect();
    let fills: Vec<Fill> = session
        .fills(account)
        .at(Stage::Execution, account)?
        .into_iter()
        .filter(|f| batch.contains(&f.order_id))
        .collect();
    info!("{} fills for {} orders", fills.len(), order_ids.len());

    // Reconciled -> Done
    guard.complete().at(Stage::Execution, account)?;

    Ok(Some(ExecutionReport { order_ids, fills }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use balancer::{InstrumentId, Price};
    use balancer_broker::paper::{FillMode, PaperBroker};

    const ACCT: &str = "DU1";

    fn broker(mode: FillMode) -> PaperBroker {
        PaperBroker::builder()
            .fill_mode(mode)
            .with_account(ACCT, 100_000_00)
            .with_instrument(InstrumentId(1), "AAA", 100.0, 1_000_000.0)
            .with_instrument(InstrumentId(2), "BBB", 50.0, 1_000_000.0)
            .build()
    }

    fn order(n: i64, quantity: i64, limit: i64) -> PricedOrder {
        PricedOrder {
            instrument: InstrumentId(n),
            quantity,
            limit: Price(limit),
            value: quantity * limit,
        }
    }

    #[test]
    fn nothing_to_submit_is_none() {
        let mut b = broker(FillMode::Full);
        assert_eq!(execute(&mut b, ACCT, &[], Duration::ZERO).unwrap(), None);
        assert_eq!(b.cancel_calls(), 0);
    }

    #[test]
    fn full_fill_round_trip() {
        let mut b = broker(FillMode::Full);
        let report = execute(
            &mut b,
            ACCT,
            &[order(1, 10, 100_00), order(2, 20, 50_00)],
            Duration::ZERO,
        )
        .unwrap()
        .unwrap();

        assert_eq!(report.order_ids.len(), 2);
        assert_eq!(report.fills.len(), 2);
        assert_eq!(b.cancel_calls(), 1);
    }

    #[test]
    fn unfilled_orders_are_cancelled() {
        let mut b = broker(FillMode::None);
        let report = execute(&mut b, ACCT, &[order(1, 10, 100_00)], Duration::ZERO)
            .unwrap()
            .unwrap();
        assert!(report.fills.is_empty());
        assert!(b.open_orders().is_empty());
        assert_eq!(b.cancel_calls(), 1);
    }

    #[test]
    fn earlier_fills_are_not_reported() {
        let mut b = broker(FillMode::Full);
        execute(&mut b, ACCT, &[order(1, 1, 100_00)], Duration::ZERO).unwrap();
        let second = execute(&mut b, ACCT, &[order(2, 2, 50_00)], Duration::ZERO)
            .unwrap()
            .unwrap();
        assert_eq!(second.fills.len(), 1);
        assert_eq!(second.fills[0].instrument, InstrumentId(2));
    }
}
