// Allow our dollar.cents digit grouping convention (e.g., 100_00 = $100.00)
#![allow(clippy::inconsistent_digit_grouping)]

//! Edge-case tests: full merge → price → solve → constrain → limit runs.

use balancer::*;
use rustc_hash::FxHashMap;

fn id(n: i64) -> InstrumentId {
    InstrumentId(n)
}

fn usd(balance: Cents) -> CashBalance {
    CashBalance {
        currency: "USD".into(),
        balance,
    }
}

fn held(n: i64, quantity: Shares) -> PositionLine {
    PositionLine {
        instrument: id(n),
        quantity,
        avg_cost: 0.0,
    }
}

fn target(n: i64, percent: f64) -> TargetLine {
    TargetLine {
        instrument: id(n),
        percent,
    }
}

fn closing(n: i64, close: f64) -> Quote {
    Quote {
        instrument: id(n),
        close: Some(close),
        ..Default::default()
    }
}

fn two_sided(n: i64, bid: f64, ask: f64) -> Quote {
    Quote {
        instrument: id(n),
        bid: Some(bid),
        bid_size: Some(500.0),
        ask: Some(ask),
        ask_size: Some(500.0),
        ..Default::default()
    }
}

fn volumes(pairs: &[(i64, f64)]) -> FxHashMap<InstrumentId, f64> {
    pairs.iter().map(|&(n, v)| (id(n), v)).collect()
}

fn run(
    positions: &[PositionLine],
    cash: Cents,
    targets: &Targets,
    quotes: &[Quote],
) -> SolvedPortfolio {
    solve(price_portfolio(merge(positions, &usd(cash), targets), quotes))
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn sixty_forty_sells_down_to_target() {
    let targets = Targets::new(vec![target(1, 60.0)], 40.0, 5.0).unwrap();
    let solved = run(&[held(1, 100)], 0, &targets, &[closing(1, 100.0)]);

    let orders = constrain_orders(&solved, &volumes(&[(1, 10_000.0)]), &OrderLimits::default());
    assert_eq!(
        orders,
        vec![ConstrainedOrder {
            instrument: id(1),
            quantity: -40,
            value: -4_000_00,
        }]
    );

    let priced = price_orders(&orders, &[two_sided(1, 99.95, 100.05)], 0.02).unwrap();
    assert_eq!(priced[0].limit, Price(100_00));
    assert_eq!(priced[0].side(), Side::Sell);
    assert_eq!(priced[0].shares(), 40);
}

#[test]
fn floor_above_order_value_stops_everything() {
    let targets = Targets::new(vec![target(1, 60.0)], 40.0, 5.0).unwrap();
    let solved = run(&[held(1, 100)], 0, &targets, &[closing(1, 100.0)]);

    let limits = OrderLimits {
        min_order_value: 5_000_00,
        ..OrderLimits::default()
    };
    assert!(constrain_orders(&solved, &volumes(&[(1, 10_000.0)]), &limits).is_empty());
}

#[test]
fn thin_volume_caps_the_buy() {
    // $100k cash, 50% target in a $25 name trading 1,000 shares a day
    let targets = Targets::new(vec![target(1, 50.0)], 50.0, 1.0).unwrap();
    let solved = run(&[], 100_000_00, &targets, &[closing(1, 25.0)]);
    assert_eq!(solved.positions[0].position_target, Some(2_000));

    let limits = OrderLimits {
        min_order_value: 100_00,
        ..OrderLimits::default()
    };
    let orders = constrain_orders(&solved, &volumes(&[(1, 1_000.0)]), &limits);
    assert_eq!(orders[0].quantity, 20);
    assert_eq!(orders[0].value, 500_00);
}

#[test]
fn targeted_but_unheld_instrument_is_bought() {
    let targets = Targets::new(vec![target(1, 50.0), target(2, 50.0)], 0.0, 2.0).unwrap();
    let solved = run(
        &[held(1, 100)],
        5_000_00,
        &targets,
        &[closing(1, 50.0), closing(2, 20.0)],
    );

    let new_line = solved.line(id(2)).unwrap();
    assert_eq!(new_line.quantity, 0);
    assert_eq!(new_line.position_target, Some(250));
    assert!(new_line.out_of_band);

    let orders = constrain_orders(
        &solved,
        &volumes(&[(1, 1_000_000.0), (2, 1_000_000.0)]),
        &OrderLimits::default(),
    );
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].instrument, id(2));
    assert_eq!(orders[0].quantity, 250);
}

#[test]
fn held_but_untargeted_instrument_is_divested() {
    let targets = Targets::new(vec![target(1, 100.0)], 0.0, 5.0).unwrap();
    let solved = run(
        &[held(1, 50), held(9, 40)],
        0,
        &targets,
        &[closing(1, 100.0), closing(9, 100.0)],
    );

    let orphan = solved.line(id(9)).unwrap();
    assert_eq!(orphan.percent_target, 0.0);
    assert_eq!(orphan.position_target, Some(0));
    assert_eq!(orphan.optimal_order, -40);
    assert_eq!(orphan.percent_deviation, Some(f64::INFINITY));
}

#[test]
fn unpriced_line_is_left_alone() {
    let targets = Targets::new(vec![target(1, 50.0), target(2, 50.0)], 0.0, 5.0).unwrap();
    let solved = run(&[held(1, 10), held(2, 10)], 0, &targets, &[closing(2, 10.0)]);

    assert_eq!(solved.total_value, 100_00);
    let unpriced = solved.line(id(1)).unwrap();
    assert_eq!(unpriced.optimal_order, 0);
    assert!(!unpriced.out_of_band);

    let orders = constrain_orders(
        &solved,
        &volumes(&[(1, 1e6), (2, 1e6)]),
        &OrderLimits {
            min_order_value: 0,
            ..OrderLimits::default()
        },
    );
    assert!(orders.iter().all(|o| o.instrument != id(1)));
}

// ============================================================================
// Degenerate inputs
// ============================================================================

#[test]
fn empty_portfolio_is_in_band() {
    let targets = Targets::new(vec![], 100.0, 5.0).unwrap();
    let solved = run(&[], 0, &targets, &[]);
    assert_eq!(solved.total_value, 0);
    assert!(solved.positions.is_empty());
    assert!(!solved.is_out_of_band());
}

#[test]
fn zero_value_portfolio_never_divides_by_zero() {
    let targets = Targets::new(vec![target(1, 100.0)], 0.0, 5.0).unwrap();
    let solved = run(&[held(1, 0)], 0, &targets, &[closing(1, 10.0)]);
    let line = &solved.positions[0];
    assert_eq!(line.percent_held, Some(0.0));
    assert_eq!(line.percent_deviation, Some(0.0));
    assert_eq!(line.optimal_order, 0);
}

#[test]
fn sentinel_quotes_do_not_price() {
    let targets = Targets::new(vec![target(1, 100.0)], 0.0, 5.0).unwrap();
    let sentinel = Quote {
        instrument: id(1),
        bid: Some(-1.0),
        bid_size: Some(-1.0),
        ask: Some(-1.0),
        ask_size: Some(-1.0),
        close: Some(-1.0),
        ..Default::default()
    };
    let priced = price_portfolio(merge(&[held(1, 10)], &usd(0), &targets), &[sentinel]);
    assert_eq!(priced.positions[0].price, None);
    assert_eq!(priced.unpriced().count(), 1);
}

#[test]
fn invalid_targets_are_rejected() {
    assert!(matches!(
        Targets::new(vec![target(1, 101.0)], 0.0, 5.0),
        Err(TargetError::PercentOutOfRange { .. })
    ));
    assert!(matches!(
        Targets::new(vec![target(1, 50.0), target(1, 50.0)], 0.0, 5.0),
        Err(TargetError::DuplicateInstrument(InstrumentId(1)))
    ));
    assert!(matches!(
        Targets::new(vec![], 100.0, -1.0),
        Err(TargetError::InvalidTolerance(_))
    ));
}

#[test]
fn percents_not_summing_to_hundred_are_permitted() {
    let targets = Targets::new(vec![target(1, 30.0)], 30.0, 5.0).unwrap();
    assert_eq!(targets.total_percent(), 60.0);
}
