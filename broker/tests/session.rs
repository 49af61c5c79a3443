// Allow our dollar.cents digit grouping convention (e.g., 100_00 = $100.00)
#![allow(clippy::inconsistent_digit_grouping)]

//! Session scoping and market-file seeding against the paper broker.

use balancer::{InstrumentId, Price, Side};
use balancer_broker::paper::{FillMode, Market, MarketAccount, MarketInstrument, MarketPosition, PaperBroker};
use balancer_broker::{Broker, BrokerError, LimitOrder, Session};

fn market() -> Market {
    Market {
        fill_mode: FillMode::Full,
        accounts: vec![MarketAccount {
            id: "DU1".into(),
            currency: "USD".into(),
            cash: 2_500.25,
            positions: vec![MarketPosition {
                symbol: "BBB".into(),
                quantity: 30,
                avg_cost: 41.0,
            }],
        }],
        instruments: vec![MarketInstrument {
            id: 42,
            symbol: "BBB".into(),
            exchange: "SMART".into(),
            currency: "USD".into(),
            bid: Some(49.98),
            ask: Some(50.02),
            bid_size: 300.0,
            ask_size: 300.0,
            last: None,
            close: Some(50.0),
            volume: 120_000.0,
        }],
    }
}

#[test]
fn session_connects_and_disconnects() {
    let mut broker = PaperBroker::from_market(market()).unwrap();
    assert_eq!(broker.sessions_opened(), 0);
    {
        let session = Session::open(&mut broker).unwrap();
        assert_eq!(session.managed_accounts().unwrap(), vec!["DU1".to_string()]);
    }
    assert_eq!(broker.sessions_opened(), 1);
    assert!(matches!(
        broker.managed_accounts(),
        Err(BrokerError::NotConnected)
    ));
}

#[test]
fn market_file_seeds_cash_positions_and_volume() {
    let mut broker = PaperBroker::from_market(market()).unwrap();
    let session = Session::open(&mut broker).unwrap();

    assert_eq!(session.cash_balance("DU1").unwrap().balance, 2_500_25);

    let positions = session.positions("DU1").unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].instrument.symbol, "BBB");
    assert_eq!(positions[0].line().instrument, InstrumentId(42));
    assert_eq!(positions[0].quantity, 30);

    let volumes = session.historical_volume(&[InstrumentId(42)], 10).unwrap();
    assert_eq!(volumes, vec![(InstrumentId(42), 120_000.0)]);
}

#[test]
fn fills_persist_across_sessions() {
    let mut broker = PaperBroker::from_market(market()).unwrap();
    {
        let session = Session::open(&mut broker).unwrap();
        let order = LimitOrder {
            instrument: InstrumentId(42),
            side: Side::Sell,
            quantity: 10,
            limit: Price(50_00),
        };
        session.submit_limit_order("DU1", &order).unwrap();
    }

    let session = Session::open(&mut broker).unwrap();
    assert_eq!(session.positions("DU1").unwrap()[0].quantity, 20);
    assert_eq!(session.cash_balance("DU1").unwrap().balance, 3_000_25);
    assert_eq!(session.fills("DU1").unwrap().len(), 1);
}

#[test]
fn position_in_unlisted_symbol_is_rejected() {
    let mut bad = market();
    bad.accounts[0].positions[0].symbol = "ZZZ".into();
    assert!(matches!(
        PaperBroker::from_market(bad),
        Err(BrokerError::UnknownInstrument(_))
    ));
}
