//! Live account snapshot and instrument directory.

use balancer::{CashBalance, Instrument, InstrumentId, PositionLine};
use balancer_broker::{Broker, Position, Session};
use log::debug;
use rustc_hash::FxHashMap;

use crate::error::{BrokerContext, Result, Stage};

/// Cash and positions of one account at one instant.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub cash: CashBalance,
    pub positions: Vec<Position>,
}

impl Snapshot {
    /// Fetch cash and positions in a single broker session.
    pub fn take<B: Broker + ?Sized>(broker: &mut B, account: &str) -> Result<Self> {
        let session = Session::open(broker).at(Stage::Snapshot, account)?;
        let cash = session.cash_balance(account).at(Stage::Snapshot, account)?;
        let positions = session.positions(account).at(Stage::Snapshot, account)?;
        debug!(
            "Snapshot {account}: {} positions, {} cash",
            positions.len(),
            cash.balance
        );
        Ok(Self { cash, positions })
    }

    pub fn lines(&self) -> Vec<PositionLine> {
        self.positions.iter().map(Position::line).collect()
    }
}

/// Display names for every instrument seen in a run.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    instruments: FxHashMap<InstrumentId, Instrument>,
}

impl Directory {
    pub fn insert(&mut self, instrument: Instrument) {
        self.instruments.insert(instrument.id, instrument);
    }

    pub fn get(&self, id: InstrumentId) -> Option<&Instrument> {
        self.instruments.get(&id)
    }

    /// Symbol when known, else the bare contract id.
    pub fn label(&self, id: InstrumentId) -> String {
        self.get(id)
            .map_or_else(|| id.to_string(), |inst| inst.symbol.clone())
    }
}

impl Extend<Instrument> for Directory {
    fn extend<I: IntoIterator<Item = Instrument>>(&mut self, iter: I) {
        for instrument in iter {
            self.insert(instrument);
        }
    }
}
