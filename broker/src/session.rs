//! Scoped broker connections.
//!
//! ```ignore
//! let session = Session::open(&mut broker)?;
//! let positions = session.positions("DU111111")?;
//! // disconnected here
//! ```

use std::ops::Deref;

use log::{debug, warn};

use crate::Broker;
use crate::error::BrokerError;

/// A live connection that is released when dropped.
///
/// Derefs to the underlying broker so every [`Broker`] query is available
/// for the lifetime of the session.
pub struct Session<'a, B: Broker + ?Sized> {
    broker: &'a mut B,
}

impl<'a, B: Broker + ?Sized> Session<'a, B> {
    /// Connect and hold the connection until the session is dropped.
    pub fn open(broker: &'a mut B) -> Result<Self, BrokerError> {
        broker.connect()?;
        debug!("Broker session opened");
        Ok(Self { broker })
    }
}

impl<B: Broker + ?Sized> Deref for Session<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.broker
    }
}

impl<B: Broker + ?Sized> Drop for Session<'_, B> {
    fn drop(&mut self) {
        match self.broker.disconnect() {
            Ok(()) => debug!("Broker session closed"),
            Err(e) => warn!("Broker disconnect failed: {e}"),
        }
    }
}
