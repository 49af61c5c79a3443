//! Broker error types.

/// Errors that can occur during broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("order error: {0}")]
    Order(String),

    #[error("not connected")]
    NotConnected,

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("cannot resolve instrument: {0}")]
    UnknownInstrument(String),

    #[error("market data error: {0}")]
    Data(String),

    #[error("{0}")]
    Other(String),
}
