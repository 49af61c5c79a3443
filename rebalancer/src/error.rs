//! Error types for the rebalancer.

use std::fmt;
use std::path::PathBuf;

use balancer_broker::BrokerError;

/// The broker operation an error surfaced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Accounts,
    Resolve,
    Snapshot,
    Pricing,
    Constraints,
    OrderPricing,
    Execution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connect => "connect",
            Stage::Accounts => "accounts",
            Stage::Resolve => "resolve",
            Stage::Snapshot => "snapshot",
            Stage::Pricing => "pricing",
            Stage::Constraints => "constraints",
            Stage::OrderPricing => "order_pricing",
            Stage::Execution => "execution",
        };
        f.write_str(name)
    }
}

/// All errors that can occur during rebalancer operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("target model error: {0}")]
    Model(String),

    #[error("failed to read target model {path}: {source}")]
    ModelRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse target model YAML: {0}")]
    ModelParse(#[from] serde_yaml::Error),

    #[error("invalid target model: {0}")]
    Targets(#[from] balancer::TargetError),

    #[error("failed to load market file {path}: {reason}")]
    Market { path: PathBuf, reason: String },

    #[error("no account configured; managed accounts: {}", available.join(", "))]
    AccountUnspecified { available: Vec<String> },

    #[error("account {account} is not managed by this login (managed: {})", available.join(", "))]
    UnknownAccount {
        account: String,
        available: Vec<String>,
    },

    #[error("broker error at stage {stage} (account {account}): {source}")]
    Broker {
        stage: Stage,
        account: String,
        #[source]
        source: BrokerError,
    },

    #[error("execution aborted: {0}")]
    Aborted(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

impl Error {
    /// True for errors raised before any trading call was made.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::ConfigRead { .. }
                | Error::ConfigParse(_)
                | Error::Model(_)
                | Error::ModelRead { .. }
                | Error::ModelParse(_)
                | Error::Targets(_)
                | Error::Market { .. }
                | Error::AccountUnspecified { .. }
                | Error::UnknownAccount { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach stage and account context to a broker result.
pub trait BrokerContext<T> {
    fn at(self, stage: Stage, account: &str) -> Result<T>;
}

impl<T> BrokerContext<T> for std::result::Result<T, BrokerError> {
    fn at(self, stage: Stage, account: &str) -> Result<T> {
        self.map_err(|source| Error::Broker {
            stage,
            account: account.to_string(),
            source,
        })
    }
}
