//! TOML configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use balancer::{Cents, OrderLimits};
use balancer_broker::paper::{Market, PaperBroker};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub constraints: ConstraintsConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountConfig {
    /// Account to trade. When unset, a login with a single managed account uses it.
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConstraintsConfig {
    #[serde(default = "default_daily_vol_pct")]
    pub daily_vol_pct_limit: f64,
    #[serde(default = "default_min_order")]
    pub min_order_usd: f64,
    #[serde(default = "default_max_order")]
    pub max_order_usd: f64,
    #[serde(default = "default_lookback")]
    pub volume_lookback_days: u32,
    #[serde(default = "default_spread_tolerance")]
    pub spread_tolerance: f64,
}

fn default_daily_vol_pct() -> f64 {
    0.02
}
fn default_min_order() -> f64 {
    1_000.0
}
fn default_max_order() -> f64 {
    10_000.0
}
fn default_lookback() -> u32 {
    10
}
fn default_spread_tolerance() -> f64 {
    0.02
}

impl Default for ConstraintsConfig {
    fn default() -> Self {
        Self {
            daily_vol_pct_limit: default_daily_vol_pct(),
            min_order_usd: default_min_order(),
            max_order_usd: default_max_order(),
            volume_lookback_days: default_lookback(),
            spread_tolerance: default_spread_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Wait between submission and fill collection inside the loop.
    #[serde(default = "default_settlement")]
    pub settlement_secs: u64,
    /// Wait used by the single-pass `once` command.
    #[serde(default = "default_standalone_settlement")]
    pub standalone_settlement_secs: u64,
    /// 0 disables the bound.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_stagnation_window")]
    pub stagnation_window: usize,
}

fn default_settlement() -> u64 {
    30
}
fn default_standalone_settlement() -> u64 {
    60
}
fn default_max_iterations() -> usize {
    100
}
fn default_stagnation_window() -> usize {
    10
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            settlement_secs: default_settlement(),
            standalone_settlement_secs: default_standalone_settlement(),
            max_iterations: default_max_iterations(),
            stagnation_window: default_stagnation_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
    #[serde(default = "default_history_file")]
    pub history_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}
fn default_history_file() -> String {
    "history.jsonl".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
            history_file: default_history_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperConfig {
    #[serde(default = "default_market_file")]
    pub market_file: PathBuf,
}

fn default_market_file() -> PathBuf {
    PathBuf::from("market.toml")
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            market_file: default_market_file(),
        }
    }
}

fn usd_to_cents(usd: f64) -> Cents {
    (usd * 100.0).round() as Cents
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        if self.account.id.as_deref().is_some_and(str::is_empty) {
            return Err(Error::Config("account id must not be empty".into()));
        }
        let c = &self.constraints;
        if !(c.daily_vol_pct_limit > 0.0 && c.daily_vol_pct_limit <= 1.0) {
            return Err(Error::Config(
                "daily_vol_pct_limit must be in (0.0, 1.0]".into(),
            ));
        }
        if c.min_order_usd < 0.0 {
            return Err(Error::Config("min_order_usd must be >= 0".into()));
        }
        if c.max_order_usd <= c.min_order_usd {
            return Err(Error::Config(
                "max_order_usd must be greater than min_order_usd".into(),
            ));
        }
        if !(c.spread_tolerance > 0.0 && c.spread_tolerance < 1.0) {
            return Err(Error::Config("spread_tolerance must be in (0.0, 1.0)".into()));
        }
        if c.volume_lookback_days == 0 {
            return Err(Error::Config("volume_lookback_days must be > 0".into()));
        }
        if self.execution.stagnation_window < 2 {
            return Err(Error::Config("stagnation_window must be >= 2".into()));
        }
        Ok(())
    }

    /// Order limits for one run; `buy_only` comes from the target model.
    pub fn order_limits(&self, buy_only: bool) -> OrderLimits {
        OrderLimits {
            daily_vol_pct_limit: self.constraints.daily_vol_pct_limit,
            min_order_value: usd_to_cents(self.constraints.min_order_usd),
            max_order_value: usd_to_cents(self.constraints.max_order_usd),
            buy_only,
        }
    }

    /// Settlement wait for the loop, or for the single-pass command.
    pub fn settlement(&self, standalone: bool) -> Duration {
        Duration::from_secs(if standalone {
            self.execution.standalone_settlement_secs
        } else {
            self.execution.settlement_secs
        })
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }

    /// Full path to the rebalance history file.
    pub fn history_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.history_file)
    }
}

impl PaperConfig {
    /// Read the market file and seed a paper broker from it.
    pub fn broker(&self) -> Result<PaperBroker> {
        let market_err = |reason: String| Error::Market {
            path: self.market_file.clone(),
            reason,
        };
        let contents = std::fs::read_to_string(&self.market_file)
            .map_err(|e| market_err(e.to_string()))?;
        let market: Market = toml::from_str(&contents).map_err(|e| market_err(e.to_string()))?;
        PaperBroker::from_market(market).map_err(|e| market_err(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_toml() -> &'static str {
        r#"
[account]
id = "DU123456"

[constraints]
daily_vol_pct_limit = 0.05
min_order_usd = 500.0
max_order_usd = 25000.0
volume_lookback_days = 20
spread_tolerance = 0.01

[execution]
settlement_secs = 15
standalone_settlement_secs = 45
max_iterations = 0
stagnation_window = 5

[logging]
dir = "./logs"
audit_file = "audit.jsonl"
history_file = "history.jsonl"

[paper]
market_file = "market.toml"
"#
    }

    #[test]
    fn parse_example_config() {
        let config = Config::from_toml(example_toml()).unwrap();
        assert_eq!(config.account.id.as_deref(), Some("DU123456"));
        assert_eq!(config.constraints.daily_vol_pct_limit, 0.05);
        assert_eq!(config.constraints.volume_lookback_days, 20);
        assert_eq!(config.execution.max_iterations, 0);
        assert_eq!(config.settlement(false), Duration::from_secs(15));
        assert_eq!(config.settlement(true), Duration::from_secs(45));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.account.id, None);
        assert_eq!(config.constraints.daily_vol_pct_limit, 0.02);
        assert_eq!(config.constraints.volume_lookback_days, 10);
        assert_eq!(config.execution.settlement_secs, 30);
        assert_eq!(config.execution.standalone_settlement_secs, 60);
        assert_eq!(config.execution.max_iterations, 100);
        assert_eq!(config.execution.stagnation_window, 10);
        assert_eq!(config.paper.market_file, PathBuf::from("market.toml"));
    }

    #[test]
    fn order_limits_in_cents() {
        let limits = Config::default().order_limits(true);
        assert_eq!(limits.min_order_value, 1_000_00);
        assert_eq!(limits.max_order_value, 10_000_00);
        assert!(limits.buy_only);
    }

    #[test]
    fn validate_catches_bad_volume_limit() {
        let mut config = Config::default();
        config.constraints.daily_vol_pct_limit = 0.0;
        assert!(config.validate().is_err());
        config.constraints.daily_vol_pct_limit = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_inverted_order_band() {
        let mut config = Config::default();
        config.constraints.min_order_usd = 20_000.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_empty_account() {
        let toml = "[account]\nid = \"\"\n";
        assert!(matches!(Config::from_toml(toml), Err(Error::Config(_))));
    }

    #[test]
    fn unknown_field_type_is_parse_error() {
        let toml = "[execution]\nsettlement_secs = \"soon\"\n";
        assert!(matches!(Config::from_toml(toml), Err(Error::ConfigParse(_))));
    }

    #[test]
    fn paths() {
        let config = Config::default();
        assert_eq!(config.audit_path(), PathBuf::from("./logs/audit.jsonl"));
        assert_eq!(config.history_path(), PathBuf::from("./logs/history.jsonl"));
    }

    #[test]
    fn missing_market_file() {
        let paper = PaperConfig {
            market_file: PathBuf::from("/nonexistent/market.toml"),
        };
        assert!(matches!(paper.broker(), Err(Error::Market { .. })));
    }
}
