//! Target model (model.yaml) loading and validation.
//!
//! The model is re-read at the start of every loop iteration, so edits made
//! while a rebalance is running take effect on the next pass.

use std::path::Path;

use balancer::{Instrument, TargetLine, Targets};
use balancer_broker::InstrumentSpec;
use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Desired allocation: per-instrument percents, cash percent and tolerance band.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetModel {
    #[serde(default)]
    pub positions: Vec<ModelPosition>,
    pub cash: Percent,
    pub tolerance: Percent,
    #[serde(default)]
    pub buy_only: bool,
    #[serde(default)]
    pub cooldown: Option<Cooldown>,
}

/// One instrument line of the model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelPosition {
    pub symbol: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Percent {
    pub percent: f64,
}

/// Minimum spacing between trading runs.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Cooldown {
    pub days: u32,
}

fn default_exchange() -> String {
    "SMART".into()
}

fn default_currency() -> String {
    "USD".into()
}

fn check_percent(what: &str, percent: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&percent) {
        return Err(Error::Model(format!(
            "percent for {what} is {percent}, expected 0..=100"
        )));
    }
    Ok(())
}

impl TargetModel {
    /// Load and validate a model YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ModelRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse from a YAML string (useful for testing).
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let model: TargetModel = serde_yaml::from_str(yaml)?;
        model.validate()?;
        Ok(model)
    }

    /// Validate the model before any broker call is made.
    fn validate(&self) -> Result<()> {
        let mut seen = FxHashSet::default();
        for p in &self.positions {
            if p.symbol.trim().is_empty() {
                return Err(Error::Model("empty symbol".into()));
            }
            if !seen.insert((&p.symbol, &p.exchange, &p.currency)) {
                return Err(Error::Model(format!("duplicate symbol: {}", p.symbol)));
            }
            check_percent(&p.symbol, p.percent)?;
        }
        check_percent("cash", self.cash.percent)?;
        if !self.tolerance.percent.is_finite() || self.tolerance.percent < 0.0 {
            return Err(Error::Model(format!(
                "tolerance percent must be >= 0, got {}",
                self.tolerance.percent
            )));
        }
        Ok(())
    }

    /// Instrument specs to resolve, in model order.
    pub fn specs(&self) -> Vec<InstrumentSpec> {
        self.positions
            .iter()
            .map(|p| InstrumentSpec {
                symbol: p.symbol.clone(),
                exchange: p.exchange.clone(),
                currency: p.currency.clone(),
            })
            .collect()
    }

    /// Build the engine's target table from instruments resolved in model order.
    pub fn targets(&self, resolved: &[Instrument]) -> Result<Targets> {
        if resolved.len() != self.positions.len() {
            return Err(Error::Model(format!(
                "{} instruments resolved for {} model positions",
                resolved.len(),
                self.positions.len()
            )));
        }
        let lines = self
            .positions
            .iter()
            .zip(resolved)
            .map(|(p, inst)| TargetLine {
                instrument: inst.id,
                percent: p.percent,
            })
            .collect();
        Ok(Targets::new(lines, self.cash.percent, self.tolerance.percent)?)
    }

    /// Cooldown as a duration, if configured.
    pub fn cooldown(&self) -> Option<chrono::Duration> {
        self.cooldown
            .filter(|c| c.days > 0)
            .map(|c| chrono::Duration::days(i64::from(c.days)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use balancer::InstrumentId;

    fn valid_yaml() -> &'static str {
        r#"
positions:
  - symbol: AAA
    exchange: SMART
    currency: USD
    percent: 60
  - symbol: BBB
    percent: 30
cash:
  percent: 10
tolerance:
  percent: 5
buy_only: true
cooldown:
  days: 7
"#
    }

    fn inst(n: i64, symbol: &str) -> Instrument {
        Instrument {
            id: InstrumentId(n),
            symbol: symbol.into(),
            exchange: "SMART".into(),
            currency: "USD".into(),
        }
    }

    #[test]
    fn parse_valid_model() {
        let model = TargetModel::from_yaml(valid_yaml()).unwrap();
        assert_eq!(model.positions.len(), 2);
        assert_eq!(model.positions[1].exchange, "SMART");
        assert_eq!(model.positions[1].currency, "USD");
        assert_eq!(model.cash.percent, 10.0);
        assert_eq!(model.tolerance.percent, 5.0);
        assert!(model.buy_only);
        assert_eq!(model.cooldown(), Some(chrono::Duration::days(7)));
    }

    #[test]
    fn optional_fields_default() {
        let yaml = "cash: {percent: 100}\ntolerance: {percent: 1}\n";
        let model = TargetModel::from_yaml(yaml).unwrap();
        assert!(model.positions.is_empty());
        assert!(!model.buy_only);
        assert_eq!(model.cooldown(), None);
    }

    #[test]
    fn targets_follow_resolution_order() {
        let model = TargetModel::from_yaml(valid_yaml()).unwrap();
        let targets = model
            .targets(&[inst(11, "AAA"), inst(22, "BBB")])
            .unwrap();
        assert_eq!(targets.lines()[0].instrument, InstrumentId(11));
        assert_eq!(targets.lines()[1].percent, 30.0);
        assert_eq!(targets.cash_percent(), 10.0);
        assert_eq!(targets.total_percent(), 100.0);
    }

    #[test]
    fn two_symbols_resolving_to_one_contract_is_rejected() {
        let model = TargetModel::from_yaml(valid_yaml()).unwrap();
        assert!(matches!(
            model.targets(&[inst(11, "AAA"), inst(11, "AAA")]),
            Err(Error::Targets(_))
        ));
    }

    #[test]
    fn reject_duplicate_symbol() {
        let yaml = r#"
positions:
  - {symbol: AAA, percent: 50}
  - {symbol: AAA, percent: 50}
cash: {percent: 0}
tolerance: {percent: 5}
"#;
        let err = TargetModel::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate symbol"));
    }

    #[test]
    fn reject_percent_out_of_range() {
        let yaml = "positions: [{symbol: AAA, percent: 120}]\ncash: {percent: 0}\ntolerance: {percent: 5}\n";
        assert!(matches!(TargetModel::from_yaml(yaml), Err(Error::Model(_))));
    }

    #[test]
    fn reject_negative_tolerance() {
        let yaml = "cash: {percent: 100}\ntolerance: {percent: -1}\n";
        assert!(matches!(TargetModel::from_yaml(yaml), Err(Error::Model(_))));
    }

    #[test]
    fn missing_cash_is_parse_error() {
        let yaml = "tolerance: {percent: 5}\n";
        assert!(matches!(
            TargetModel::from_yaml(yaml),
            Err(Error::ModelParse(_))
        ));
    }

    #[test]
    fn percents_need_not_sum_to_hundred() {
        let yaml = "positions: [{symbol: AAA, percent: 20}]\ncash: {percent: 20}\ntolerance: {percent: 5}\n";
        assert!(TargetModel::from_yaml(yaml).is_ok());
    }
}
