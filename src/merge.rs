//! Target tables and the snapshot/target outer join.

use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::TargetError;
use crate::types::{Cents, InstrumentId, Shares};

/// One instrument's target weight, in percent of total portfolio value.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetLine {
    pub instrument: InstrumentId,
    pub percent: f64,
}

/// Validated target allocation: instrument lines, cash percent and tolerance band.
///
/// Percents that do not sum to 100 are accepted on purpose; the shortfall or
/// excess simply shows up as cash drift. A warning is logged.
#[derive(Clone, Debug, PartialEq)]
pub struct Targets {
    lines: Vec<TargetLine>,
    cash_percent: f64,
    tolerance_percent: f64,
}

fn check_percent(what: impl FnOnce() -> String, percent: f64) -> Result<(), TargetError> {
    if !(0.0..=100.0).contains(&percent) {
        return Err(TargetError::PercentOutOfRange {
            what: what(),
            percent,
        });
    }
    Ok(())
}

impl Targets {
    pub fn new(
        lines: Vec<TargetLine>,
        cash_percent: f64,
        tolerance_percent: f64,
    ) -> Result<Self, TargetError> {
        let mut seen = FxHashSet::default();
        for line in &lines {
            if !seen.insert(line.instrument) {
                return Err(TargetError::DuplicateInstrument(line.instrument));
            }
            check_percent(|| format!("instrument {}", line.instrument), line.percent)?;
        }
        check_percent(|| "cash".to_string(), cash_percent)?;
        if !tolerance_percent.is_finite() || tolerance_percent < 0.0 {
            return Err(TargetError::InvalidTolerance(tolerance_percent));
        }

        let targets = Self {
            lines,
            cash_percent,
            tolerance_percent,
        };
        let total = targets.total_percent();
        if (total - 100.0).abs() > 1e-6 {
            warn!("Target percents sum to {total:.2}%, not 100%; running in permissive mode");
        }
        Ok(targets)
    }

    pub fn lines(&self) -> &[TargetLine] {
        &self.lines
    }

    pub fn cash_percent(&self) -> f64 {
        self.cash_percent
    }

    pub fn tolerance_percent(&self) -> f64 {
        self.tolerance_percent
    }

    /// Sum of all instrument percents plus cash.
    pub fn total_percent(&self) -> f64 {
        self.lines.iter().map(|l| l.percent).sum::<f64>() + self.cash_percent
    }
}

/// A live position as reported by the broker.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionLine {
    pub instrument: InstrumentId,
    pub quantity: Shares,
    /// Informational only.
    pub avg_cost: f64,
}

/// Live cash balance in the account's single currency.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CashBalance {
    pub currency: String,
    pub balance: Cents,
}

/// Position joined with its target percent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetedLine {
    pub instrument: InstrumentId,
    pub quantity: Shares,
    pub avg_cost: f64,
    pub percent_target: f64,
}

/// Cash joined with its target percent.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetedCash {
    pub currency: String,
    pub balance: Cents,
    pub percent_target: f64,
}

/// Output of [`merge`]: every instrument on either side, plus cash.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedPortfolio {
    pub positions: Vec<TargetedLine>,
    pub cash: TargetedCash,
    pub tolerance_percent: f64,
}

/// Outer-join live positions with the target model on instrument id.
///
/// Instruments held but absent from the model get a 0% target (divest);
/// instruments in the model but not held get quantity 0. Duplicate position
/// rows for one instrument are summed. Output is sorted by instrument id.
pub fn merge(positions: &[PositionLine], cash: &CashBalance, targets: &Targets) -> MergedPortfolio {
    let mut joined: FxHashMap<InstrumentId, TargetedLine> = FxHashMap::default();

    for pos in positions {
        joined
            .entry(pos.instrument)
            .and_modify(|line| line.quantity += pos.quantity)
            .or_insert(TargetedLine {
                instrument: pos.instrument,
                quantity: pos.quantity,
                avg_cost: pos.avg_cost,
                percent_target: 0.0,
            });
    }

    for target in targets.lines() {
        joined
            .entry(target.instrument)
            .and_modify(|line| line.percent_target = target.percent)
            .or_insert(TargetedLine {
                instrument: target.instrument,
                quantity: 0,
                avg_cost: 0.0,
                percent_target: target.percent,
            });
    }

    let mut lines: Vec<TargetedLine> = joined.into_values().collect();
    lines.sort_by_key(|l| l.instrument);

    MergedPortfolio {
        positions: lines,
        cash: TargetedCash {
            currency: cash.currency.clone(),
            balance: cash.balance,
            percent_target: targets.cash_percent(),
        },
        tolerance_percent: targets.tolerance_percent(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i64) -> InstrumentId {
        InstrumentId(n)
    }

    fn usd(balance: Cents) -> CashBalance {
        CashBalance {
            currency: "USD".into(),
            balance,
        }
    }

    fn pos(n: i64, quantity: Shares) -> PositionLine {
        PositionLine {
            instrument: id(n),
            quantity,
            avg_cost: 10.0,
        }
    }

    fn targets(lines: &[(i64, f64)], cash: f64) -> Targets {
        Targets::new(
            lines
                .iter()
                .map(|&(n, percent)| TargetLine {
                    instrument: id(n),
                    percent,
                })
                .collect(),
            cash,
            5.0,
        )
        .unwrap()
    }

    #[test]
    fn outer_join_covers_both_sides() {
        let merged = merge(
            &[pos(1, 100), pos(2, 50)],
            &usd(1_000_00),
            &targets(&[(2, 40.0), (3, 50.0)], 10.0),
        );

        assert_eq!(merged.positions.len(), 3);
        let by_id: Vec<_> = merged
            .positions
            .iter()
            .map(|l| (l.instrument.0, l.quantity, l.percent_target))
            .collect();
        assert_eq!(by_id, vec![(1, 100, 0.0), (2, 50, 40.0), (3, 0, 50.0)]);
        assert_eq!(merged.cash.percent_target, 10.0);
        assert_eq!(merged.cash.balance, 1_000_00);
        assert_eq!(merged.tolerance_percent, 5.0);
    }

    #[test]
    fn duplicate_position_rows_are_summed() {
        let merged = merge(
            &[pos(1, 100), pos(1, 25)],
            &usd(0),
            &targets(&[(1, 100.0)], 0.0),
        );
        assert_eq!(merged.positions.len(), 1);
        assert_eq!(merged.positions[0].quantity, 125);
    }

    #[test]
    fn empty_snapshot_yields_targets_only() {
        let merged = merge(&[], &usd(10_000_00), &targets(&[(9, 60.0)], 40.0));
        assert_eq!(merged.positions.len(), 1);
        assert_eq!(merged.positions[0].quantity, 0);
    }

    #[test]
    fn reject_duplicate_target() {
        let err = Targets::new(
            vec![
                TargetLine {
                    instrument: id(1),
                    percent: 10.0,
                },
                TargetLine {
                    instrument: id(1),
                    percent: 20.0,
                },
            ],
            70.0,
            5.0,
        )
        .unwrap_err();
        assert_eq!(err, TargetError::DuplicateInstrument(id(1)));
    }

    #[test]
    fn reject_out_of_range_percent() {
        let lines = vec![TargetLine {
            instrument: id(1),
            percent: 120.0,
        }];
        assert!(matches!(
            Targets::new(lines, 0.0, 5.0),
            Err(TargetError::PercentOutOfRange { .. })
        ));
        assert!(Targets::new(vec![], f64::NAN, 5.0).is_err());
    }

    #[test]
    fn reject_negative_tolerance() {
        assert_eq!(
            Targets::new(vec![], 100.0, -1.0),
            Err(TargetError::InvalidTolerance(-1.0))
        );
    }

    #[test]
    fn accept_sum_below_hundred() {
        let t = targets(&[(1, 50.0)], 30.0);
        assert!((t.total_percent() - 80.0).abs() < 1e-9);
    }
}
