//! Rebalance loop: snapshot → price → solve → constrain → price orders →
//! execute, repeated until the portfolio converges or stops improving.
//!
//! Each pass re-reads the target model and rebuilds every table from a fresh
//! snapshot; only the history carries over between passes.
//!
//! | state | next |
//! |-------|------|
//! | Converging | Stagnant, Converged, IterationLimit or Trading |
//! | Trading | Converging (after execution) |

use std::fmt;
use std::path::{Path, PathBuf};

use balancer::{
    InstrumentId, PricedOrder, SolvedPortfolio, constrain_orders, merge, price_orders,
    price_portfolio, solve,
};
use balancer_broker::{Broker, Session};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rustc_hash::FxHashMap;

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::error::{BrokerContext, Error, Result, Stage};
use crate::execution::{self, ExecutionReport};
use crate::history::{History, HistoryLog};
use crate::model::TargetModel;
use crate::report::Reporter;
use crate::snapshot::{Directory, Snapshot};

/// How a rebalance run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Every line, cash included, is inside its tolerance band.
    Converged { runs: usize },
    /// The mean deviation has not moved over the stagnation window.
    Stagnant { runs: usize, mean_deviation: f64 },
    /// `max_iterations` passes without converging.
    IterationLimit { runs: usize },
    /// The model's cooldown has not elapsed since the last submission.
    CooldownActive {
        last_trade: DateTime<Utc>,
        next_allowed: DateTime<Utc>,
    },
    /// Orders were computed but not submitted.
    DryRun { orders: usize },
    /// A single pass submitted orders.
    Executed { orders: usize, fills: usize },
}

impl Outcome {
    /// Short machine-readable name for the audit trail.
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Converged { .. } => "converged",
            Outcome::Stagnant { .. } => "stagnant",
            Outcome::IterationLimit { .. } => "iteration_limit",
            Outcome::CooldownActive { .. } => "cooldown_active",
            Outcome::DryRun { .. } => "dry_run",
            Outcome::Executed { .. } => "executed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Converged { runs } => {
                write!(f, "Portfolio converged after {runs} run(s).")
            }
            Outcome::Stagnant {
                runs,
                mean_deviation,
            } => write!(
                f,
                "Rebalancing stagnated after {runs} runs at mean deviation {mean_deviation:.2}%. \
                 Orders are no longer moving the portfolio; review limits and rebalance manually."
            ),
            Outcome::IterationLimit { runs } => {
                write!(f, "Stopped after {runs} runs without converging.")
            }
            Outcome::CooldownActive {
                last_trade,
                next_allowed,
            } => write!(
                f,
                "Cooldown active: last orders submitted {}, next run allowed after {}.",
                last_trade.format("%Y-%m-%d %H:%M UTC"),
                next_allowed.format("%Y-%m-%d %H:%M UTC")
            ),
            Outcome::DryRun { orders } => {
                write!(f, "[DRY RUN] {orders} order(s) computed, none submitted.")
            }
            Outcome::Executed { orders, fills } => {
                write!(f, "{orders} order(s) submitted, {fills} fill(s).")
            }
        }
    }
}

/// Options for a rebalance run.
pub struct RunOptions {
    pub model_path: PathBuf,
    pub dry_run: bool,
    /// Skip the confirmation before the first submission.
    pub force: bool,
}

/// Pick the account to trade.
///
/// A configured account must be managed by the login. Without one, a single
/// managed account is used; several are a configuration error naming them.
pub fn select_account<B: Broker + ?Sized>(broker: &mut B, configured: Option<&str>) -> Result<String> {
    let label = configured.unwrap_or("-");
    let session = Session::open(broker).at(Stage::Accounts, label)?;
    let available = session.managed_accounts().at(Stage::Accounts, label)?;

    match configured {
        Some(id) if available.iter().any(|a| a == id) => Ok(id.to_string()),
        Some(id) => Err(Error::UnknownAccount {
            account: id.to_string(),
            available,
        }),
        None => match available.as_slice() {
            [only] => {
                info!("Using the only managed account {only}");
                Ok(only.clone())
            }
            _ => Err(Error::AccountUnspecified { available }),
        },
    }
}

/// One solved iteration plus the context needed to trade it.
pub struct Plan {
    pub model: TargetModel,
    pub directory: Directory,
    pub solved: SolvedPortfolio,
}

/// Drives the loop against one account.
pub struct Rebalancer<'a, B: Broker + ?Sized> {
    broker: &'a mut B,
    config: &'a Config,
    account: String,
}

impl<'a, B: Broker + ?Sized> Rebalancer<'a, B> {
    pub fn new(broker: &'a mut B, config: &'a Config, account: String) -> Self {
        Self {
            broker,
            config,
            account,
        }
    }

    /// Validate the model at `model_path`, then select the account.
    ///
    /// A missing or invalid model fails here, before any broker session.
    pub fn prepare(broker: &'a mut B, config: &'a Config, model_path: &Path) -> Result<Self> {
        let model = TargetModel::load(model_path)?;
        debug!(
            "Model {}: {} positions",
            model_path.display(),
            model.positions.len()
        );
        let account = select_account(&mut *broker, config.account.id.as_deref())?;
        Ok(Self::new(broker, config, account))
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Load the model, resolve it, snapshot the account and solve.
    pub fn plan(&mut self, model_path: &Path) -> Result<Plan> {
        let account = self.account.as_str();
        let model = TargetModel::load(model_path)?;

        let instruments = {
            let session = Session::open(&mut *self.broker).at(Stage::Resolve, account)?;
            session
                .resolve_instruments(&model.specs())
                .at(Stage::Resolve, account)?
        };
        let targets = model.targets(&instruments)?;

        let snapshot = Snapshot::take(&mut *self.broker, account)?;
        let mut directory = Directory::default();
        directory.extend(snapshot.positions.iter().map(|p| p.instrument.clone()));
        directory.extend(instruments);

        let merged = merge(&snapshot.lines(), &snapshot.cash, &targets);
        let ids: Vec<InstrumentId> = merged.positions.iter().map(|l| l.instrument).collect();
        let quotes = {
            let session = Session::open(&mut *self.broker).at(Stage::Pricing, account)?;
            session.quotes(&ids).at(Stage::Pricing, account)?
        };

        let solved = solve(price_portfolio(merged, &quotes));
        Ok(Plan {
            model,
            directory,
            solved,
        })
    }

    /// Constrain and price the optimal orders of a solved portfolio.
    ///
    /// `None` when nothing survives constraints or quote filtering.
    pub fn orders(&mut self, plan: &Plan) -> Result<Option<Vec<PricedOrder>>> {
        let account = self.account.as_str();
        let constraints = &self.config.constraints;

        let tradable: Vec<InstrumentId> = plan
            .solved
            .positions
            .iter()
            .filter(|l| l.price.is_some() && l.optimal_order != 0)
            .map(|l| l.instrument)
            .collect();
        if tradable.is_empty() {
            return Ok(None);
        }

        let volumes: FxHashMap<InstrumentId, f64> = {
            let session = Session::open(&mut *self.broker).at(Stage::Constraints, account)?;
            session
                .historical_volume(&tradable, constraints.volume_lookback_days)
                .at(Stage::Constraints, account)?
                .into_iter()
                .collect()
        };
        let limits = self.config.order_limits(plan.model.buy_only);
        let constrained = constrain_orders(&plan.solved, &volumes, &limits);
        if constrained.is_empty() {
            info!("No order survives constraints");
            return Ok(None);
        }

        let ids: Vec<InstrumentId> = constrained.iter().map(|o| o.instrument).collect();
        let quotes = {
            let session = Session::open(&mut *self.broker).at(Stage::OrderPricing, account)?;
            session.quotes(&ids).at(Stage::OrderPricing, account)?
        };
        Ok(price_orders(&constrained, &quotes, constraints.spread_tolerance)
            .filter(|priced| !priced.is_empty()))
    }

    /// Submit priced orders and wait for fills.
    pub fn execute(&mut self, orders: &[PricedOrder], standalone: bool) -> Result<Option<ExecutionReport>> {
        execution::execute(
            &mut *self.broker,
            &self.account,
            orders,
            self.config.settlement(standalone),
        )
    }

    /// Run the convergence loop.
    ///
    /// `confirm` is asked once, before the first submission, unless
    /// `opts.force` is set.
    pub fn run<R, C>(&mut self, opts: &RunOptions, reporter: &mut R, mut confirm: C) -> Result<Outcome>
    where
        R: Reporter + ?Sized,
        C: FnMut(&[PricedOrder]) -> Result<bool>,
    {
        let mut journal = Journal::open(self.config)?;
        if let Some(outcome) = self.cooldown_check(&opts.model_path)? {
            reporter.finished(&outcome);
            return Ok(outcome);
        }
        audit::log_run_started(
            &mut journal.audit,
            "loop",
            &opts.model_path.display().to_string(),
            &self.account,
        )?;

        let config = self.config;
        let exec = &config.execution;
        let mut confirmed = opts.force;

        let outcome = loop {
            let runs = journal.history.runs();
            if exec.max_iterations != 0 && runs >= exec.max_iterations {
                warn!("Iteration limit {} reached", exec.max_iterations);
                break Outcome::IterationLimit { runs };
            }

            // Converging
            let plan = self.plan(&opts.model_path)?;
            let run = journal.record(&plan)?;
            reporter.iteration(run, &plan.solved, &plan.directory);
            reporter.trend(&journal.history);

            if journal.history.is_stagnant(exec.stagnation_window) {
                let mean_deviation = journal
                    .history
                    .mean_deviations()
                    .last()
                    .copied()
                    .unwrap_or_default();
                break Outcome::Stagnant {
                    runs: run,
                    mean_deviation,
                };
            }
            if !plan.solved.is_out_of_band() {
                break Outcome::Converged { runs: run };
            }

            // Trading
            debug!("Run {run}: out of band, trading");
            let Some(orders) = self.orders(&plan)? else {
                continue;
            };
            reporter.orders(&orders, &plan.directory);

            if opts.dry_run {
                break Outcome::DryRun {
                    orders: orders.len(),
                };
            }
            if !confirmed {
                journal.confirm(&mut confirm, &orders)?;
                confirmed = true;
            }

            if let Some(report) = self.execute(&orders, false)? {
                journal.executed(run, &orders, &report, &plan.directory)?;
                reporter.fills(&report.fills, &plan.directory);
            }
        };

        audit::log_run_finished(&mut journal.audit, &outcome)?;
        reporter.finished(&outcome);
        Ok(outcome)
    }

    /// A single solve → constrain → price → execute pass with the
    /// stand-alone settlement window.
    pub fn once<R, C>(&mut self, opts: &RunOptions, reporter: &mut R, mut confirm: C) -> Result<Outcome>
    where
        R: Reporter + ?Sized,
        C: FnMut(&[PricedOrder]) -> Result<bool>,
    {
        let mut journal = Journal::open(self.config)?;
        if let Some(outcome) = self.cooldown_check(&opts.model_path)? {
            reporter.finished(&outcome);
            return Ok(outcome);
        }
        audit::log_run_started(
            &mut journal.audit,
            "once",
            &opts.model_path.display().to_string(),
            &self.account,
        )?;

        let plan = self.plan(&opts.model_path)?;
        let run = journal.record(&plan)?;
        reporter.iteration(run, &plan.solved, &plan.directory);

        let outcome = if !plan.solved.is_out_of_band() {
            Outcome::Converged { runs: run }
        } else {
            match self.orders(&plan)? {
                None => Outcome::Executed {
                    orders: 0,
                    fills: 0,
                },
                Some(orders) => {
                    reporter.orders(&orders, &plan.directory);
                    if opts.dry_run {
                        Outcome::DryRun {
                            orders: orders.len(),
                        }
                    } else {
                        if !opts.force {
                            journal.confirm(&mut confirm, &orders)?;
                        }
                        let report = self.execute(&orders, true)?;
                        let fills = report.as_ref().map_or(0, |r| r.fills.len());
                        if let Some(report) = report {
                            journal.executed(run, &orders, &report, &plan.directory)?;
                            reporter.fills(&report.fills, &plan.directory);
                        }
                        Outcome::Executed {
                            orders: orders.len(),
                            fills,
                        }
                    }
                }
            }
        };

        audit::log_run_finished(&mut journal.audit, &outcome)?;
        reporter.finished(&outcome);
        Ok(outcome)
    }

    /// `CooldownActive` when the model's cooldown has not elapsed since the
    /// last recorded submission.
    fn cooldown_check(&self, model_path: &Path) -> Result<Option<Outcome>> {
        let model = TargetModel::load(model_path)?;
        let Some(cooldown) = model.cooldown() else {
            return Ok(None);
        };
        let Some(last_trade) =
            audit::last_event_time(&self.config.audit_path(), "orders_submitted")?
        else {
            return Ok(None);
        };

        let next_allowed = last_trade + cooldown;
        if Utc::now() < next_allowed {
            info!("Cooldown active until {next_allowed}");
            return Ok(Some(Outcome::CooldownActive {
                last_trade,
                next_allowed,
            }));
        }
        Ok(None)
    }
}

/// History, its JSONL mirror and the audit trail for one run.
struct Journal {
    history: History,
    history_log: HistoryLog,
    audit: AuditLog,
}

impl Journal {
    fn open(config: &Config) -> Result<Self> {
        Ok(Self {
            history: History::default(),
            history_log: HistoryLog::open(&config.history_path())?,
            audit: AuditLog::open(&config.audit_path())?,
        })
    }

    /// Record a solved iteration; returns its run number.
    fn record(&mut self, plan: &Plan) -> Result<usize> {
        let rows = self
            .history
            .record(&plan.solved, &plan.directory, Utc::now());
        self.history_log.append(rows)?;
        let run = self.history.runs();
        audit::log_iteration_solved(&mut self.audit, run, &plan.solved, &plan.directory)?;
        Ok(run)
    }

    fn confirm<C>(&mut self, confirm: &mut C, orders: &[PricedOrder]) -> Result<()>
    where
        C: FnMut(&[PricedOrder]) -> Result<bool>,
    {
        let approved = confirm(orders)?;
        self.audit
            .log("user_confirmed", serde_json::json!({ "approved": approved }))?;
        if approved {
            Ok(())
        } else {
            Err(Error::Aborted("declined at confirmation".into()))
        }
    }

    fn executed(
        &mut self,
        run: usize,
        orders: &[PricedOrder],
        report: &ExecutionReport,
        directory: &Directory,
    ) -> Result<()> {
        audit::log_orders_submitted(&mut self.audit, run, orders, &report.order_ids, directory)?;
        audit::log_fills_collected(&mut self.audit, run, &report.fills)
    }
}
