//! CLI entry point for the balancer rebalancer.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use balancer::{Price, PricedOrder};
use balancer_broker::{Broker, Session};
use balancer_rebalancer::config::Config;
use balancer_rebalancer::error::{BrokerContext, Error, Result, Stage};
use balancer_rebalancer::report::TerminalReporter;
use balancer_rebalancer::snapshot::Snapshot;
use balancer_rebalancer::{Outcome, Rebalancer, RunOptions, select_account};

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Portfolio rebalancer: target model → limit orders until converged")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebalance repeatedly until the portfolio converges or stagnates
    Run {
        /// Path to the target model YAML
        model: PathBuf,

        /// Show the first order batch without executing
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt (for automation/cron)
        #[arg(long)]
        force: bool,
    },

    /// One solve/constrain/execute pass
    Once {
        /// Path to the target model YAML
        model: PathBuf,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        force: bool,
    },

    /// Show current positions and cash
    Positions,

    /// List accounts managed by the login
    Accounts,
}

fn confirm(orders: &[PricedOrder]) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(format!("Submit {} order(s)?", orders.len()))
        .default(false)
        .interact()
        .map_err(|e| Error::Aborted(format!("confirmation prompt failed: {e}")))
}

fn rebalance(config: &Config, model: PathBuf, dry_run: bool, force: bool, once: bool) -> Result<Outcome> {
    let mut broker = config.paper.broker()?;
    let mut rebalancer = Rebalancer::prepare(&mut broker, config, &model)?;
    let opts = RunOptions {
        model_path: model,
        dry_run,
        force,
    };
    let mut reporter = TerminalReporter::stdout();
    if once {
        rebalancer.once(&opts, &mut reporter, confirm)
    } else {
        rebalancer.run(&opts, &mut reporter, confirm)
    }
}

fn show_positions(config: &Config) -> Result<()> {
    let mut broker = config.paper.broker()?;
    let account = select_account(&mut broker, config.account.id.as_deref())?;
    let snapshot = Snapshot::take(&mut broker, &account)?;

    println!(
        "Account {account}: {} {} cash\n",
        Price(snapshot.cash.balance),
        snapshot.cash.currency
    );
    println!("  {:10} {:8} {:>10} {:>12}", "Symbol", "Exchange", "Qty", "Avg cost");
    for p in &snapshot.positions {
        println!(
            "  {:10} {:8} {:>10} {:>12.2}",
            p.instrument.symbol, p.instrument.exchange, p.quantity, p.avg_cost
        );
    }
    Ok(())
}

fn list_accounts(config: &Config) -> Result<()> {
    let mut broker = config.paper.broker()?;
    let session = Session::open(&mut broker).at(Stage::Connect, "-")?;
    let accounts = session.managed_accounts().at(Stage::Accounts, "-")?;
    for id in accounts {
        let marker = if config.account.id.as_deref() == Some(id.as_str()) {
            " (configured)"
        } else {
            ""
        };
        println!("{id}{marker}");
    }
    Ok(())
}

fn exit_code(outcome: &Outcome) -> i32 {
    match outcome {
        Outcome::Stagnant { .. } => 3,
        Outcome::IterationLimit { .. } => 4,
        _ => 0,
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(2);
        }
    };

    let result = match cli.command {
        Command::Run {
            model,
            dry_run,
            force,
        } => rebalance(&config, model, dry_run, force, false).map(|o| exit_code(&o)),
        Command::Once {
            model,
            dry_run,
            force,
        } => rebalance(&config, model, dry_run, force, true).map(|o| exit_code(&o)),
        Command::Positions => show_positions(&config).map(|()| 0),
        Command::Accounts => list_accounts(&config).map(|()| 0),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(Error::Aborted(msg)) => {
            eprintln!("Aborted: {msg}");
            process::exit(0);
        }
        Err(e) if e.is_configuration() => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
