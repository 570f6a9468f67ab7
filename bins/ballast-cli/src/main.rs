//! ballast-cli: offline driver for the Ballast voting-power ledger.
//!
//! Replays JSON action scripts against an in-memory escrow, inspects
//! persisted ledger state at arbitrary times, and prints the resolved
//! configuration.

mod script;

use std::path::PathBuf;

use anyhow::{Context, Result};
use ballast_core::config::LedgerConfig;
use ballast_core::types::Amounts;
use ballast_ledger::{DelegationState, Escrow, MemoryCollaborators, persist};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;

/// Ballast voting-power ledger tools.
#[derive(Parser)]
#[command(name = "ballast-cli", version, about = "Lock-based voting power with linear decay")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON action script and print the resulting powers.
    Simulate(SimulateArgs),
    /// Query a persisted ledger state.
    Inspect(InspectArgs),
    /// Print the effective ledger configuration.
    Config(ConfigArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Preset {
    Mainnet,
    Testing,
}

#[derive(Args)]
struct ConfigArgs {
    /// TOML config file. `BALLAST_*` environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Built-in parameters used when no config file is given.
    #[arg(long, value_enum, default_value = "testing")]
    preset: Preset,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<LedgerConfig> {
        let config = match &self.config {
            Some(path) => {
                LedgerConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))?
            }
            None => match self.preset {
                Preset::Mainnet => LedgerConfig::mainnet(),
                Preset::Testing => LedgerConfig::testing(),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args)]
struct SimulateArgs {
    /// Action script (JSON).
    #[arg(short, long)]
    script: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Write the final ledger state here.
    #[arg(long)]
    state_out: Option<PathBuf>,

    /// Abort on the first rejected action.
    #[arg(long)]
    strict: bool,
}

#[derive(Args)]
struct InspectArgs {
    /// Ledger state written by `simulate --state-out`.
    #[arg(long)]
    state: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Query time in seconds (default: the last global synchronization).
    #[arg(long)]
    at: Option<u64>,

    /// Accounts to report, by script name or hex id.
    #[arg(long, value_delimiter = ',')]
    account: Vec<String>,
}

fn init_tracing(level: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry().with(filter).with(fmt::layer().json()).init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_format);

    match cli.command {
        Commands::Simulate(args) => simulate(args),
        Commands::Inspect(args) => inspect(args),
        Commands::Config(args) => show_config(args),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn simulate(args: SimulateArgs) -> Result<()> {
    let config = args.config.resolve()?;
    let script = script::load(&args.script)?;
    let mut runner = script::Runner::new(config, &script)?;
    let (applied, rejected) = runner.run(&script.actions, args.strict)?;
    info!(applied, rejected, "simulate: script finished");

    print_json(&runner.summary(applied, rejected))?;

    if let Some(path) = &args.state_out {
        persist::save(runner.escrow.state(), path)
            .with_context(|| format!("failed to write state to {}", path.display()))?;
        info!(path = %path.display(), "simulate: state written");
    }
    Ok(())
}

#[derive(Serialize)]
struct LockView {
    id: String,
    owner: String,
    amounts: Amounts,
    expiry: u64,
    unlocked: bool,
    delegation: DelegationState,
    power: u128,
}

#[derive(Serialize)]
struct AccountView {
    name: String,
    id: String,
    owner: u128,
    delegate: u128,
    delegated_away: u128,
    total: u128,
}

#[derive(Serialize)]
struct InspectReport {
    at: u64,
    epoch: u64,
    last_sync: u64,
    total_supply: u128,
    epoch_start_supply: u128,
    locks: Vec<LockView>,
    accounts: Vec<AccountView>,
}

fn inspect(args: InspectArgs) -> Result<()> {
    let config = args.config.resolve()?;
    let state = persist::load(&args.state).with_context(|| format!("failed to read {}", args.state.display()))?;
    let escrow = Escrow::from_state(config, state, MemoryCollaborators::new().collaborators())?;
    let last_sync = escrow.accounts().global().last_updated;
    let at = args.at.unwrap_or(last_sync);
    let epoch = escrow.clock().epoch_number(at);

    let mut locks = Vec::with_capacity(escrow.locks().len());
    for lock in escrow.locks().iter() {
        locks.push(LockView {
            id: lock.id.to_string(),
            owner: lock.owner.to_string(),
            amounts: lock.amounts,
            expiry: lock.expiry,
            unlocked: lock.is_unlocked(),
            delegation: escrow.delegation_state(&lock.id, at)?,
            power: escrow.lock_power(&lock.id, at)?,
        });
    }
    let accounts = args
        .account
        .iter()
        .map(|name| {
            let id = script::account(name);
            AccountView {
                name: name.clone(),
                id: id.to_string(),
                owner: escrow.owner_power(&id, at),
                delegate: escrow.delegate_power(&id, at),
                delegated_away: escrow.delegated_away(&id, at),
                total: escrow.account_power(&id, at, false),
            }
        })
        .collect();

    print_json(&InspectReport {
        at,
        epoch,
        last_sync,
        total_supply: escrow.total_supply(at),
        epoch_start_supply: escrow.historical_supply(epoch),
        locks,
        accounts,
    })
}

fn show_config(args: ConfigArgs) -> Result<()> {
    let config = args.resolve()?;
    print_json(&config)
}
