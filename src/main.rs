use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use referral_core::{Clock, SystemClock};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod script;

use script::{parse_script, Replay, StateFile, StepReport};

#[derive(Parser, Debug)]
#[command(name = "referral", version, about = "Referral reward ledger tools")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the default rate configuration.
    InitConfig {
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check a rate configuration file.
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
    /// Replay a JSON-lines script of operations and print the events.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Rate configuration (TOML). Required unless --resume is given.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    script: PathBuf,

    /// Funds available to pay referral bonuses.
    #[arg(long, default_value_t = 1_000_000_000_000_000_000)]
    treasury: u64,

    /// Initial clock value (unix seconds); defaults to now.
    #[arg(long)]
    start_time: Option<u64>,

    /// State file from an earlier run to continue from. Carries its own
    /// rates and ledger balances.
    #[arg(long, conflicts_with_all = ["config", "treasury"])]
    resume: Option<PathBuf>,

    /// Where to write the final state.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn write_all(p: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).ok();
    }
    fs::write(p, bytes).with_context(|| format!("write {}", p.display()))
}

fn init_config_cmd(out: Option<PathBuf>) -> Result<()> {
    let text = config::render_default()?;
    match out {
        Some(path) => {
            write_all(&path, text.as_bytes())?;
            eprintln!("Config → {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn validate_cmd(path: &Path) -> Result<()> {
    let table = config::load_rate_table(path)?;
    println!(
        "OK: levels={:?} referral_bonus_rate={}/{} tiers={} only_active={} policy={:?}",
        table.level_rates(),
        table.referral_bonus_rate(),
        table.decimals(),
        table.referee_bonus_tiers().len(),
        table.only_reward_active_referrers(),
        table.registration_policy(),
    );
    Ok(())
}

fn run_cmd(args: RunArgs) -> Result<()> {
    let start_time = args.start_time.unwrap_or_else(|| SystemClock.now());
    let mut replay = match (&args.resume, &args.config) {
        (Some(state_path), _) => {
            let bytes = fs::read(state_path)
                .with_context(|| format!("read state {}", state_path.display()))?;
            let state: StateFile = serde_json::from_slice(&bytes)
                .with_context(|| format!("parse state {}", state_path.display()))?;
            Replay::resume(state, start_time)?
        }
        (None, Some(config_path)) => {
            let rates = config::load_rate_table(config_path)?;
            Replay::new(rates, args.treasury, start_time)?
        }
        (None, None) => bail!("either --config or --resume is required"),
    };

    let text = fs::read_to_string(&args.script)
        .with_context(|| format!("read script {}", args.script.display()))?;
    let ops = parse_script(&text)?;
    info!(operations = ops.len(), start_time, "replaying script");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut failures = 0usize;
    let mut paid_total: u64 = 0;
    for (line, op) in &ops {
        let report = replay.step(*line, op);
        match &report {
            StepReport::Ok { paid, .. } => paid_total += paid.unwrap_or(0),
            StepReport::Error { .. } => failures += 1,
        }
        serde_json::to_writer(&mut out, &report)?;
        writeln!(out)?;
    }
    out.flush()?;

    let state = replay.state();
    eprintln!(
        "replayed {} operations ({} failed), paid {} in bonuses, treasury {}, state root {}",
        ops.len(),
        failures,
        paid_total,
        replay.ledger().balance(script::TREASURY),
        state.program.state_root
    );
    if let Some(path) = &args.snapshot {
        write_all(path, &serde_json::to_vec_pretty(&state)?)?;
        eprintln!("State → {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::InitConfig { out } => init_config_cmd(out),
        Command::Validate { config } => validate_cmd(&config),
        Command::Run(args) => run_cmd(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_requires_script() {
        assert!(Cli::try_parse_from(["referral", "run", "--config", "rates.toml"]).is_err());
        let cli = Cli::try_parse_from([
            "referral", "run", "--config", "rates.toml", "--script", "ops.jsonl",
        ])
        .unwrap();
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.treasury, 1_000_000_000_000_000_000);
                assert!(args.resume.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn resume_conflicts_with_fresh_start_flags() {
        for extra in [["--config", "rates.toml"], ["--treasury", "5"]] {
            let mut argv = vec!["referral", "run", "--resume", "state.json", "--script", "ops.jsonl"];
            argv.extend(extra);
            let err = Cli::try_parse_from(argv).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
        }
        assert!(Cli::try_parse_from([
            "referral", "run", "--resume", "state.json", "--script", "ops.jsonl",
        ])
        .is_ok());
    }

    #[test]
    fn run_writes_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("rates.toml");
        let script_path = dir.path().join("ops.jsonl");
        let state_path = dir.path().join("out/state.json");
        fs::write(&config_path, config::render_default().unwrap()).unwrap();
        fs::write(
            &script_path,
            "{\"op\":\"register\",\"referee\":\"bob\",\"referrer\":\"alice\"}\n\
             {\"op\":\"play\",\"payer\":\"bob\",\"value\":1000000}\n",
        )
        .unwrap();

        run_cmd(RunArgs {
            config: Some(config_path),
            script: script_path,
            treasury: 1_000_000,
            start_time: Some(100),
            resume: None,
            snapshot: Some(state_path.clone()),
        })
        .unwrap();

        let state: StateFile = serde_json::from_slice(&fs::read(&state_path).unwrap()).unwrap();
        assert_eq!(state.program.accounts["alice"].reward, 40_000);
        assert_eq!(state.ledger.balance("alice"), 40_000);
        assert_eq!(state.program.accounts["bob"].last_active_time, Some(100));
    }
}
