//! stake-ledger CLI: replay scenarios, verify snapshots.

use clap::{Parser, Subcommand};
use stake_ledger::journal::EventJournal;
use stake_ledger::scenario::{run_scenario, Scenario};
use stake_ledger::snapshot::{snapshot_hash, verify_snapshot_hash, LedgerSnapshot};
use std::path::{Path, PathBuf};
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Simulate(args) => run_simulate(args),
        Command::Verify(args) => run_verify(args),
    }
}

#[derive(Parser)]
#[command(name = "stake-ledger")]
#[command(author = "gorusys <goru.connector@outlook.com>")]
#[command(about = "Index-based staking reward ledger with cooldown-gated claims")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a scenario file and write its snapshot and hash.
    Simulate(SimulateArgs),
    /// Verify a snapshot against its sibling .sha256 file.
    Verify(VerifyArgs),
}

#[derive(Parser)]
struct SimulateArgs {
    #[arg(long)]
    scenario: PathBuf,
    /// SQLite file receiving every committed event.
    #[arg(long)]
    journal: Option<PathBuf>,
    #[arg(long, default_value = "./reports")]
    out_dir: PathBuf,
}

#[derive(Parser)]
struct VerifyArgs {
    #[arg(long)]
    snapshot: PathBuf,
}

fn file_stem(name: &str) -> String {
    name.chars()
        .take(40)
        .collect::<String>()
        .replace([' ', ':', '/', '\\'], "_")
}

fn run_simulate(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::load(&args.scenario)?;
    let journal = args.journal.as_ref().map(EventJournal::open).transpose()?;
    let run = run_scenario(&scenario, journal.as_ref())?;
    for o in &run.outcomes {
        match (&o.error, o.amount) {
            (Some(code), _) => info!(step = o.step, op = %o.op, at = o.at, error = %code, "rejected"),
            (None, Some(amount)) => info!(step = o.step, op = %o.op, at = o.at, amount, "ok"),
            (None, None) => info!(step = o.step, op = %o.op, at = o.at, "ok"),
        }
    }

    let snapshot = LedgerSnapshot::from_engine(&run.engine);
    let hash = snapshot_hash(&snapshot)?;
    std::fs::create_dir_all(&args.out_dir)?;
    let stem = file_stem(&scenario.name);
    let snapshot_path = args.out_dir.join(format!("{}.snapshot.json", stem));
    let hash_path = args.out_dir.join(format!("{}.sha256", stem));
    std::fs::write(&snapshot_path, serde_json::to_string_pretty(&snapshot)?)?;
    std::fs::write(&hash_path, format!("{}\n", hash))?;
    if let Some(j) = &journal {
        info!(events = j.count()?, "journal written");
    }
    info!(?snapshot_path, ?hash_path, total_staked = snapshot.total_staked, "simulate complete");
    println!("{}", hash);
    Ok(())
}

/// `<dir>/<name>.snapshot.json` pairs with `<dir>/<name>.sha256`.
fn sha256_path(snapshot: &Path) -> PathBuf {
    let file_name = snapshot
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned();
    let stem = file_name
        .strip_suffix(".snapshot.json")
        .or_else(|| file_name.strip_suffix(".json"))
        .unwrap_or(&file_name);
    snapshot
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{}.sha256", stem))
}

fn run_verify(args: VerifyArgs) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot_json = std::fs::read_to_string(&args.snapshot)?;
    let snapshot: LedgerSnapshot = serde_json::from_str(&snapshot_json)?;
    let expected = std::fs::read_to_string(sha256_path(&args.snapshot)).ok();
    let result = match expected {
        Some(ref exp) => verify_snapshot_hash(&snapshot, exp)?,
        None => stake_ledger::VerificationResult {
            snapshot_hash: snapshot_hash(&snapshot)?,
            expected_hash: None,
            matches: false,
        },
    };
    if result.matches {
        println!("OK\t{}", result.snapshot_hash);
    } else {
        eprintln!(
            "MISMATCH\tcomputed={}\texpected={:?}",
            result.snapshot_hash, result.expected_hash
        );
        std::process::exit(1);
    }
    Ok(())
}
