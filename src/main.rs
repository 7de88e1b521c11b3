//! Sentinel Scan - ransomware detection over a user's file operations
//!
//! # Usage
//!
//! ```bash
//! # Scan everything changed since the last scan, for two users
//! sentinel-scan scan --user alice --user bob
//!
//! # Scan captured events
//! sentinel-scan scan --user alice --events events.json
//!
//! # Undo a recorded operation
//! sentinel-scan recover --user alice --id 42
//! ```

use clap::{Parser, Subcommand};
use sentinel_scan::analyzer::{EntropyAnalyzer, FileCorruptionAnalyzer};
use sentinel_scan::detector::header;
use sentinel_scan::{Config, RawOperation, Scanner, UserContext, Verdict};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sentinel-scan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/sentinel-scan/config.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan file operations and classify them
    Scan {
        /// User whose storage is scanned (repeatable)
        #[arg(short, long = "user", required = true)]
        users: Vec<String>,

        /// JSON array of captured operations; defaults to the changes since the last scan
        #[arg(short, long)]
        events: Option<PathBuf>,
    },

    /// Undo a recorded operation from the trash or an earlier version
    Recover {
        #[arg(short, long)]
        user: String,

        /// Operation id
        #[arg(long)]
        id: u64,
    },

    /// Show entropy and corruption of a single file
    Entropy {
        path: PathBuf,
    },

    /// List the changes the next scan would pick up
    Files {
        #[arg(short, long)]
        user: String,
    },

    /// Show configuration
    Config,
}

fn setup_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Print a verdict; returns whether it is a failure
fn emit(verdict: &Verdict) -> anyhow::Result<bool> {
    println!("{}", serde_json::to_string_pretty(&verdict.response())?);
    Ok(verdict.status() != 200)
}

fn read_events(path: &Path) -> anyhow::Result<Vec<RawOperation>> {
    let content = std::fs::read_to_string(path)?;
    let events = serde_json::from_str(&content)?;
    Ok(events)
}

async fn scan(config: Config, users: Vec<String>, events: Option<PathBuf>) -> anyhow::Result<bool> {
    let events = match events {
        Some(path) if users.len() > 1 => {
            anyhow::bail!("--events {:?} applies to a single --user", path)
        }
        Some(path) => Some(Arc::new(read_events(&path)?)),
        None => None,
    };

    let scanner = Arc::new(Scanner::from_config(config)?);

    // Users are independent; each one gets its own blocking task
    let mut tasks = Vec::new();
    for user in users {
        let scanner = scanner.clone();
        let events = events.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            let ctx = UserContext::new(user);
            let result = match events.as_deref() {
                Some(raw) => scanner.scan_events(&ctx, raw),
                None => scanner.scan_changes(&ctx),
            };
            Verdict::from_result(result.map(Verdict::Scan))
        }));
    }

    let mut failed = false;
    for task in tasks {
        let verdict = task.await??;
        failed |= emit(&verdict)?;
    }
    Ok(failed)
}

fn entropy(config: &Config, path: &Path) -> anyhow::Result<()> {
    let analyzer = EntropyAnalyzer::new(&config.detection);
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let result = analyzer.analyze_reader(&mut file, len)?;

    let mut head = Vec::new();
    File::open(path)?.take(512).read_to_end(&mut head)?;
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let mime = header::mime_for_name(&name);
    let corrupted = FileCorruptionAnalyzer::new().analyze_bytes(mime, &name, &head);

    println!("File:      {:?}", path);
    println!("Size:      {} bytes", len);
    println!("Mime:      {}", mime);
    println!("Entropy:   {:.4} bits/byte", result.entropy);
    println!("Deviation: {:.4}", result.standard_deviation);
    println!("Class:     {:?}", result.class);
    println!("Corrupted: {}", corrupted);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        if cli.config.exists() {
            error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
        info!("Using default configuration");
        Config::default()
    });

    let failed = match cli.command {
        Commands::Scan { users, events } => scan(config, users, events).await?,

        Commands::Recover { user, id } => {
            let scanner = Scanner::from_config(config)?;
            let ctx = UserContext::new(user);
            info!("Recovering operation {} of {}", id, ctx.user_id);
            let verdict = Verdict::from_result(
                scanner
                    .recover(&ctx, id)
                    .map(|outcome| Verdict::Recovery { id, outcome }),
            )?;
            emit(&verdict)?
        }

        Commands::Entropy { path } => {
            entropy(&config, &path)?;
            false
        }

        Commands::Files { user } => {
            let scanner = Scanner::from_config(config)?;
            let files = scanner.files_to_scan(&UserContext::new(user))?;
            println!("{}", serde_json::to_string_pretty(&files)?);
            false
        }

        Commands::Config => {
            println!("{}", serde_yaml::to_string(&config)?);
            false
        }
    };

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
