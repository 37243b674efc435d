//! Swap Ledger CLI
//!
//! Entry point for the `swap-ledger` command-line tool. Each invocation is
//! one ledger instance; the temporary snapshot carries recorded artifacts
//! from `record` calls to the final `finalize`.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

use swap_ledger::config::{default_host_config_path, REPO_CONFIG_PATH};
use swap_ledger::{
    EffectiveConfig, FileKind, Ledger, LedgerDocument, LedgerSettings, PersistenceMode,
    VerifierStatus,
};

#[derive(Parser)]
#[command(name = "swap-ledger")]
#[command(about = "Incremental build artifact ledger for hot-swap deployments", version)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Configuration sources and per-invocation overrides
#[derive(Args)]
struct Overrides {
    /// Path to repo config file (default: .swap/ledger.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Path to host config file (default: ~/.config/swap/ledger.toml)
    #[arg(long, global = true)]
    host_config: Option<PathBuf>,

    /// Durable ledger file
    #[arg(long, global = true)]
    build_info: Option<PathBuf>,

    /// Temporary snapshot file
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Target platform version (API level)
    #[arg(long, global = true)]
    platform_version: Option<u32>,

    /// Coldswap mode: auto, multi-shard or multi-split
    #[arg(long, global = true)]
    coldswap_mode: Option<String>,

    /// Target ABI, when a single ABI is built
    #[arg(long, global = true)]
    abi: Option<String>,

    /// Target screen density
    #[arg(long, global = true)]
    density: Option<String>,
}

impl Overrides {
    fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "build_info": self.build_info,
            "snapshot": self.snapshot,
            "target": {
                "platform_version": self.platform_version,
                "coldswap_mode": self.coldswap_mode,
                "abi": self.abi,
                "density": self.density,
            }
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record produced files into the temporary snapshot
    Record {
        /// Artifact kind (MAIN, SPLIT_MAIN, RELOAD_PATCH, RESTART_PATCH, SHARD, SPLIT, RESOURCES)
        #[arg(long, short = 'k')]
        kind: FileKind,

        /// Produced file locations
        #[arg(required = true)]
        locations: Vec<PathBuf>,
    },

    /// Close the invocation and write the durable ledger
    Finalize {
        /// Persistence mode (default: from config)
        #[arg(long)]
        mode: Option<PersistenceMode>,

        /// Verifier result for this invocation
        #[arg(long)]
        verifier: Option<VerifierStatus>,

        /// Mark the invocation as failed
        #[arg(long)]
        aborted: bool,
    },

    /// Show the builds and artifacts of a durable ledger
    Inspect {
        /// Ledger file (default: configured build_info)
        path: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Check that a ledger file has a supported format
    Check {
        /// Ledger file (default: configured build_info)
        path: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = match load_config(&cli.overrides) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Record { kind, locations } => run_record(&config, kind, &locations),
        Commands::Finalize {
            mode,
            verifier,
            aborted,
        } => run_finalize(&config, mode, verifier, aborted),
        Commands::Inspect { path, json } => run_inspect(&config, path, json),
        Commands::Check { path } => run_check(&config, path),
        Commands::Config { json } => run_config(&config, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("SWAP_LEDGER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let json = std::env::var("SWAP_LEDGER_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(overrides: &Overrides) -> Result<EffectiveConfig, String> {
    let host = overrides.host_config.clone().or_else(default_host_config_path);
    let repo = overrides
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(REPO_CONFIG_PATH));

    EffectiveConfig::build(host.as_deref(), Some(repo.as_path()), Some(overrides.to_value()))
        .map_err(|e| e.to_string())
}

fn settings(config: &EffectiveConfig) -> Result<LedgerSettings, String> {
    config.settings().map_err(|e| e.to_string())
}

fn run_record(config: &EffectiveConfig, kind: FileKind, locations: &[PathBuf]) -> Result<(), String> {
    let settings = settings(config)?;
    let ledger = Ledger::new();

    if settings.apply_to(&ledger).is_none() {
        eprintln!("Warning: no target platform version configured, nothing is recorded");
        return Ok(());
    }

    ledger
        .load_previous_from_file(&settings.build_info)
        .map_err(|e| e.to_string())?;
    ledger
        .merge_temporary_from_file(&settings.snapshot)
        .map_err(|e| e.to_string())?;

    for location in locations {
        let recorded = ledger
            .add_changed_file(kind, location)
            .map_err(|e| e.to_string())?;
        if recorded {
            println!("recorded {} {}", kind, location.display());
        } else {
            println!("skipped  {} {}", kind, location.display());
        }
    }

    Ok(())
}

fn run_finalize(
    config: &EffectiveConfig,
    mode: Option<PersistenceMode>,
    verifier: Option<VerifierStatus>,
    aborted: bool,
) -> Result<(), String> {
    let settings = settings(config)?;
    let mode = mode.unwrap_or(settings.persistence);
    if mode == PersistenceMode::Temporary {
        return Err("the durable ledger cannot be written in temporary mode".to_string());
    }

    let ledger = Ledger::new();
    settings.apply_to(&ledger);

    ledger
        .load_previous_from_file(&settings.build_info)
        .map_err(|e| e.to_string())?;
    ledger
        .merge_temporary_from_file(&settings.snapshot)
        .map_err(|e| e.to_string())?;

    if let Some(status) = verifier {
        ledger.set_verifier_result(status);
    }
    if aborted {
        ledger.abort();
    }

    let summary = ledger.close(mode);
    ledger
        .write_to_file(&settings.build_info, mode)
        .map_err(|e| e.to_string())?;

    if settings.snapshot.exists() {
        std::fs::remove_file(&settings.snapshot)
            .map_err(|e| format!("{}: {}", settings.snapshot.display(), e))?;
    }

    println!(
        "Wrote {} (build {}, {} builds retained, {} purged)",
        settings.build_info.display(),
        ledger.build_id(),
        ledger.previous_builds().len(),
        summary.removed_builds.len()
    );
    Ok(())
}

fn ledger_path(config: &EffectiveConfig, path: Option<PathBuf>) -> Result<PathBuf, String> {
    match path {
        Some(p) => Ok(p),
        None => Ok(settings(config)?.build_info),
    }
}

fn load_document(path: &Path) -> Result<LedgerDocument, String> {
    LedgerDocument::from_file(path)
        .map_err(|e| format!("{}: {}", path.display(), e))?
        .ok_or_else(|| format!("no ledger at {}", path.display()))
}

fn run_inspect(config: &EffectiveConfig, path: Option<PathBuf>, json: bool) -> Result<(), String> {
    let path = ledger_path(config, path)?;
    let document = load_document(&path)?;

    if json {
        println!("{}", document.to_json().map_err(|e| e.to_string())?);
        return Ok(());
    }

    println!("Ledger: {} (format {})", path.display(), document.format);
    if let Some(version) = document.platform_version {
        println!("  Platform version: {}", version);
    }
    if let Some(ref abi) = document.abi {
        println!("  ABI: {}", abi);
    }
    if let Some(ref density) = document.density {
        println!("  Density: {}", density);
    }
    for task in &document.tasks {
        println!("  Task {}: {} ms", task.name, task.duration);
    }
    println!();

    for build in std::iter::once(&document.current).chain(document.history()) {
        match build.verifier_status() {
            Some(status) => println!("  Build {} [{}]", build.id(), status),
            None => println!("  Build {}", build.id()),
        }
        if build.is_empty() {
            println!("    (no artifacts)");
        }
        for artifact in build.artifacts() {
            println!("    {:<13} {}", artifact.kind().as_str(), artifact.location().display());
        }
    }

    Ok(())
}

fn run_check(config: &EffectiveConfig, path: Option<PathBuf>) -> Result<(), String> {
    let path = ledger_path(config, path)?;
    let document = load_document(&path)?;
    println!(
        "{}: format {} ({} builds)",
        path.display(),
        document.format,
        1 + document.history().count()
    );
    Ok(())
}

fn run_config(config: &EffectiveConfig, json: bool) -> Result<(), String> {
    if json {
        println!("{}", config.to_json().map_err(|e| e.to_string())?);
        return Ok(());
    }

    let settings = settings(config)?;
    println!("Build info: {}", settings.build_info.display());
    println!("Snapshot: {}", settings.snapshot.display());
    println!("Persistence: {}", settings.persistence);
    match settings.target.platform_version {
        Some(version) => println!("Platform version: {}", version),
        None => println!("Platform version: (unset, recording disabled)"),
    }
    println!("Coldswap mode: {}", settings.target.coldswap_mode);
    if let Some(ref abi) = settings.target.abi {
        println!("ABI: {}", abi);
    }
    if let Some(ref density) = settings.target.density {
        println!("Density: {}", density);
    }
    println!();
    println!("Sources:");
    for source in &config.sources {
        match source.path {
            Some(ref path) => println!("  {:?}: {}", source.origin, path),
            None => println!("  {:?}", source.origin),
        }
    }
    Ok(())
}
