//! Renter CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use renter::gc::{
    AlwaysConfirm, CancellationFlag, Confirm, CycleOutcome, GarbageCollector, PromptConfirm,
};
use renter::host::TcpSessionOpener;
use renter::storage::{ContractSet, MetaFile};
use renter::{logging, RenterConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "renter")]
#[command(version, about = "Storage network renter - manage metafiles and reclaim host storage", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/renter/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete host sectors that no metafile under METAFOLDER references
    Gc {
        /// Directory searched recursively for metafiles
        #[arg(value_name = "METAFOLDER")]
        meta_dir: PathBuf,

        /// Delete without asking for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Directory holding contract files
        #[arg(long, value_name = "DIR")]
        contracts: Option<PathBuf>,

        /// Hosts contacted at once
        #[arg(long, value_name = "N")]
        parallelism: Option<usize>,
    },

    /// Show information about a metafile
    Info {
        #[arg(value_name = "METAFILE")]
        metafile: PathBuf,
    },

    /// Print version information
    Version,
}

/// Exit status after a second Ctrl-C
const INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    // Exit without waiting on a prompt thread abandoned by a cancellation
    std::process::exit(code);
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => RenterConfig::default_path().context("Could not determine config directory")?,
    };
    let config = RenterConfig::load(&config_path).context("Could not load config")?;
    logging::init_logging(&config.log_level, cli.verbose)?;

    match cli.command {
        Commands::Gc {
            meta_dir,
            yes,
            contracts,
            parallelism,
        } => gc(&config, meta_dir, yes, contracts, parallelism).await,
        Commands::Info { metafile } => {
            let meta = MetaFile::read(&metafile)
                .with_context(|| format!("Could not load metafile {}", metafile.display()))?;
            print!("{}", meta.info());
            Ok(())
        }
        Commands::Version => {
            println!("renter v{}", clap::crate_version!());
            Ok(())
        }
    }
}

async fn gc(
    config: &RenterConfig,
    meta_dir: PathBuf,
    yes: bool,
    contracts_dir: Option<PathBuf>,
    parallelism: Option<usize>,
) -> Result<()> {
    if !meta_dir.is_dir() {
        bail!("{} is not a directory", meta_dir.display());
    }

    let contracts_dir = contracts_dir.unwrap_or_else(|| config.contracts_dir.clone());
    let contracts = ContractSet::load_dir(&contracts_dir)
        .with_context(|| format!("Could not load contracts from {}", contracts_dir.display()))?;
    let resolver = config.resolver()?;

    let confirm: Arc<dyn Confirm> = if yes {
        Arc::new(AlwaysConfirm)
    } else {
        Arc::new(PromptConfirm::stdio())
    };

    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            tracing::warn!("Interrupted; finishing hosts already in progress (Ctrl-C again to quit)");
            cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Aborted");
                std::process::exit(INTERRUPTED);
            }
        });
    }

    let opener = TcpSessionOpener {
        connect_timeout: config.connect_timeout(),
        io_timeout: config.io_timeout(),
    };
    let collector = GarbageCollector::new(Arc::new(resolver), Arc::new(opener), confirm)
        .with_parallelism(parallelism.unwrap_or(config.parallelism))
        .with_cancellation(cancel);

    let report = collector
        .run(&contracts, &meta_dir)
        .await
        .context("Garbage collection failed")?;

    if report.outcome == CycleOutcome::Completed && report.hosts_failed() > 0 {
        tracing::warn!(
            failed = report.hosts_failed(),
            "Some hosts could not be cleaned"
        );
    }
    Ok(())
}
