//! tierpoint CLI - collective checkpoint aggregation and tier migration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tierpoint::models::load_reports;
use tierpoint::storage::{remove_tree, resolve_latest_version, version_status};
use tierpoint::{
    recover_staging, AggregatorHandle, CompletionAggregator, Config, DuplicatePolicy, Status,
    TierMigrator,
};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "tierpoint")]
#[command(version)]
#[command(about = "Collective checkpoint aggregation and tiered checkpoint storage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "tierpoint.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a JSONL stream of participant reports through the aggregator
    Migrate {
        /// Path to reports JSONL file
        #[arg(short, long)]
        reports: PathBuf,
    },

    /// Print the newest readable version of a checkpoint in a directory
    Latest {
        /// Directory to scan
        #[arg(short, long)]
        dir: PathBuf,

        /// Collective checkpoint name
        #[arg(short, long)]
        name: String,

        /// Highest acceptable version (0 = unbounded)
        #[arg(short, long, default_value = "0")]
        max: u64,
    },

    /// Remove interrupted migrations from the persistent tier
    Recover,

    /// Recursively remove a checkpoint tree
    Rm {
        /// Path to remove
        path: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# tierpoint configuration file

[storage]
# Fast local tier; participants write <name>-<version>/<participant>.ckpt here
scratch = "/tmp/tierpoint/scratch"
# Durable tier that committed checkpoints migrate to
persistent = "/srv/checkpoints"
# Remove interrupted migrations before processing reports
recover_on_start = true

[aggregator]
participants = 4
# Drop a second report from the same participant within an open round
reject_duplicates = false
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            info!("Configuration is valid");
            info!("  Scratch:      {}", config.storage.scratch.display());
            info!("  Persistent:   {}", config.storage.persistent.display());
            info!("  Participants: {}", config.aggregator.participants);
        }

        Commands::Latest { dir, name, max } => {
            let lookup = resolve_latest_version(&dir, &name, max);
            let status = version_status(&lookup);
            match lookup {
                Ok(Some(version)) => println!("{name}-{version}"),
                Ok(None) => println!("no version of {name} in {}", dir.display()),
                Err(e) => warn!(error = %e, "Version lookup failed"),
            }
            std::process::exit(status.code());
        }

        Commands::Rm { path } => {
            remove_tree(&path);
            info!(path = %path.display(), "Removed");
        }

        Commands::Recover => {
            let config = load_config(&cli.config)?;
            let removed = recover_staging(&config.storage.persistent)
                .context("Failed to sweep persistent tier")?;
            println!("Removed {removed} interrupted migration(s)");
        }

        Commands::Migrate { reports } => {
            let config = load_config(&cli.config)?;

            if config.storage.recover_on_start {
                recover_staging(&config.storage.persistent)
                    .context("Failed to sweep persistent tier")?;
            }

            let reports = load_reports(&reports).context("Failed to load reports")?;

            let policy = if config.aggregator.reject_duplicates {
                DuplicatePolicy::Reject
            } else {
                DuplicatePolicy::Append
            };
            let migrator = TierMigrator::new(
                config.storage.scratch.clone(),
                config.storage.persistent.clone(),
            );
            let aggregator =
                CompletionAggregator::new(config.aggregator.participants, migrator)
                    .with_policy(policy);
            let (handle, service) = AggregatorHandle::spawn(aggregator);

            let mut closed = 0usize;
            let mut failed = 0usize;
            for report in reports {
                match handle.submit(report).await? {
                    Status::Ignored => {}
                    Status::Success => closed += 1,
                    _ => {
                        closed += 1;
                        failed += 1;
                    }
                }
            }
            drop(handle);

            let aggregator = service.join().await?;
            let migrator = aggregator.hooks();

            println!("\n=== Migration Complete ===");
            println!("Rounds closed:     {closed}");
            println!("Rounds failed:     {failed}");
            println!("Checkpoints saved: {}", aggregator.completed_rounds());
            if let Some(id) = migrator.last_committed() {
                println!("Last committed:    {id}");
            }
            if let Some(id) = migrator.last_restored() {
                println!("Last restored:     {id}");
            }
            println!(
                "Open rounds:       checkpoint={} restart={}",
                aggregator.pending(tierpoint::RoundKind::Checkpoint),
                aggregator.pending(tierpoint::RoundKind::Restart)
            );
        }
    }

    Ok(())
}
