//! dbsync CLI - chunked table synchronization between two databases.

use clap::{Parser, Subcommand};
use dbsync::{Config, Orchestrator, SyncError};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "dbsync")]
#[command(about = "Chunked, fingerprint-based table sync between MySQL, MariaDB and PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the destination tables in line with the source
    Sync {
        /// Sync only this table (repeatable)
        #[arg(short, long = "table")]
        tables: Vec<String>,

        /// Generate statements without applying them
        #[arg(long)]
        dry_run: bool,

        /// Write generated statements to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List source tables with their primary keys
    Tables,

    /// Show the source and destination descriptors of a table
    Describe {
        /// Table name
        table: String,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(SyncError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Sync {
            tables,
            dry_run,
            output,
        } => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator
                .run(cancel_token, Some(tables), dry_run)
                .await?;

            if !result.statements.is_empty() {
                let mut script = result.statements.join("\n");
                script.push('\n');
                match output {
                    Some(path) => {
                        std::fs::write(&path, script)?;
                        info!("Wrote {} statements to {:?}", result.statements.len(), path);
                    }
                    None if !cli.output_json => print!("{}", script),
                    None => {}
                }
            }

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("Sync {} ({} mode):", result.status, result.mode);
                for outcome in &result.tables {
                    match (&outcome.stats, &outcome.error) {
                        (Some(stats), _) => println!(
                            "  {}: {} deleted, {} inserted, {} updated ({} windows, {}ms)",
                            outcome.table,
                            stats.deletes,
                            stats.inserts,
                            stats.updates,
                            stats.windows,
                            stats.duration_ms
                        ),
                        (None, Some(err)) => println!("  {}: FAILED: {}", outcome.table, err),
                        (None, None) => println!("  {}: {}", outcome.table, outcome.status),
                    }
                }
                println!("  Duration: {:.2}s", result.duration_seconds);
            }

            if result.status == "cancelled" {
                return Err(SyncError::Cancelled);
            }
            if !result.failed_tables.is_empty() {
                return Err(SyncError::query(
                    result.failed_tables.join(", "),
                    "table sync failed",
                ));
            }
        }

        Commands::Tables => {
            let orchestrator = Orchestrator::new(config).await?;
            let tables = orchestrator.list_tables().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                for table in &tables {
                    if table.primary_key.is_empty() {
                        println!("{} (no primary key, cannot be synced)", table.name);
                    } else {
                        println!("{} ({})", table.name, table.primary_key.join(", "));
                    }
                }
            }
        }

        Commands::Describe { table } => {
            let orchestrator = Orchestrator::new(config).await?;
            let (source, destination) = orchestrator.describe(&table).await?;

            if cli.output_json {
                let both = serde_json::json!({ "source": source, "destination": destination });
                println!("{}", serde_json::to_string_pretty(&both)?);
            } else {
                println!("-- source\n{}\n", source);
                println!("-- destination\n{}", destination);
                if source.primary_key != destination.primary_key {
                    warn!("{}: primary keys differ between source and destination", table);
                }
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source: {} ({}ms) {}",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms,
                    result.source_version
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Destination: {} ({}ms) {}",
                    if result.destination_connected { "OK" } else { "FAILED" },
                    result.destination_latency_ms,
                    result.destination_version
                );
                if let Some(ref err) = result.destination_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(SyncError::pool("Health check failed", "health-check"));
            }
        }
    }

    Ok(())
}

/// `RUST_LOG` takes precedence over `--verbosity` when set.
fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}

/// Cancel the returned token on SIGINT or SIGTERM. A running table stops
/// before its next window and still tears down.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current window...", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Could not install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Ctrl-C only outside unix.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current window...");
            token.cancel();
        }
    });

    cancel_token
}
