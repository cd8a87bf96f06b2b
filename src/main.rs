use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use clap::Parser;
use purger::{
    config::PurgerConfig,
    jobs, observability,
    purge::{self, ExtraCondition, PurgeEvent, PurgeRequest},
};
use tokio::io::AsyncReadExt;

/// CLI arguments for the purger
#[derive(Parser, Debug)]
#[command(version, about = "Cascading PostgreSQL purge", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "purger.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Purge tables and everything that references them
    Run {
        /// Comma-separated root tables, purged in order
        #[arg(short, long)]
        tables: String,
        /// Configured service whose database is purged
        #[arg(short, long)]
        service: String,
        /// Tenant whose rows are purged
        #[arg(long, allow_hyphen_values = true)]
        school_id: String,
        /// Purge rows created before this time (RFC 3339 or "<N> days ago")
        #[arg(long)]
        before: String,
        /// Purge rows created after this time
        #[arg(long)]
        after: Option<String>,
        /// Delete in batches of this many rows
        #[arg(long)]
        per_batch: Option<u32>,
        /// Extra condition for a table, as `table=condition` (repeatable)
        #[arg(long = "extra-cond", value_parser = parse_extra_cond)]
        extra_cond: Vec<ExtraCondition>,
        /// Print the statements without executing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a purge from a JSON trigger payload
    Event {
        /// Payload file (defaults to stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Print the statements without executing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the dependency graph and statements for a table as JSON
    Graph {
        #[arg(short, long)]
        service: String,
        #[arg(short, long)]
        table: String,
        #[arg(long)]
        per_batch: Option<u32>,
    },
    /// Run the scheduled purges until interrupted
    Worker,
    /// Export the JSON schema for the configuration file
    Schema {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn parse_extra_cond(value: &str) -> Result<ExtraCondition, String> {
    let (table, condition) = value
        .split_once('=')
        .ok_or_else(|| format!("expected table=condition, got '{value}'"))?;
    if table.trim().is_empty() {
        return Err(format!("missing table in '{value}'"));
    }
    Ok(ExtraCondition {
        table: table.trim().to_string(),
        condition: condition.to_string(),
    })
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Command::Schema { output } => {
            #[cfg(feature = "json-schema")]
            run_schema_export(output);
            #[cfg(not(feature = "json-schema"))]
            {
                let _ = output;
                eprintln!("Error: JSON schema export requires the 'json-schema' feature");
                std::process::exit(1);
            }
        }
        Command::Run {
            tables,
            service,
            school_id,
            before,
            after,
            per_batch,
            extra_cond,
            dry_run,
        } => {
            let config = load_config(&args.config);
            let event = PurgeEvent {
                tables,
                service,
                school_id,
                per_batch: per_batch.map_or(0, i64::from),
                before_at: before,
                after_at: after.unwrap_or_default(),
                extra_cond,
            };
            run_event(&config, event, dry_run).await;
        }
        Command::Event { file, dry_run } => {
            let config = load_config(&args.config);
            let payload = match read_payload(file.as_deref()).await {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Failed to read purge event: {}", e);
                    std::process::exit(1);
                }
            };
            let event: PurgeEvent = match serde_json::from_str(&payload) {
                Ok(e) => e,
                Err(e) => {
                    eprintln!("Invalid purge event: {}", e);
                    std::process::exit(1);
                }
            };
            run_event(&config, event, dry_run).await;
        }
        Command::Graph {
            service,
            table,
            per_batch,
        } => {
            let config = load_config(&args.config);
            run_graph(&config, &service, &table, per_batch).await;
        }
        Command::Worker => {
            let config = load_config(&args.config);
            run_worker(config, &args.config).await;
        }
    }
}

/// Load the config file and initialize logging from it.
fn load_config(path: &Path) -> PurgerConfig {
    let config = match PurgerConfig::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }

    config
}

async fn read_payload(file: Option<&Path>) -> std::io::Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(path).await,
        None => {
            let mut payload = String::new();
            tokio::io::stdin().read_to_string(&mut payload).await?;
            Ok(payload)
        }
    }
}

async fn run_event(config: &PurgerConfig, event: PurgeEvent, dry_run: bool) {
    let mut request: PurgeRequest = match event.into_request(Utc::now()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    request.dry_run = dry_run;

    match purge::run_purge(config, &request).await {
        Ok(report) => print_json(&report),
        Err(e) => {
            tracing::error!(error = %e, "Purge failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_graph(config: &PurgerConfig, service: &str, table: &str, per_batch: Option<u32>) {
    match purge::plan_purge(config, service, table, per_batch).await {
        Ok(plan) => print_json(&plan),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_worker(config: PurgerConfig, config_path: &Path) {
    tracing::info!(
        config_file = %config_path.display(),
        "Starting purge worker"
    );

    tokio::select! {
        _ = jobs::start_scheduled_purge_worker(Arc::new(config)) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received, stopping worker");
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize output: {}", e);
            std::process::exit(1);
        }
    }
}

/// Export the config JSON schema to file or stdout
#[cfg(feature = "json-schema")]
fn run_schema_export(output: Option<String>) {
    let content = match PurgerConfig::json_schema_string() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to serialize config schema: {}", e);
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &content) {
                eprintln!("Failed to write to {}: {}", path, e);
                std::process::exit(1);
            }
            eprintln!("Config JSON schema written to {}", path);
        }
        None => {
            println!("{}", content);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extra_cond() {
        let extra = parse_extra_cond("lessons=and deleted_at is not null").unwrap();
        assert_eq!(extra.table, "lessons");
        assert_eq!(extra.condition, "and deleted_at is not null");

        let extra = parse_extra_cond("lessons=kind = 'x'").unwrap();
        assert_eq!(extra.condition, "kind = 'x'");

        assert!(parse_extra_cond("no condition").is_err());
        assert!(parse_extra_cond("=a = 1").is_err());
    }

    #[test]
    fn test_run_args() {
        let args = Args::try_parse_from([
            "purger",
            "run",
            "--tables",
            "lessons,lesson_reports",
            "--service",
            "bob",
            "--school-id",
            "-2147483644",
            "--before",
            "3 months ago",
            "--extra-cond",
            "lessons=deleted_at is null",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("purger.toml"));
        match args.command {
            Command::Run {
                school_id,
                extra_cond,
                dry_run,
                per_batch,
                ..
            } => {
                assert_eq!(school_id, "-2147483644");
                assert_eq!(extra_cond.len(), 1);
                assert!(dry_run);
                assert_eq!(per_batch, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
