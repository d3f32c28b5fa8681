//! taskroute: classify and route task descriptions from the command line
//!
//! # Usage
//!
//! ```bash
//! # Route one task
//! taskroute route "fix the login bug in the auth service"
//!
//! # With hints and a worker registry file
//! taskroute --workers workers.toml route "restyle the navbar" --file-pattern src/Nav.tsx
//!
//! # One task per line (plain text or JSON task objects); `-` reads stdin
//! taskroute batch tasks.txt --stats
//!
//! # Validate a config file and print the effective settings
//! taskroute --config router.toml check-config
//! ```
//!
//! Decisions go to stdout as JSON; logs go to stderr (`RUST_LOG` filters).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use task_router::{
    CapabilitySource, RouterConfig, RoutingEngine, StaticSource, StructuredHints,
    TaskDescription, TomlFileSource,
};
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Router configuration file (TOML). Defaults plus TASKROUTE_* env overrides when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Worker registry file (TOML). Uses the built-in roster when absent
    #[arg(long, global = true)]
    workers: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true, default_value_t = false)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Route a single task description
    Route {
        /// Task text
        text: String,

        /// File the task touches (repeatable)
        #[arg(long = "file-pattern")]
        file_patterns: Vec<String>,

        /// Domain known to be involved (repeatable)
        #[arg(long = "domain")]
        domains: Vec<String>,

        /// Free-form working context
        #[arg(long)]
        context: Option<String>,

        /// Acceptance criterion (repeatable)
        #[arg(long = "criterion")]
        criteria: Vec<String>,
    },

    /// Route every task in a file
    Batch {
        /// Task file, or `-` for stdin
        file: PathBuf,

        /// Print engine statistics after the batch
        #[arg(long, default_value_t = false)]
        stats: bool,
    },

    /// Validate the configuration and print it as TOML
    CheckConfig,
}

impl Command {
    /// Hints assembled from `route` flags; `None` when no flag was given.
    fn hints(&self) -> Option<StructuredHints> {
        let Command::Route {
            file_patterns,
            domains,
            context,
            criteria,
            ..
        } = self
        else {
            return None;
        };
        let hints = StructuredHints {
            file_patterns: file_patterns.clone(),
            declared_domains: domains.clone(),
            working_context: context.clone(),
            acceptance_criteria: criteria.clone(),
        };
        (!hints.is_empty()).then_some(hints)
    }
}

fn load_config(path: Option<&Path>) -> Result<RouterConfig> {
    let config = match path {
        Some(path) => RouterConfig::load(path)
            .with_context(|| format!("loading router config {}", path.display()))?,
        None => {
            let config = RouterConfig::from_env();
            config.validate().context("validating router config from env")?;
            config
        }
    };
    Ok(config)
}

fn capability_source(workers: Option<&Path>) -> Arc<dyn CapabilitySource> {
    match workers {
        Some(path) => Arc::new(TomlFileSource::new(path)),
        None => Arc::new(StaticSource::builtin()),
    }
}

/// Parse a batch file: blank lines and `#` comments are skipped, lines
/// starting with `{` are JSON task objects, anything else is task text.
fn parse_batch(raw: &str) -> Result<Vec<TaskDescription>> {
    raw.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| {
            if line.starts_with('{') {
                serde_json::from_str(line).with_context(|| format!("parsing task on line {n}"))
            } else {
                Ok(TaskDescription::new(line))
            }
        })
        .collect()
}

fn read_batch(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("reading tasks from stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("reading task file {}", file.display()))
    }
}

fn emit<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

#[derive(Serialize)]
struct BatchError<'a> {
    text: &'a str,
    error: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    if let Command::CheckConfig = cli.command {
        print!("{}", config.to_toml_string()?);
        info!("Configuration valid");
        return Ok(());
    }

    let engine = RoutingEngine::builder(capability_source(cli.workers.as_deref()))
        .config(config)
        .build()
        .await
        .context("starting routing engine")?;

    match &cli.command {
        Command::Route { text, .. } => {
            let decision = engine
                .classify_and_route(text, cli.command.hints())
                .await
                .context("routing task")?;
            emit(&decision, cli.pretty)?;
        }
        Command::Batch { file, stats } => {
            let tasks = parse_batch(&read_batch(file)?)?;
            let mut failed = 0usize;
            for task in &tasks {
                match engine.classify_and_route(&task.text, task.hints.clone()).await {
                    Ok(decision) => emit(&decision, cli.pretty)?,
                    Err(e) => {
                        failed += 1;
                        warn!("Task rejected: {e}");
                        emit(
                            &BatchError {
                                text: &task.text,
                                error: e.to_string(),
                            },
                            cli.pretty,
                        )?;
                    }
                }
            }
            info!(tasks = tasks.len(), failed, "Batch routed");
            if *stats {
                emit(&engine.stats()?, cli.pretty)?;
            }
        }
        Command::CheckConfig => {}
    }

    engine.shutdown().await;
    Ok(())
}
