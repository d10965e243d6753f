//! Command-line arguments. Every option can also come from the environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "rusty-workflows",
    about = "Workflow automation engine: scheduled, event-driven and manual pipelines",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the REST API server and the scheduler.
    Serve(ServeArgs),
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        database: DatabaseArgs,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Execute a workflow definition file once and print the resulting run.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// JSON payload exposed to the run as `trigger`.
        #[arg(long)]
        input: Option<String>,
        #[command(flatten)]
        http: HttpArgs,
    },
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind: String,

    #[command(flatten)]
    pub database: DatabaseArgs,

    #[command(flatten)]
    pub http: HttpArgs,
}

#[derive(Args)]
pub struct DatabaseArgs {
    /// Postgres connection string. Without it, state is kept in memory.
    #[arg(long = "database-url", env = "DATABASE_URL")]
    pub url: Option<String>,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,
}

impl DatabaseArgs {
    pub fn pool_settings(&self) -> db::PoolSettings {
        db::PoolSettings {
            max_connections: self.max_connections,
            ..db::PoolSettings::default()
        }
    }
}

#[derive(Args)]
pub struct HttpArgs {
    /// Transport timeout for webhook actions.
    #[arg(long, env = "WEBHOOK_TIMEOUT_SECS", default_value_t = 30)]
    pub webhook_timeout_secs: u64,
}

impl HttpArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Args)]
pub struct LoggingArgs {
    /// Default filter when `RUST_LOG` is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,
}
