//! `rusty-workflows` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server and scheduler.
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate a workflow JSON file.
//! - `run`      — execute a workflow JSON file once.

mod config;
mod logging;

use std::path::Path;
use std::sync::Arc;

use actions::{ActionRegistry, Collaborators};
use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use engine::{
    DefinitionRegistry, EngineConfig, InMemoryDefinitionRegistry, InMemoryRunStore, NewWorkflow,
    PgDefinitionRegistry, PgRunStore, RunStatus, RunStore, Scheduler, SystemClock,
    WorkflowDefinition, WorkflowEngine, WorkflowService,
};
use serde_json::Value;
use tracing::{info, warn};

use config::{Cli, Command, DatabaseArgs, HttpArgs, ServeArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.logging);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Migrate { database } => migrate(database).await,
        Command::Validate { path } => validate(&path),
        Command::Run { path, input, http } => run(&path, input.as_deref(), http).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let (definitions, runs): (Arc<dyn DefinitionRegistry>, Arc<dyn RunStore>) = match &args.database.url {
        Some(url) => {
            let pool = db::create_pool(url, &args.database.pool_settings())
                .await
                .context("failed to connect to database")?;
            (
                Arc::new(PgDefinitionRegistry::new(pool.clone())),
                Arc::new(PgRunStore::new(pool)),
            )
        }
        None => {
            warn!("DATABASE_URL not set; workflows and runs are kept in memory");
            (
                Arc::new(InMemoryDefinitionRegistry::new()),
                Arc::new(InMemoryRunStore::new()),
            )
        }
    };

    let actions = ActionRegistry::builtin(Collaborators::defaults(args.http.timeout())?);
    let engine = WorkflowEngine::new(actions, definitions, runs, EngineConfig::default());
    let scheduler = Arc::new(Scheduler::new(engine.clone(), Arc::new(SystemClock)));
    let service = WorkflowService::new(engine, scheduler.clone());

    let registered = service.bootstrap().await.context("scheduler bootstrap failed")?;
    info!(registered, bind = %args.bind, "starting API server");

    api::serve(&args.bind, api::AppState::new(service)).await?;
    scheduler.shutdown().await;
    Ok(())
}

async fn migrate(database: DatabaseArgs) -> anyhow::Result<()> {
    let Some(url) = &database.url else {
        bail!("--database-url or DATABASE_URL is required for migrate");
    };
    let pool = db::create_pool(url, &database.pool_settings())
        .await
        .context("failed to connect to database")?;
    db::run_migrations(&pool).await.context("migration failed")?;
    info!("migrations applied successfully");
    Ok(())
}

fn load_definition(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let new: NewWorkflow = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a workflow definition", path.display()))?;
    Ok(new.into_definition(Utc::now()))
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let definition = load_definition(path)?;
    engine::validate_definition(&definition, Utc::now())
        .with_context(|| format!("workflow '{}' is invalid", definition.name))?;
    let order = engine::validate_action_graph(&definition.actions)?;
    println!(
        "Workflow '{}' is valid ({} trigger). Action order: {order:?}",
        definition.name,
        definition.trigger.kind()
    );
    Ok(())
}

async fn run(path: &Path, input: Option<&str>, http: HttpArgs) -> anyhow::Result<()> {
    let definition = load_definition(path)?;
    engine::validate_definition(&definition, Utc::now())?;

    let input: Value = match input {
        Some(raw) => serde_json::from_str(raw).context("--input must be valid JSON")?,
        None => Value::Null,
    };

    let engine = WorkflowEngine::new(
        ActionRegistry::builtin(Collaborators::defaults(http.timeout())?),
        Arc::new(InMemoryDefinitionRegistry::new()),
        Arc::new(InMemoryRunStore::new()),
        EngineConfig::default(),
    );
    let run = engine.run_definition(definition, input).await?;
    println!("{}", serde_json::to_string_pretty(&run)?);

    if run.status == RunStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}
