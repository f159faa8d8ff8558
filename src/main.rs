use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use petition_store::config;
use petition_store::db::{self, SqliteRelationalStore};
use petition_store::docstore::HttpDocumentStore;
use petition_store::shortener::HttpShortener;
use petition_store::{PetitionController, PetitionItem};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Inspect and maintain petitions across the document and relational stores"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the migration phase currently in force
    Phase,
    /// Load one petition by legacy id or entity id
    Show {
        id: String,
        /// Allow a possibly-stale read from a replica or secondary
        #[arg(long)]
        stale: bool,
    },
    /// Save a petition from a flat JSON record
    Save { file: PathBuf },
    /// Delete a petition from every active backend
    Delete { id: String },
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let phases = cfg.phase_registry();
    if let Command::Phase = args.command {
        return print_json(&phases.snapshot());
    }

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.relational.database_url.clone());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;
    let relational = match cfg.relational.replica_url.as_deref() {
        Some(url) => SqliteRelationalStore::with_replica(pool, db::init_replica_pool(url).await?),
        None => SqliteRelationalStore::new(pool),
    };

    let controller = PetitionController::new(
        phases,
        Arc::new(HttpDocumentStore::from_config(&cfg)?),
        Arc::new(relational),
        Arc::new(HttpShortener::new(
            &cfg.shortener.endpoint,
            cfg.shortener.token.clone(),
        )?),
        cfg.url_settings(),
    );
    info!(phase = ?controller.phases().snapshot(), "petition store ready");

    match args.command {
        Command::Phase => Ok(()),
        Command::Show { id, stale } => match controller.load(&id, !stale).await? {
            Some(record) => print_json(&record),
            None => Err(anyhow!("petition {} not found", id)),
        },
        Command::Save { file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let record: Map<String, Value> =
                serde_json::from_str(&content).context("petition file must be a JSON object")?;
            let mut item = PetitionItem::from_flat(record)?;
            let outcome = controller.save(&mut item).await?;
            print_json(&json!({ "outcome": outcome, "petition": item.to_flat() }))
        }
        Command::Delete { id } => {
            let outcome = controller.delete(&id).await?;
            print_json(&outcome)
        }
    }
}
