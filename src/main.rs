use std::path::PathBuf;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use table_insight::config::{redact_url, ConfigArgs};
use table_insight::AnalysisEngine;

#[derive(Debug, Parser)]
#[command(name = "table-insight", version, about = "Ask questions about tabular files")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a file and ask a question about it.
    Ask {
        file: PathBuf,
        question: String,
        /// Existing session to attach the dataset to; a new one is created otherwise.
        #[arg(long)]
        session: Option<String>,
        /// Print the structured result as JSON instead of the report.
        #[arg(long)]
        json: bool,
    },
    /// Ask another question about a dataset already uploaded to a session.
    Followup {
        #[arg(long)]
        session: String,
        #[arg(long)]
        dataset: String,
        question: String,
    },
    /// Print the chat history of a session.
    History {
        #[arg(long)]
        session: String,
    },
    /// List the datasets uploaded to a session.
    Datasets {
        #[arg(long)]
        session: String,
    },
    /// List known sessions, most recently updated first.
    Sessions,
    /// Delete a session with its datasets and history.
    DeleteSession {
        #[arg(long)]
        session: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "table_insight=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.config.into_config()?;

    info!("Configuration loaded:");
    info!("  Generation endpoint: {}", config.generation.endpoint);
    info!("  Generation model: {}", config.generation.model);
    info!("  Materialization: {:?}", config.engine.materialization);
    match &config.database_url {
        Some(url) => info!("  Database URL: {}", redact_url(url)),
        None => info!("  Database URL: <none, in-memory sessions>"),
    }

    let engine = AnalysisEngine::new(config).await?;

    let outcome = run(&engine, cli.command).await;
    if let Err(err) = &outcome {
        error!("Command failed: {:#}", err);
    }
    outcome
}

async fn run(engine: &AnalysisEngine, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Ask {
            file,
            question,
            session,
            json,
        } => {
            let filename = file
                .file_name()
                .and_then(|name| name.to_str())
                .with_context(|| format!("{} has no usable file name", file.display()))?
                .to_string();
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;

            let session_id = match session {
                Some(session_id) => session_id,
                None => engine.create_session().await?,
            };

            let response = engine
                .analyze(Bytes::from(bytes), &filename, &question, &session_id)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.report);
                println!();
                println!("session: {}  dataset: {}", session_id, response.dataset_id);
            }
        }
        Command::Followup {
            session,
            dataset,
            question,
        } => {
            let response = engine.ask(&session, &dataset, &question).await?;
            println!("{}", response.report);
        }
        Command::History { session } => {
            let turns = engine.list_history(&session).await?;
            println!("{}", serde_json::to_string_pretty(&turns)?);
        }
        Command::Datasets { session } => {
            let datasets = engine.list_datasets(&session).await?;
            println!("{}", serde_json::to_string_pretty(&datasets)?);
        }
        Command::Sessions => {
            let sessions = engine.list_sessions().await?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        Command::DeleteSession { session } => {
            engine.delete_session(&session).await?;
            println!("deleted session {}", session);
        }
    }

    Ok(())
}
