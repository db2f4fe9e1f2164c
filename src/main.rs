use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use uuid::Uuid;

use tracemine::agent::{AgentRuntime, ReplayRuntime, stream_turn};
use tracemine::batch::{AnswerRecord, BatchRunner};
use tracemine::config::{AgentConfig, BatchConfig, parse_workers};

/// Split agent event streams into answers, documents and retrieved chunks.
#[derive(Parser)]
#[command(name = "tracemine")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Agent identifier (overrides TRACEMINE_AGENT_ID)
    #[arg(long, global = true)]
    agent_id: Option<String>,

    /// Agent alias identifier (overrides TRACEMINE_AGENT_ALIAS_ID)
    #[arg(long, global = true)]
    agent_alias_id: Option<String>,

    /// Invoke without trace payloads (no documents or chunks)
    #[arg(long, global = true)]
    no_trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream one recorded turn, printing each event as a JSON line
    Mine {
        /// Recorded transcript (JSON Lines)
        transcript: PathBuf,

        /// Which recorded input to replay; optional if there is only one
        #[arg(long)]
        input: Option<String>,
    },

    /// Answer a file of questions, one per line, printing one JSON row each
    Batch {
        /// Recorded transcript (JSON Lines)
        transcript: PathBuf,

        /// Questions file, one question per line
        #[arg(long)]
        questions: PathBuf,

        /// Number of parallel workers (overrides TRACEMINE_MAX_WORKERS)
        #[arg(long, value_parser = parse_workers_arg)]
        workers: Option<usize>,

        /// Print documents and chunks as single " | "-joined strings
        #[arg(long)]
        flat: bool,
    },
}

fn parse_workers_arg(raw: &str) -> Result<usize, String> {
    parse_workers(raw).map_err(|e| e.to_string())
}

fn agent_config(cli: &Cli) -> anyhow::Result<AgentConfig> {
    let mut config = AgentConfig::from_env_or("replay", "replay")?;
    if let Some(id) = &cli.agent_id {
        config.agent_id = id.clone();
    }
    if let Some(alias) = &cli.agent_alias_id {
        config.agent_alias_id = alias.clone();
    }
    if cli.no_trace {
        config.enable_trace = false;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let agent = agent_config(&cli)?;

    match cli.command {
        Command::Mine { transcript, input } => mine(agent, transcript, input).await,
        Command::Batch {
            transcript,
            questions,
            workers,
            flat,
        } => batch(agent, transcript, questions, workers, flat).await,
    }
}

async fn mine(
    agent: AgentConfig,
    transcript: PathBuf,
    input: Option<String>,
) -> anyhow::Result<()> {
    let runtime = ReplayRuntime::from_path(&transcript)
        .await
        .with_context(|| format!("loading {}", transcript.display()))?;

    let input = match input {
        Some(input) => input,
        None => match runtime.inputs().as_slice() {
            [only] => only.to_string(),
            [] => bail!("{} has no recordings", transcript.display()),
            many => bail!(
                "{} has {} recordings; pick one with --input",
                transcript.display(),
                many.len()
            ),
        },
    };

    let connection = runtime.connect().await?;
    let request = agent.request(Uuid::new_v4().to_string(), input);
    let mut events = stream_turn(connection, request);

    let mut seen = Vec::new();
    loop {
        let event = tokio::select! {
            event = events.next() => event,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted; abandoning turn");
                return Ok(());
            }
        };
        let Some(event) = event else {
            break;
        };

        println!("{}", serde_json::to_string(&event)?);
        seen.push(event);
    }

    let record = AnswerRecord::from_events(&seen);
    println!("{}", serde_json::to_string(&record)?);
    Ok(())
}

async fn batch(
    agent: AgentConfig,
    transcript: PathBuf,
    questions: PathBuf,
    workers: Option<usize>,
    flat: bool,
) -> anyhow::Result<()> {
    let runtime: Arc<dyn AgentRuntime> = Arc::new(
        ReplayRuntime::from_path(&transcript)
            .await
            .with_context(|| format!("loading {}", transcript.display()))?,
    );

    let contents = tokio::fs::read_to_string(&questions)
        .await
        .with_context(|| format!("reading {}", questions.display()))?;
    let questions: Vec<String> = contents.lines().map(str::to_string).collect();

    let mut config = BatchConfig::from_env()?;
    if let Some(workers) = workers {
        config.max_workers = workers;
    }

    let rows = BatchRunner::new(runtime, agent, config).run(&questions).await;
    for row in &rows {
        let line = if flat {
            serde_json::to_string(&row.to_flat())?
        } else {
            serde_json::to_string(row)?
        };
        println!("{line}");
    }

    tracing::info!(rows = rows.len(), "Batch complete");
    Ok(())
}
