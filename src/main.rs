use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tension_field::{
    config::{Config, LogFormat},
    langbase::LangbaseClient,
    server::{AppState, McpServer},
    session::{spawn_tick_loop, Collaborators, Phase, SessionMachine, StorageRecorder},
    storage::{SqliteStorage, Storage},
};

#[derive(Parser)]
#[command(name = "tension-field")]
#[command(version)]
#[command(about = "Decision-support tension field served over MCP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP stdio server with a live tick loop (default)
    Serve,

    /// Headless offline run printing JSON field snapshots
    Simulate {
        /// Decision statement to explore
        #[arg(short, long)]
        decision: String,

        /// Number of ticks to simulate
        #[arg(short, long, default_value_t = 200)]
        ticks: u64,

        /// Print a snapshot every N ticks
        #[arg(long, default_value_t = 50)]
        every: u64,

        /// Answers applied to the spawned nodes in order
        #[arg(short, long)]
        answer: Vec<String>,
    },

    /// Print the persisted message log and latest session of a conversation
    History {
        /// Conversation id
        conversation_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Simulate {
            decision,
            ticks,
            every,
            answer,
        } => simulate(config, &decision, ticks, every, &answer).await,
        Commands::History { conversation_id } => history(config, &conversation_id).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "Tension field server starting...");

    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let langbase = match LangbaseClient::new(&config.langbase, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.langbase.base_url, "Langbase client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Langbase client");
            return Err(e.into());
        }
    };

    let state = Arc::new(AppState::new(config, storage, langbase));

    if let Some(pipes) = &state.pipes {
        info!("Ensuring required Langbase pipes exist...");
        if let Err(e) = pipes.ensure_pipes().await {
            warn!(error = %e, "Failed to ensure Langbase pipes, collaborators will fall back");
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = spawn_tick_loop(state.machine.clone(), shutdown_rx);

    let server = McpServer::new(state);
    info!("Server ready, waiting for requests on stdin...");
    let result = server.run().await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = ticker.await {
        warn!(error = %e, "Tick loop ended abnormally");
    }

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Drive an offline machine on a simulated clock.
async fn simulate(config: Config, decision: &str, ticks: u64, every: u64, answers: &[String]) -> anyhow::Result<()> {
    let field = config.field;
    let step = Duration::milliseconds(field.tick_interval_ms as i64);
    let machine = SessionMachine::new(field, Collaborators::offline(), "simulation");

    let mut now = Utc::now();
    machine.submit_decision(decision, now).await;

    let node_ids = machine.snapshot().await.field.ids();
    for (node_id, answer) in node_ids.iter().zip(answers) {
        now += Duration::seconds(5);
        machine.select_node(node_id, now).await;
        now += Duration::seconds(5);
        machine.answer_question(node_id, answer, now).await;
    }

    let every = every.max(1);
    for tick in 1..=ticks {
        now += step;
        machine.tick(now).await;
        if tick % every == 0 {
            print_snapshot(&machine).await?;
        }
    }

    let session_id = machine.snapshot().await.session.id.clone();
    if let Some(statement) = machine.run_convergence_check(&session_id, now).await {
        info!(statement = %statement, "Field converged");
    }
    print_snapshot(&machine).await?;

    let phase = machine.phase().await;
    if phase != Phase::Exploring {
        warn!(phase = %phase, "Simulation ended outside exploring");
    }
    Ok(())
}

async fn print_snapshot(machine: &SessionMachine) -> anyhow::Result<()> {
    let view = machine.snapshot().await.view();
    println!("{}", serde_json::to_string(&view)?);
    Ok(())
}

async fn history(config: Config, conversation_id: &str) -> anyhow::Result<()> {
    let storage = SqliteStorage::new(&config.database).await?;

    for entry in storage.get_messages(conversation_id).await? {
        println!("{}", serde_json::to_string(&entry)?);
    }
    if let Some(latest) = storage.latest_session(conversation_id).await? {
        info!(
            session_id = %latest.id,
            phase = %latest.phase,
            ending = ?latest.ending,
            "Latest session"
        );
        let recorder = StorageRecorder::new(storage.clone());
        if let Some(session) = recorder.restore(&latest.id).await? {
            println!("{}", serde_json::to_string(&session)?);
        }
    }
    Ok(())
}

/// Initialize tracing/logging. Output goes to stderr; stdout carries JSON-RPC.
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
