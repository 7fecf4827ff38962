//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state management

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::langbase::LangbaseClient;
use crate::session::{Collaborators, LangbasePipes, PipeCore, SessionMachine, StorageRecorder};
use crate::storage::SqliteStorage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// SQLite storage backend.
    pub storage: SqliteStorage,
    /// Langbase API client.
    pub langbase: LangbaseClient,
    /// The live decision session.
    pub machine: SessionMachine,
    /// Pipe-backed collaborators, present when Langbase is configured.
    pub pipes: Option<LangbasePipes>,
}

impl AppState {
    /// Create new application state with a fresh conversation.
    ///
    /// Without a Langbase API key every AI collaborator stays offline and the
    /// machine runs on its local fallbacks. Persistence is always on.
    pub fn new(config: Config, storage: SqliteStorage, langbase: LangbaseClient) -> Self {
        let recorder = Arc::new(StorageRecorder::new(storage.clone()));
        let mut collaborators = Collaborators::offline().with_recorder(recorder);

        let pipes = if langbase.is_configured() {
            let pipes = LangbasePipes::new(
                PipeCore::new(storage.clone(), langbase.clone()),
                config.pipes.clone(),
            );
            let shared = Arc::new(pipes.clone());
            collaborators = collaborators
                .with_questions(shared.clone())
                .with_analyzer(shared.clone())
                .with_merges(shared.clone())
                .with_drafter(shared.clone())
                .with_insights(shared);
            tracing::info!(
                questions_pipe = %config.pipes.questions,
                answers_pipe = %config.pipes.answers,
                "AppState initializing with Langbase collaborators"
            );
            Some(pipes)
        } else {
            tracing::warn!("LANGBASE_API_KEY not set, running with offline collaborators");
            None
        };

        let machine = SessionMachine::new(config.field.clone(), collaborators, Uuid::new_v4().to_string());
        Self::with_machine(config, storage, langbase, machine, pipes)
    }

    /// Assemble state around an existing machine.
    pub fn with_machine(
        config: Config,
        storage: SqliteStorage,
        langbase: LangbaseClient,
        machine: SessionMachine,
        pipes: Option<LangbasePipes>,
    ) -> Self {
        Self {
            config,
            storage,
            langbase,
            machine,
            pipes,
        }
    }

    /// Whether AI collaborators are wired to Langbase.
    pub fn is_online(&self) -> bool {
        self.pipes.is_some()
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
