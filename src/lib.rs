//! # Tension Field
//!
//! A decision-support engine. A person states a decision; the engine spawns
//! a handful of open questions as "thought nodes" in a small damped particle
//! simulation, lets related answers drift together, fades what is ignored,
//! and offers a soft confirmation once the field has calmed down.
//!
//! ## Features
//!
//! - **Tension Field Engine**: forces, affinity, clustering with stability
//!   detection, fading and dissolution, convergence evaluation
//! - **Session State Machine**: idle, intake, exploring, settling and silent
//!   phases with copy-on-write snapshots shared with a fixed-rate tick loop
//! - **Collaborators**: question generation, answer analysis, merge
//!   detection, confirmation and insight drafting through Langbase pipes,
//!   with local fallbacks when offline
//! - **Persistence**: message log, session snapshots and AI invocation log in
//!   SQLite
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server (Rust) → SessionMachine → Langbase Pipes (HTTP)
//!                                       ↓
//!                              TensionField + SQLite
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use tension_field::config::FieldConfig;
//! use tension_field::session::{Collaborators, SessionMachine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let machine = SessionMachine::new(FieldConfig::default(), Collaborators::offline(), "conv-1");
//!     machine.submit_decision("Should I move abroad?", chrono::Utc::now()).await;
//!     machine.tick(chrono::Utc::now()).await;
//!     println!("{:?}", machine.snapshot().await.view());
//! }
//! ```

/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// The Tension Field Engine: simulation, clustering, fading and convergence.
pub mod field;
/// Langbase API client and types for pipe communication.
pub mod langbase;
/// System prompts for Langbase pipes.
pub mod prompts;
/// MCP server implementation and request handling.
pub mod server;
/// Decision sessions and the phase state machine.
pub mod session;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
