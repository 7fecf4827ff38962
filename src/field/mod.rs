//! Tension Field Engine.
//!
//! A small damped particle simulation over "thought nodes": pairwise forces
//! position them, proximity clustering observes the result, low-signal nodes
//! fade out, and the convergence evaluator decides when the field has calmed
//! down enough to offer closure.
//!
//! Every function here is pure over node collections and takes `now`
//! explicitly; the session layer owns the clock and the shared state.

pub mod affinity;
pub mod clustering;
pub mod convergence;
pub mod engine;
pub mod fading;
pub mod forces;
pub mod geometry;
pub mod leaning;
pub mod satellites;
pub mod signals;
pub mod throw;
pub mod types;

pub use clustering::{ClusterKey, ClusterTracker, ConceptCluster};
pub use convergence::{check_convergence, draft_confirmation, ConvergenceBlocker, ConvergenceInput, ConvergenceReport};
pub use engine::TensionField;
pub use leaning::LeaningVector;
pub use signals::{BehaviorSignal, BehaviorTracker, Indication, SignalKind};
pub use throw::{PointerSample, ThrowAction, VelocityTracker};
pub use types::{
    normalize_concept, LoopStatus, NodeId, NodeState, OpenLoop, QuestionCategory, Satellite, SatelliteState,
    ThoughtNode, TopicKey, Vec2,
};
