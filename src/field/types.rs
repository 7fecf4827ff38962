//! Core data types of the tension field: thought nodes, satellites, topics
//! and the 2D vector they move in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{Add, AddAssign, Mul, Sub};
use uuid::Uuid;

/// Identifier of a thought node or satellite.
pub type NodeId = String;

// ============================================================================
// Geometry primitive
// ============================================================================

/// A 2D point or displacement in field coordinates (pixels).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector at `angle` radians.
    pub fn from_angle(angle: f64) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(&self, other: Vec2) -> f64 {
        (other - *self).length()
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    pub fn normalized(&self) -> Vec2 {
        let len = self.length();
        if len == 0.0 {
            Vec2::ZERO
        } else {
            *self * (1.0 / len)
        }
    }

    /// Same direction, length capped at `max`.
    pub fn clamp_length(&self, max: f64) -> Vec2 {
        let len = self.length();
        if len > max && len > 0.0 {
            *self * (max / len)
        } else {
            *self
        }
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

// ============================================================================
// Topic and category
// ============================================================================

/// The fixed set of topics a thought node can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKey {
    /// What is actually true about the situation.
    Reality,
    /// What matters to the person deciding.
    Values,
    /// Which paths are available.
    Options,
    /// How the person feels about it.
    Feelings,
}

/// Question category, derived from the topic by a total mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    Factual,
    Priority,
    Strategic,
    Emotional,
}

impl TopicKey {
    pub const ALL: [TopicKey; 4] = [
        TopicKey::Reality,
        TopicKey::Values,
        TopicKey::Options,
        TopicKey::Feelings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKey::Reality => "reality",
            TopicKey::Values => "values",
            TopicKey::Options => "options",
            TopicKey::Feelings => "feelings",
        }
    }

    pub fn category(&self) -> QuestionCategory {
        match self {
            TopicKey::Reality => QuestionCategory::Factual,
            TopicKey::Values => QuestionCategory::Priority,
            TopicKey::Options => QuestionCategory::Strategic,
            TopicKey::Feelings => QuestionCategory::Emotional,
        }
    }
}

impl std::fmt::Display for TopicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TopicKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reality" => Ok(TopicKey::Reality),
            "values" => Ok(TopicKey::Values),
            "options" => Ok(TopicKey::Options),
            "feelings" => Ok(TopicKey::Feelings),
            _ => Err(format!("Unknown topic: {}", s)),
        }
    }
}

// ============================================================================
// Node lifecycle
// ============================================================================

/// Lifecycle state of a thought node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Spawned, waiting to be explored.
    #[default]
    Latent,
    /// Latent and untouched for a while.
    Dormant,
    /// The single node currently being answered.
    Probing,
    /// Answered.
    Resolved,
    /// Low intensity, visually receding.
    Fading,
    /// Faded out; hidden and excluded from simulation.
    Dissolved,
    /// Folded into another node by a merge.
    Merged,
    /// Thrown away by the user.
    Exiting,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Latent => "latent",
            NodeState::Dormant => "dormant",
            NodeState::Probing => "probing",
            NodeState::Resolved => "resolved",
            NodeState::Fading => "fading",
            NodeState::Dissolved => "dissolved",
            NodeState::Merged => "merged",
            NodeState::Exiting => "exiting",
        }
    }

    /// Whether the node takes part in forces and clustering.
    pub fn is_simulated(&self) -> bool {
        !self.is_gone()
    }

    /// Terminal states: no event may bring the node back.
    pub fn is_gone(&self) -> bool {
        matches!(
            self,
            NodeState::Dissolved | NodeState::Merged | NodeState::Exiting
        )
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Satellites
// ============================================================================

/// Visibility state of a satellite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SatelliteState {
    Active,
    /// No activity within the dim window.
    Dimmed,
    /// Answered and fading out before removal.
    Answered,
}

/// A follow-up question orbiting a parent node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Satellite {
    pub id: NodeId,
    pub parent_id: NodeId,
    pub question: String,
    pub answer: Option<String>,
    /// Orbit angle around the parent, radians.
    pub angle: f64,
    pub position: Vec2,
    pub state: SatelliteState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
}

/// Status of an open loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Open,
    Closed,
}

/// A follow-up the user still owes an answer to. Blocks convergence while open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenLoop {
    pub id: String,
    pub node_id: NodeId,
    pub satellite_id: Option<NodeId>,
    pub description: String,
    pub status: LoopStatus,
    pub created_at: DateTime<Utc>,
}

impl OpenLoop {
    pub fn new(node_id: impl Into<String>, description: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node_id: node_id.into(),
            satellite_id: None,
            description: description.into(),
            status: LoopStatus::Open,
            created_at: now,
        }
    }

    pub fn for_satellite(mut self, satellite_id: impl Into<String>) -> Self {
        self.satellite_id = Some(satellite_id.into());
        self
    }

    pub fn is_open(&self) -> bool {
        self.status == LoopStatus::Open
    }
}

// ============================================================================
// Thought node
// ============================================================================

/// A single open question simulated on the decision surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtNode {
    pub id: NodeId,
    pub question: String,
    /// Free-form concept label; equal concepts attract strongly.
    pub concept: Option<String>,
    pub answer: Option<String>,
    pub topic: TopicKey,
    pub category: QuestionCategory,
    pub position: Vec2,
    /// Liveness in [0, 1]; drives opacity and fade eligibility.
    pub intensity: f64,
    /// Explicit relatedness overrides keyed by the other node's id.
    #[serde(default)]
    pub affinities: HashMap<NodeId, f64>,
    pub state: NodeState,
    /// Surviving node id once merged.
    pub merged_into: Option<NodeId>,
    #[serde(default)]
    pub satellites: Vec<Satellite>,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Canonical form of a concept label: trimmed and lowercased. Blank labels
/// carry no concept.
pub fn normalize_concept(concept: &str) -> Option<String> {
    let concept = concept.trim();
    if concept.is_empty() {
        None
    } else {
        Some(concept.to_lowercase())
    }
}

/// Intensity of a freshly spawned node. Sits above the default signal
/// threshold so untouched nodes only start fading once they go dormant.
pub const SPAWN_INTENSITY: f64 = 0.75;

impl ThoughtNode {
    pub fn new(question: impl Into<String>, topic: TopicKey, position: Vec2, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            question: question.into(),
            concept: None,
            answer: None,
            topic,
            category: topic.category(),
            position,
            intensity: SPAWN_INTENSITY,
            affinities: HashMap::new(),
            state: NodeState::Latent,
            merged_into: None,
            satellites: Vec::new(),
            created_at: now,
            last_touched_at: now,
            resolved_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_concept(mut self, concept: impl AsRef<str>) -> Self {
        self.concept = normalize_concept(concept.as_ref());
        self
    }

    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.intensity = intensity.clamp(0.0, 1.0);
        self
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    pub fn with_affinity(mut self, other: impl Into<String>, score: f64) -> Self {
        self.affinities.insert(other.into(), score.clamp(0.0, 1.0));
        self
    }

    /// Age in milliseconds at `now`.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_milliseconds()
    }

    /// Raise intensity by an explicit external signal.
    pub fn boost(&mut self, amount: f64) {
        self.intensity = (self.intensity + amount).clamp(0.0, 1.0);
    }

    pub fn is_simulated(&self) -> bool {
        self.state.is_simulated()
    }
}
