use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;
use crate::field::types::SPAWN_INTENSITY;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: LangbaseConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub field: FieldConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    /// Empty when no key is configured; the client then fails fast and
    /// every collaborator falls back locally.
    pub api_key: String,
    pub base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Langbase pipe names for each collaborator
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub questions: String,
    pub answers: String,
    pub merge: String,
    pub confirmation: String,
    pub insight: String,
}

/// Tuning constants for the tension field.
///
/// No invariant depends on the magnitudes, only on the relative ordering
/// checked by [`FieldConfig::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConfig {
    pub tick_interval_ms: u64,

    // Forces
    pub min_distance: f64,
    pub max_distance: f64,
    pub attraction_strength: f64,
    pub repulsion_strength: f64,
    pub resolved_push: f64,
    pub damping: f64,
    pub max_step: f64,

    // Clustering
    pub cluster_distance_threshold: f64,
    pub movement_threshold: f64,
    pub stable_duration_ms: i64,

    // Fading
    pub grace_period_ms: i64,
    pub fade_interval_ms: i64,
    pub fade_rate: f64,
    pub signal_threshold: f64,
    pub fading_threshold: f64,
    pub dissolve_threshold: f64,
    pub dormancy_ms: i64,

    // Convergence
    pub min_resolved_nodes: usize,
    pub confusion_window_ms: i64,
    pub max_active_latent: usize,
    pub cluster_dominance_threshold: f64,
    pub settle_threshold: usize,
    pub convergence_delay_ms: u64,

    // Satellites
    pub satellite_dim_ms: i64,
    pub satellite_fade_out_ms: i64,
    pub satellite_orbit: f64,

    // Spawning
    pub spawn_radius: f64,
    pub spawn_jitter: f64,

    // Leaning
    pub leaning_max_shift: f64,

    // Drag-to-throw
    pub throw_velocity_threshold: f64,
    pub throw_sample_window: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").unwrap_or_default(),
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/tension-field.db".to_string()),
            ),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", 30000),
            max_retries: env_or("MAX_RETRIES", 3),
            retry_delay_ms: env_or("RETRY_DELAY_MS", 1000),
        };

        let pipes = PipeConfig::from_env();
        let field = FieldConfig::from_env();
        field.validate()?;

        Ok(Config {
            langbase,
            database,
            logging,
            request,
            pipes,
            field,
        })
    }
}

/// Parse an environment variable, falling back to `default` when it is
/// missing or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            questions: "field-questions-v1".to_string(),
            answers: "field-answer-analysis-v1".to_string(),
            merge: "field-merge-detection-v1".to_string(),
            confirmation: "field-confirmation-v1".to_string(),
            insight: "field-insight-v1".to_string(),
        }
    }
}

impl PipeConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            questions: env::var("PIPE_QUESTIONS").unwrap_or(defaults.questions),
            answers: env::var("PIPE_ANSWERS").unwrap_or(defaults.answers),
            merge: env::var("PIPE_MERGE").unwrap_or(defaults.merge),
            confirmation: env::var("PIPE_CONFIRMATION").unwrap_or(defaults.confirmation),
            insight: env::var("PIPE_INSIGHT").unwrap_or(defaults.insight),
        }
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            min_distance: 80.0,
            max_distance: 400.0,
            attraction_strength: 600.0,
            repulsion_strength: 1200.0,
            resolved_push: 15.0,
            damping: 0.1,
            max_step: 12.0,
            cluster_distance_threshold: 160.0,
            movement_threshold: 4.0,
            stable_duration_ms: 3000,
            grace_period_ms: 8000,
            fade_interval_ms: 1000,
            fade_rate: 0.92,
            signal_threshold: 0.7,
            fading_threshold: 0.3,
            dissolve_threshold: 0.03,
            dormancy_ms: 45000,
            min_resolved_nodes: 2,
            confusion_window_ms: 60000,
            max_active_latent: 3,
            cluster_dominance_threshold: 0.5,
            settle_threshold: 2,
            convergence_delay_ms: 600,
            satellite_dim_ms: 30000,
            satellite_fade_out_ms: 600,
            satellite_orbit: 70.0,
            spawn_radius: 180.0,
            spawn_jitter: 20.0,
            leaning_max_shift: 0.15,
            throw_velocity_threshold: 500.0,
            throw_sample_window: 5,
        }
    }
}

impl FieldConfig {
    /// Defaults overridden by `FIELD_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            tick_interval_ms: env_or("FIELD_TICK_INTERVAL_MS", d.tick_interval_ms),
            min_distance: env_or("FIELD_MIN_DISTANCE", d.min_distance),
            max_distance: env_or("FIELD_MAX_DISTANCE", d.max_distance),
            attraction_strength: env_or("FIELD_ATTRACTION", d.attraction_strength),
            repulsion_strength: env_or("FIELD_REPULSION", d.repulsion_strength),
            resolved_push: env_or("FIELD_RESOLVED_PUSH", d.resolved_push),
            damping: env_or("FIELD_DAMPING", d.damping),
            max_step: env_or("FIELD_MAX_STEP", d.max_step),
            cluster_distance_threshold: env_or(
                "FIELD_CLUSTER_DISTANCE",
                d.cluster_distance_threshold,
            ),
            movement_threshold: env_or("FIELD_MOVEMENT_THRESHOLD", d.movement_threshold),
            stable_duration_ms: env_or("FIELD_STABLE_DURATION_MS", d.stable_duration_ms),
            grace_period_ms: env_or("FIELD_GRACE_PERIOD_MS", d.grace_period_ms),
            fade_interval_ms: env_or("FIELD_FADE_INTERVAL_MS", d.fade_interval_ms),
            fade_rate: env_or("FIELD_FADE_RATE", d.fade_rate),
            signal_threshold: env_or("FIELD_SIGNAL_THRESHOLD", d.signal_threshold),
            fading_threshold: env_or("FIELD_FADING_THRESHOLD", d.fading_threshold),
            dissolve_threshold: env_or("FIELD_DISSOLVE_THRESHOLD", d.dissolve_threshold),
            dormancy_ms: env_or("FIELD_DORMANCY_MS", d.dormancy_ms),
            min_resolved_nodes: env_or("FIELD_MIN_RESOLVED", d.min_resolved_nodes),
            confusion_window_ms: env_or("FIELD_CONFUSION_WINDOW_MS", d.confusion_window_ms),
            max_active_latent: env_or("FIELD_MAX_ACTIVE_LATENT", d.max_active_latent),
            cluster_dominance_threshold: env_or(
                "FIELD_DOMINANCE_THRESHOLD",
                d.cluster_dominance_threshold,
            ),
            settle_threshold: env_or("FIELD_SETTLE_THRESHOLD", d.settle_threshold),
            convergence_delay_ms: env_or("FIELD_CONVERGENCE_DELAY_MS", d.convergence_delay_ms),
            satellite_dim_ms: env_or("FIELD_SATELLITE_DIM_MS", d.satellite_dim_ms),
            satellite_fade_out_ms: env_or("FIELD_SATELLITE_FADE_OUT_MS", d.satellite_fade_out_ms),
            satellite_orbit: env_or("FIELD_SATELLITE_ORBIT", d.satellite_orbit),
            spawn_radius: env_or("FIELD_SPAWN_RADIUS", d.spawn_radius),
            spawn_jitter: env_or("FIELD_SPAWN_JITTER", d.spawn_jitter),
            leaning_max_shift: env_or("FIELD_LEANING_MAX_SHIFT", d.leaning_max_shift),
            throw_velocity_threshold: env_or("FIELD_THROW_VELOCITY", d.throw_velocity_threshold),
            throw_sample_window: env_or("FIELD_THROW_WINDOW", d.throw_sample_window),
        }
    }

    /// Check the relative ordering the engine relies on.
    pub fn validate(&self) -> Result<(), AppError> {
        let fail = |message: &str| {
            Err(AppError::Config {
                message: message.to_string(),
            })
        };

        if !(self.dissolve_threshold < self.fading_threshold
            && self.fading_threshold < self.signal_threshold)
        {
            return fail("thresholds must satisfy dissolve < fading < signal");
        }
        if self.signal_threshold >= SPAWN_INTENSITY {
            return fail("signal_threshold must stay below the spawn intensity");
        }
        if !(self.fade_rate > 0.0 && self.fade_rate < 1.0) {
            return fail("fade_rate must be in (0, 1)");
        }
        if !(self.damping > 0.0 && self.damping < 1.0) {
            return fail("damping must be in (0, 1)");
        }
        if self.min_distance >= self.max_distance {
            return fail("min_distance must be below max_distance");
        }
        if self.tick_interval_ms == 0 {
            return fail("tick_interval_ms must be positive");
        }
        if self.throw_sample_window < 2 {
            return fail("throw_sample_window needs at least two samples");
        }
        Ok(())
    }
}
