use thiserror::Error;

/// Unified error type for the entire autohunt workspace.
#[derive(Error, Debug)]
pub enum HuntError {
    // ── Lifecycle errors ───────────────────────────────────────
    #[error("no configuration loaded")]
    ConfigurationMissing,

    #[error("decision loop is not running")]
    NotRunning,

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Perception / actuation errors ──────────────────────────
    #[error("perception unavailable: {0}")]
    PerceptionUnavailable(String),

    #[error("actuation failed: {action}: {reason}")]
    ActuationFailed { action: String, reason: String },

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    // ── Contract errors ────────────────────────────────────────
    #[error("unknown stat counter: {0}")]
    UnknownCounter(String),

    #[error("waypoint not found: {0}")]
    WaypointNotFound(String),

    // ── Storage errors ─────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl HuntError {
    /// Transient errors are logged and the tick moves on; they never end a run.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PerceptionUnavailable(_) | Self::ActuationFailed { .. } | Self::Timeout { .. }
        )
    }

    pub fn actuation(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ActuationFailed {
            action: action.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HuntError>;
