use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Central error type for the plantlink engine
#[derive(Error, Debug)]
pub enum PlantlinkError {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Invalid configuration at '{field}': {message}")]
    Config { field: String, message: String },

    #[error("Invalid condition expression '{expression}': {message}")]
    InvalidCondition { expression: String, message: String },

    // ============================================================================
    // Registry Errors
    // ============================================================================
    #[error("{role} not found: {id}")]
    ComponentNotFound { role: ComponentRole, id: String },

    #[error("{role} already registered: {id}")]
    DuplicateComponent { role: ComponentRole, id: String },

    #[error("Components cannot be registered while the pipeline is running")]
    PipelineRunning,

    // ============================================================================
    // Execution Errors
    // ============================================================================
    #[error("Stage execution failed: {0}")]
    StageExecution(String),

    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    // ============================================================================
    // Lifecycle Errors
    // ============================================================================
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // ============================================================================
    // Generic/System Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mutex lock error")]
    LockError,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlantlinkError {
    /// Shorthand for a configuration error on a named field
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        PlantlinkError::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Classify this error for the public failure record
    pub fn kind(&self) -> IntegrationErrorKind {
        match self {
            PlantlinkError::Config { .. } | PlantlinkError::InvalidCondition { .. } => {
                IntegrationErrorKind::Configuration
            }
            PlantlinkError::ComponentNotFound { .. } => IntegrationErrorKind::ComponentNotFound,
            PlantlinkError::Adapter(_) => IntegrationErrorKind::Connection,
            PlantlinkError::Subscription(_) => IntegrationErrorKind::Subscription,
            _ => IntegrationErrorKind::StageExecution,
        }
    }
}

// Implement conversion from PoisonError for Mutex locks
impl<T> From<std::sync::PoisonError<T>> for PlantlinkError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        PlantlinkError::LockError
    }
}

// Helper type alias for Results
pub type PlantlinkResult<T> = Result<T, PlantlinkError>;

/// Role a component plays in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentRole {
    SourceAdapter,
    SinkAdapter,
    Transformer,
    Validator,
    CustomHandler,
}

impl std::fmt::Display for ComponentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ComponentRole::SourceAdapter => "Source adapter",
            ComponentRole::SinkAdapter => "Sink adapter",
            ComponentRole::Transformer => "Transformer",
            ComponentRole::Validator => "Validator",
            ComponentRole::CustomHandler => "Custom handler",
        };
        f.write_str(name)
    }
}

/// Category of a failure surfaced to callers and the event bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationErrorKind {
    Configuration,
    ComponentNotFound,
    StageExecution,
    Transformation,
    Validation,
    Delivery,
    Connection,
    Subscription,
}

/// Failure record returned in `PipelineResult` and published with error events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationError {
    #[serde(rename = "type")]
    pub kind: IntegrationErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub integration_id: String,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl IntegrationError {
    pub fn new(
        kind: IntegrationErrorKind,
        message: impl Into<String>,
        integration_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            original_error: None,
            timestamp: Utc::now(),
            integration_id: integration_id.into(),
            context: Map::new(),
        }
    }

    /// Build a record from an engine error, keeping its display text as the original error
    pub fn from_error(error: &PlantlinkError, integration_id: impl Into<String>) -> Self {
        let mut record = Self::new(error.kind(), error.to_string(), integration_id);
        record.original_error = Some(format!("{:?}", error));
        record
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Display for IntegrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}
