use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::expression::Condition;

/// Opaque per-stage options consumed by the stage implementation
pub type StageOptions = Map<String, Value>;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Kind of work a stage performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageType {
    Source,
    Transformer,
    Validator,
    Sink,
    Filter,
    Custom,
}

impl StageType {
    pub const ALL: [StageType; 6] = [
        StageType::Source,
        StageType::Transformer,
        StageType::Validator,
        StageType::Sink,
        StageType::Filter,
        StageType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::Source => "source",
            StageType::Transformer => "transformer",
            StageType::Validator => "validator",
            StageType::Sink => "sink",
            StageType::Filter => "filter",
            StageType::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for StageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to an execution when a stage fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStrategy {
    Continue,
    Retry,
    #[default]
    Abort,
}

impl ErrorStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "continue" => Some(ErrorStrategy::Continue),
            "retry" => Some(ErrorStrategy::Retry),
            "abort" => Some(ErrorStrategy::Abort),
            _ => None,
        }
    }
}

/// Transformation/validation direction for a stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Inbound,
    Outbound,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(Direction::Inbound),
            "outbound" => Some(Direction::Outbound),
            _ => None,
        }
    }
}

/// Stage-level error handling overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageErrorHandling {
    #[serde(default)]
    pub strategy: ErrorStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Base delay between retries in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_exponential_backoff: Option<bool>,
}

impl StageErrorHandling {
    pub fn with_strategy(strategy: ErrorStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }
}

/// Pipeline-wide error handling defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineErrorHandling {
    #[serde(default)]
    pub default_strategy: ErrorStrategy,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

impl Default for PipelineErrorHandling {
    fn default() -> Self {
        Self {
            default_strategy: ErrorStrategy::Abort,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    #[serde(default = "default_true")]
    pub collect_metrics: bool,
    #[serde(default)]
    pub detailed_logging: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            collect_metrics: true,
            detailed_logging: false,
        }
    }
}

/// One configured unit of work in a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub stage_type: StageType,
    pub component_id: String,
    #[serde(default)]
    pub config: StageOptions,
    /// Gate evaluated before the stage runs; false skips the stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<StageErrorHandling>,

    /// Compiled `config.condition` of a filter stage
    #[serde(skip)]
    pub(crate) filter: Option<Condition>,
}

impl StageConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        stage_type: StageType,
        component_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stage_type,
            component_id: component_id.into(),
            config: StageOptions::new(),
            condition: None,
            error_handling: None,
            filter: None,
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_error_handling(mut self, error_handling: StageErrorHandling) -> Self {
        self.error_handling = Some(error_handling);
        self
    }

    /// `config.direction`, defaulting to inbound
    pub fn direction(&self) -> Direction {
        self.config
            .get("direction")
            .and_then(Value::as_str)
            .and_then(Direction::parse)
            .unwrap_or_default()
    }

    /// `config.topics` as a list of topic names; empty when absent
    pub fn topics(&self) -> Vec<String> {
        match self.config.get("topics") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn filter_condition(&self) -> Option<&Condition> {
        self.filter.as_ref()
    }

    /// Compile `config.condition` for filter stages
    pub(crate) fn compile_filter(&mut self, index: usize) -> crate::error::PlantlinkResult<()> {
        if self.stage_type != StageType::Filter {
            return Ok(());
        }
        let source = self
            .config
            .get("condition")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                crate::error::PlantlinkError::config(
                    format!("stages[{}].config.condition", index),
                    "filter stages require a condition expression",
                )
            })?;
        self.filter = Some(Condition::parse(source)?);
        Ok(())
    }
}

/// Validated description of a pipeline
///
/// Stage order defines execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub auto_start: bool,
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub error_handling: PipelineErrorHandling,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl PipelineConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            auto_start: false,
            stages: Vec::new(),
            error_handling: PipelineErrorHandling::default(),
            monitoring: MonitoringConfig::default(),
        }
    }

    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage(&self, id: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn source_stages(&self) -> impl Iterator<Item = &StageConfig> {
        self.stages
            .iter()
            .filter(|s| s.stage_type == StageType::Source)
    }

    /// Strategy for a stage: its own, else the pipeline default
    pub fn strategy_for(&self, stage: &StageConfig) -> ErrorStrategy {
        stage
            .error_handling
            .as_ref()
            .map(|eh| eh.strategy)
            .unwrap_or(self.error_handling.default_strategy)
    }
}
