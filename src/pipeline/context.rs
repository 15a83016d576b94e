use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::error::IntegrationError;

/// Per-execution state for one `process()` call
///
/// Created fresh for every execution and handed back inside the
/// [`PipelineResult`](super::PipelineResult). Stage handlers see it read-only.
///
/// # Example
/// ```
/// use plantlink::pipeline::ExecutionContext;
///
/// let context = ExecutionContext::new("line-3", "plc-7", 4, None);
/// assert!(context.execution_id().starts_with("line-3-"));
/// assert_eq!(context.total_stages(), 4);
/// assert!(context.stage_timing().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pipeline_id: String,
    execution_id: String,
    source_id: String,
    start_time: DateTime<Utc>,
    current_stage: usize,
    total_stages: usize,
    metadata: Map<String, Value>,

    /// One entry per stage reached; skipped stages record zero
    stage_timing: Vec<Duration>,

    /// Failure of the most recent unrecovered stage
    error: Option<IntegrationError>,

    /// Every stage failure seen during the execution, recovered or not
    errors: Vec<IntegrationError>,
}

impl ExecutionContext {
    pub fn new(
        pipeline_id: impl Into<String>,
        source_id: impl Into<String>,
        total_stages: usize,
        metadata: Option<Map<String, Value>>,
    ) -> Self {
        let pipeline_id = pipeline_id.into();
        let execution_id = format!("{}-{}", pipeline_id, Uuid::new_v4().simple());
        Self {
            pipeline_id,
            execution_id,
            source_id: source_id.into(),
            start_time: Utc::now(),
            current_stage: 0,
            total_stages,
            metadata: metadata.unwrap_or_default(),
            stage_timing: Vec::with_capacity(total_stages),
            error: None,
            errors: Vec::new(),
        }
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Index of the stage being executed, or the last one reached
    pub fn current_stage(&self) -> usize {
        self.current_stage
    }

    pub fn total_stages(&self) -> usize {
        self.total_stages
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn stage_timing(&self) -> &[Duration] {
        &self.stage_timing
    }

    /// Stage timings in fractional milliseconds
    pub fn stage_timing_ms(&self) -> Vec<f64> {
        self.stage_timing
            .iter()
            .map(|d| d.as_nanos() as f64 / 1_000_000.0)
            .collect()
    }

    pub fn error(&self) -> Option<&IntegrationError> {
        self.error.as_ref()
    }

    pub fn errors(&self) -> &[IntegrationError] {
        &self.errors
    }

    /// View of the context exposed to condition expressions as `context`
    pub fn scope(&self) -> Value {
        json!({
            "pipelineId": self.pipeline_id,
            "executionId": self.execution_id,
            "sourceId": self.source_id,
            "currentStage": self.current_stage,
            "totalStages": self.total_stages,
            "metadata": self.metadata,
        })
    }

    pub(crate) fn set_current_stage(&mut self, index: usize) {
        self.current_stage = index;
    }

    pub(crate) fn record_timing(&mut self, elapsed: Duration) {
        self.stage_timing.push(elapsed);
    }

    pub(crate) fn set_error(&mut self, error: IntegrationError) {
        self.errors.push(error.clone());
        self.error = Some(error);
    }

    pub(crate) fn clear_error(&mut self) {
        self.error = None;
    }
}
