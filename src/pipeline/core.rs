use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::context::ExecutionContext;
use crate::components::ConnectionStatus;
use crate::error::{IntegrationError, IntegrationErrorKind, PlantlinkError};
use crate::state_machine::LifecycleStatus;

/// Why a single stage failed
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub kind: IntegrationErrorKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(kind: IntegrationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_error(error: &PlantlinkError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

/// Result of dispatching one stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// The stage produced the data for the next stage
    Completed(Value),

    /// A filter rejected the data; no later stage runs
    Filtered,

    Failed(StageFailure),
}

impl StageOutcome {
    pub fn failed(kind: IntegrationErrorKind, message: impl Into<String>) -> Self {
        StageOutcome::Failed(StageFailure::new(kind, message))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }
}

/// Final outcome of one execution
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed(Value),

    /// Excluded by a filter stage; a successful "not delivered" outcome
    Filtered,

    Failed(IntegrationError),
}

/// Result of a `process()` call
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub outcome: ExecutionOutcome,
    pub context: ExecutionContext,
    pub processing_time: Duration,
}

impl PipelineResult {
    /// True unless a stage aborted the execution; filtered executions succeed
    pub fn success(&self) -> bool {
        !matches!(self.outcome, ExecutionOutcome::Failed(_))
    }

    /// Output of the last stage, absent when filtered or failed
    pub fn data(&self) -> Option<&Value> {
        match &self.outcome {
            ExecutionOutcome::Completed(data) => Some(data),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<Value> {
        match self.outcome {
            ExecutionOutcome::Completed(data) => Some(data),
            _ => None,
        }
    }

    /// The error that aborted the execution
    pub fn error(&self) -> Option<&IntegrationError> {
        match &self.outcome {
            ExecutionOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_filtered(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Filtered)
    }

    pub fn processing_time_ms(&self) -> f64 {
        self.processing_time.as_nanos() as f64 / 1_000_000.0
    }
}

/// Connectivity of one registered adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterHealth {
    pub adapter_id: String,
    pub status: LifecycleStatus,
    pub connection_status: ConnectionStatus,
    pub reachable: bool,
    pub latency_ms: Option<f64>,
    pub last_error: Option<IntegrationError>,
}

/// Snapshot produced by `health_check()`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub pipeline_id: String,
    pub status: LifecycleStatus,
    pub healthy: bool,
    pub subscription_count: usize,
    /// Source adapters with open subscriptions, sorted by id
    pub subscribed_adapters: Vec<String>,
    pub adapters: Vec<AdapterHealth>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn unreachable_adapters(&self) -> Vec<&str> {
        self.adapters
            .iter()
            .filter(|a| !a.reachable)
            .map(|a| a.adapter_id.as_str())
            .collect()
    }
}
