use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Exact incremental mean: the average of `n` samples after adding `sample`
/// to the average `previous` of the first `n - 1`
pub fn incremental_mean(previous: f64, n: u64, sample: f64) -> f64 {
    if n == 0 {
        return previous;
    }
    previous + (sample - previous) / n as f64
}

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// Counters for one stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStats {
    pub processed_count: u64,
    pub error_count: u64,
    /// Failures recovered by retrying
    pub retry_count: u64,
    /// Milliseconds
    pub average_processing_time: f64,
    pub last_processed: Option<DateTime<Utc>>,
}

/// Counters for a pipeline and its stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub processed_count: u64,
    /// Executions aborted by a stage failure
    pub error_count: u64,
    pub filtered_count: u64,
    /// Stage failures recovered by retrying, across all executions
    pub retry_count: u64,
    /// Milliseconds
    pub average_processing_time: f64,
    pub last_processed: Option<DateTime<Utc>>,
    pub stages: HashMap<String, StageStats>,
}

/// Execution-level facts recorded once per `process()` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionRecord {
    pub duration: Duration,
    pub failed: bool,
    pub filtered: bool,
    /// Stages recovered by retrying in this execution
    pub retries: u32,
}

/// Serializes every statistics update behind one lock
#[derive(Debug, Default)]
pub struct StatsTracker {
    inner: Mutex<PipelineStats>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_stage(&self, stage_id: &str, duration: Duration, failed: bool) {
        if let Ok(mut stats) = self.inner.lock() {
            let stage = stats.stages.entry(stage_id.to_string()).or_default();
            stage.processed_count += 1;
            if failed {
                stage.error_count += 1;
            }
            stage.average_processing_time = incremental_mean(
                stage.average_processing_time,
                stage.processed_count,
                as_millis_f64(duration),
            );
            stage.last_processed = Some(Utc::now());
        }
    }

    pub fn record_stage_retry(&self, stage_id: &str) {
        if let Ok(mut stats) = self.inner.lock() {
            stats
                .stages
                .entry(stage_id.to_string())
                .or_default()
                .retry_count += 1;
        }
    }

    pub fn record_execution(&self, record: ExecutionRecord) {
        if let Ok(mut stats) = self.inner.lock() {
            stats.processed_count += 1;
            if record.failed {
                stats.error_count += 1;
            }
            if record.filtered {
                stats.filtered_count += 1;
            }
            stats.retry_count += u64::from(record.retries);
            stats.average_processing_time = incremental_mean(
                stats.average_processing_time,
                stats.processed_count,
                as_millis_f64(record.duration),
            );
            stats.last_processed = Some(Utc::now());
        }
    }

    pub fn snapshot(&self) -> PipelineStats {
        match self.inner.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn stage(&self, stage_id: &str) -> Option<StageStats> {
        self.inner
            .lock()
            .ok()
            .and_then(|stats| stats.stages.get(stage_id).cloned())
    }

    pub fn reset(&self) {
        match self.inner.lock() {
            Ok(mut stats) => *stats = PipelineStats::default(),
            Err(poisoned) => *poisoned.into_inner() = PipelineStats::default(),
        }
    }
}
