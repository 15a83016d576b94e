use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::IntegrationError;
use crate::state_machine::LifecycleStatus;

/// Event names - centralized for consistency
pub mod event_names {
    pub const PIPELINE_STATUS_CHANGED: &str = "pipeline.status.changed";
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    pub const PIPELINE_STOPPED: &str = "pipeline.stopped";
    pub const EXECUTION_COMPLETED: &str = "execution.completed";
    pub const EXECUTION_ERROR: &str = "execution.error";
    pub const EXECUTION_DATA_ERROR: &str = "execution.data.error";
}

/// Pipeline lifecycle status change event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatusChangedEvent {
    pub pipeline_id: String,
    pub previous_status: LifecycleStatus,
    pub status: LifecycleStatus,
    pub timestamp: String,
}

/// Pipeline started event (all source subscriptions are open)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStartedEvent {
    pub pipeline_id: String,
    pub subscription_count: usize,
    pub timestamp: String,
}

/// Pipeline stopped event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStoppedEvent {
    pub pipeline_id: String,
    pub failed_unsubscribes: usize,
    pub timestamp: String,
}

/// Emitted once per `process()` call, whatever the outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionCompletedEvent {
    pub pipeline_id: String,
    pub execution_id: String,
    pub success: bool,
    pub filtered: bool,
    pub duration_ms: f64,
    pub timestamp: String,
}

/// Emitted when a stage aborted an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionErrorEvent {
    pub pipeline_id: String,
    pub execution_id: String,
    pub stage_id: Option<String>,
    pub error: IntegrationError,
    pub timestamp: String,
}

/// Emitted when handling data delivered by a subscription failed outside the
/// normal stage error handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDataErrorEvent {
    pub pipeline_id: String,
    pub adapter_id: String,
    pub error: String,
    pub timestamp: String,
}

/// Fire-and-forget sink for lifecycle events
///
/// A publish failure is reported to the caller but must never change the
/// outcome of the operation that produced the event.
pub trait EventPublisher: Send + Sync {
    fn create_and_publish_event(&self, name: &str, payload: Value) -> Result<(), String>;
}

/// Publisher that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventPublisher;

impl EventPublisher for NoOpEventPublisher {
    fn create_and_publish_event(&self, _name: &str, _payload: Value) -> Result<(), String> {
        Ok(())
    }
}

/// Event as delivered to [`BroadcastEventPublisher`] subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub name: String,
    pub payload: Value,
}

/// In-process fan-out over a tokio broadcast channel
///
/// Publishing with no live receivers is not an error.
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

impl BroadcastEventPublisher {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl EventPublisher for BroadcastEventPublisher {
    fn create_and_publish_event(&self, name: &str, payload: Value) -> Result<(), String> {
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(PublishedEvent {
                name: name.to_string(),
                payload,
            })
            .map(|_| ())
            .map_err(|e| format!("Failed to broadcast {} event: {}", name, e))
    }
}

/// Event emitter helper
pub struct EventEmitter;

impl EventEmitter {
    fn publish<T: Serialize>(
        publisher: &dyn EventPublisher,
        name: &str,
        event: &T,
    ) -> Result<(), String> {
        let payload = serde_json::to_value(event)
            .map_err(|e| format!("Failed to serialize {} event: {}", name, e))?;
        publisher.create_and_publish_event(name, payload)
    }

    fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }

    /// Emit pipeline status changed event
    pub fn status_changed(
        publisher: &dyn EventPublisher,
        pipeline_id: &str,
        previous_status: LifecycleStatus,
        status: LifecycleStatus,
    ) -> Result<(), String> {
        let event = PipelineStatusChangedEvent {
            pipeline_id: pipeline_id.to_string(),
            previous_status,
            status,
            timestamp: Self::now(),
        };
        Self::publish(publisher, event_names::PIPELINE_STATUS_CHANGED, &event)
    }

    /// Emit pipeline started event
    pub fn pipeline_started(
        publisher: &dyn EventPublisher,
        pipeline_id: &str,
        subscription_count: usize,
    ) -> Result<(), String> {
        let event = PipelineStartedEvent {
            pipeline_id: pipeline_id.to_string(),
            subscription_count,
            timestamp: Self::now(),
        };
        Self::publish(publisher, event_names::PIPELINE_STARTED, &event)
    }

    /// Emit pipeline stopped event
    pub fn pipeline_stopped(
        publisher: &dyn EventPublisher,
        pipeline_id: &str,
        failed_unsubscribes: usize,
    ) -> Result<(), String> {
        let event = PipelineStoppedEvent {
            pipeline_id: pipeline_id.to_string(),
            failed_unsubscribes,
            timestamp: Self::now(),
        };
        Self::publish(publisher, event_names::PIPELINE_STOPPED, &event)
    }

    /// Emit execution completed event
    pub fn execution_completed(
        publisher: &dyn EventPublisher,
        pipeline_id: &str,
        execution_id: &str,
        success: bool,
        filtered: bool,
        duration_ms: f64,
    ) -> Result<(), String> {
        let event = ExecutionCompletedEvent {
            pipeline_id: pipeline_id.to_string(),
            execution_id: execution_id.to_string(),
            success,
            filtered,
            duration_ms,
            timestamp: Self::now(),
        };
        Self::publish(publisher, event_names::EXECUTION_COMPLETED, &event)
    }

    /// Emit execution error event
    pub fn execution_error(
        publisher: &dyn EventPublisher,
        pipeline_id: &str,
        execution_id: &str,
        stage_id: Option<&str>,
        error: &IntegrationError,
    ) -> Result<(), String> {
        let event = ExecutionErrorEvent {
            pipeline_id: pipeline_id.to_string(),
            execution_id: execution_id.to_string(),
            stage_id: stage_id.map(str::to_string),
            error: error.clone(),
            timestamp: Self::now(),
        };
        Self::publish(publisher, event_names::EXECUTION_ERROR, &event)
    }

    /// Emit execution data error event
    pub fn execution_data_error(
        publisher: &dyn EventPublisher,
        pipeline_id: &str,
        adapter_id: &str,
        error: &str,
    ) -> Result<(), String> {
        let event = ExecutionDataErrorEvent {
            pipeline_id: pipeline_id.to_string(),
            adapter_id: adapter_id.to_string(),
            error: error.to_string(),
            timestamp: Self::now(),
        };
        Self::publish(publisher, event_names::EXECUTION_DATA_ERROR, &event)
    }
}
