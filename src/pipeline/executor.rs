use futures::future::join_all;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use super::builder::PipelineBuilder;
use super::context::ExecutionContext;
use super::core::{
    AdapterHealth, ExecutionOutcome, HealthReport, PipelineResult, StageFailure, StageOutcome,
};
use super::retry::{run_with_retry, RetryPolicy};
use super::stages::{self, StageRequest};
use super::stats::{ExecutionRecord, PipelineStats, StageStats, StatsTracker};
use super::subscription::SubscriptionManager;
use crate::components::{
    Adapter, ComponentRegistry, DataCallback, StageHandler, Transformer, Validator,
};
use crate::config::{ErrorStrategy, PipelineConfig, StageConfig};
use crate::error::{IntegrationError, PlantlinkError, PlantlinkResult};
use crate::events::{EventEmitter, EventPublisher, NoOpEventPublisher};
use crate::logger::{LogLevel, Logger, LOGGER};
use crate::packet::DataPacket;
use crate::state_machine::{Lifecycle, LifecycleStatus, StatusChange};

const LOG_SOURCE: &str = "pipeline";

/// Integration pipeline: runs data through configured stages and manages the
/// subscriptions that feed it
///
/// Many `process()` calls may run at once. Each works on its own
/// [`ExecutionContext`] and a snapshot of the component registry taken when
/// the call starts; statistics updates are serialized.
///
/// # Example
/// ```
/// use plantlink::pipeline::IntegrationPipeline;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() {
/// let pipeline = IntegrationPipeline::from_value(&json!({
///     "id": "line-3",
///     "name": "Line 3 telemetry",
///     "stages": [
///         {"id": "hot", "name": "Hot only", "type": "filter", "componentId": "none",
///          "config": {"condition": "data.temperature > 50"}}
///     ]
/// })).unwrap();
///
/// let result = pipeline.process(json!({"temperature": 20}), "plc-7", None).await;
/// assert!(result.success());
/// assert!(result.is_filtered());
/// # }
/// ```
pub struct IntegrationPipeline {
    config: PipelineConfig,
    registry: RwLock<Arc<ComponentRegistry>>,
    lifecycle: Mutex<Lifecycle>,
    /// Serializes start/stop/reset
    lifecycle_op: tokio::sync::Mutex<()>,
    subscriptions: SubscriptionManager,
    stats: StatsTracker,
    publisher: Arc<dyn EventPublisher>,
    logger: Arc<Logger>,
}

impl IntegrationPipeline {
    /// Validate `config` and create a pipeline in the `READY` state
    pub fn new(config: PipelineConfig) -> PlantlinkResult<Self> {
        Self::assemble(config, Arc::new(NoOpEventPublisher), LOGGER.clone())
    }

    /// Parse and validate an untyped configuration object
    pub fn from_value(raw: &Value) -> PlantlinkResult<Self> {
        Self::new(PipelineConfig::from_value(raw)?)
    }

    /// Start a [`PipelineBuilder`] for `config`
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub(crate) fn assemble(
        config: PipelineConfig,
        publisher: Arc<dyn EventPublisher>,
        logger: Arc<Logger>,
    ) -> PlantlinkResult<Self> {
        let config = config.validated()?;
        let pipeline = Self {
            subscriptions: SubscriptionManager::new(logger.clone()),
            config,
            registry: RwLock::new(Arc::new(ComponentRegistry::new())),
            lifecycle: Mutex::new(Lifecycle::new()),
            lifecycle_op: tokio::sync::Mutex::new(()),
            stats: StatsTracker::new(),
            publisher,
            logger,
        };

        pipeline.transition(LifecycleStatus::Ready)?;
        pipeline.logger.log(
            LogLevel::Info,
            &format!(
                "Pipeline '{}' ({}) ready with {} stages",
                pipeline.config.name,
                pipeline.config.id,
                pipeline.config.stages.len()
            ),
            LOG_SOURCE,
        );
        Ok(pipeline)
    }

    /// Get the pipeline id
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Get the validated configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the current lifecycle status
    pub fn status(&self) -> LifecycleStatus {
        match self.lifecycle.lock() {
            Ok(lifecycle) => lifecycle.status(),
            Err(_) => LifecycleStatus::Error,
        }
    }

    /// Reason for the last move to `ERROR`, if the pipeline is in it
    pub fn last_error(&self) -> Option<String> {
        self.lifecycle
            .lock()
            .ok()
            .and_then(|lifecycle| lifecycle.last_error().map(str::to_string))
    }

    /// Get the number of open source subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.count()
    }

    // ========================================================================
    // Component registration
    // ========================================================================

    /// Register an adapter that feeds `source` stages
    pub fn add_source_adapter(&self, adapter: Arc<dyn Adapter>) -> PlantlinkResult<()> {
        self.update_registry(|registry| registry.add_source_adapter(adapter))
    }

    /// Register an adapter that `sink` stages deliver to
    pub fn add_sink_adapter(&self, adapter: Arc<dyn Adapter>) -> PlantlinkResult<()> {
        self.update_registry(|registry| registry.add_sink_adapter(adapter))
    }

    /// Register a transformer under the id `transformer` stages reference
    pub fn add_transformer(
        &self,
        id: impl Into<String>,
        transformer: Arc<dyn Transformer>,
    ) -> PlantlinkResult<()> {
        self.update_registry(|registry| registry.add_transformer(id, transformer))
    }

    /// Register a validator under the id `validator` stages reference
    pub fn add_validator(
        &self,
        id: impl Into<String>,
        validator: Arc<dyn Validator>,
    ) -> PlantlinkResult<()> {
        self.update_registry(|registry| registry.add_validator(id, validator))
    }

    /// Register the handler behind `custom` stages with this id
    pub fn register_custom_handler(
        &self,
        id: impl Into<String>,
        handler: Arc<dyn StageHandler>,
    ) -> PlantlinkResult<()> {
        self.update_registry(|registry| registry.add_handler(id, handler))
    }

    /// Apply a registration to a copy of the registry and publish the copy
    ///
    /// Holding the lifecycle lock keeps registration and `start()` from
    /// interleaving.
    fn update_registry<F>(&self, register: F) -> PlantlinkResult<()>
    where
        F: FnOnce(&mut ComponentRegistry) -> PlantlinkResult<()>,
    {
        let lifecycle = self.lifecycle.lock()?;
        if !lifecycle.status().accepts_registration() {
            return Err(PlantlinkError::PipelineRunning);
        }
        let mut registry = self.registry.write()?;
        let mut next = ComponentRegistry::clone(&registry);
        register(&mut next)?;
        *registry = Arc::new(next);
        Ok(())
    }

    fn registry_snapshot(&self) -> Arc<ComponentRegistry> {
        match self.registry.read() {
            Ok(registry) => registry.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run `data` through every stage in order
    ///
    /// Never fails: stage errors are handled per the stage's error strategy and
    /// reported in the returned result.
    pub async fn process(
        &self,
        data: Value,
        source_id: &str,
        metadata: Option<Map<String, Value>>,
    ) -> PipelineResult {
        let started = Instant::now();
        let registry = self.registry_snapshot();
        let detailed = self.config.monitoring.detailed_logging;
        let metrics = self.config.monitoring.collect_metrics;

        let mut context =
            ExecutionContext::new(&self.config.id, source_id, self.config.stages.len(), metadata);
        let mut current = data;
        let mut outcome = None;
        let mut aborted_at = None;
        let mut retries: u32 = 0;

        for (index, stage) in self.config.stages.iter().enumerate() {
            context.set_current_stage(index);

            if let Some(condition) = &stage.condition {
                if !condition.evaluate(&current, &context.scope()) {
                    context.record_timing(Duration::ZERO);
                    if detailed {
                        self.logger.log(
                            LogLevel::Debug,
                            &format!(
                                "Skipping stage {}/{}: {} (execution: {})",
                                index + 1,
                                self.config.stages.len(),
                                stage.id,
                                context.execution_id()
                            ),
                            LOG_SOURCE,
                        );
                    }
                    continue;
                }
            }

            if detailed {
                self.logger.log(
                    LogLevel::Debug,
                    &format!(
                        "Executing stage {}/{}: {} ({}) (execution: {})",
                        index + 1,
                        self.config.stages.len(),
                        stage.id,
                        stage.stage_type,
                        context.execution_id()
                    ),
                    LOG_SOURCE,
                );
            }

            let stage_start = Instant::now();
            let result = stages::dispatch(StageRequest {
                stage,
                data: &current,
                context: &context,
                registry: &registry,
            })
            .await;
            let elapsed = stage_start.elapsed();
            context.record_timing(elapsed);
            if metrics {
                self.stats.record_stage(&stage.id, elapsed, result.is_failed());
            }

            let failure = match result {
                StageOutcome::Completed(next) => {
                    current = next;
                    continue;
                }
                StageOutcome::Filtered => {
                    outcome = Some(ExecutionOutcome::Filtered);
                    break;
                }
                StageOutcome::Failed(failure) => failure,
            };

            let error = self.stage_error(&failure, &context, stage);
            self.logger.log(
                LogLevel::Warn,
                &format!(
                    "Stage {} failed (execution: {}): {}",
                    stage.id,
                    context.execution_id(),
                    error.message
                ),
                LOG_SOURCE,
            );
            context.set_error(error.clone());

            let strategy = self.config.strategy_for(stage);
            let mut unrecovered = Some(error);

            if strategy == ErrorStrategy::Retry {
                let policy =
                    RetryPolicy::resolve(&self.config.error_handling, stage.error_handling.as_ref());
                let (data_ref, context_ref, registry_ref) = (&current, &context, &*registry);
                let retry = run_with_retry(&policy, StageOutcome::Failed(failure), move |attempt| {
                    self.logger.log(
                        LogLevel::Info,
                        &format!(
                            "Retrying stage {} (attempt {}/{}, execution: {})",
                            stage.id,
                            attempt,
                            policy.max_retries,
                            context_ref.execution_id()
                        ),
                        LOG_SOURCE,
                    );
                    stages::dispatch(StageRequest {
                        stage,
                        data: data_ref,
                        context: context_ref,
                        registry: registry_ref,
                    })
                })
                .await;

                match retry.outcome {
                    StageOutcome::Completed(next) => {
                        current = next;
                        unrecovered = None;
                    }
                    StageOutcome::Filtered => {
                        outcome = Some(ExecutionOutcome::Filtered);
                        unrecovered = None;
                    }
                    StageOutcome::Failed(last) => {
                        let error = self.stage_error(&last, &context, stage);
                        context.set_error(error.clone());
                        unrecovered = Some(error);
                    }
                }

                if unrecovered.is_none() {
                    retries += 1;
                    context.clear_error();
                    if metrics {
                        self.stats.record_stage_retry(&stage.id);
                    }
                    self.logger.log(
                        LogLevel::Info,
                        &format!(
                            "Stage {} recovered after {} retr{} (execution: {})",
                            stage.id,
                            retry.attempts,
                            if retry.attempts == 1 { "y" } else { "ies" },
                            context.execution_id()
                        ),
                        LOG_SOURCE,
                    );
                    if outcome.is_some() {
                        break;
                    }
                }
            }

            if let Some(error) = unrecovered {
                if strategy == ErrorStrategy::Continue {
                    // Next stage sees the data from before the failure
                    continue;
                }
                aborted_at = Some(stage.id.clone());
                outcome = Some(ExecutionOutcome::Failed(error));
                break;
            }
        }

        let outcome = outcome.unwrap_or(ExecutionOutcome::Completed(current));
        let processing_time = started.elapsed();
        let result = PipelineResult {
            outcome,
            context,
            processing_time,
        };

        if metrics {
            self.stats.record_execution(ExecutionRecord {
                duration: processing_time,
                failed: !result.success(),
                filtered: result.is_filtered(),
                retries,
            });
        }
        self.report_execution(&result, aborted_at.as_deref());
        result
    }

    fn stage_error(
        &self,
        failure: &StageFailure,
        context: &ExecutionContext,
        stage: &StageConfig,
    ) -> IntegrationError {
        IntegrationError::new(failure.kind, failure.message.clone(), self.config.id.clone())
            .with_context("executionId", context.execution_id())
            .with_context("sourceId", context.source_id())
            .with_context("stageId", stage.id.clone())
            .with_context("stageIndex", context.current_stage())
    }

    fn report_execution(&self, result: &PipelineResult, aborted_at: Option<&str>) {
        let context = &result.context;
        let duration_ms = result.processing_time_ms();

        match (&result.outcome, aborted_at) {
            (ExecutionOutcome::Failed(error), stage_id) => {
                self.logger.log(
                    LogLevel::Error,
                    &format!(
                        "Execution {} failed at stage {}: {}",
                        context.execution_id(),
                        stage_id.unwrap_or("?"),
                        error.message
                    ),
                    LOG_SOURCE,
                );
                self.publish(EventEmitter::execution_error(
                    self.publisher.as_ref(),
                    &self.config.id,
                    context.execution_id(),
                    stage_id,
                    error,
                ));
            }
            (ExecutionOutcome::Filtered, _) => {
                self.logger.log(
                    LogLevel::Debug,
                    &format!(
                        "Execution {} filtered at stage {}",
                        context.execution_id(),
                        context.current_stage()
                    ),
                    LOG_SOURCE,
                );
            }
            (ExecutionOutcome::Completed(_), _) => {
                if self.config.monitoring.detailed_logging {
                    self.logger.log(
                        LogLevel::Info,
                        &format!(
                            "Execution {} completed in {:.3}ms",
                            context.execution_id(),
                            duration_ms
                        ),
                        LOG_SOURCE,
                    );
                }
            }
        }

        self.publish(EventEmitter::execution_completed(
            self.publisher.as_ref(),
            &self.config.id,
            context.execution_id(),
            result.success(),
            result.is_filtered(),
            duration_ms,
        ));
    }

    /// Log and drop a failed publish
    fn publish(&self, published: Result<(), String>) {
        if let Err(e) = published {
            self.logger.log(LogLevel::Warn, &e, "events");
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    fn transition(&self, to: LifecycleStatus) -> PlantlinkResult<StatusChange> {
        let change = self.lifecycle.lock()?.transition(to)?;
        self.announce(change);
        Ok(change)
    }

    fn fail(&self, reason: &str) {
        let change = match self.lifecycle.lock() {
            Ok(mut lifecycle) => lifecycle.fail(reason),
            Err(poisoned) => poisoned.into_inner().fail(reason),
        };
        self.announce(change);
    }

    fn announce(&self, change: StatusChange) {
        self.logger.log(
            LogLevel::Debug,
            &format!(
                "Pipeline {} status {} -> {}",
                self.config.id, change.from, change.to
            ),
            LOG_SOURCE,
        );
        self.publish(EventEmitter::status_changed(
            self.publisher.as_ref(),
            &self.config.id,
            change.from,
            change.to,
        ));
    }

    /// Connect every source adapter and open the subscriptions of every
    /// source stage
    ///
    /// Only valid from `READY`; from any other state this logs a warning and
    /// does nothing. On failure, whatever was opened is closed again and the
    /// pipeline moves to `ERROR`.
    pub async fn start(self: &Arc<Self>) -> PlantlinkResult<()> {
        let _op = self.lifecycle_op.lock().await;

        {
            let mut lifecycle = self.lifecycle.lock()?;
            let status = lifecycle.status();
            if status != LifecycleStatus::Ready {
                drop(lifecycle);
                self.logger.log(
                    LogLevel::Warn,
                    &format!(
                        "Cannot start pipeline {} from {} state",
                        self.config.id, status
                    ),
                    LOG_SOURCE,
                );
                return Ok(());
            }
            let change = lifecycle.transition(LifecycleStatus::Starting)?;
            drop(lifecycle);
            self.announce(change);
        }

        self.logger.log(
            LogLevel::Info,
            &format!("Starting pipeline '{}'", self.config.name),
            LOG_SOURCE,
        );

        match self.open_subscriptions().await {
            Ok(count) => {
                self.transition(LifecycleStatus::Running)?;
                self.logger.log(
                    LogLevel::Info,
                    &format!(
                        "Pipeline '{}' running with {} subscription(s)",
                        self.config.name, count
                    ),
                    LOG_SOURCE,
                );
                self.publish(EventEmitter::pipeline_started(
                    self.publisher.as_ref(),
                    &self.config.id,
                    count,
                ));
                Ok(())
            }
            Err(e) => {
                let rolled_back = self.subscriptions.unsubscribe_all().await;
                self.logger.log(
                    LogLevel::Error,
                    &format!(
                        "Failed to start pipeline {} ({} rollback failure(s)): {}",
                        self.config.id, rolled_back, e
                    ),
                    LOG_SOURCE,
                );
                self.fail(&e.to_string());
                Err(e)
            }
        }
    }

    async fn open_subscriptions(self: &Arc<Self>) -> PlantlinkResult<usize> {
        let registry = self.registry_snapshot();

        let mut sources = Vec::new();
        for stage in self.config.source_stages() {
            sources.push((stage, registry.require_source_adapter(&stage.component_id)?));
        }

        // Connect each adapter once, all at the same time
        let mut unique: Vec<Arc<dyn Adapter>> = Vec::new();
        for (_, adapter) in &sources {
            if !unique.iter().any(|a| a.id() == adapter.id()) {
                unique.push(adapter.clone());
            }
        }
        join_all(
            unique
                .into_iter()
                .map(|adapter| self.subscriptions.ensure_started(adapter)),
        )
        .await
        .into_iter()
        .collect::<PlantlinkResult<Vec<()>>>()?;

        let opened = join_all(sources.iter().map(|(stage, adapter)| {
            let callback = self.data_callback(adapter.id(), stage);
            self.subscriptions.open(adapter.clone(), stage, callback)
        }))
        .await;

        let mut total = 0;
        for result in opened {
            total += result?;
        }
        Ok(total)
    }

    /// Callback handed to a source adapter; holds only a weak reference so an
    /// adapter outliving the pipeline does not keep it alive
    fn data_callback(self: &Arc<Self>, adapter_id: &str, stage: &StageConfig) -> DataCallback {
        let pipeline = Arc::downgrade(self);
        let adapter_id = adapter_id.to_string();
        let mut metadata = Map::new();
        metadata.insert("sourceAdapter".to_string(), Value::String(adapter_id.clone()));
        metadata.insert("sourceConfig".to_string(), Value::Object(stage.config.clone()));

        Arc::new(move |packet: DataPacket| {
            let pipeline = pipeline.clone();
            let adapter_id = adapter_id.clone();
            let metadata = metadata.clone();
            async move {
                if let Some(pipeline) = pipeline.upgrade() {
                    pipeline.handle_delivery(packet, &adapter_id, metadata).await;
                }
            }
            .boxed()
        })
    }

    async fn handle_delivery(&self, packet: DataPacket, adapter_id: &str, metadata: Map<String, Value>) {
        let processing = self.process(packet.to_value(), adapter_id, Some(metadata));
        match AssertUnwindSafe(processing).catch_unwind().await {
            // Filtered and failed executions were already reported by process()
            Ok(_) => {}
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.logger.log(
                    LogLevel::Error,
                    &format!(
                        "Processing data from {} panicked: {}",
                        adapter_id, message
                    ),
                    LOG_SOURCE,
                );
                self.publish(EventEmitter::execution_data_error(
                    self.publisher.as_ref(),
                    &self.config.id,
                    adapter_id,
                    &message,
                ));
            }
        }
    }

    /// Close every subscription and return to `READY`
    ///
    /// Only valid from `RUNNING`; otherwise logs a warning and does nothing.
    /// In-flight executions are left to finish.
    pub async fn stop(&self) -> PlantlinkResult<()> {
        let _op = self.lifecycle_op.lock().await;

        let status = self.status();
        if status != LifecycleStatus::Running {
            self.logger.log(
                LogLevel::Warn,
                &format!("Cannot stop pipeline {} from {} state", self.config.id, status),
                LOG_SOURCE,
            );
            return Ok(());
        }

        self.transition(LifecycleStatus::Stopping)?;
        let failures = self.subscriptions.unsubscribe_all().await;
        self.transition(LifecycleStatus::Ready)?;

        self.logger.log(
            LogLevel::Info,
            &format!(
                "Pipeline '{}' stopped ({} failed unsubscribe(s))",
                self.config.name, failures
            ),
            LOG_SOURCE,
        );
        self.publish(EventEmitter::pipeline_stopped(
            self.publisher.as_ref(),
            &self.config.id,
            failures,
        ));
        Ok(())
    }

    /// Leave `ERROR` and return to `READY`
    pub async fn reset(&self) -> PlantlinkResult<()> {
        let _op = self.lifecycle_op.lock().await;

        let status = self.status();
        if status != LifecycleStatus::Error {
            self.logger.log(
                LogLevel::Warn,
                &format!("Cannot reset pipeline {} from {} state", self.config.id, status),
                LOG_SOURCE,
            );
            return Ok(());
        }

        self.subscriptions.unsubscribe_all().await;
        self.transition(LifecycleStatus::Ready)?;
        Ok(())
    }

    // ========================================================================
    // Monitoring
    // ========================================================================

    /// Get a snapshot of the pipeline and stage statistics
    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot()
    }

    /// Get the statistics of one stage
    pub fn stage_stats(&self, stage_id: &str) -> Option<StageStats> {
        self.stats.stage(stage_id)
    }

    /// Zero every counter
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Probe every registered adapter
    pub async fn health_check(&self) -> HealthReport {
        let registry = self.registry_snapshot();
        let adapters = join_all(registry.adapters().into_iter().map(|adapter| async move {
            let reachable = adapter.test_connection().await;
            let latency = adapter.latency().await;
            AdapterHealth {
                adapter_id: adapter.id().to_string(),
                status: adapter.status(),
                connection_status: adapter.connection_status(),
                reachable,
                latency_ms: latency.map(|d| d.as_nanos() as f64 / 1_000_000.0),
                last_error: adapter.last_error(),
            }
        }))
        .await;

        let status = self.status();
        HealthReport {
            pipeline_id: self.config.id.clone(),
            status,
            healthy: status != LifecycleStatus::Error && adapters.iter().all(|a| a.reachable),
            subscription_count: self.subscriptions.count(),
            subscribed_adapters: self.subscriptions.adapter_ids(),
            adapters,
            checked_at: chrono::Utc::now(),
        }
    }
}
