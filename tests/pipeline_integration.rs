use async_trait::async_trait;
use plantlink::components::{
    Adapter, FnHandler, MockAdapter, TransformOutput, Transformer, ValidationIssue, ValidationResult,
    Validator,
};
use plantlink::config::{PipelineConfig, StageOptions};
use plantlink::events::{event_names, BroadcastEventPublisher};
use plantlink::{DataPacket, IntegrationPipeline, LifecycleStatus, PlantlinkError};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Doubles `value`
struct DoubleValue;

#[async_trait]
impl Transformer for DoubleValue {
    async fn transform_inbound(&self, data: &Value, _options: &StageOptions) -> TransformOutput {
        let value = data["value"].as_i64().ok_or("value must be an integer")?;
        Ok(json!({ "value": value * 2 }))
    }
}

/// Fails a fixed number of times before passing data through
struct Flaky {
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl Flaky {
    fn new(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Transformer for Flaky {
    async fn transform_inbound(&self, data: &Value, _options: &StageOptions) -> TransformOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err("PLC busy".to_string());
        }
        Ok(data.clone())
    }
}

struct MustBePositive;

#[async_trait]
impl Validator for MustBePositive {
    async fn validate_inbound(&self, data: &Value, _options: &StageOptions) -> ValidationResult {
        match data["value"].as_f64() {
            Some(v) if v > 0.0 => ValidationResult::valid(),
            Some(_) => ValidationResult::invalid(vec![ValidationIssue::for_field(
                "value",
                "value must be positive",
            )]),
            None => ValidationResult::invalid(vec![ValidationIssue::new("value missing")]),
        }
    }
}

fn transform_then_sink() -> Value {
    json!({
        "id": "line-3",
        "name": "Line 3 telemetry",
        "stages": [
            {"id": "double", "name": "Double value", "type": "transformer", "componentId": "double-value"},
            {"id": "record", "name": "Record", "type": "sink", "componentId": "recorder"}
        ]
    })
}

#[tokio::test]
async fn test_success_path() {
    let pipeline = IntegrationPipeline::from_value(&transform_then_sink()).unwrap();
    let recorder = Arc::new(MockAdapter::connected("recorder"));
    pipeline
        .add_transformer("double-value", Arc::new(DoubleValue))
        .unwrap();
    pipeline.add_sink_adapter(recorder.clone()).unwrap();

    let result = pipeline.process(json!({"value": 5}), "plc-7", None).await;

    assert!(result.success());
    assert_eq!(result.data(), Some(&json!({"value": 10})));
    assert_eq!(result.context.stage_timing().len(), 2);

    let sent = recorder.sent_packets();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload, json!({"value": 10}));
    assert_eq!(sent[0].id, result.context.execution_id());
    assert_eq!(sent[0].source, "plc-7");
}

#[tokio::test]
async fn test_abort_on_validation_failure() {
    let pipeline = IntegrationPipeline::from_value(&json!({
        "id": "line-3",
        "name": "Line 3",
        "stages": [
            {"id": "check", "name": "Check", "type": "validator", "componentId": "must-be-positive"},
            {"id": "record", "name": "Record", "type": "sink", "componentId": "recorder"}
        ]
    }))
    .unwrap();
    let recorder = Arc::new(MockAdapter::connected("recorder"));
    pipeline
        .add_validator("must-be-positive", Arc::new(MustBePositive))
        .unwrap();
    pipeline.add_sink_adapter(recorder.clone()).unwrap();

    let result = pipeline.process(json!({"value": -1}), "plc-7", None).await;

    assert!(!result.success());
    let error = result.error().unwrap();
    assert!(error.message.contains("Validation failed"));
    assert_eq!(error.context["stageId"], "check");
    assert_eq!(result.context.stage_timing().len(), 1);
    assert!(recorder.sent_packets().is_empty());
    assert_eq!(pipeline.stats().error_count, 1);
}

#[tokio::test]
async fn test_retry_then_succeed() {
    let pipeline = IntegrationPipeline::from_value(&json!({
        "id": "line-3",
        "name": "Line 3",
        "stages": [
            {"id": "read", "name": "Read", "type": "transformer", "componentId": "flaky",
             "errorHandling": {"strategy": "retry", "maxRetries": 3, "retryDelay": 2}}
        ]
    }))
    .unwrap();
    let flaky = Arc::new(Flaky::new(2));
    pipeline.add_transformer("flaky", flaky.clone()).unwrap();

    let result = pipeline.process(json!({"value": 1}), "plc-7", None).await;

    assert!(result.success());
    assert_eq!(result.data(), Some(&json!({"value": 1})));
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    assert_eq!(pipeline.stats().retry_count, 1);
    assert_eq!(pipeline.stats().error_count, 0);
    // The stage's own timing slot is recorded once
    assert_eq!(result.context.stage_timing().len(), 1);
}

#[tokio::test]
async fn test_each_recovered_stage_counts_as_a_retry() {
    let pipeline = IntegrationPipeline::from_value(&json!({
        "id": "line-3",
        "name": "Line 3",
        "errorHandling": {"defaultStrategy": "retry", "maxRetries": 2, "retryDelay": 1},
        "stages": [
            {"id": "read", "name": "Read", "type": "transformer", "componentId": "flaky-read"},
            {"id": "scale", "name": "Scale", "type": "transformer", "componentId": "flaky-scale"}
        ]
    }))
    .unwrap();
    pipeline
        .add_transformer("flaky-read", Arc::new(Flaky::new(1)))
        .unwrap();
    pipeline
        .add_transformer("flaky-scale", Arc::new(Flaky::new(1)))
        .unwrap();

    let result = pipeline.process(json!({"value": 1}), "plc-7", None).await;

    assert!(result.success());
    let stats = pipeline.stats();
    assert_eq!(stats.retry_count, 2);
    assert_eq!(stats.stages["read"].retry_count, 1);
    assert_eq!(stats.stages["scale"].retry_count, 1);
    assert_eq!(stats.error_count, 0);
}

#[tokio::test]
async fn test_filter_exclusion() {
    let pipeline = IntegrationPipeline::from_value(&json!({
        "id": "line-3",
        "name": "Line 3",
        "stages": [
            {"id": "hot", "name": "Hot readings", "type": "filter", "componentId": "none",
             "config": {"condition": "data.temperature >= 80"}},
            {"id": "record", "name": "Record", "type": "sink", "componentId": "recorder"}
        ]
    }))
    .unwrap();
    let recorder = Arc::new(MockAdapter::connected("recorder"));
    pipeline.add_sink_adapter(recorder.clone()).unwrap();

    let filtered = pipeline
        .process(json!({"temperature": 40}), "plc-7", None)
        .await;
    assert!(filtered.success());
    assert!(filtered.is_filtered());
    assert!(filtered.data().is_none());
    assert!(filtered.error().is_none());
    assert!(recorder.sent_packets().is_empty());

    let kept = pipeline
        .process(json!({"temperature": 95}), "plc-7", None)
        .await;
    assert!(kept.success());
    assert_eq!(recorder.sent_packets().len(), 1);

    let stats = pipeline.stats();
    assert_eq!(stats.processed_count, 2);
    assert_eq!(stats.filtered_count, 1);
    assert_eq!(stats.error_count, 0);
}

#[tokio::test]
async fn test_pure_stages_are_idempotent() {
    let pipeline = IntegrationPipeline::from_value(&json!({
        "id": "line-3",
        "name": "Line 3",
        "stages": [
            {"id": "double", "name": "Double", "type": "transformer", "componentId": "double-value"},
            {"id": "check", "name": "Check", "type": "validator", "componentId": "must-be-positive"}
        ]
    }))
    .unwrap();
    pipeline
        .add_transformer("double-value", Arc::new(DoubleValue))
        .unwrap();
    pipeline
        .add_validator("must-be-positive", Arc::new(MustBePositive))
        .unwrap();

    let first = pipeline.process(json!({"value": 21}), "plc-7", None).await;
    let second = pipeline.process(json!({"value": 21}), "plc-7", None).await;

    assert_eq!(first.data(), Some(&json!({"value": 42})));
    assert_eq!(first.data(), second.data());
    assert_ne!(first.context.execution_id(), second.context.execution_id());
}

#[tokio::test]
async fn test_total_stages_matches_config() {
    let pipeline = IntegrationPipeline::from_value(&transform_then_sink()).unwrap();
    pipeline
        .add_transformer("double-value", Arc::new(DoubleValue))
        .unwrap();
    // No sink registered: the second stage fails

    for input in [json!({"value": 1}), json!({"value": "x"}), json!(null)] {
        let result = pipeline.process(input, "plc-7", None).await;
        assert_eq!(result.context.total_stages(), 2);
        assert!(result.context.stage_timing().len() <= 2);
        assert!(!result.success());
    }
}

#[tokio::test]
async fn test_concurrent_executions_keep_exact_counts() {
    let pipeline = Arc::new(IntegrationPipeline::from_value(&transform_then_sink()).unwrap());
    let recorder = Arc::new(MockAdapter::connected("recorder"));
    pipeline
        .add_transformer("double-value", Arc::new(DoubleValue))
        .unwrap();
    pipeline.add_sink_adapter(recorder.clone()).unwrap();

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.process(json!({"value": i}), "plc-7", None).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().success());
    }

    let stats = pipeline.stats();
    assert_eq!(stats.processed_count, 50);
    assert_eq!(stats.stages["double"].processed_count, 50);
    assert_eq!(stats.stages["record"].processed_count, 50);
    assert_eq!(recorder.sent_packets().len(), 50);
}

#[tokio::test]
async fn test_subscription_lifecycle() {
    let config = PipelineConfig::from_value(&json!({
        "id": "line-3",
        "name": "Line 3",
        "stages": [
            {"id": "in", "name": "PLC", "type": "source", "componentId": "plc-1"},
            {"id": "tag", "name": "Tag", "type": "custom", "componentId": "tag-origin"},
            {"id": "record", "name": "Record", "type": "sink", "componentId": "recorder"}
        ]
    }))
    .unwrap();
    let plc = Arc::new(MockAdapter::new("plc-1"));
    let recorder = Arc::new(MockAdapter::connected("recorder"));
    let pipeline = Arc::new(
        IntegrationPipeline::builder(config)
            .source_adapter(plc.clone())
            .sink_adapter(recorder.clone())
            .handler(
                "tag-origin",
                Arc::new(FnHandler::new(|data, ctx, _opts| {
                    Ok(json!({
                        "from": ctx.get_metadata("sourceAdapter").cloned(),
                        "reading": data["payload"].clone(),
                    }))
                })),
            )
            .build()
            .unwrap(),
    );

    // Step 1: start connects the source adapter and subscribes
    pipeline.start().await.unwrap();
    assert_eq!(pipeline.status(), LifecycleStatus::Running);
    assert_eq!(plc.start_calls(), 1);
    assert_eq!(plc.subscription_count(), 1);
    assert_eq!(pipeline.subscription_count(), 1);

    // Step 2: delivered packets run through the pipeline
    plc.emit(DataPacket::new("pkt-1", "plc-1", json!({"rpm": 1200})))
        .await;
    let sent = recorder.sent_packets();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].source, "plc-1");
    assert_eq!(sent[0].payload["from"], "plc-1");
    assert_eq!(sent[0].payload["reading"], json!({"rpm": 1200}));

    // Step 3: stop closes the subscriptions but leaves the adapter alone
    pipeline.stop().await.unwrap();
    assert_eq!(pipeline.status(), LifecycleStatus::Ready);
    assert_eq!(pipeline.subscription_count(), 0);
    assert_eq!(plc.subscription_count(), 0);
    assert_eq!(plc.status(), LifecycleStatus::Running);

    plc.emit(DataPacket::new("pkt-2", "plc-1", json!({"rpm": 900})))
        .await;
    assert_eq!(recorder.sent_packets().len(), 1);
}

#[tokio::test]
async fn test_topic_subscriptions() {
    let pipeline = Arc::new(
        IntegrationPipeline::from_value(&json!({
            "id": "line-3",
            "name": "Line 3",
            "stages": [
                {"id": "in", "name": "Broker", "type": "source", "componentId": "mqtt",
                 "config": {"topics": ["line3/temp", "line3/vibration"], "qos": 1}},
                {"id": "record", "name": "Record", "type": "sink", "componentId": "recorder"}
            ]
        }))
        .unwrap(),
    );
    let broker = Arc::new(MockAdapter::connected("mqtt"));
    let recorder = Arc::new(MockAdapter::connected("recorder"));
    pipeline.add_source_adapter(broker.clone()).unwrap();
    pipeline.add_sink_adapter(recorder.clone()).unwrap();

    pipeline.start().await.unwrap();
    assert_eq!(broker.start_calls(), 0);
    assert_eq!(broker.subscription_count(), 2);
    assert_eq!(pipeline.subscription_count(), 2);

    let report = pipeline.health_check().await;
    assert_eq!(report.subscription_count, 2);
    assert_eq!(report.subscribed_adapters, vec!["mqtt".to_string()]);

    broker
        .emit_to_topic("line3/temp", DataPacket::new("t1", "mqtt", json!(71.2)))
        .await;
    assert_eq!(recorder.sent_packets().len(), 1);
    assert_eq!(recorder.sent_packets()[0].id, "t1");

    pipeline.stop().await.unwrap();
    assert_eq!(broker.subscription_count(), 0);
    assert!(pipeline.health_check().await.subscribed_adapters.is_empty());
}

#[tokio::test]
async fn test_registration_rejected_while_running() {
    let pipeline = Arc::new(IntegrationPipeline::from_value(&transform_then_sink()).unwrap());
    pipeline.start().await.unwrap();
    assert_eq!(pipeline.status(), LifecycleStatus::Running);

    let err = pipeline
        .add_transformer("double-value", Arc::new(DoubleValue))
        .unwrap_err();
    assert!(matches!(err, PlantlinkError::PipelineRunning));

    pipeline.stop().await.unwrap();
    pipeline
        .add_transformer("double-value", Arc::new(DoubleValue))
        .unwrap();
}

#[tokio::test]
async fn test_out_of_state_lifecycle_calls_are_no_ops() {
    let pipeline = Arc::new(IntegrationPipeline::from_value(&transform_then_sink()).unwrap());

    pipeline.stop().await.unwrap();
    assert_eq!(pipeline.status(), LifecycleStatus::Ready);

    pipeline.start().await.unwrap();
    pipeline.start().await.unwrap();
    assert_eq!(pipeline.status(), LifecycleStatus::Running);

    pipeline.reset().await.unwrap();
    assert_eq!(pipeline.status(), LifecycleStatus::Running);
}

#[tokio::test]
async fn test_lifecycle_events() {
    let publisher = Arc::new(BroadcastEventPublisher::new(64));
    let mut rx = publisher.subscribe();
    let config = PipelineConfig::from_value(&json!({
        "id": "line-3",
        "name": "Line 3",
        "stages": [
            {"id": "in", "name": "PLC", "type": "source", "componentId": "plc-1"},
            {"id": "hot", "name": "Hot", "type": "filter", "componentId": "none",
             "config": {"condition": "data.payload.temperature > 80"}}
        ]
    }))
    .unwrap();
    let plc = Arc::new(MockAdapter::new("plc-1"));
    let pipeline = Arc::new(
        IntegrationPipeline::builder(config)
            .event_publisher(publisher.clone())
            .source_adapter(plc.clone())
            .build()
            .unwrap(),
    );

    pipeline.start().await.unwrap();
    plc.emit(DataPacket::new("p", "plc-1", json!({"temperature": 20})))
        .await;
    pipeline.stop().await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            event_names::PIPELINE_STATUS_CHANGED, // INITIALIZING -> READY
            event_names::PIPELINE_STATUS_CHANGED, // READY -> STARTING
            event_names::PIPELINE_STATUS_CHANGED, // STARTING -> RUNNING
            event_names::PIPELINE_STARTED,
            event_names::EXECUTION_COMPLETED,
            event_names::PIPELINE_STATUS_CHANGED, // RUNNING -> STOPPING
            event_names::PIPELINE_STATUS_CHANGED, // STOPPING -> READY
            event_names::PIPELINE_STOPPED,
        ]
    );

    let completed = &events[4].payload;
    assert_eq!(completed["success"], true);
    assert_eq!(completed["filtered"], true);
    assert_eq!(events[2].payload["status"], "RUNNING");
}

#[tokio::test]
async fn test_panicking_handler_is_reported_not_propagated() {
    let publisher = Arc::new(BroadcastEventPublisher::new(64));
    let mut rx = publisher.subscribe();
    let config = PipelineConfig::from_value(&json!({
        "id": "line-3",
        "name": "Line 3",
        "stages": [
            {"id": "in", "name": "PLC", "type": "source", "componentId": "plc-1"},
            {"id": "explode", "name": "Explode", "type": "custom", "componentId": "explode"}
        ]
    }))
    .unwrap();
    let plc = Arc::new(MockAdapter::connected("plc-1"));
    let pipeline = Arc::new(
        IntegrationPipeline::builder(config)
            .event_publisher(publisher.clone())
            .source_adapter(plc.clone())
            .handler(
                "explode",
                Arc::new(FnHandler::new(|_data, _ctx, _opts| -> Result<Value, String> {
                    panic!("sensor driver crashed")
                })),
            )
            .build()
            .unwrap(),
    );

    pipeline.start().await.unwrap();
    plc.emit(DataPacket::new("p", "plc-1", json!(1))).await;
    assert_eq!(pipeline.status(), LifecycleStatus::Running);

    let mut data_errors = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if event.name == event_names::EXECUTION_DATA_ERROR {
            data_errors.push(event.payload);
        }
    }
    assert_eq!(data_errors.len(), 1);
    assert_eq!(data_errors[0]["adapterId"], "plc-1");
    assert!(data_errors[0]["error"]
        .as_str()
        .unwrap()
        .contains("sensor driver crashed"));
}

#[tokio::test]
async fn test_pipeline_from_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "{}",
        json!({
            "id": "line-9",
            "name": "Line 9",
            "autoStart": true,
            "errorHandling": {"defaultStrategy": "continue", "maxRetries": 5},
            "monitoring": {"detailedLogging": true},
            "stages": [
                {"id": "double", "name": "Double", "type": "transformer", "componentId": "double-value"}
            ]
        })
    )
    .unwrap();

    let config = PipelineConfig::from_file(file.path()).unwrap();
    assert!(config.auto_start);
    assert_eq!(config.error_handling.max_retries, 5);
    assert!(config.monitoring.collect_metrics);

    let pipeline = IntegrationPipeline::builder(config)
        .transformer("double-value", Arc::new(DoubleValue))
        .build_started()
        .await
        .unwrap();
    assert_eq!(pipeline.status(), LifecycleStatus::Running);

    let result = pipeline.process(json!({"value": 4}), "manual", None).await;
    assert_eq!(result.data(), Some(&json!({"value": 8})));
}

#[tokio::test]
async fn test_health_check_reports_adapters() {
    let pipeline = Arc::new(IntegrationPipeline::from_value(&transform_then_sink()).unwrap());
    let recorder = Arc::new(MockAdapter::connected("recorder"));
    pipeline.add_sink_adapter(recorder.clone()).unwrap();

    let report = pipeline.health_check().await;
    assert!(report.healthy);
    assert_eq!(report.status, LifecycleStatus::Ready);
    assert_eq!(report.adapters.len(), 1);

    recorder.set_connection_status(plantlink::ConnectionStatus::Disconnected);
    let report = pipeline.health_check().await;
    assert!(!report.healthy);
    assert_eq!(report.unreachable_adapters(), vec!["recorder"]);
}
