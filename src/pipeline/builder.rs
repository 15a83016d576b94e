use std::sync::Arc;

use super::executor::IntegrationPipeline;
use crate::components::{Adapter, StageHandler, Transformer, Validator};
use crate::config::PipelineConfig;
use crate::error::PlantlinkResult;
use crate::events::{EventPublisher, NoOpEventPublisher};
use crate::logger::{Logger, LOGGER};

/// Builder for creating integration pipelines
///
/// Components added here are registered in the order they were added, with
/// the same duplicate checks as direct registration.
///
/// # Example
/// ```
/// use plantlink::components::{FnHandler, MockAdapter};
/// use plantlink::config::PipelineConfig;
/// use plantlink::pipeline::PipelineBuilder;
/// use std::sync::Arc;
///
/// let pipeline = PipelineBuilder::new(PipelineConfig::new("line-3", "Line 3"))
///     .sink_adapter(Arc::new(MockAdapter::connected("historian")))
///     .handler("noop", Arc::new(FnHandler::new(|data, _ctx, _opts| Ok(data))))
///     .build()
///     .unwrap();
///
/// assert_eq!(pipeline.id(), "line-3");
/// ```
pub struct PipelineBuilder {
    config: PipelineConfig,
    publisher: Arc<dyn EventPublisher>,
    logger: Arc<Logger>,
    source_adapters: Vec<Arc<dyn Adapter>>,
    sink_adapters: Vec<Arc<dyn Adapter>>,
    transformers: Vec<(String, Arc<dyn Transformer>)>,
    validators: Vec<(String, Arc<dyn Validator>)>,
    handlers: Vec<(String, Arc<dyn StageHandler>)>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            publisher: Arc::new(NoOpEventPublisher),
            logger: LOGGER.clone(),
            source_adapters: Vec::new(),
            sink_adapters: Vec::new(),
            transformers: Vec::new(),
            validators: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Where lifecycle and execution events go (default: dropped)
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Logger for this pipeline (default: the shared [`LOGGER`])
    pub fn logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Add an adapter that feeds `source` stages
    pub fn source_adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.source_adapters.push(adapter);
        self
    }

    /// Add an adapter that `sink` stages deliver to
    pub fn sink_adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.sink_adapters.push(adapter);
        self
    }

    /// Add a transformer under the given component id
    pub fn transformer(mut self, id: impl Into<String>, transformer: Arc<dyn Transformer>) -> Self {
        self.transformers.push((id.into(), transformer));
        self
    }

    /// Add a validator under the given component id
    pub fn validator(mut self, id: impl Into<String>, validator: Arc<dyn Validator>) -> Self {
        self.validators.push((id.into(), validator));
        self
    }

    /// Add a custom stage handler under the given component id
    pub fn handler(mut self, id: impl Into<String>, handler: Arc<dyn StageHandler>) -> Self {
        self.handlers.push((id.into(), handler));
        self
    }

    /// Build the pipeline in the `READY` state
    pub fn build(self) -> PlantlinkResult<IntegrationPipeline> {
        let pipeline = IntegrationPipeline::assemble(self.config, self.publisher, self.logger)?;

        for adapter in self.source_adapters {
            pipeline.add_source_adapter(adapter)?;
        }
        for adapter in self.sink_adapters {
            pipeline.add_sink_adapter(adapter)?;
        }
        for (id, transformer) in self.transformers {
            pipeline.add_transformer(id, transformer)?;
        }
        for (id, validator) in self.validators {
            pipeline.add_validator(id, validator)?;
        }
        for (id, handler) in self.handlers {
            pipeline.register_custom_handler(id, handler)?;
        }

        Ok(pipeline)
    }

    /// Build the pipeline and start it if its configuration sets `autoStart`
    pub async fn build_started(self) -> PlantlinkResult<Arc<IntegrationPipeline>> {
        let pipeline = Arc::new(self.build()?);
        if pipeline.config().auto_start {
            pipeline.start().await?;
        }
        Ok(pipeline)
    }
}
