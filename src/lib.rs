//! Plantlink: integration pipeline engine for manufacturing data
//!
//! Moves data between plant-floor systems (message brokers, industrial
//! protocol servers, HTTP endpoints) through configurable stages: transform,
//! validate, filter, deliver, or hand off to custom code. Adapters,
//! transformers and validators are supplied by the embedding application and
//! registered into a pipeline; the engine sequences stages, handles errors,
//! keeps statistics and manages the pipeline lifecycle.

pub mod components;
pub mod config;
pub mod error;
pub mod events;
pub mod expression;
pub mod logger;
pub mod packet;
pub mod pipeline;
pub mod state_machine;

pub use components::{
    Adapter, ComponentRegistry, ConnectionStatus, FnHandler, MockAdapter, StageHandler,
    Transformer, ValidationIssue, ValidationResult, Validator,
};
pub use config::{ErrorStrategy, PipelineConfig, StageConfig, StageType};
pub use error::{IntegrationError, IntegrationErrorKind, PlantlinkError, PlantlinkResult};
pub use events::{BroadcastEventPublisher, EventPublisher, NoOpEventPublisher};
pub use packet::DataPacket;
pub use pipeline::{
    ExecutionContext, ExecutionOutcome, IntegrationPipeline, PipelineBuilder, PipelineResult,
};
pub use state_machine::LifecycleStatus;
