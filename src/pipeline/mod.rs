//! Integration pipeline engine
//!
//! A pipeline runs each piece of data through its configured stages in order:
//! conditions may skip a stage, filters may drop the data, and failures are
//! handled per stage by aborting, continuing with the previous data, or
//! retrying with backoff. Source stages describe where data enters; on
//! `start()` their adapters are connected and subscribed, and every delivered
//! packet is fed to `process()`.
//!
//! # Example
//! ```
//! use plantlink::components::FnHandler;
//! use plantlink::config::{PipelineConfig, StageConfig, StageType};
//! use plantlink::pipeline::IntegrationPipeline;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = PipelineConfig::new("line-3", "Line 3")
//!     .with_stage(StageConfig::new("double", "Double", StageType::Custom, "double"));
//!
//! let pipeline = IntegrationPipeline::new(config).unwrap();
//! pipeline
//!     .register_custom_handler(
//!         "double",
//!         Arc::new(FnHandler::new(|data, _ctx, _opts| {
//!             Ok(json!({"value": data["value"].as_i64().unwrap_or(0) * 2}))
//!         })),
//!     )
//!     .unwrap();
//!
//! let result = pipeline.process(json!({"value": 5}), "plc-7", None).await;
//! assert_eq!(result.data(), Some(&json!({"value": 10})));
//! # }
//! ```

pub mod builder;
pub mod context;
pub mod core;
pub mod executor;
pub mod retry;
pub mod stages;
pub mod stats;
pub mod subscription;

// Re-export main types
pub use builder::PipelineBuilder;
pub use context::ExecutionContext;
pub use core::{
    AdapterHealth, ExecutionOutcome, HealthReport, PipelineResult, StageFailure, StageOutcome,
};
pub use executor::IntegrationPipeline;
pub use retry::RetryPolicy;
pub use stats::{PipelineStats, StageStats};
