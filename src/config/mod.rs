//! Pipeline configuration model
//!
//! A pipeline is described by a [`PipelineConfig`]: an ordered list of
//! [`StageConfig`]s plus pipeline-wide error handling and monitoring options.
//! Raw configuration is checked with [`PipelineConfig::from_value`] before a
//! pipeline can be constructed from it.

mod parser;
pub mod types;

pub use types::{
    Direction, ErrorStrategy, MonitoringConfig, PipelineConfig, PipelineErrorHandling,
    StageConfig, StageErrorHandling, StageOptions, StageType, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY_MS,
};
