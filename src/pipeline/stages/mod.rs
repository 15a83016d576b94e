//! Stage implementations, one module per stage type
//!
//! 1. source - Entry point documentation; passes data through
//! 2. transformer - Runs a registered transformer (inbound or outbound)
//! 3. validator - Runs a registered validator; data passes through unchanged
//! 4. sink - Delivers the data to a connected sink adapter as a packet
//! 5. filter - Drops data whose condition evaluates false
//! 6. custom - Runs a registered handler and returns its output verbatim

pub mod custom;
pub mod filter;
pub mod sink;
pub mod transformer;
pub mod validator;

use serde_json::Value;

use super::context::ExecutionContext;
use super::core::StageOutcome;
use crate::components::ComponentRegistry;
use crate::config::{StageConfig, StageType};

/// Everything a stage needs for one invocation
#[derive(Clone, Copy)]
pub struct StageRequest<'a> {
    pub stage: &'a StageConfig,
    pub data: &'a Value,
    pub context: &'a ExecutionContext,
    pub registry: &'a ComponentRegistry,
}

/// Run one stage against the current data
pub async fn dispatch(request: StageRequest<'_>) -> StageOutcome {
    match request.stage.stage_type {
        // Consumed by the subscription manager during start()
        StageType::Source => StageOutcome::Completed(request.data.clone()),
        StageType::Transformer => transformer::execute(request).await,
        StageType::Validator => validator::execute(request).await,
        StageType::Sink => sink::execute(request).await,
        StageType::Filter => filter::execute(request),
        StageType::Custom => custom::execute(request).await,
    }
}
