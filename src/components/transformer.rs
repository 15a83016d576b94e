use async_trait::async_trait;
use serde_json::Value;

use crate::config::StageOptions;
use crate::packet::DataPacket;

/// Output of a transformation: the new data, or the reason it failed
pub type TransformOutput = Result<Value, String>;

/// Converts data between an external system's shape and the pipeline's shape
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Transform data entering the pipeline
    async fn transform_inbound(&self, data: &Value, options: &StageOptions) -> TransformOutput;

    /// Transform a packet leaving the pipeline
    async fn transform_outbound(
        &self,
        _packet: &DataPacket,
        _options: &StageOptions,
    ) -> TransformOutput {
        Err("outbound transformation is not supported".to_string())
    }
}
