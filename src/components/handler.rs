use async_trait::async_trait;
use serde_json::Value;

use crate::config::StageOptions;
use crate::pipeline::ExecutionContext;

/// Handler behind a `custom` stage
///
/// Whatever the handler returns becomes the stage output.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(
        &self,
        data: Value,
        context: &ExecutionContext,
        options: &StageOptions,
    ) -> Result<Value, String>;
}

/// Adapts a plain synchronous closure into a [`StageHandler`]
///
/// # Example
/// ```
/// use plantlink::components::FnHandler;
/// use serde_json::json;
///
/// let stamp = FnHandler::new(|mut data, ctx, _options| {
///     data["executionId"] = json!(ctx.execution_id());
///     Ok(data)
/// });
/// ```
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Value, &ExecutionContext, &StageOptions) -> Result<Value, String> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> StageHandler for FnHandler<F>
where
    F: Fn(Value, &ExecutionContext, &StageOptions) -> Result<Value, String> + Send + Sync,
{
    async fn handle(
        &self,
        data: Value,
        context: &ExecutionContext,
        options: &StageOptions,
    ) -> Result<Value, String> {
        (self.func)(data, context, options)
    }
}
