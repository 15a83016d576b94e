use super::StageRequest;
use crate::error::{ComponentRole, IntegrationErrorKind, PlantlinkError};
use crate::pipeline::core::{StageFailure, StageOutcome};

/// Invoke the handler registered under the stage's `componentId`
pub async fn execute(request: StageRequest<'_>) -> StageOutcome {
    let stage = request.stage;
    let handler = match request.registry.handler(&stage.component_id) {
        Some(handler) => handler,
        None => {
            return StageOutcome::Failed(StageFailure::from_error(
                &PlantlinkError::ComponentNotFound {
                    role: ComponentRole::CustomHandler,
                    id: stage.component_id.clone(),
                },
            ))
        }
    };

    match handler
        .handle(request.data.clone(), request.context, &stage.config)
        .await
    {
        Ok(data) => StageOutcome::Completed(data),
        Err(e) => StageOutcome::failed(
            IntegrationErrorKind::StageExecution,
            format!("Custom stage {} failed: {}", stage.id, e),
        ),
    }
}
