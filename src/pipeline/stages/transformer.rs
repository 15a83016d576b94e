use super::StageRequest;
use crate::config::Direction;
use crate::error::{ComponentRole, IntegrationErrorKind, PlantlinkError};
use crate::packet::DataPacket;
use crate::pipeline::core::{StageFailure, StageOutcome};

/// Run the transformer registered under the stage's `componentId`
///
/// Outbound transformation needs the current data to already be a packet.
pub async fn execute(request: StageRequest<'_>) -> StageOutcome {
    let stage = request.stage;
    let transformer = match request.registry.transformer(&stage.component_id) {
        Some(transformer) => transformer,
        None => {
            return StageOutcome::Failed(StageFailure::from_error(
                &PlantlinkError::ComponentNotFound {
                    role: ComponentRole::Transformer,
                    id: stage.component_id.clone(),
                },
            ))
        }
    };

    let output = match stage.direction() {
        Direction::Inbound => {
            transformer
                .transform_inbound(request.data, &stage.config)
                .await
        }
        Direction::Outbound => {
            if !DataPacket::is_packet(request.data) {
                return StageOutcome::failed(
                    IntegrationErrorKind::Transformation,
                    "Transformation failed: outbound transformation requires a data packet",
                );
            }
            match DataPacket::decode(request.data) {
                Ok(packet) => transformer.transform_outbound(&packet, &stage.config).await,
                Err(e) => {
                    return StageOutcome::failed(
                        IntegrationErrorKind::Transformation,
                        format!("Transformation failed: invalid data packet: {}", e),
                    )
                }
            }
        }
    };

    match output {
        Ok(data) => StageOutcome::Completed(data),
        Err(e) => StageOutcome::failed(
            IntegrationErrorKind::Transformation,
            format!("Transformation failed: {}", e),
        ),
    }
}
