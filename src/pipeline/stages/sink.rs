use super::StageRequest;
use crate::components::ConnectionStatus;
use crate::error::{ComponentRole, IntegrationErrorKind, PlantlinkError};
use crate::packet::DataPacket;
use crate::pipeline::core::{StageFailure, StageOutcome};

/// Deliver the current data through the sink adapter named by `componentId`
///
/// Bare payloads are wrapped into a packet whose id is the execution id and
/// whose source is the execution's source id. The stage returns the data it
/// was given, not the packet.
pub async fn execute(request: StageRequest<'_>) -> StageOutcome {
    let stage = request.stage;
    let adapter = match request.registry.sink_adapter(&stage.component_id) {
        Some(adapter) => adapter,
        None => {
            return StageOutcome::Failed(StageFailure::from_error(
                &PlantlinkError::ComponentNotFound {
                    role: ComponentRole::SinkAdapter,
                    id: stage.component_id.clone(),
                },
            ))
        }
    };

    let connection = adapter.connection_status();
    if connection != ConnectionStatus::Connected {
        return StageOutcome::failed(
            IntegrationErrorKind::Connection,
            format!(
                "Sink adapter {} is not connected (status: {:?})",
                adapter.id(),
                connection
            ),
        );
    }

    let packet = match DataPacket::wrap(
        request.data,
        request.context.execution_id(),
        request.context.source_id(),
    ) {
        Ok(packet) => packet,
        Err(e) => {
            return StageOutcome::failed(
                IntegrationErrorKind::Delivery,
                format!("Delivery to {} failed: invalid data packet: {}", adapter.id(), e),
            )
        }
    };

    match adapter.send_data(packet, Some(&stage.config)).await {
        Ok(()) => StageOutcome::Completed(request.data.clone()),
        Err(e) => StageOutcome::failed(
            IntegrationErrorKind::Delivery,
            format!("Delivery to {} failed: {}", adapter.id(), e),
        ),
    }
}
