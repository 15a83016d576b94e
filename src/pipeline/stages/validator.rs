use super::StageRequest;
use crate::config::Direction;
use crate::error::{ComponentRole, IntegrationErrorKind, PlantlinkError};
use crate::packet::DataPacket;
use crate::pipeline::core::{StageFailure, StageOutcome};

/// Run the validator registered under the stage's `componentId`
///
/// Valid data passes through unchanged.
pub async fn execute(request: StageRequest<'_>) -> StageOutcome {
    let stage = request.stage;
    let validator = match request.registry.validator(&stage.component_id) {
        Some(validator) => validator,
        None => {
            return StageOutcome::Failed(StageFailure::from_error(
                &PlantlinkError::ComponentNotFound {
                    role: ComponentRole::Validator,
                    id: stage.component_id.clone(),
                },
            ))
        }
    };

    let result = match stage.direction() {
        Direction::Inbound => validator.validate_inbound(request.data, &stage.config).await,
        Direction::Outbound => {
            if !DataPacket::is_packet(request.data) {
                return StageOutcome::failed(
                    IntegrationErrorKind::Validation,
                    "Validation failed: outbound validation requires a data packet",
                );
            }
            match DataPacket::decode(request.data) {
                Ok(packet) => validator.validate_outbound(&packet, &stage.config).await,
                Err(e) => {
                    return StageOutcome::failed(
                        IntegrationErrorKind::Validation,
                        format!("Validation failed: invalid data packet: {}", e),
                    )
                }
            }
        }
    };

    if result.valid {
        StageOutcome::Completed(request.data.clone())
    } else {
        StageOutcome::failed(
            IntegrationErrorKind::Validation,
            format!("Validation failed: {}", result.error_summary()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ComponentRegistry, ValidationIssue, ValidationResult, Validator};
    use crate::config::{StageConfig, StageOptions, StageType};
    use crate::pipeline::ExecutionContext;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct InRange;

    #[async_trait]
    impl Validator for InRange {
        async fn validate_inbound(&self, data: &Value, _options: &StageOptions) -> ValidationResult {
            let mut errors = Vec::new();
            match data["value"].as_f64() {
                Some(v) if v < 0.0 => errors.push(ValidationIssue::for_field("value", "must be positive")),
                Some(v) if v > 100.0 => errors.push(ValidationIssue::for_field("value", "above range")),
                Some(_) => {}
                None => errors.push(ValidationIssue::new("value missing")),
            }
            if data.get("unit").is_none() {
                errors.push(ValidationIssue::new("unit missing"));
            }
            if errors.is_empty() {
                ValidationResult::valid()
            } else {
                ValidationResult::invalid(errors)
            }
        }
    }

    async fn run(data: Value) -> StageOutcome {
        let mut registry = ComponentRegistry::new();
        registry.add_validator("range", Arc::new(InRange)).unwrap();
        let stage = StageConfig::new("v", "Range", StageType::Validator, "range");
        let context = ExecutionContext::new("p", "src", 1, None);
        execute(StageRequest {
            stage: &stage,
            data: &data,
            context: &context,
            registry: &registry,
        })
        .await
    }

    #[tokio::test]
    async fn test_valid_data_passes_unchanged() {
        let data = json!({"value": 42, "unit": "C"});
        assert_eq!(run(data.clone()).await, StageOutcome::Completed(data));
    }

    #[tokio::test]
    async fn test_messages_are_joined() {
        match run(json!({"value": -1})).await {
            StageOutcome::Failed(failure) => {
                assert_eq!(failure.kind, IntegrationErrorKind::Validation);
                assert_eq!(
                    failure.message,
                    "Validation failed: must be positive, unit missing"
                );
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
