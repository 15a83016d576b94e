use super::StageRequest;
use crate::error::IntegrationErrorKind;
use crate::pipeline::core::StageOutcome;

/// Evaluate the stage's `config.condition` against the current data
///
/// A false condition yields [`StageOutcome::Filtered`], which is not a failure.
pub fn execute(request: StageRequest<'_>) -> StageOutcome {
    let condition = match request.stage.filter_condition() {
        Some(condition) => condition,
        None => {
            return StageOutcome::failed(
                IntegrationErrorKind::Configuration,
                format!(
                    "Filter stage {} has no compiled condition",
                    request.stage.id
                ),
            )
        }
    };

    if condition.evaluate(request.data, &request.context.scope()) {
        StageOutcome::Completed(request.data.clone())
    } else {
        StageOutcome::Filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ComponentRegistry;
    use crate::config::{StageConfig, StageType};
    use crate::pipeline::ExecutionContext;
    use serde_json::{json, Value};

    fn run(stage: &StageConfig, data: Value) -> StageOutcome {
        let context = ExecutionContext::new("p", "plc-1", 1, None);
        let registry = ComponentRegistry::new();
        execute(StageRequest {
            stage,
            data: &data,
            context: &context,
            registry: &registry,
        })
    }

    fn filter(condition: &str) -> StageConfig {
        let mut stage = StageConfig::new("f", "Filter", StageType::Filter, "none")
            .with_option("condition", condition);
        stage.compile_filter(0).unwrap();
        stage
    }

    #[test]
    fn test_filter_keeps_matching_data() {
        let stage = filter("data.temperature > 50");
        let data = json!({"temperature": 71});
        assert_eq!(run(&stage, data.clone()), StageOutcome::Completed(data));
    }

    #[test]
    fn test_filter_drops_non_matching_data() {
        let stage = filter("data.temperature > 50 && context.sourceId == 'plc-1'");
        assert_eq!(run(&stage, json!({"temperature": 20})), StageOutcome::Filtered);
    }

    #[test]
    fn test_uncompiled_filter_fails() {
        let stage = StageConfig::new("f", "Filter", StageType::Filter, "none");
        assert!(run(&stage, json!({})).is_failed());
    }
}
