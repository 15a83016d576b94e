//! Parsing and validation of raw pipeline configuration.

use serde_json::Value;
use std::path::Path;

use super::types::{Direction, ErrorStrategy, PipelineConfig, StageType};
use crate::error::{PlantlinkError, PlantlinkResult};
use crate::expression::Condition;

fn require_string(
    object: &serde_json::Map<String, Value>,
    key: &str,
    field: &str,
) -> PlantlinkResult<()> {
    match object.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(()),
        Some(Value::String(_)) => Err(PlantlinkError::config(field, "must not be empty")),
        Some(_) => Err(PlantlinkError::config(field, "must be a string")),
        None => Err(PlantlinkError::config(field, "is required")),
    }
}

fn check_condition(value: &Value, field: &str) -> PlantlinkResult<()> {
    let source = value
        .as_str()
        .ok_or_else(|| PlantlinkError::config(field, "must be an expression string"))?;
    Condition::parse(source).map_err(|e| PlantlinkError::config(field, e.to_string()))?;
    Ok(())
}

fn check_strategy(value: Option<&Value>, field: &str) -> PlantlinkResult<()> {
    match value {
        None => Ok(()),
        Some(Value::String(s)) if ErrorStrategy::parse(s).is_some() => Ok(()),
        Some(other) => Err(PlantlinkError::config(
            field,
            format!("must be one of continue, retry, abort (got {})", other),
        )),
    }
}

/// Check the raw shape of one stage, naming the first offending field
fn check_stage(index: usize, stage: &Value) -> PlantlinkResult<()> {
    let prefix = format!("stages[{}]", index);
    let object = stage
        .as_object()
        .ok_or_else(|| PlantlinkError::config(&prefix, "must be an object"))?;

    require_string(object, "id", &format!("{}.id", prefix))?;
    require_string(object, "name", &format!("{}.name", prefix))?;

    let type_field = format!("{}.type", prefix);
    match object.get("type") {
        Some(Value::String(t)) if StageType::parse(t).is_some() => {}
        Some(Value::String(t)) => {
            return Err(PlantlinkError::config(
                type_field,
                format!(
                    "unknown stage type '{}' (expected source, transformer, validator, sink, filter or custom)",
                    t
                ),
            ))
        }
        Some(_) => return Err(PlantlinkError::config(type_field, "must be a string")),
        None => return Err(PlantlinkError::config(type_field, "is required")),
    }

    require_string(object, "componentId", &format!("{}.componentId", prefix))?;

    if let Some(options) = object.get("config") {
        let options = options
            .as_object()
            .ok_or_else(|| PlantlinkError::config(format!("{}.config", prefix), "must be an object"))?;
        if let Some(direction) = options.get("direction") {
            if direction.as_str().and_then(Direction::parse).is_none() {
                return Err(PlantlinkError::config(
                    format!("{}.config.direction", prefix),
                    "must be 'inbound' or 'outbound'",
                ));
            }
        }
        if let Some(topics) = options.get("topics") {
            let valid = topics
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false);
            if !valid {
                return Err(PlantlinkError::config(
                    format!("{}.config.topics", prefix),
                    "must be a list of strings",
                ));
            }
        }
    }

    if let Some(condition) = object.get("condition") {
        if !condition.is_null() {
            check_condition(condition, &format!("{}.condition", prefix))?;
        }
    }

    if let Some(error_handling) = object.get("errorHandling") {
        let eh = error_handling.as_object().ok_or_else(|| {
            PlantlinkError::config(format!("{}.errorHandling", prefix), "must be an object")
        })?;
        check_strategy(
            eh.get("strategy"),
            &format!("{}.errorHandling.strategy", prefix),
        )?;
    }

    Ok(())
}

impl PipelineConfig {
    /// Validate and type a raw configuration object
    ///
    /// The error names the first missing or invalid field.
    pub fn from_value(raw: &Value) -> PlantlinkResult<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| PlantlinkError::config("config", "must be an object"))?;

        require_string(object, "id", "id")?;
        require_string(object, "name", "name")?;

        let stages = match object.get("stages") {
            Some(Value::Array(stages)) => stages,
            Some(_) => return Err(PlantlinkError::config("stages", "must be an array")),
            None => return Err(PlantlinkError::config("stages", "is required")),
        };
        for (index, stage) in stages.iter().enumerate() {
            check_stage(index, stage)?;
        }

        if let Some(error_handling) = object.get("errorHandling") {
            let eh = error_handling
                .as_object()
                .ok_or_else(|| PlantlinkError::config("errorHandling", "must be an object"))?;
            check_strategy(eh.get("defaultStrategy"), "errorHandling.defaultStrategy")?;
        }

        let config: PipelineConfig = serde_json::from_value(raw.clone())
            .map_err(|e| PlantlinkError::config("config", e.to_string()))?;
        config.validated()
    }

    pub fn from_json_str(json: &str) -> PlantlinkResult<Self> {
        let raw: Value = serde_json::from_str(json)
            .map_err(|e| PlantlinkError::config("config", format!("invalid JSON: {}", e)))?;
        Self::from_value(&raw)
    }

    /// Load a JSON pipeline definition from disk
    pub fn from_file(path: impl AsRef<Path>) -> PlantlinkResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Check a typed configuration and compile its filter conditions
    ///
    /// Configurations built in code go through the same checks as parsed ones.
    pub fn validated(mut self) -> PlantlinkResult<Self> {
        if self.id.trim().is_empty() {
            return Err(PlantlinkError::config("id", "must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(PlantlinkError::config("name", "must not be empty"));
        }
        for (index, stage) in self.stages.iter_mut().enumerate() {
            if stage.id.trim().is_empty() {
                return Err(PlantlinkError::config(
                    format!("stages[{}].id", index),
                    "must not be empty",
                ));
            }
            if stage.name.trim().is_empty() {
                return Err(PlantlinkError::config(
                    format!("stages[{}].name", index),
                    "must not be empty",
                ));
            }
            if stage.component_id.trim().is_empty() {
                return Err(PlantlinkError::config(
                    format!("stages[{}].componentId", index),
                    "must not be empty",
                ));
            }
            stage.compile_filter(index).map_err(|e| match e {
                PlantlinkError::InvalidCondition { .. } => PlantlinkError::config(
                    format!("stages[{}].config.condition", index),
                    e.to_string(),
                ),
                other => other,
            })?;
        }
        Ok(self)
    }
}
