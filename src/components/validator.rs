use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::StageOptions;
use crate::packet::DataPacket;

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

/// Result of validating one piece of data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<ValidationIssue>,
    #[serde(default)]
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    pub fn invalid(errors: Vec<ValidationIssue>) -> Self {
        Self {
            valid: false,
            errors,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: ValidationIssue) -> Self {
        self.warnings.push(warning);
        self
    }

    /// Error messages joined with ", "
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|issue| issue.message.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Checks data without modifying it
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate_inbound(&self, data: &Value, options: &StageOptions) -> ValidationResult;

    async fn validate_outbound(
        &self,
        _packet: &DataPacket,
        _options: &StageOptions,
    ) -> ValidationResult {
        ValidationResult::invalid(vec![ValidationIssue::new(
            "outbound validation is not supported",
        )])
    }
}
