//! Condition expressions for stage gating and filter stages
//!
//! Expressions are parsed once into a small AST and interpreted against the
//! current stage data and a view of the execution context. Nothing is ever
//! compiled or executed as code.
//!
//! # Example
//! ```
//! use plantlink::expression::Condition;
//! use serde_json::json;
//!
//! let condition = Condition::parse("data.temperature > 80 && context.sourceId == 'line-1'").unwrap();
//! let data = json!({"temperature": 91.5});
//! let scope = json!({"sourceId": "line-1"});
//! assert!(condition.evaluate(&data, &scope));
//! ```

mod eval;
mod parser;

use serde::{Deserialize, Serialize};

use crate::error::{PlantlinkError, PlantlinkResult};

pub use eval::{is_truthy, values_equal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRoot {
    Data,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(serde_json::Value),
    Path(PathRoot, Vec<PathSegment>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

/// A parsed condition together with its source text
///
/// Serializes as the original expression string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> PlantlinkResult<Self> {
        let expr = parser::parse(source).map_err(|message| PlantlinkError::InvalidCondition {
            expression: source.to_string(),
            message,
        })?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate against the stage data and the context scope
    pub fn evaluate(&self, data: &serde_json::Value, context: &serde_json::Value) -> bool {
        is_truthy(&eval::evaluate(&self.expr, data, context))
    }
}

impl TryFrom<String> for Condition {
    type Error = PlantlinkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Condition::parse(&value)
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.source
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
