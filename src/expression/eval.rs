use super::{CompareOp, Expr, PathRoot, PathSegment};
use serde_json::Value;
use std::cmp::Ordering;

pub(super) fn evaluate(expr: &Expr, data: &Value, context: &Value) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Path(root, segments) => {
            let base = match root {
                PathRoot::Data => data,
                PathRoot::Context => context,
            };
            resolve(base, segments).cloned().unwrap_or(Value::Null)
        }
        Expr::Not(inner) => Value::Bool(!is_truthy(&evaluate(inner, data, context))),
        Expr::And(left, right) => Value::Bool(
            is_truthy(&evaluate(left, data, context)) && is_truthy(&evaluate(right, data, context)),
        ),
        Expr::Or(left, right) => Value::Bool(
            is_truthy(&evaluate(left, data, context)) || is_truthy(&evaluate(right, data, context)),
        ),
        Expr::Compare(op, left, right) => {
            let left = evaluate(left, data, context);
            let right = evaluate(right, data, context);
            Value::Bool(compare(*op, &left, &right))
        }
    }
}

fn resolve<'a>(base: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    segments.iter().try_fold(base, |current, segment| match segment {
        PathSegment::Field(name) => current.get(name.as_str()),
        PathSegment::Index(index) => current.get(*index),
    })
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::Ne => !values_equal(left, right),
        CompareOp::Lt => order(left, right) == Some(Ordering::Less),
        CompareOp::Le => matches!(order(left, right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => order(left, right) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(order(left, right), Some(Ordering::Greater | Ordering::Equal)),
    }
}

// Only numbers with numbers and strings with strings are ordered
fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Equality that treats `10` and `10.0` as the same number
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// `null`, `false`, `0` and `""` are false; everything else is true
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use crate::expression::Condition;
    use serde_json::json;

    fn eval(source: &str, data: serde_json::Value) -> bool {
        Condition::parse(source).unwrap().evaluate(&data, &json!({}))
    }

    #[test]
    fn test_numeric_comparisons() {
        let data = json!({"value": 5});
        assert!(eval("data.value > 0", data.clone()));
        assert!(eval("data.value == 5.0", data.clone()));
        assert!(eval("data.value <= 5", data.clone()));
        assert!(!eval("data.value < 5", data.clone()));
        assert!(eval("data.value != 6", data));
    }

    #[test]
    fn test_string_and_mixed_comparisons() {
        let data = json!({"mode": "auto", "count": "7"});
        assert!(eval("data.mode == 'auto'", data.clone()));
        assert!(eval("data.mode > 'a'", data.clone()));
        // Strings are not coerced to numbers
        assert!(!eval("data.count > 3", data.clone()));
        assert!(!eval("data.count == 7", data));
    }

    #[test]
    fn test_missing_paths_are_null() {
        let data = json!({"a": {"b": [1, 2]}});
        assert!(eval("data.a.b[1] == 2", data.clone()));
        assert!(eval("data.a.missing == null", data.clone()));
        assert!(!eval("data.a.b[5]", data.clone()));
        assert!(!eval("data.a.b[0].deep > 0", data));
    }

    #[test]
    fn test_truthiness_and_negation() {
        let data = json!({"flag": true, "zero": 0, "empty": "", "list": []});
        assert!(eval("data.flag", data.clone()));
        assert!(eval("!data.zero", data.clone()));
        assert!(eval("!data.empty", data.clone()));
        assert!(eval("data.list", data.clone()));
        assert!(eval("!(data.flag && data.zero)", data));
    }

    #[test]
    fn test_short_circuit_results() {
        let data = json!({"a": 1});
        assert!(eval("data.a == 2 || data.a == 1", data.clone()));
        assert!(!eval("data.a == 1 && data.b", data));
    }
}
