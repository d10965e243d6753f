//! The `condition` handler evaluates `field <operator> value` against the run context.
//!
//! `field` is a dot path into [`RunContext::as_value`]. A false predicate
//! fails the run with [`ActionError::ConditionNotMet`]; it is never a skip.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{parse_config, require_non_empty};
use crate::{ActionError, ActionHandler, ActionType, RunContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Exists,
    NotExists,
    In,
}

impl std::str::FromStr for Operator {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "equals" | "eq" | "==" => Self::Equals,
            "not_equals" | "ne" | "!=" => Self::NotEquals,
            "greater_than" | "gt" | ">" => Self::GreaterThan,
            "greater_than_or_equal" | "gte" | ">=" => Self::GreaterThanOrEqual,
            "less_than" | "lt" | "<" => Self::LessThan,
            "less_than_or_equal" | "lte" | "<=" => Self::LessThanOrEqual,
            "contains" => Self::Contains,
            "not_contains" => Self::NotContains,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            "exists" => Self::Exists,
            "not_exists" => Self::NotExists,
            "in" => Self::In,
            other => return Err(format!("unknown operator '{other}'")),
        })
    }
}

impl Operator {
    /// Whether the operator reads the configured `value`.
    pub fn needs_value(self) -> bool {
        !matches!(self, Self::Exists | Self::NotExists)
    }

    /// Evaluate the predicate. `actual` is `None` when the field is missing.
    pub fn evaluate(self, actual: Option<&Value>, expected: &Value) -> bool {
        let Some(actual) = actual else {
            return matches!(self, Self::NotExists | Self::NotEquals);
        };
        match self {
            Self::Exists => !actual.is_null(),
            Self::NotExists => actual.is_null(),
            Self::Equals => loosely_equal(actual, expected),
            Self::NotEquals => !loosely_equal(actual, expected),
            Self::GreaterThan => compare(actual, expected) == Some(Ordering::Greater),
            Self::GreaterThanOrEqual => {
                matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal))
            }
            Self::LessThan => compare(actual, expected) == Some(Ordering::Less),
            Self::LessThanOrEqual => {
                matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal))
            }
            Self::Contains => contains(actual, expected),
            Self::NotContains => !contains(actual, expected),
            Self::StartsWith => match (actual.as_str(), expected.as_str()) {
                (Some(a), Some(e)) => a.starts_with(e),
                _ => false,
            },
            Self::EndsWith => match (actual.as_str(), expected.as_str()) {
                (Some(a), Some(e)) => a.ends_with(e),
                _ => false,
            },
            Self::In => match expected {
                Value::Array(items) => items.iter().any(|item| loosely_equal(actual, item)),
                Value::String(haystack) => actual.as_str().is_some_and(|a| haystack.contains(a)),
                _ => false,
            },
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
        Value::Object(map) => needle.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    }
}

#[derive(Debug, Deserialize)]
struct ConditionConfig {
    field: String,
    operator: String,
    #[serde(default)]
    value: Option<Value>,
}

pub struct ConditionHandler;

#[async_trait]
impl ActionHandler for ConditionHandler {
    fn action_type(&self) -> ActionType {
        ActionType::Condition
    }

    async fn execute(&self, config: &Value, ctx: &RunContext) -> Result<Value, ActionError> {
        let cfg: ConditionConfig = parse_config(ActionType::Condition, config)?;
        require_non_empty(ActionType::Condition, "field", &cfg.field)?;
        let operator: Operator = cfg
            .operator
            .parse()
            .map_err(|e: String| ActionError::config(ActionType::Condition, e))?;
        let expected = match cfg.value {
            Some(v) => v,
            None if operator.needs_value() => {
                return Err(ActionError::config(ActionType::Condition, "missing field `value`"));
            }
            None => Value::Null,
        };

        let actual = ctx.lookup(&cfg.field);
        let result = operator.evaluate(actual.as_ref(), &expected);
        debug!(
            run_id = %ctx.run_id,
            field = %cfg.field,
            ?actual,
            "condition evaluated to {result}"
        );

        if !result {
            return Err(ActionError::ConditionNotMet);
        }

        Ok(json!({
            "field": cfg.field,
            "operator": cfg.operator,
            "actual": actual,
            "expected": expected,
            "result": true,
        }))
    }
}
