//! Declarative condition maps
//!
//! A [`ConditionSpec`] is the loosely typed form callers (HTTP handlers,
//! workflows, tests) use to describe a predicate:
//!
//! ```rust
//! use serde_json::json;
//! use wao_store::repository::ConditionSpec;
//!
//! let spec = ConditionSpec::from_json(json!({
//!     "status": "DRAFT",
//!     "total_amount GREATER_THAN_OR_EQUAL": 100,
//!     "OR": [{"currency": "USD"}, {"currency": "EUR"}],
//! }))
//! .unwrap();
//! let filter = spec.compile().unwrap();
//! assert_eq!(filter.conditions.len(), 2);
//! assert_eq!(filter.or_groups[0].len(), 2);
//! ```
//!
//! Keys are a bare attribute (equality), an attribute followed by a space and
//! an operator token, or the reserved key `OR`. Tokens match exactly and
//! case-sensitively; the longest matching token wins, so `qty NOT IN` is set
//! exclusion rather than `IN` on an attribute called `qty NOT`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::error::{RepositoryError, RepositoryResult};
use super::filter::{Filter, FilterCondition, FilterOperator};
use super::value::Value;

/// Reserved key holding a sequence of nested condition maps
pub const OR_KEY: &str = "OR";

/// Operator tokens, longest first so that suffix matching is unambiguous.
const SUFFIXES: &[(&str, FilterOperator)] = &[
    (" GREATER_THAN_OR_EQUAL", FilterOperator::GreaterThanOrEqual),
    (" LESS_THAN_OR_EQUAL", FilterOperator::LessThanOrEqual),
    (" GREATER_THAN", FilterOperator::GreaterThan),
    (" IS NOT NULL", FilterOperator::IsNotNull),
    (" BETWEEN_AND", FilterOperator::Between),
    (" LESS_THAN", FilterOperator::LessThan),
    (" NOT_EQUAL", FilterOperator::NotEqual),
    (" NOT_LIKE", FilterOperator::NotLike),
    (" NOT IN", FilterOperator::NotIn),
    (" EQUAL", FilterOperator::Equal),
    (" LIKE", FilterOperator::Like),
    (" IN", FilterOperator::In),
    (" @>", FilterOperator::Contains),
];

/// Split a condition key into attribute and operator.
pub fn parse_key(key: &str) -> (&str, FilterOperator) {
    SUFFIXES
        .iter()
        .find_map(|(suffix, op)| key.strip_suffix(suffix).map(|attr| (attr.trim(), *op)))
        .unwrap_or((key.trim(), FilterOperator::Equal))
}

/// Order-irrelevant mapping from condition key to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionSpec(Map<String, JsonValue>);

impl ConditionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a JSON object; anything else is a compiler fault.
    pub fn from_json(json: JsonValue) -> RepositoryResult<Self> {
        match json {
            JsonValue::Object(map) => Ok(Self(map)),
            JsonValue::Null => Ok(Self::default()),
            other => Err(RepositoryError::compiler_fault(format!(
                "condition must be an object, got {}",
                other
            ))),
        }
    }

    /// Insert a key, replacing any previous value
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compile into a predicate tree.
    ///
    /// Empty attribute names are dropped. A value whose shape does not fit its
    /// operator, or an `OR` value that is not a sequence of objects, fails
    /// with `CompilerFault`.
    pub fn compile(&self) -> RepositoryResult<Filter> {
        compile_map(&self.0)
    }
}

impl From<Map<String, JsonValue>> for ConditionSpec {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl TryFrom<ConditionSpec> for Filter {
    type Error = RepositoryError;

    fn try_from(spec: ConditionSpec) -> RepositoryResult<Self> {
        spec.compile()
    }
}

impl TryFrom<&ConditionSpec> for Filter {
    type Error = RepositoryError;

    fn try_from(spec: &ConditionSpec) -> RepositoryResult<Self> {
        spec.compile()
    }
}

fn compile_map(map: &Map<String, JsonValue>) -> RepositoryResult<Filter> {
    let mut filter = Filter::new();

    for (key, raw) in map {
        if key == OR_KEY {
            filter = filter.or(compile_or(raw)?);
            continue;
        }

        let (attribute, operator) = parse_key(key);
        if attribute.is_empty() {
            continue;
        }

        let value = match operator {
            FilterOperator::IsNotNull | FilterOperator::IsNull => Value::Null,
            _ => Value::from_json(raw),
        };
        filter = filter.and(FilterCondition::new(attribute, operator, value)?);
    }

    Ok(filter)
}

fn compile_or(raw: &JsonValue) -> RepositoryResult<Vec<Filter>> {
    match raw {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::Array(members) => members
            .iter()
            .map(|member| match member {
                JsonValue::Object(map) => compile_map(map),
                other => Err(RepositoryError::compiler_fault(format!(
                    "OR members must be objects, got {}",
                    other
                ))),
            })
            .collect(),
        other => Err(RepositoryError::compiler_fault(format!(
            "OR expects a sequence of condition objects, got {}",
            other
        ))),
    }
}
