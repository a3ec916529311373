//! Update sets
//!
//! [`Changes`] is an ordered list of column assignments. Besides plain
//! values it can express in-place arithmetic and server timestamps, so that
//! read-modify-write sequences such as stock decrements run as a single
//! statement.
//!
//! ```rust
//! use wao_store::repository::{BatchUpdateItem, Changes, Filter};
//!
//! let item = BatchUpdateItem::new(
//!     Filter::new().eq("code", "TSHIRT-RED-M").gte("quantity", 3),
//!     Changes::new().increment("quantity", -3),
//! );
//! assert_eq!(item.changes.len(), 1);
//! ```

use serde_json::{Map, Value as JsonValue};

use super::condition::ConditionSpec;
use super::error::{RepositoryError, RepositoryResult};
use super::filter::Filter;
use super::value::Value;

/// Right-hand side of one `SET` clause
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `attr = $n`
    Set(Value),
    /// `attr = attr + $n`
    Increment(Value),
    /// `attr = NOW()`
    Now,
}

/// Ordered column assignments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    items: Vec<(String, Assignment)>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, attribute: impl Into<String>, assignment: Assignment) -> Self {
        let attribute = attribute.into();
        self.items.retain(|(existing, _)| *existing != attribute);
        self.items.push((attribute, assignment));
        self
    }

    #[must_use]
    pub fn set(self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(attribute, Assignment::Set(value.into()))
    }

    /// Add `delta` to the current value; negative deltas decrement
    #[must_use]
    pub fn increment(self, attribute: impl Into<String>, delta: impl Into<Value>) -> Self {
        self.push(attribute, Assignment::Increment(delta.into()))
    }

    /// Stamp with the server clock
    #[must_use]
    pub fn touch(self, attribute: impl Into<String>) -> Self {
        self.push(attribute, Assignment::Now)
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.items.iter().any(|(existing, _)| existing == attribute)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Assignment)> {
        self.items.iter().map(|(attr, assignment)| (attr.as_str(), assignment))
    }
}

impl From<Map<String, JsonValue>> for Changes {
    fn from(map: Map<String, JsonValue>) -> Self {
        map.iter()
            .fold(Changes::new(), |changes, (attr, raw)| {
                changes.set(attr.as_str(), Value::from_json(raw))
            })
    }
}

impl TryFrom<JsonValue> for Changes {
    type Error = RepositoryError;

    fn try_from(json: JsonValue) -> RepositoryResult<Self> {
        match json {
            JsonValue::Object(map) => Ok(map.into()),
            other => Err(RepositoryError::compiler_fault(format!(
                "update set must be an object, got {}",
                other
            ))),
        }
    }
}

/// One `(filter, changes)` pair of a batch update
#[derive(Debug, Clone, PartialEq)]
pub struct BatchUpdateItem {
    pub filter: Filter,
    pub changes: Changes,
}

impl BatchUpdateItem {
    pub fn new(filter: Filter, changes: Changes) -> Self {
        Self { filter, changes }
    }

    /// Build from the loosely typed condition and update maps
    pub fn from_spec(condition: &ConditionSpec, updates: Map<String, JsonValue>) -> RepositoryResult<Self> {
        Ok(Self {
            filter: condition.compile()?,
            changes: updates.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_later_assignment_replaces_earlier() {
        let changes = Changes::new().set("status", "DRAFT").set("status", "SUBMITTED");
        assert_eq!(changes.len(), 1);
        let (attr, assignment) = changes.iter().next().unwrap();
        assert_eq!(attr, "status");
        assert_eq!(assignment, &Assignment::Set(Value::Text("SUBMITTED".into())));
    }

    #[test]
    fn test_order_is_preserved() {
        let changes = Changes::new()
            .set("b", 1)
            .increment("a", -2)
            .touch("updated_at");
        let attrs: Vec<&str> = changes.iter().map(|(a, _)| a).collect();
        assert_eq!(attrs, vec!["b", "a", "updated_at"]);
        assert!(changes.contains("updated_at"));
    }

    #[test]
    fn test_from_json_map() {
        let changes = Changes::try_from(json!({"status": "PAID", "notes": null})).unwrap();
        assert_eq!(changes.len(), 2);
        assert!(Changes::try_from(json!([1])).is_err());
    }

    #[test]
    fn test_batch_item_from_spec() {
        let spec = ConditionSpec::new().with("code", "A");
        let updates = json!({"quantity": 4}).as_object().cloned().unwrap();
        let item = BatchUpdateItem::from_spec(&spec, updates).unwrap();
        assert_eq!(item.filter.conditions.len(), 1);
        assert!(item.changes.contains("quantity"));
    }
}
