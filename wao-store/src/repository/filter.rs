//! Predicate tree for repository queries
//!
//! A [`Filter`] is a conjunction of [`FilterCondition`] leaves plus any number
//! of OR groups. Each OR group is a list of nested filters joined with `OR`,
//! and the group as a whole is AND-ed with everything else.
//!
//! # Example
//!
//! ```rust
//! use wao_store::repository::Filter;
//!
//! // status = 'DRAFT' AND (currency = 'USD' OR total_amount >= 100)
//! let filter = Filter::new()
//!     .eq("status", "DRAFT")
//!     .or([
//!         Filter::new().eq("currency", "USD"),
//!         Filter::new().gte("total_amount", 100.0),
//!     ]);
//! assert!(filter.references("currency"));
//! ```

use std::fmt;

use uuid::Uuid;

use super::error::{RepositoryError, RepositoryResult};
use super::value::Value;

/// Comparison operators for filter conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    /// Set membership
    In,
    /// Set exclusion
    NotIn,
    /// Array or JSON containment (`@>`)
    Contains,
    /// Inclusive range
    Between,
    /// Case-insensitive substring match
    Like,
    /// Case-insensitive substring exclusion
    NotLike,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    /// Operators whose value is compared against the column's own type.
    /// `LIKE` always matches text and `@>` takes the column's element type as given.
    pub fn compares(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::GreaterThan
                | Self::GreaterThanOrEqual
                | Self::LessThan
                | Self::LessThanOrEqual
                | Self::In
                | Self::NotIn
                | Self::Between
        )
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Contains => "@>",
            Self::Between => "BETWEEN",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        };
        f.write_str(op)
    }
}

/// A single `attribute <operator> value` leaf
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    /// Attribute name, optionally qualified as `table.column`
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl FilterCondition {
    /// Build a leaf, rejecting values whose shape does not fit the operator.
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<Value>,
    ) -> RepositoryResult<Self> {
        let condition = Self::unchecked(field, operator, value.into());
        condition.check_shape()?;
        Ok(condition)
    }

    fn unchecked(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Verify the value shape against the operator.
    ///
    /// The query assembler calls this again before rendering, so leaves built
    /// by hand through the public fields cannot bypass it.
    pub fn check_shape(&self) -> RepositoryResult<()> {
        let fault = |expected: &str| {
            Err(RepositoryError::compiler_fault(format!(
                "`{} {}` expects {}, got {}",
                self.field,
                self.operator,
                expected,
                self.value.type_name()
            )))
        };

        match self.operator {
            FilterOperator::Equal | FilterOperator::NotEqual => match self.value {
                Value::List(_) => fault("a scalar"),
                _ => Ok(()),
            },
            FilterOperator::GreaterThan
            | FilterOperator::GreaterThanOrEqual
            | FilterOperator::LessThan
            | FilterOperator::LessThanOrEqual => match self.value {
                Value::List(_) | Value::Null | Value::Json(_) => fault("a scalar"),
                _ => Ok(()),
            },
            FilterOperator::In | FilterOperator::NotIn => match &self.value {
                Value::List(items) if items.iter().all(|v| !matches!(v, Value::List(_))) => Ok(()),
                _ => fault("a sequence of scalars"),
            },
            FilterOperator::Contains => match self.value {
                Value::Null => fault("a scalar or sequence"),
                _ => Ok(()),
            },
            FilterOperator::Between => match &self.value {
                Value::List(items)
                    if items.len() == 2 && items.iter().all(|v| !matches!(v, Value::List(_))) =>
                {
                    Ok(())
                }
                _ => fault("a two-element sequence"),
            },
            FilterOperator::Like | FilterOperator::NotLike => match self.value {
                Value::Text(_) => Ok(()),
                _ => fault("a string"),
            },
            FilterOperator::IsNull | FilterOperator::IsNotNull => Ok(()),
        }
    }
}

/// Conjunction of leaves and OR groups
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<FilterCondition>,
    /// Each inner list is OR-ed; the groups are AND-ed with `conditions`
    pub or_groups: Vec<Vec<Filter>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `id = $1`
    pub fn by_id(id: Uuid) -> Self {
        Self::new().eq("id", id)
    }

    /// `id IN (...)`
    pub fn by_ids(ids: &[Uuid]) -> Self {
        Self::new().is_in("id", ids.iter().copied())
    }

    /// True when there is nothing to compile
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.or_groups.iter().all(|g| g.iter().all(Filter::is_empty))
    }

    /// Add an already-built leaf
    #[must_use]
    pub fn and(mut self, condition: FilterCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Conjoin every leaf and group of another filter
    #[must_use]
    pub fn merge(mut self, other: Filter) -> Self {
        self.conditions.extend(other.conditions);
        self.or_groups.extend(other.or_groups);
        self
    }

    /// AND a disjunction of nested filters. An empty group contributes nothing.
    #[must_use]
    pub fn or(mut self, members: impl IntoIterator<Item = Filter>) -> Self {
        let members: Vec<Filter> = members.into_iter().collect();
        if !members.is_empty() {
            self.or_groups.push(members);
        }
        self
    }

    fn leaf(self, field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        self.and(FilterCondition::unchecked(field, operator, value))
    }

    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.leaf(field, FilterOperator::Equal, value.into())
    }

    #[must_use]
    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.leaf(field, FilterOperator::NotEqual, value.into())
    }

    #[must_use]
    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.leaf(field, FilterOperator::GreaterThan, value.into())
    }

    #[must_use]
    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.leaf(field, FilterOperator::GreaterThanOrEqual, value.into())
    }

    #[must_use]
    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.leaf(field, FilterOperator::LessThan, value.into())
    }

    #[must_use]
    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.leaf(field, FilterOperator::LessThanOrEqual, value.into())
    }

    #[must_use]
    pub fn is_in<V: Into<Value>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = Value::List(values.into_iter().map(Into::into).collect());
        self.leaf(field, FilterOperator::In, values)
    }

    #[must_use]
    pub fn not_in<V: Into<Value>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = Value::List(values.into_iter().map(Into::into).collect());
        self.leaf(field, FilterOperator::NotIn, values)
    }

    /// `field @> value`; a scalar is treated as a one-element array
    #[must_use]
    pub fn contains(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.leaf(field, FilterOperator::Contains, value.into())
    }

    #[must_use]
    pub fn between(
        self,
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        let range = Value::List(vec![low.into(), high.into()]);
        self.leaf(field, FilterOperator::Between, range)
    }

    /// Case-insensitive substring match
    #[must_use]
    pub fn like(self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.leaf(field, FilterOperator::Like, Value::Text(needle.into()))
    }

    #[must_use]
    pub fn not_like(self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.leaf(field, FilterOperator::NotLike, Value::Text(needle.into()))
    }

    #[must_use]
    pub fn is_null(self, field: impl Into<String>) -> Self {
        self.leaf(field, FilterOperator::IsNull, Value::Null)
    }

    #[must_use]
    pub fn is_not_null(self, field: impl Into<String>) -> Self {
        self.leaf(field, FilterOperator::IsNotNull, Value::Null)
    }

    /// Every leaf attribute name, at any depth
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.conditions.iter().map(|c| c.field.as_str()).collect();
        for member in self.or_groups.iter().flatten() {
            fields.extend(member.fields());
        }
        fields
    }

    /// Whether any leaf, at any depth, names `attribute`
    /// (bare or qualified with any table).
    pub fn references(&self, attribute: &str) -> bool {
        self.fields().into_iter().any(|field| {
            field == attribute
                || field
                    .rsplit_once('.')
                    .is_some_and(|(_, column)| column == attribute)
        })
    }
}
