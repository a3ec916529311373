//! Query assembler
//!
//! Turns a [`Filter`] plus projection, joins, sort and window into a
//! parameterised PostgreSQL statement for one entity kind. Every attribute is
//! checked against the [`MetadataCache`] and emitted quoted; every value is a
//! bind parameter except `NULL`.
//!
//! Rules applied to every statement built here:
//!
//! - unqualified attributes must exist on the entity, otherwise the leaf (or
//!   sort key) is dropped with a warning
//! - `table.column` attributes are accepted when both parts are plain
//!   identifiers; when `table` is the entity's own table the column must exist
//! - an OR group with a member that resolves to nothing matches everything
//!   and is dropped
//! - kinds with `deleted_at` get `"table"."deleted_at" IS NULL` unless the
//!   filter names `deleted_at` itself
//! - updates and deletes refuse to run without a predicate

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::changes::{Assignment, Changes};
use super::entity::Entity;
use super::error::{RepositoryError, RepositoryResult};
use super::filter::{Filter, FilterCondition, FilterOperator};
use super::metadata::{is_identifier, MetadataCache};
use super::pagination::{parse_sort, OrderDirection};
use super::value::Value;

/// PostgreSQL accepts at most this many bind parameters per statement
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Attributes used for implicit ordering, in priority order
pub const DEFAULT_ORDER_ATTRIBUTES: &[&str] = &["created_at", "created_date"];

const SOFT_DELETE_ATTRIBUTE: &str = "deleted_at";
const TOUCH_ATTRIBUTE: &str = "updated_at";
const CREATED_ATTRIBUTE: &str = "created_at";

/// Statement under construction
pub type Statement = QueryBuilder<'static, Postgres>;

/// Description of a SELECT
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectSpec<'a> {
    pub filter: Option<&'a Filter>,
    /// Empty selects every attribute
    pub fields: &'a [String],
    /// Raw `JOIN ...` fragments
    pub joins: &'a [String],
    pub sort: Option<&'a str>,
    /// Fall back to `created_at DESC` / `created_date DESC` when no sort key survives
    pub default_order: bool,
    /// Zero means no limit
    pub limit: u64,
    pub offset: u64,
    /// Append `FOR UPDATE`
    pub lock: bool,
}

/// Resolved predicate, ready to render
#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Leaf {
        column: String,
        operator: FilterOperator,
        value: Value,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Raw(String),
}

/// `"name"`
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

/// Builds statements for entity kind `E`
pub struct QueryAssembler<'m, E> {
    metadata: &'m MetadataCache,
    _entity: PhantomData<fn() -> E>,
}

impl<'m, E: Entity> QueryAssembler<'m, E> {
    pub fn new(metadata: &'m MetadataCache) -> Self {
        Self {
            metadata,
            _entity: PhantomData,
        }
    }

    fn table(&self) -> String {
        quote(E::TABLE)
    }

    /// `"table"."column"` for an attribute the entity has
    fn own_column(&self, attribute: &str) -> Option<String> {
        self.metadata
            .has_attribute::<E>(attribute)
            .then(|| format!("{}.{}", self.table(), quote(attribute)))
    }

    /// Resolve a possibly qualified attribute to a quoted column reference
    pub fn column(&self, field: &str) -> Option<String> {
        match field.split_once('.') {
            None => self.own_column(field),
            Some((table, column)) if table == E::TABLE => self.own_column(column),
            Some((table, column)) if is_identifier(table) && is_identifier(column) => {
                Some(format!("{}.{}", quote(table), quote(column)))
            }
            Some(_) => None,
        }
    }

    /// Attribute name when `field` refers to the entity's own table
    fn own_attribute<'f>(&self, field: &'f str) -> Option<&'f str> {
        match field.split_once('.') {
            None => Some(field),
            Some((table, column)) if table == E::TABLE => Some(column),
            Some(_) => None,
        }
    }

    /// Parse text bound for a `uuid` or `timestamptz` attribute
    fn typed_value(&self, attribute: &str, value: &Value) -> RepositoryResult<Value> {
        let kind = if E::UUID_COLUMNS.contains(&attribute) {
            ColumnKind::Uuid
        } else if E::TIMESTAMP_COLUMNS.contains(&attribute) {
            ColumnKind::Timestamp
        } else {
            return Ok(value.clone());
        };
        coerce(kind, attribute, value)
    }

    fn resolve_leaf(&self, condition: &FilterCondition) -> RepositoryResult<Option<Predicate>> {
        condition.check_shape()?;
        match self.column(&condition.field) {
            Some(column) => {
                let attribute = self.own_attribute(&condition.field);
                let value = match attribute {
                    Some(attribute) if condition.operator.compares() => {
                        self.typed_value(attribute, &condition.value)?
                    }
                    _ => condition.value.clone(),
                };
                Ok(Some(Predicate::Leaf {
                    column,
                    operator: condition.operator,
                    value,
                }))
            }
            None => {
                tracing::warn!(
                    entity = E::NAME,
                    attribute = %condition.field,
                    "dropping condition on unknown attribute"
                );
                Ok(None)
            }
        }
    }

    fn resolve(&self, filter: &Filter) -> RepositoryResult<Vec<Predicate>> {
        let mut conjuncts = Vec::new();
        for condition in &filter.conditions {
            if let Some(leaf) = self.resolve_leaf(condition)? {
                conjuncts.push(leaf);
            }
        }

        'groups: for group in &filter.or_groups {
            let mut members = Vec::with_capacity(group.len());
            for member in group {
                let resolved = self.resolve(member)?;
                if resolved.is_empty() {
                    // An unconstrained member makes the whole group true.
                    continue 'groups;
                }
                members.push(Predicate::And(resolved));
            }
            if !members.is_empty() {
                conjuncts.push(Predicate::Or(members));
            }
        }

        Ok(conjuncts)
    }

    fn mentions_soft_delete(&self, filter: &Filter) -> bool {
        let qualified = format!("{}.{}", E::TABLE, SOFT_DELETE_ATTRIBUTE);
        filter
            .fields()
            .into_iter()
            .any(|field| field == SOFT_DELETE_ATTRIBUTE || field == qualified)
    }

    /// Caller predicate plus soft-delete scoping
    fn predicates(&self, filter: Option<&Filter>) -> RepositoryResult<(Vec<Predicate>, bool)> {
        let mut conjuncts = match filter {
            Some(filter) => self.resolve(filter)?,
            None => Vec::new(),
        };
        let caller_constrained = !conjuncts.is_empty();

        let scoped = filter.is_some_and(|f| self.mentions_soft_delete(f));
        if self.metadata.is_soft_delete::<E>() && !scoped {
            conjuncts.push(Predicate::Raw(format!(
                "{}.{} IS NULL",
                self.table(),
                quote(SOFT_DELETE_ATTRIBUTE)
            )));
        }
        Ok((conjuncts, caller_constrained))
    }

    fn push_where(&self, qb: &mut Statement, conjuncts: &[Predicate]) -> RepositoryResult<()> {
        if conjuncts.is_empty() {
            return Ok(());
        }
        qb.push(" WHERE ");
        push_conjunction(qb, conjuncts)
    }

    fn push_from(&self, qb: &mut Statement, joins: &[String]) {
        qb.push(" FROM ");
        qb.push(self.table());
        for join in joins {
            qb.push(" ");
            qb.push(join.trim());
        }
    }

    fn push_projection(&self, qb: &mut Statement, fields: &[String]) {
        let mut columns: Vec<String> = Vec::new();
        for field in fields {
            match self.own_column(field) {
                Some(column) if !columns.contains(&column) => columns.push(column),
                Some(_) => {}
                None => tracing::warn!(
                    entity = E::NAME,
                    attribute = %field,
                    "dropping unknown attribute from projection"
                ),
            }
        }

        if columns.is_empty() {
            qb.push(format!("{}.*", self.table()));
            return;
        }

        // Preloading and id lookups need the key even when not asked for.
        if let Some(id) = self.own_column("id") {
            if !columns.contains(&id) {
                columns.insert(0, id);
            }
        }
        qb.push(columns.join(", "));
    }

    fn push_order(&self, qb: &mut Statement, sort: Option<&str>, default_order: bool) {
        let mut terms: Vec<String> = Vec::new();
        for key in sort.map(parse_sort).unwrap_or_default() {
            match self.own_column(&key.attribute) {
                Some(column) => terms.push(format!("{} {}", column, key.direction.as_sql())),
                None => tracing::warn!(
                    entity = E::NAME,
                    attribute = %key.attribute,
                    "dropping sort on unknown attribute"
                ),
            }
        }

        if terms.is_empty() && default_order {
            if let Some(column) = DEFAULT_ORDER_ATTRIBUTES
                .iter()
                .find_map(|attr| self.own_column(attr))
            {
                terms.push(format!("{} {}", column, OrderDirection::Descending.as_sql()));
            }
        }

        if terms.is_empty() {
            return;
        }

        // Tie-break on the key so consecutive pages never overlap.
        if let Some(id) = self.own_column("id") {
            if !terms.iter().any(|t| t.starts_with(&id)) {
                terms.push(format!("{} {}", id, OrderDirection::Ascending.as_sql()));
            }
        }

        qb.push(" ORDER BY ");
        qb.push(terms.join(", "));
    }

    /// `SELECT ... FROM ... WHERE ... ORDER BY ... LIMIT ... OFFSET ... [FOR UPDATE]`
    pub fn select(&self, spec: &SelectSpec<'_>) -> RepositoryResult<Statement> {
        let (conjuncts, _) = self.predicates(spec.filter)?;

        let mut qb = Statement::new("SELECT ");
        self.push_projection(&mut qb, spec.fields);
        self.push_from(&mut qb, spec.joins);
        self.push_where(&mut qb, &conjuncts)?;
        self.push_order(&mut qb, spec.sort, spec.default_order);

        if spec.limit > 0 {
            qb.push(" LIMIT ");
            qb.push_bind(to_i64(spec.limit));
        }
        if spec.offset > 0 {
            qb.push(" OFFSET ");
            qb.push_bind(to_i64(spec.offset));
        }
        if spec.lock {
            qb.push(" FOR UPDATE");
            if !spec.joins.is_empty() {
                qb.push(" OF ");
                qb.push(self.table());
            }
        }
        Ok(qb)
    }

    /// `SELECT COUNT(*)` with the same filter shape as [`select`](Self::select)
    pub fn count(&self, filter: Option<&Filter>, joins: &[String]) -> RepositoryResult<Statement> {
        let (conjuncts, _) = self.predicates(filter)?;
        let mut qb = Statement::new("SELECT COUNT(*)");
        self.push_from(&mut qb, joins);
        self.push_where(&mut qb, &conjuncts)?;
        Ok(qb)
    }

    /// Lock every matching row, in key order, returning the ids
    pub fn lock_ids(&self, filter: &Filter) -> RepositoryResult<Statement> {
        let (conjuncts, constrained) = self.predicates(Some(filter))?;
        if !constrained {
            return Err(refuse("lock"));
        }
        let id = self
            .own_column("id")
            .ok_or_else(|| RepositoryError::compiler_fault(format!("{} has no id", E::NAME)))?;

        let mut qb = Statement::new("SELECT ");
        qb.push(&id);
        self.push_from(&mut qb, &[]);
        self.push_where(&mut qb, &conjuncts)?;
        qb.push(" ORDER BY ");
        qb.push(&id);
        qb.push(" FOR UPDATE");
        Ok(qb)
    }

    /// `UPDATE ... SET ... WHERE ...`; touches `updated_at` unless assigned
    pub fn update(&self, filter: &Filter, changes: &Changes) -> RepositoryResult<Statement> {
        let (conjuncts, constrained) = self.predicates(Some(filter))?;
        if !constrained {
            return Err(refuse("update"));
        }
        if changes.is_empty() {
            return Err(RepositoryError::compiler_fault("update set is empty"));
        }

        let mut qb = Statement::new("UPDATE ");
        qb.push(self.table());
        qb.push(" SET ");

        let mut first = true;
        for (attribute, assignment) in changes.iter() {
            if attribute == "id" || !self.metadata.has_attribute::<E>(attribute) {
                return Err(RepositoryError::compiler_fault(format!(
                    "cannot assign `{}` on {}",
                    attribute,
                    E::NAME
                )));
            }
            if !first {
                qb.push(", ");
            }
            first = false;

            let target = quote(attribute);
            qb.push(&target);
            qb.push(" = ");
            match assignment {
                Assignment::Set(value) => {
                    push_value(&mut qb, &self.typed_value(attribute, value)?)?
                }
                Assignment::Increment(delta) => {
                    qb.push(&target);
                    qb.push(" + ");
                    push_value(&mut qb, delta)?;
                }
                Assignment::Now => {
                    qb.push("NOW()");
                }
            }
        }

        if self.metadata.has_attribute::<E>(TOUCH_ATTRIBUTE) && !changes.contains(TOUCH_ATTRIBUTE) {
            qb.push(", ");
            qb.push(quote(TOUCH_ATTRIBUTE));
            qb.push(" = NOW()");
        }

        self.push_where(&mut qb, &conjuncts)?;
        Ok(qb)
    }

    /// Soft delete (`SET deleted_at = NOW()`) when the kind supports it,
    /// otherwise `DELETE FROM`
    pub fn delete(&self, filter: &Filter) -> RepositoryResult<Statement> {
        let (conjuncts, constrained) = self.predicates(Some(filter))?;
        if !constrained {
            return Err(refuse("delete"));
        }

        let mut qb = if self.metadata.is_soft_delete::<E>() {
            let mut qb = Statement::new("UPDATE ");
            qb.push(self.table());
            qb.push(" SET ");
            qb.push(quote(SOFT_DELETE_ATTRIBUTE));
            qb.push(" = NOW()");
            qb
        } else {
            let mut qb = Statement::new("DELETE FROM ");
            qb.push(self.table());
            qb
        };
        self.push_where(&mut qb, &conjuncts)?;
        Ok(qb)
    }

    /// Multi-row `INSERT ... RETURNING *`, split so no statement exceeds
    /// the bind parameter limit
    pub fn insert(&self, entities: &[E]) -> RepositoryResult<Vec<Statement>> {
        self.insert_chunks(entities, usize::MAX, false)
    }

    /// As [`insert`](Self::insert) with at most `batch_size` rows per statement
    pub fn insert_batched(&self, entities: &[E], batch_size: usize) -> RepositoryResult<Vec<Statement>> {
        self.insert_chunks(entities, batch_size, false)
    }

    /// `INSERT ... ON CONFLICT ("id") DO UPDATE SET` every other column
    /// except `created_at`
    pub fn upsert(&self, entities: &[E]) -> RepositoryResult<Vec<Statement>> {
        self.insert_chunks(entities, usize::MAX, true)
    }

    fn insert_chunks(
        &self,
        entities: &[E],
        batch_size: usize,
        upsert: bool,
    ) -> RepositoryResult<Vec<Statement>> {
        let width = E::COLUMNS.len().max(1);
        let rows_per_statement = (MAX_BIND_PARAMS / width).min(batch_size).max(1);

        entities
            .chunks(rows_per_statement)
            .map(|chunk| self.insert_statement(chunk, upsert))
            .collect()
    }

    fn insert_statement(&self, rows: &[E], upsert: bool) -> RepositoryResult<Statement> {
        let columns: Vec<String> = E::COLUMNS.iter().map(|c| quote(c)).collect();

        let mut qb = Statement::new("INSERT INTO ");
        qb.push(self.table());
        qb.push(" (");
        qb.push(columns.join(", "));
        qb.push(") VALUES ");

        for (i, row) in rows.iter().enumerate() {
            let values = row.values();
            if values.len() != E::COLUMNS.len() {
                return Err(RepositoryError::compiler_fault(format!(
                    "{} produced {} values for {} columns",
                    E::NAME,
                    values.len(),
                    E::COLUMNS.len()
                )));
            }
            if i > 0 {
                qb.push(", ");
            }
            qb.push("(");
            for (j, value) in values.iter().enumerate() {
                if j > 0 {
                    qb.push(", ");
                }
                push_value(&mut qb, value)?;
            }
            qb.push(")");
        }

        if upsert {
            let updates: Vec<String> = E::COLUMNS
                .iter()
                .filter(|c| **c != "id" && **c != CREATED_ATTRIBUTE)
                .map(|c| format!("{} = EXCLUDED.{}", quote(c), quote(c)))
                .collect();
            qb.push(" ON CONFLICT (\"id\") ");
            if updates.is_empty() {
                qb.push("DO NOTHING");
            } else {
                qb.push("DO UPDATE SET ");
                qb.push(updates.join(", "));
            }
        }

        qb.push(" RETURNING *");
        Ok(qb)
    }
}

#[derive(Debug, Clone, Copy)]
enum ColumnKind {
    Uuid,
    Timestamp,
}

fn coerce(kind: ColumnKind, attribute: &str, value: &Value) -> RepositoryResult<Value> {
    match value {
        Value::Text(text) => {
            let parsed = match kind {
                ColumnKind::Uuid => Uuid::parse_str(text).ok().map(Value::Uuid),
                ColumnKind::Timestamp => DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|ts| Value::Timestamp(ts.with_timezone(&Utc))),
            };
            parsed.ok_or_else(|| {
                RepositoryError::compiler_fault(format!(
                    "`{}` expects a {}, got {:?}",
                    attribute,
                    match kind {
                        ColumnKind::Uuid => "uuid",
                        ColumnKind::Timestamp => "RFC 3339 timestamp",
                    },
                    text
                ))
            })
        }
        Value::List(items) => items
            .iter()
            .map(|item| coerce(kind, attribute, item))
            .collect::<RepositoryResult<Vec<_>>>()
            .map(Value::List),
        other => Ok(other.clone()),
    }
}

fn refuse(what: &str) -> RepositoryError {
    RepositoryError::compiler_fault(format!("refusing to {} without a condition", what))
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn push_conjunction(qb: &mut Statement, conjuncts: &[Predicate]) -> RepositoryResult<()> {
    for (i, predicate) in conjuncts.iter().enumerate() {
        if i > 0 {
            qb.push(" AND ");
        }
        push_predicate(qb, predicate)?;
    }
    Ok(())
}

fn push_predicate(qb: &mut Statement, predicate: &Predicate) -> RepositoryResult<()> {
    match predicate {
        Predicate::Raw(sql) => {
            qb.push(sql);
        }
        Predicate::And(conjuncts) if conjuncts.len() == 1 => push_predicate(qb, &conjuncts[0])?,
        Predicate::And(conjuncts) => {
            qb.push("(");
            push_conjunction(qb, conjuncts)?;
            qb.push(")");
        }
        Predicate::Or(members) => {
            qb.push("(");
            for (i, member) in members.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_predicate(qb, member)?;
            }
            qb.push(")");
        }
        Predicate::Leaf {
            column,
            operator,
            value,
        } => push_leaf(qb, column, *operator, value)?,
    }
    Ok(())
}

fn push_leaf(
    qb: &mut Statement,
    column: &str,
    operator: FilterOperator,
    value: &Value,
) -> RepositoryResult<()> {
    match operator {
        FilterOperator::Equal | FilterOperator::NotEqual if value.is_null() => {
            qb.push(column);
            qb.push(if operator == FilterOperator::Equal {
                " IS NULL"
            } else {
                " IS NOT NULL"
            });
        }
        FilterOperator::Equal
        | FilterOperator::NotEqual
        | FilterOperator::GreaterThan
        | FilterOperator::GreaterThanOrEqual
        | FilterOperator::LessThan
        | FilterOperator::LessThanOrEqual => {
            qb.push(format!("{} {} ", column, operator));
            push_value(qb, value)?;
        }
        FilterOperator::In | FilterOperator::NotIn => {
            let items = value.as_list().unwrap_or_default();
            if items.is_empty() {
                qb.push(if operator == FilterOperator::In {
                    "FALSE"
                } else {
                    "TRUE"
                });
                return Ok(());
            }
            qb.push(format!("{} {} (", column, operator));
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, item)?;
            }
            qb.push(")");
        }
        FilterOperator::Contains => {
            qb.push(format!("{} @> ", column));
            match value {
                Value::Json(json) => {
                    qb.push_bind(json.clone());
                }
                Value::List(items) => push_array(qb, items)?,
                scalar => push_array(qb, std::slice::from_ref(scalar))?,
            }
        }
        FilterOperator::Between => match value.as_list() {
            Some([low, high]) => {
                qb.push(format!("{} BETWEEN ", column));
                push_value(qb, low)?;
                qb.push(" AND ");
                push_value(qb, high)?;
            }
            _ => {
                return Err(RepositoryError::compiler_fault(
                    "BETWEEN expects a two-element sequence",
                ))
            }
        },
        FilterOperator::Like | FilterOperator::NotLike => {
            let needle = value.as_text().unwrap_or_default();
            qb.push(format!("LOWER({}) ", column));
            qb.push(if operator == FilterOperator::Like {
                "LIKE "
            } else {
                "NOT LIKE "
            });
            qb.push_bind(format!("%{}%", needle.to_lowercase()));
        }
        FilterOperator::IsNull => {
            qb.push(format!("{} IS NULL", column));
        }
        FilterOperator::IsNotNull => {
            qb.push(format!("{} IS NOT NULL", column));
        }
    }
    Ok(())
}

/// Bind a scalar; `NULL` is emitted literally and lists bind as arrays
fn push_value(qb: &mut Statement, value: &Value) -> RepositoryResult<()> {
    match value {
        Value::Null => {
            qb.push("NULL");
        }
        Value::Bool(b) => {
            qb.push_bind(*b);
        }
        Value::Integer(i) => {
            qb.push_bind(*i);
        }
        Value::Float(f) => {
            qb.push_bind(*f);
        }
        Value::Text(s) => {
            qb.push_bind(s.clone());
        }
        Value::Uuid(id) => {
            qb.push_bind(*id);
        }
        Value::Timestamp(ts) => {
            qb.push_bind(*ts);
        }
        Value::Json(json) => {
            qb.push_bind(json.clone());
        }
        Value::List(items) => push_array(qb, items)?,
    }
    Ok(())
}

/// Bind a homogeneous list as a PostgreSQL array (or a JSON array when the
/// elements are objects)
fn push_array(qb: &mut Statement, items: &[Value]) -> RepositoryResult<()> {
    fn collect<T>(items: &[Value], pick: impl Fn(&Value) -> Option<T>) -> RepositoryResult<Vec<T>> {
        items
            .iter()
            .map(|v| {
                pick(v).ok_or_else(|| {
                    RepositoryError::compiler_fault(format!(
                        "array elements must share one type, found {}",
                        v.type_name()
                    ))
                })
            })
            .collect()
    }

    match items.first() {
        None => {
            qb.push("'{}'");
        }
        Some(Value::Text(_)) => {
            let array: Vec<String> = collect(items, |v| v.as_text().map(str::to_string))?;
            qb.push_bind(array);
        }
        Some(Value::Integer(_)) => {
            let array: Vec<i64> = collect(items, |v| match v {
                Value::Integer(i) => Some(*i),
                _ => None,
            })?;
            qb.push_bind(array);
        }
        Some(Value::Float(_)) => {
            let array: Vec<f64> = collect(items, |v| match v {
                Value::Float(f) => Some(*f),
                Value::Integer(i) => Some(*i as f64),
                _ => None,
            })?;
            qb.push_bind(array);
        }
        Some(Value::Bool(_)) => {
            let array: Vec<bool> = collect(items, |v| match v {
                Value::Bool(b) => Some(*b),
                _ => None,
            })?;
            qb.push_bind(array);
        }
        Some(Value::Uuid(_)) => {
            let array: Vec<Uuid> = collect(items, |v| match v {
                Value::Uuid(id) => Some(*id),
                _ => None,
            })?;
            qb.push_bind(array);
        }
        Some(Value::Timestamp(_)) => {
            let array: Vec<DateTime<Utc>> = collect(items, |v| match v {
                Value::Timestamp(ts) => Some(*ts),
                _ => None,
            })?;
            qb.push_bind(array);
        }
        Some(Value::Json(_)) => {
            let array: Vec<JsonValue> = collect(items, |v| match v {
                Value::Json(json) => Some(json.clone()),
                _ => None,
            })?;
            qb.push_bind(JsonValue::Array(array));
        }
        Some(other) => {
            return Err(RepositoryError::compiler_fault(format!(
                "cannot bind an array of {}",
                other.type_name()
            )));
        }
    }
    Ok(())
}
