//! Entity descriptors and relation loading
//!
//! Instead of reflecting over structs at runtime, each entity kind registers
//! a static attribute table ([`Entity::COLUMNS`]) and knows how to turn
//! itself into bind values. Relations are loaded by [`Entity::preload`],
//! usually by delegating to [`load_has_many`].

use std::collections::HashMap;

use futures::future::{self, BoxFuture, FutureExt};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use super::error::{RepositoryError, RepositoryOperation, RepositoryResult};
use super::filter::Filter;
use super::metadata::MetadataCache;
use super::query::{QueryAssembler, SelectSpec};
use super::value::Value;

/// A record kind stored in one table
///
/// # Example
///
/// ```rust
/// use chrono::{DateTime, Utc};
/// use uuid::Uuid;
/// use wao_store::repository::{Entity, Value};
///
/// #[derive(sqlx::FromRow)]
/// struct Supplier {
///     id: Uuid,
///     name: String,
///     created_at: DateTime<Utc>,
///     deleted_at: Option<DateTime<Utc>>,
/// }
///
/// impl Entity for Supplier {
///     const TABLE: &'static str = "suppliers";
///     const NAME: &'static str = "Supplier";
///     const COLUMNS: &'static [&'static str] = &["id", "name", "created_at", "deleted_at"];
///
///     fn id(&self) -> Uuid {
///         self.id
///     }
///
///     fn values(&self) -> Vec<Value> {
///         vec![
///             self.id.into(),
///             self.name.clone().into(),
///             self.created_at.into(),
///             self.deleted_at.into(),
///         ]
///     }
/// }
/// ```
pub trait Entity: for<'r> FromRow<'r, PgRow> + Send + Sync + Unpin + 'static {
    /// Table name, unquoted
    const TABLE: &'static str;
    /// Display name used in errors and logs
    const NAME: &'static str;
    /// Every stored attribute, in the order [`values`](Entity::values) returns them
    const COLUMNS: &'static [&'static str];
    /// Attributes stored as `uuid`. Text condition and update values aimed
    /// at them are parsed before binding.
    const UUID_COLUMNS: &'static [&'static str] = &["id"];
    /// Attributes stored as `timestamptz`, parsed from RFC 3339 text the same way
    const TIMESTAMP_COLUMNS: &'static [&'static str] = &["created_at", "updated_at", "deleted_at"];

    fn id(&self) -> Uuid;

    /// Bind values aligned with [`COLUMNS`](Entity::COLUMNS)
    fn values(&self) -> Vec<Value>;

    /// Load the relation named by `preload` into every parent.
    ///
    /// Kinds without relations keep the default, which rejects any name.
    fn preload<'a>(
        _conn: &'a mut PgConnection,
        _parents: &'a mut [Self],
        preload: &'a Preload,
        _metadata: &'a MetadataCache,
    ) -> BoxFuture<'a, RepositoryResult<()>>
    where
        Self: Sized,
    {
        future::ready(Err(unknown_relation::<Self>(preload))).boxed()
    }
}

/// Fault for a relation name the kind does not define
pub fn unknown_relation<E: Entity>(preload: &Preload) -> RepositoryError {
    RepositoryError::compiler_fault(format!(
        "{} has no relation `{}`",
        E::NAME,
        preload.relation
    ))
    .with_operation(RepositoryOperation::Preload)
    .with_entity_type(E::NAME)
}

/// A related collection to load eagerly, with an optional child filter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preload {
    pub relation: String,
    /// Restricts child rows only; the parent query is unaffected
    pub filter: Filter,
    /// Child ordering, same syntax as list sorts
    pub sort: Option<String>,
}

impl Preload {
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Whether this preload names `relation`, ignoring ASCII case
    pub fn is(&self, relation: &str) -> bool {
        self.relation.eq_ignore_ascii_case(relation)
    }
}

/// Load a one-to-many relation in a single query and distribute the children.
///
/// Children are selected with `foreign_key IN (parent ids)` AND-ed with the
/// preload's own filter and the child kind's soft-delete scope.
pub async fn load_has_many<P, C>(
    conn: &mut PgConnection,
    parents: &mut [P],
    preload: &Preload,
    metadata: &MetadataCache,
    foreign_key: &'static str,
    key_of: fn(&C) -> Uuid,
    attach: fn(&mut P, Vec<C>),
) -> RepositoryResult<()>
where
    P: Entity,
    C: Entity,
{
    if parents.is_empty() {
        return Ok(());
    }
    if !metadata.has_attribute::<C>(foreign_key) {
        return Err(RepositoryError::compiler_fault(format!(
            "{} has no attribute `{}`",
            C::NAME,
            foreign_key
        ))
        .with_operation(RepositoryOperation::Preload));
    }

    let mut ids: Vec<Uuid> = parents.iter().map(Entity::id).collect();
    ids.sort_unstable();
    ids.dedup();

    let filter = preload.filter.clone().is_in(foreign_key, ids);
    let spec = SelectSpec {
        filter: Some(&filter),
        sort: preload.sort.as_deref(),
        ..Default::default()
    };
    let mut qb = QueryAssembler::<C>::new(metadata)
        .select(&spec)
        .map_err(|e| e.with_operation(RepositoryOperation::Preload))?;

    tracing::debug!(
        parent = P::NAME,
        child = C::NAME,
        relation = %preload.relation,
        sql = qb.sql(),
        "preloading relation"
    );

    let children: Vec<C> = qb
        .build_query_as::<C>()
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            RepositoryError::from(e)
                .with_operation(RepositoryOperation::Preload)
                .with_entity_type(C::NAME)
        })?;

    let mut grouped: HashMap<Uuid, Vec<C>> = HashMap::new();
    for child in children {
        grouped.entry(key_of(&child)).or_default().push(child);
    }
    for parent in parents.iter_mut() {
        let mine = grouped.remove(&parent.id()).unwrap_or_default();
        attach(parent, mine);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::Widget;
    use crate::repository::RepositoryErrorKind;

    #[test]
    fn test_preload_builder() {
        let preload = Preload::new("Options")
            .filter(Filter::new().gt("quantity", 0))
            .sort("name");
        assert!(preload.is("options"));
        assert!(!preload.is("items"));
        assert_eq!(preload.filter.conditions.len(), 1);
        assert_eq!(preload.sort.as_deref(), Some("name"));
    }

    #[test]
    fn test_unknown_relation_fault() {
        let err = unknown_relation::<Widget>(&Preload::new("parts"));
        assert_eq!(err.kind, RepositoryErrorKind::CompilerFault);
        assert_eq!(err.operation, RepositoryOperation::Preload);
        assert!(err.message.contains("parts"));
    }

    #[test]
    fn test_values_align_with_columns() {
        let widget = Widget::sample("bolt");
        assert_eq!(widget.values().len(), Widget::COLUMNS.len());
    }
}
