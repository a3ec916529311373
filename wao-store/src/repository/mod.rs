//! Generic data access over PostgreSQL
//!
//! This module turns declarative predicates into parameterised SQL and runs
//! them for any registered entity kind.
//!
//! # Features
//!
//! - **Condition language**: [`ConditionSpec`] maps `"attr <suffix>"` keys and
//!   `OR` groups onto a [`Filter`] tree; the [`Filter`] builder expresses the
//!   same predicates in typed form
//! - **Soft delete**: kinds with a `deleted_at` attribute hide deleted rows
//!   unless a filter names `deleted_at` explicitly
//! - **Sorting and pagination**: [`FindOptions`] and [`Page`], with unknown
//!   sort keys dropped instead of failing
//! - **Relation loading**: [`Preload`] eager-loads child collections in one
//!   query per relation
//! - **Atomic batches**: [`Repository::batch_update_lock`] locks the target
//!   rows before updating them inside a transaction
//! - **Transactions**: [`Store::transaction`] and [`TxHandle`] span several
//!   entity kinds
//!
//! # Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use wao_store::prelude::*;
//! use wao_store::orders::ProductOption;
//!
//! # async fn demo(store: Store) -> wao_store::Result<()> {
//! let spec = ConditionSpec::from_json(json!({
//!     "quantity GREATER_THAN": 0,
//!     "OR": [{"name LIKE": "red"}, {"code IN": ["R-1", "R-2"]}],
//! }))?;
//! let filter = spec.compile()?;
//!
//! let options = store
//!     .repository::<ProductOption>()
//!     .find(&filter, &FindOptions::new().sort("-price,name"))
//!     .await?;
//! # let _ = options;
//! # Ok(())
//! # }
//! ```

mod changes;
mod condition;
mod entity;
mod error;
mod filter;
mod metadata;
mod pagination;
mod query;
mod repo;
mod store;
mod transaction;
mod value;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export all public types
pub use changes::{Assignment, BatchUpdateItem, Changes};
pub use condition::{parse_key, ConditionSpec, OR_KEY};
pub use entity::{load_has_many, unknown_relation, Entity, Preload};
pub use error::{
    classify_sqlstate, RepositoryError, RepositoryErrorKind, RepositoryOperation,
    RepositoryResult,
};
pub use filter::{Filter, FilterCondition, FilterOperator};
pub use metadata::{is_identifier, MetadataCache, MAX_IDENTIFIER_LEN};
pub use pagination::{parse_sort, FindOptions, OrderDirection, Page, Pagination, SortKey};
pub use query::{
    quote, QueryAssembler, SelectSpec, Statement, DEFAULT_ORDER_ATTRIBUTES, MAX_BIND_PARAMS,
};
pub use repo::{Repository, DEFAULT_BATCH_SIZE};
pub use store::Store;
pub use transaction::TxHandle;
pub use value::Value;
