//! # wao-store
//!
//! Entity-generic data access over PostgreSQL.
//!
//! ## Features
//!
//! - **Declarative conditions**: `"attr <op>"` keys and `OR` groups compiled
//!   into parameterised SQL, or the equivalent typed [`Filter`](repository::Filter) builder
//! - **Soft delete**: rows with `deleted_at` set are hidden unless asked for
//! - **Sorting and pagination**: unknown sort keys are dropped, pages carry totals
//! - **Eager loading**: child collections loaded in one query per relation
//! - **Transactions**: multi-entity units of work with commit, rollback and
//!   row-locked batch updates
//! - **Deadlines and cancellation** on every operation
//! - **Purchase orders** (feature `orders`): catalogue and order entities
//!   with a stock-reserving order workflow
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wao_store::prelude::*;
//! use wao_store::orders::{OrderService, Requester};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Initialize tracing
//!     init_tracing(&config)?;
//!
//!     // Connect the pool
//!     let store = Store::connect(&config.database).await?;
//!
//!     let notifier = Arc::new(BroadcastNotifier::new(&config.notifications));
//!     let orders = OrderService::new(store, notifier);
//!
//!     let me = Requester::new(uuid::Uuid::new_v4(), "buyer");
//!     let page = orders
//!         .list_orders(&me, &FindOptions::new().sort("-order_date").paginate(Pagination::page(1, 20)))
//!         .await?;
//!     println!("{} orders", page.total);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod notify;
pub mod observability;
pub mod repository;

#[cfg(feature = "orders")]
pub mod orders;

// Re-exports for convenience
pub use error::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig, NotificationConfig, ServiceConfig};
    pub use crate::database::create_pool;
    pub use crate::error::{Error, Result};
    pub use crate::notify::{BroadcastNotifier, NoopNotifier, Notification, Notifier};
    pub use crate::observability::init_tracing;
    pub use crate::repository::{
        BatchUpdateItem, Changes, ConditionSpec, Entity, Filter, FindOptions, MetadataCache, Page,
        Pagination, Preload, Repository, RepositoryError, RepositoryErrorKind, RepositoryResult,
        Store, TxHandle, Value,
    };

    pub use tokio_util::sync::CancellationToken;
}
