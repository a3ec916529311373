//! Entry point tying the pool, metadata cache and default deadline together

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use super::entity::Entity;
use super::error::{RepositoryError, RepositoryResult};
use super::metadata::MetadataCache;
use super::repo::Repository;
use super::transaction::TxHandle;
use crate::config::DatabaseConfig;
use crate::database::create_pool;
use crate::error::Result;

/// Shared data-access state; cheap to clone
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
    metadata: Arc<MetadataCache>,
    timeout: Option<Duration>,
}

impl Store {
    /// Wrap an existing pool, using the global metadata cache
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            metadata: MetadataCache::global(),
            timeout: None,
        }
    }

    /// Create the pool from configuration, retrying per its settings
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        let mut store = Self::new(pool);
        store.timeout = config.query_timeout();
        Ok(store)
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Arc<MetadataCache>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Default deadline for every repository created from this store
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn metadata(&self) -> &Arc<MetadataCache> {
        &self.metadata
    }

    /// Pool-backed repository for `E`
    pub fn repository<E: Entity>(&self) -> Repository<E> {
        Repository::from_pool(self.pool.clone(), Arc::clone(&self.metadata), self.timeout)
    }

    /// Begin a transaction the caller commits or rolls back
    pub async fn begin(&self) -> RepositoryResult<TxHandle> {
        TxHandle::begin(&self.pool, Arc::clone(&self.metadata), self.timeout).await
    }

    /// Run `work` in a fresh transaction spanning any number of entity kinds.
    ///
    /// Commits on `Ok`, rolls back on `Err` or panic.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use wao_store::prelude::*;
    /// use wao_store::orders::{PurchaseOrder, PurchaseOrderItem};
    ///
    /// # async fn demo(store: Store, order: PurchaseOrder, items: Vec<PurchaseOrderItem>) -> wao_store::Result<()> {
    /// store
    ///     .transaction(|tx| async move {
    ///         tx.repository::<PurchaseOrder>().create(&order).await?;
    ///         tx.repository::<PurchaseOrderItem>().create_many(&items).await?;
    ///         Ok::<_, wao_store::Error>(())
    ///     })
    ///     .await
    /// # }
    /// ```
    pub async fn transaction<F, Fut, R, Err>(&self, work: F) -> std::result::Result<R, Err>
    where
        F: FnOnce(TxHandle) -> Fut,
        Fut: Future<Output = std::result::Result<R, Err>>,
        Err: From<RepositoryError>,
    {
        let tx = self.begin().await?;
        tx.run(work(tx.clone())).await
    }
}
