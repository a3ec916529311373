//! Generic repository façade
//!
//! One [`Repository<E>`] per entity kind, bound either to the pool or to an
//! open [`TxHandle`]. Every operation:
//!
//! - compiles its filter through the [`QueryAssembler`], so soft delete,
//!   attribute whitelisting and sort validation apply uniformly
//! - runs under the repository's deadline and cancellation token, if any
//! - reports failures as [`RepositoryError`] tagged with the operation and
//!   entity kind
//!
//! # Example
//!
//! ```rust,no_run
//! use wao_store::prelude::*;
//! use wao_store::orders::Product;
//!
//! # async fn demo(store: Store) -> wao_store::Result<()> {
//! let products = store.repository::<Product>();
//! let page = products
//!     .paginate(
//!         &Filter::new().like("name", "shirt"),
//!         &FindOptions::new().sort("-created_at").paginate(Pagination::page(1, 20)),
//!     )
//!     .await?;
//! println!("{} of {}", page.items.len(), page.total);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::changes::{BatchUpdateItem, Changes};
use super::entity::{Entity, Preload};
use super::error::{RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult};
use super::filter::Filter;
use super::metadata::MetadataCache;
use super::pagination::{FindOptions, Page};
use super::query::{QueryAssembler, SelectSpec, Statement};
use super::transaction::{Connection, TxHandle};

/// Default rows per statement for [`Repository::create_in_batches`]
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Clone)]
enum Executor {
    Pool(PgPool),
    Tx(TxHandle),
}

/// Data access for one entity kind
pub struct Repository<E> {
    executor: Executor,
    metadata: Arc<MetadataCache>,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            metadata: Arc::clone(&self.metadata),
            timeout: self.timeout,
            cancel: self.cancel.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("transactional", &matches!(self.executor, Executor::Tx(_)))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<E: Entity> Repository<E> {
    /// Pool-backed repository using the global metadata cache
    pub fn new(pool: PgPool) -> Self {
        Self::from_pool(pool, MetadataCache::global(), None)
    }

    pub(crate) fn from_pool(pool: PgPool, metadata: Arc<MetadataCache>, timeout: Option<Duration>) -> Self {
        Self {
            executor: Executor::Pool(pool),
            metadata,
            timeout,
            cancel: None,
            _entity: PhantomData,
        }
    }

    pub(crate) fn bound(tx: TxHandle, metadata: Arc<MetadataCache>, timeout: Option<Duration>) -> Self {
        Self {
            executor: Executor::Tx(tx),
            metadata,
            timeout,
            cancel: None,
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Arc<MetadataCache>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Bound every operation; on expiry the query is abandoned, its
    /// connection released and `Timeout` returned
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort operations with `Cancelled` once `token` fires
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The same repository, bound to `tx`
    #[must_use]
    pub fn with_tx(&self, tx: &TxHandle) -> Self {
        Self {
            executor: Executor::Tx(tx.clone()),
            ..self.clone()
        }
    }

    /// Open transaction this repository is bound to
    pub fn tx(&self) -> Option<&TxHandle> {
        match &self.executor {
            Executor::Tx(tx) => Some(tx),
            Executor::Pool(_) => None,
        }
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// Another kind's repository on the same executor
    pub fn sibling<O: Entity>(&self) -> Repository<O> {
        Repository {
            executor: self.executor.clone(),
            metadata: Arc::clone(&self.metadata),
            timeout: self.timeout,
            cancel: self.cancel.clone(),
            _entity: PhantomData,
        }
    }

    fn assembler(&self) -> QueryAssembler<'_, E> {
        QueryAssembler::new(&self.metadata)
    }

    async fn connection(&self) -> RepositoryResult<Connection> {
        match &self.executor {
            Executor::Pool(pool) => pool
                .acquire()
                .await
                .map(Connection::Pooled)
                .map_err(RepositoryError::from),
            Executor::Tx(tx) => tx.acquire().await,
        }
    }

    fn trace(&self, operation: RepositoryOperation, qb: &Statement) {
        tracing::debug!(
            entity = E::NAME,
            operation = %operation,
            transactional = self.tx().is_some(),
            sql = qb.sql(),
            "executing statement"
        );
    }

    /// Apply deadline, cancellation and error context to one operation
    async fn run<T, F>(&self, operation: RepositoryOperation, work: F) -> RepositoryResult<T>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, work).await.unwrap_or_else(|_| {
                    Err(RepositoryError::timeout(
                        operation,
                        format!("deadline of {}ms exceeded", limit.as_millis()),
                    ))
                }),
                None => work.await,
            }
        };

        let result = match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(RepositoryError::cancelled(operation)),
                    result = bounded => result,
                }
            }
            None => bounded.await,
        };

        result.map_err(|err| {
            let err = if err.operation == RepositoryOperation::Preload {
                err
            } else {
                err.with_operation(operation)
            };
            err.with_entity_type(E::NAME)
        })
    }

    async fn fetch_all(&self, operation: RepositoryOperation, mut qb: Statement) -> RepositoryResult<Vec<E>> {
        self.trace(operation, &qb);
        let mut conn = self.connection().await?;
        Ok(qb.build_query_as::<E>().fetch_all(&mut *conn).await?)
    }

    async fn fetch_optional(&self, operation: RepositoryOperation, mut qb: Statement) -> RepositoryResult<Option<E>> {
        self.trace(operation, &qb);
        let mut conn = self.connection().await?;
        Ok(qb.build_query_as::<E>().fetch_optional(&mut *conn).await?)
    }

    async fn execute(&self, operation: RepositoryOperation, mut qb: Statement) -> RepositoryResult<u64> {
        self.trace(operation, &qb);
        let mut conn = self.connection().await?;
        Ok(qb.build().execute(&mut *conn).await?.rows_affected())
    }

    async fn fetch_count(&self, operation: RepositoryOperation, mut qb: Statement) -> RepositoryResult<u64> {
        self.trace(operation, &qb);
        let mut conn = self.connection().await?;
        let count: i64 = qb.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Run each preload against `rows` on one connection
    async fn apply_preloads(&self, rows: &mut [E], preloads: &[Preload]) -> RepositoryResult<()> {
        if preloads.is_empty() || rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        for preload in preloads {
            E::preload(&mut conn, rows, preload, &self.metadata).await?;
        }
        Ok(())
    }

    /// Execute insert statements atomically, opening a transaction when more
    /// than one statement is needed and none is open
    async fn insert_all(&self, operation: RepositoryOperation, statements: Vec<Statement>) -> RepositoryResult<Vec<E>> {
        if statements.len() <= 1 || self.tx().is_some() {
            let mut rows = Vec::new();
            for qb in statements {
                rows.extend(self.fetch_all(operation, qb).await?);
            }
            return Ok(rows);
        }

        self.transaction(move |repo: Repository<E>| async move {
            let mut rows = Vec::new();
            for qb in statements {
                rows.extend(repo.fetch_all(operation, qb).await?);
            }
            Ok::<_, RepositoryError>(rows)
        })
        .await
    }

    fn not_found(&self, operation: RepositoryOperation, id: Option<Uuid>) -> RepositoryError {
        let err = RepositoryError::new(operation, RepositoryErrorKind::NotFound, "record not found");
        match id {
            Some(id) => err.with_entity(E::NAME, id.to_string()),
            None => err.with_entity_type(E::NAME),
        }
    }

    // ----- writes -----------------------------------------------------------

    /// Insert one entity and return the stored row
    pub async fn create(&self, entity: &E) -> RepositoryResult<E> {
        let op = RepositoryOperation::Create;
        self.run(op, async {
            let statements = self.assembler().insert(std::slice::from_ref(entity))?;
            self.insert_all(op, statements)
                .await?
                .pop()
                .ok_or_else(|| self.not_found(op, Some(entity.id())))
        })
        .await
    }

    /// Insert all entities atomically
    pub async fn create_many(&self, entities: &[E]) -> RepositoryResult<Vec<E>> {
        let op = RepositoryOperation::CreateMany;
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        self.run(op, async {
            let statements = self.assembler().insert(entities)?;
            self.insert_all(op, statements).await
        })
        .await
    }

    /// Insert atomically, at most `batch_size` rows per statement
    /// (zero means [`DEFAULT_BATCH_SIZE`])
    pub async fn create_in_batches(&self, entities: &[E], batch_size: usize) -> RepositoryResult<Vec<E>> {
        let op = RepositoryOperation::CreateMany;
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let batch_size = if batch_size == 0 { DEFAULT_BATCH_SIZE } else { batch_size };
        self.run(op, async {
            let statements = self.assembler().insert_batched(entities, batch_size)?;
            self.insert_all(op, statements).await
        })
        .await
    }

    /// Insert, or overwrite every column but `id`/`created_at` on key conflict
    pub async fn upsert(&self, entities: &[E]) -> RepositoryResult<Vec<E>> {
        let op = RepositoryOperation::Upsert;
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        self.run(op, async {
            let statements = self.assembler().upsert(entities)?;
            self.insert_all(op, statements).await
        })
        .await
    }

    /// Partial update by id. Returns affected rows; zero is not an error.
    pub async fn update(&self, id: Uuid, changes: &Changes) -> RepositoryResult<u64> {
        let op = RepositoryOperation::Update;
        if changes.is_empty() {
            return Ok(0);
        }
        self.run(op, async {
            let qb = self.assembler().update(&Filter::by_id(id), changes)?;
            self.execute(op, qb).await
        })
        .await
    }

    /// Partial update of every matching row. Returns affected rows.
    pub async fn update_fields(&self, filter: &Filter, changes: &Changes) -> RepositoryResult<u64> {
        let op = RepositoryOperation::UpdateFields;
        if changes.is_empty() {
            return Ok(0);
        }
        self.run(op, async {
            let qb = self.assembler().update(filter, changes)?;
            self.execute(op, qb).await
        })
        .await
    }

    /// Soft delete when the kind has `deleted_at`, otherwise remove the row
    pub async fn delete(&self, id: Uuid) -> RepositoryResult<u64> {
        let op = RepositoryOperation::Delete;
        self.run(op, async {
            let qb = self.assembler().delete(&Filter::by_id(id))?;
            self.execute(op, qb).await
        })
        .await
    }

    pub async fn delete_where(&self, filter: &Filter) -> RepositoryResult<u64> {
        let op = RepositoryOperation::DeleteWhere;
        self.run(op, async {
            let qb = self.assembler().delete(filter)?;
            self.execute(op, qb).await
        })
        .await
    }

    pub async fn bulk_delete(&self, ids: &[Uuid]) -> RepositoryResult<u64> {
        let op = RepositoryOperation::BulkDelete;
        if ids.is_empty() {
            return Ok(0);
        }
        self.run(op, async {
            let qb = self.assembler().delete(&Filter::by_ids(ids))?;
            self.execute(op, qb).await
        })
        .await
    }

    /// Apply every item in one transaction; any failure rolls all back.
    /// Returns the total of affected rows.
    pub async fn batch_update(&self, items: &[BatchUpdateItem]) -> RepositoryResult<u64> {
        let op = RepositoryOperation::BatchUpdate;
        if items.is_empty() {
            return Ok(0);
        }
        self.run(op, async {
            // Compile up front so a bad item never opens a transaction.
            let statements = items
                .iter()
                .filter(|item| !item.changes.is_empty())
                .map(|item| self.assembler().update(&item.filter, &item.changes))
                .collect::<RepositoryResult<Vec<_>>>()?;

            self.transaction(move |repo: Repository<E>| async move {
                let mut affected = 0;
                for qb in statements {
                    affected += repo.execute(op, qb).await?;
                }
                Ok::<_, RepositoryError>(affected)
            })
            .await
        })
        .await
    }

    /// As [`batch_update`](Self::batch_update), but each item first takes
    /// `FOR UPDATE` locks on its matching rows, in key order. Concurrent
    /// callers touching the same rows therefore apply one after the other.
    pub async fn batch_update_lock(&self, items: &[BatchUpdateItem]) -> RepositoryResult<u64> {
        let op = RepositoryOperation::BatchUpdateLock;
        if items.is_empty() {
            return Ok(0);
        }
        self.run(op, async {
            for item in items {
                self.assembler().lock_ids(&item.filter)?;
                if !item.changes.is_empty() {
                    self.assembler().update(&item.filter, &item.changes)?;
                }
            }

            self.transaction(|repo: Repository<E>| async move {
                let mut affected = 0;
                for item in items {
                    let mut lock = repo.assembler().lock_ids(&item.filter)?;
                    repo.trace(op, &lock);
                    let ids: Vec<Uuid> = {
                        let mut conn = repo.connection().await?;
                        lock.build_query_scalar::<Uuid>().fetch_all(&mut *conn).await?
                    };
                    if ids.is_empty() || item.changes.is_empty() {
                        continue;
                    }
                    let filter = item.filter.clone().merge(Filter::by_ids(&ids));
                    let qb = repo.assembler().update(&filter, &item.changes)?;
                    affected += repo.execute(op, qb).await?;
                }
                Ok::<_, RepositoryError>(affected)
            })
            .await
        })
        .await
    }

    // ----- reads ------------------------------------------------------------

    /// Matching entities, honoring projection, sort and window
    pub async fn find(&self, filter: &Filter, options: &FindOptions) -> RepositoryResult<Vec<E>> {
        let op = RepositoryOperation::Find;
        self.run(op, async {
            let (limit, offset) = options.window();
            let qb = self.assembler().select(&SelectSpec {
                filter: Some(filter),
                fields: &options.fields,
                sort: options.sort.as_deref(),
                limit,
                offset,
                ..Default::default()
            })?;
            self.fetch_all(op, qb).await
        })
        .await
    }

    /// As [`find`](Self::find), locking the rows `FOR UPDATE`. Only useful
    /// inside a transaction.
    pub async fn find_for_update(&self, filter: &Filter, options: &FindOptions) -> RepositoryResult<Vec<E>> {
        let op = RepositoryOperation::Find;
        self.run(op, async {
            let (limit, offset) = options.window();
            let qb = self.assembler().select(&SelectSpec {
                filter: Some(filter),
                fields: &options.fields,
                sort: options.sort.as_deref(),
                limit,
                offset,
                lock: true,
                ..Default::default()
            })?;
            self.fetch_all(op, qb).await
        })
        .await
    }

    /// First match in key order, or `NotFound`
    pub async fn find_one(&self, filter: &Filter, fields: &[String]) -> RepositoryResult<E> {
        let op = RepositoryOperation::FindOne;
        self.run(op, async {
            self.find_one_inner(op, filter, fields)
                .await?
                .ok_or_else(|| self.not_found(op, None))
        })
        .await
    }

    /// As [`find_one`](Self::find_one), with no match reported as `None`
    pub async fn find_one_or_none(&self, filter: &Filter, fields: &[String]) -> RepositoryResult<Option<E>> {
        let op = RepositoryOperation::FindOne;
        self.run(op, self.find_one_inner(op, filter, fields)).await
    }

    async fn find_one_inner(
        &self,
        op: RepositoryOperation,
        filter: &Filter,
        fields: &[String],
    ) -> RepositoryResult<Option<E>> {
        let qb = self.assembler().select(&SelectSpec {
            filter: Some(filter),
            fields,
            sort: Some("id"),
            limit: 1,
            ..Default::default()
        })?;
        self.fetch_optional(op, qb).await
    }

    /// By id; the nil id short-circuits to `None`
    pub async fn find_by_id(&self, id: Uuid, fields: &[String]) -> RepositoryResult<Option<E>> {
        if id.is_nil() {
            return Ok(None);
        }
        self.find_one_or_none(&Filter::by_id(id), fields).await
    }

    pub async fn find_by_ids(&self, ids: &[Uuid], fields: &[String]) -> RepositoryResult<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.find(&Filter::by_ids(ids), &FindOptions::new().fields(fields.iter().cloned()))
            .await
    }

    /// By id, or `NotFound` when absent or soft-deleted
    pub async fn first(&self, id: Uuid) -> RepositoryResult<E> {
        self.first_with_preload(&[], id).await
    }

    /// By id with the named relations loaded
    pub async fn first_with_preload(&self, preloads: &[Preload], id: Uuid) -> RepositoryResult<E> {
        let op = RepositoryOperation::First;
        self.run(op, async {
            let qb = self.assembler().select(&SelectSpec {
                filter: Some(&Filter::by_id(id)),
                limit: 1,
                ..Default::default()
            })?;
            let entity = self
                .fetch_optional(op, qb)
                .await?
                .ok_or_else(|| self.not_found(op, Some(id)))?;
            let mut rows = vec![entity];
            self.apply_preloads(&mut rows, preloads).await?;
            rows.pop().ok_or_else(|| self.not_found(op, Some(id)))
        })
        .await
    }

    pub async fn count(&self, filter: &Filter) -> RepositoryResult<u64> {
        self.count_with_join(filter, &[]).await
    }

    /// Count with raw `JOIN` fragments; filters may name joined columns
    /// as `table.column`
    pub async fn count_with_join(&self, filter: &Filter, joins: &[String]) -> RepositoryResult<u64> {
        let op = RepositoryOperation::Count;
        self.run(op, async {
            let qb = self.assembler().count(Some(filter), joins)?;
            self.fetch_count(op, qb).await
        })
        .await
    }

    /// Joined, filtered, sorted list with relations loaded
    pub async fn find_with_join_and_preload(
        &self,
        filter: &Filter,
        options: &FindOptions,
        joins: &[String],
        preloads: &[Preload],
    ) -> RepositoryResult<Vec<E>> {
        let op = RepositoryOperation::Find;
        self.run(op, async {
            let (limit, offset) = options.window();
            let qb = self.assembler().select(&SelectSpec {
                filter: Some(filter),
                fields: &options.fields,
                joins,
                sort: options.sort.as_deref(),
                limit,
                offset,
                ..Default::default()
            })?;
            let mut rows = self.fetch_all(op, qb).await?;
            self.apply_preloads(&mut rows, preloads).await?;
            Ok(rows)
        })
        .await
    }

    /// Count plus one page. Without a usable sort key the page is ordered by
    /// `created_at` (or `created_date`) descending.
    pub async fn paginate(&self, filter: &Filter, options: &FindOptions) -> RepositoryResult<Page<E>> {
        self.paginate_with_preload(filter, options, &[]).await
    }

    pub async fn paginate_with_preload(
        &self,
        filter: &Filter,
        options: &FindOptions,
        preloads: &[Preload],
    ) -> RepositoryResult<Page<E>> {
        let op = RepositoryOperation::Paginate;
        self.run(op, async {
            let (limit, offset) = options.window();
            let assembler = self.assembler();

            let count = assembler.count(Some(filter), &[])?;
            let total = self.fetch_count(op, count).await?;

            let qb = assembler.select(&SelectSpec {
                filter: Some(filter),
                fields: &options.fields,
                sort: options.sort.as_deref(),
                default_order: true,
                limit,
                offset,
                ..Default::default()
            })?;
            let mut items = self.fetch_all(op, qb).await?;
            self.apply_preloads(&mut items, preloads).await?;

            Ok(Page::new(items, total, limit, offset))
        })
        .await
    }

    // ----- transactions -----------------------------------------------------

    /// Run `work` with a repository bound to a transaction.
    ///
    /// Commits when `work` returns `Ok`, rolls back on `Err` or panic. A
    /// repository already bound to a transaction passes itself through, so
    /// nested calls join the outer unit of work and the outer owner decides
    /// the outcome.
    pub async fn transaction<F, Fut, R, Err>(&self, work: F) -> Result<R, Err>
    where
        F: FnOnce(Repository<E>) -> Fut,
        Fut: Future<Output = Result<R, Err>>,
        Err: From<RepositoryError>,
    {
        let pool = match &self.executor {
            Executor::Tx(_) => return work(self.clone()).await,
            Executor::Pool(pool) => pool,
        };

        let tx = TxHandle::begin(pool, Arc::clone(&self.metadata), self.timeout).await?;
        tx.run(work(self.with_tx(&tx))).await
    }
}
