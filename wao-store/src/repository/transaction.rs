//! Transaction scope
//!
//! A [`TxHandle`] owns one open PostgreSQL transaction. Clones share it, so
//! repositories for different entity kinds can take part in the same unit of
//! work. Statements issued through the handle run one at a time, in the
//! order they acquire it.
//!
//! Whoever began the transaction ends it: [`TxHandle::commit`] or
//! [`TxHandle::rollback`]. If the last clone is dropped while the
//! transaction is still open, sqlx rolls it back.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};

use super::entity::Entity;
use super::error::{RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult};
use super::metadata::MetadataCache;
use super::repo::Repository;

type Slot = Option<Transaction<'static, Postgres>>;

/// Shared handle to one open transaction
#[derive(Clone)]
pub struct TxHandle {
    slot: Arc<Mutex<Slot>>,
    metadata: Arc<MetadataCache>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxHandle")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn finished() -> RepositoryError {
    RepositoryError::new(
        RepositoryOperation::Transaction,
        RepositoryErrorKind::Unknown,
        "transaction already committed or rolled back",
    )
}

impl TxHandle {
    /// Begin a transaction on a pooled connection
    pub async fn begin(
        pool: &PgPool,
        metadata: Arc<MetadataCache>,
        timeout: Option<Duration>,
    ) -> RepositoryResult<Self> {
        let tx = pool
            .begin()
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Transaction))?;
        tracing::debug!("transaction started");
        Ok(Self {
            slot: Arc::new(Mutex::new(Some(tx))),
            metadata,
            timeout,
        })
    }

    /// Repository for `E` bound to this transaction
    pub fn repository<E: Entity>(&self) -> Repository<E> {
        Repository::bound(self.clone(), Arc::clone(&self.metadata), self.timeout)
    }

    /// Commit; later use of any clone fails
    pub async fn commit(&self) -> RepositoryResult<()> {
        let tx = self.slot.lock().await.take().ok_or_else(finished)?;
        tx.commit()
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Transaction))?;
        tracing::debug!("transaction committed");
        Ok(())
    }

    /// Roll back; later use of any clone fails
    pub async fn rollback(&self) -> RepositoryResult<()> {
        let tx = self.slot.lock().await.take().ok_or_else(finished)?;
        tx.rollback()
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Transaction))?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }

    /// Still open
    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Whether two handles share one transaction
    pub fn same_as(&self, other: &TxHandle) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    pub(crate) async fn acquire(&self) -> RepositoryResult<Connection> {
        let guard: OwnedMutexGuard<Slot> = Arc::clone(&self.slot).lock_owned().await;
        OwnedMutexGuard::try_map(guard, |slot| slot.as_mut().map(|tx| &mut **tx))
            .map(Connection::Transaction)
            .map_err(|_| finished())
    }

    /// Await `work`, then commit on `Ok`, roll back on `Err` or panic.
    ///
    /// A panic is re-raised after the rollback.
    pub async fn run<Fut, R, Err>(&self, work: Fut) -> Result<R, Err>
    where
        Fut: Future<Output = Result<R, Err>>,
        Err: From<RepositoryError>,
    {
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(value)) => {
                // `work` may have ended the transaction itself.
                if self.is_active().await {
                    self.commit().await?;
                }
                Ok(value)
            }
            Ok(Err(err)) => {
                self.rollback_quietly().await;
                Err(err)
            }
            Err(panic) => {
                self.rollback_quietly().await;
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn rollback_quietly(&self) {
        if !self.is_active().await {
            return;
        }
        if let Err(e) = self.rollback().await {
            tracing::warn!(error = %e, "rollback failed");
        }
    }
}

/// A connection borrowed either from the pool or from an open transaction
pub(crate) enum Connection {
    Pooled(PoolConnection<Postgres>),
    Transaction(OwnedMappedMutexGuard<Slot, PgConnection>),
}

impl Deref for Connection {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        match self {
            Connection::Pooled(conn) => &**conn,
            Connection::Transaction(guard) => &**guard,
        }
    }
}

impl DerefMut for Connection {
    fn deref_mut(&mut self) -> &mut PgConnection {
        match self {
            Connection::Pooled(conn) => &mut **conn,
            Connection::Transaction(guard) => &mut **guard,
        }
    }
}
