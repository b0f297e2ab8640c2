use async_trait::async_trait;
use std::sync::Arc;

use crate::{UnitOfWorkError, UnitOfWorkResult};

/// A database transaction that can be resolved exactly once.
///
/// Both terminal operations consume the handle, so a transaction cannot be
/// committed after it was rolled back (or the other way around) through the
/// same value.
#[async_trait]
pub trait Transaction: Send + Sized + 'static {
    /// Commit all work done in this transaction.
    async fn commit(self) -> UnitOfWorkResult<()>;

    /// Discard all work done in this transaction.
    async fn rollback(self) -> UnitOfWorkResult<()>;
}

/// A source of transactions, usually a connection pool.
///
/// The unit of work never closes the database; its lifetime is owned by the
/// caller.
#[async_trait]
pub trait Database: Send + Sync {
    type Transaction: Transaction;

    /// Begin a new transaction.
    async fn begin(&self) -> UnitOfWorkResult<Self::Transaction>;
}

#[async_trait]
impl<DB> Transaction for sqlx::Transaction<'static, DB>
where
    DB: sqlx::Database,
{
    async fn commit(self) -> UnitOfWorkResult<()> {
        sqlx::Transaction::commit(self)
            .await
            .map_err(UnitOfWorkError::commit)
    }

    async fn rollback(self) -> UnitOfWorkResult<()> {
        sqlx::Transaction::rollback(self)
            .await
            .map_err(UnitOfWorkError::rollback)
    }
}

#[async_trait]
impl<DB> Database for sqlx::Pool<DB>
where
    DB: sqlx::Database,
{
    type Transaction = sqlx::Transaction<'static, DB>;

    async fn begin(&self) -> UnitOfWorkResult<Self::Transaction> {
        sqlx::Pool::begin(self).await.map_err(UnitOfWorkError::begin)
    }
}

#[async_trait]
impl<D> Database for Arc<D>
where
    D: Database + ?Sized,
{
    type Transaction = D::Transaction;

    async fn begin(&self) -> UnitOfWorkResult<Self::Transaction> {
        (**self).begin().await
    }
}
