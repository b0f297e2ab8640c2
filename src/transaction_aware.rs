use async_trait::async_trait;

use crate::BoxError;

/// Trait for components that need to be notified of transaction lifecycle events.
///
/// Components implementing this trait can be registered on an [`Executor`](crate::Executor)
/// to receive callbacks once the transaction behind it is committed or rolled back.
/// Repositories use this to update caches or discard in-memory state.
#[async_trait]
pub trait TransactionAware: Send + Sync {
    /// Called after a successful transaction commit.
    ///
    /// An error returned here is reported as [`UnitOfWorkError::Observer`](crate::UnitOfWorkError::Observer);
    /// the transaction stays committed.
    async fn on_commit(&self) -> Result<(), BoxError>;

    /// Called after a successful transaction rollback.
    ///
    /// An error returned here is reported as a failed rollback.
    async fn on_rollback(&self) -> Result<(), BoxError>;
}
