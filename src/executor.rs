use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::{Transaction, TransactionAware, UnitOfWorkError, UnitOfWorkResult};

/// Executor wraps a database transaction for use by repositories.
///
/// Cloning an executor is cheap and every clone refers to the same
/// transaction. Once any clone commits or rolls back, the transaction is gone
/// for all of them and further resolution fails with
/// [`UnitOfWorkError::TransactionAlreadyResolved`].
pub struct Executor<T> {
    id: Uuid,
    tx: Arc<Mutex<Option<T>>>,
    observers: Arc<RwLock<Vec<Arc<dyn TransactionAware>>>>,
}

impl<T> Executor<T> {
    /// Creates a new Executor from an open transaction.
    pub fn new(tx: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx: Arc::new(Mutex::new(Some(tx))),
            observers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Identifier of the wrapped transaction, stable across clones.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Locks the transaction slot. The slot is `None` once the transaction is resolved.
    pub async fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.tx.lock().await
    }

    pub async fn is_resolved(&self) -> bool {
        self.tx.lock().await.is_none()
    }

    /// Whether both executors share the same transaction.
    pub fn same_transaction(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }

    /// Register a component that needs to be notified of transaction events.
    pub fn register_transaction_aware(&self, observer: Arc<dyn TransactionAware>) {
        self.observers.write().push(observer);
    }

    /// Takes ownership of the transaction, leaving None in its place.
    async fn take_transaction(&self) -> UnitOfWorkResult<T> {
        self.tx
            .lock()
            .await
            .take()
            .ok_or(UnitOfWorkError::TransactionAlreadyResolved)
    }

    fn observers(&self) -> Vec<Arc<dyn TransactionAware>> {
        self.observers.read().clone()
    }
}

impl<T: Transaction> Executor<T> {
    /// Commit the transaction and notify all registered observers.
    ///
    /// Observer failures are reported as [`UnitOfWorkError::Observer`]; the
    /// transaction is already committed at that point.
    pub async fn commit(&self) -> UnitOfWorkResult<()> {
        let tx = self.take_transaction().await?;
        tx.commit().await?;
        debug!(tx_id = %self.id, "transaction committed");

        for observer in self.observers() {
            observer
                .on_commit()
                .await
                .map_err(UnitOfWorkError::Observer)?;
        }
        Ok(())
    }

    /// Rollback the transaction and notify all registered observers.
    pub async fn rollback(&self) -> UnitOfWorkResult<()> {
        let tx = self.take_transaction().await?;
        tx.rollback().await?;
        debug!(tx_id = %self.id, "transaction rolled back");

        for observer in self.observers() {
            observer
                .on_rollback()
                .await
                .map_err(UnitOfWorkError::Observer)?;
        }
        Ok(())
    }
}

impl<T> Clone for Executor<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: Arc::clone(&self.tx),
            observers: Arc::clone(&self.observers),
        }
    }
}

impl<T> fmt::Debug for Executor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.id)
            .field("observers", &self.observers.read().len())
            .finish_non_exhaustive()
    }
}
