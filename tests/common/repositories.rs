use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::{Row, Sqlite};
use std::sync::Arc;
use uuid::Uuid;

use sqlx_unit_of_work::{BoxError, Executor, TransactionAware, UnitOfWorkError};

use super::entities::{Account, Transfer};
use super::error::AppError;

pub type SqliteExecutor = Executor<sqlx::Transaction<'static, Sqlite>>;

/// Transaction-aware Account Repository
pub struct AccountRepository {
    executor: SqliteExecutor,
    // Track operations for verification in tests
    committed: Arc<RwLock<bool>>,
    rolled_back: Arc<RwLock<bool>>,
}

impl AccountRepository {
    pub fn new(executor: SqliteExecutor) -> Arc<Self> {
        Arc::new(Self {
            executor,
            committed: Arc::new(RwLock::new(false)),
            rolled_back: Arc::new(RwLock::new(false)),
        })
    }

    /// Factory that also subscribes the repository to transaction events.
    pub fn observed(executor: SqliteExecutor) -> Arc<Self> {
        let repository = Self::new(executor.clone());
        executor.register_transaction_aware(repository.clone());
        repository
    }

    pub fn executor(&self) -> &SqliteExecutor {
        &self.executor
    }

    pub async fn create(&self, account: &Account) -> Result<(), AppError> {
        let mut tx_guard = self.executor.lock().await;
        let tx = tx_guard
            .as_mut()
            .ok_or(UnitOfWorkError::TransactionAlreadyResolved)?;
        sqlx::query("INSERT INTO accounts (id, owner, balance) VALUES (?, ?, ?)")
            .bind(account.id)
            .bind(&account.owner)
            .bind(account.balance)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn deposit(&self, id: Uuid, amount: i64) -> Result<(), AppError> {
        let mut tx_guard = self.executor.lock().await;
        let tx = tx_guard
            .as_mut()
            .ok_or(UnitOfWorkError::TransactionAlreadyResolved)?;
        sqlx::query("UPDATE accounts SET balance = balance + ? WHERE id = ?")
            .bind(amount)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        let mut tx_guard = self.executor.lock().await;
        let tx = tx_guard
            .as_mut()
            .ok_or(UnitOfWorkError::TransactionAlreadyResolved)?;
        let row = sqlx::query("SELECT id, owner, balance FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(row.map(|r| Account {
            id: r.get("id"),
            owner: r.get("owner"),
            balance: r.get("balance"),
        }))
    }

    pub fn is_committed(&self) -> bool {
        *self.committed.read()
    }

    pub fn is_rolled_back(&self) -> bool {
        *self.rolled_back.read()
    }
}

#[async_trait]
impl TransactionAware for AccountRepository {
    async fn on_commit(&self) -> Result<(), BoxError> {
        *self.committed.write() = true;
        Ok(())
    }

    async fn on_rollback(&self) -> Result<(), BoxError> {
        *self.rolled_back.write() = true;
        Ok(())
    }
}

/// Transfer Repository, not transaction-aware
pub struct TransferRepository {
    executor: SqliteExecutor,
}

impl TransferRepository {
    pub fn new(executor: SqliteExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &SqliteExecutor {
        &self.executor
    }

    /// Postpones foreign key checks to COMMIT for the rest of the transaction.
    pub async fn defer_foreign_keys(&self) -> Result<(), AppError> {
        let mut tx_guard = self.executor.lock().await;
        let tx = tx_guard
            .as_mut()
            .ok_or(UnitOfWorkError::TransactionAlreadyResolved)?;
        sqlx::query("PRAGMA defer_foreign_keys = ON")
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn create(&self, transfer: &Transfer) -> Result<(), AppError> {
        let mut tx_guard = self.executor.lock().await;
        let tx = tx_guard
            .as_mut()
            .ok_or(UnitOfWorkError::TransactionAlreadyResolved)?;
        sqlx::query(
            "INSERT INTO transfers (id, from_account, to_account, amount) VALUES (?, ?, ?, ?)",
        )
        .bind(transfer.id)
        .bind(transfer.from_account)
        .bind(transfer.to_account)
        .bind(transfer.amount)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

/// Listener whose callbacks fail, standing in for a cache that cannot be updated
pub struct FailingListener {
    fail_on_commit: bool,
    fail_on_rollback: bool,
}

impl FailingListener {
    pub const MESSAGE: &'static str = "search index unavailable";

    fn attach(executor: &SqliteExecutor, fail_on_commit: bool, fail_on_rollback: bool) -> Arc<Self> {
        let listener = Arc::new(Self {
            fail_on_commit,
            fail_on_rollback,
        });
        executor.register_transaction_aware(listener.clone());
        listener
    }

    pub fn failing_on_commit(executor: SqliteExecutor) -> Arc<Self> {
        Self::attach(&executor, true, false)
    }

    pub fn failing_on_rollback(executor: SqliteExecutor) -> Arc<Self> {
        Self::attach(&executor, false, true)
    }
}

#[async_trait]
impl TransactionAware for FailingListener {
    async fn on_commit(&self) -> Result<(), BoxError> {
        if self.fail_on_commit {
            return Err(Self::MESSAGE.into());
        }
        Ok(())
    }

    async fn on_rollback(&self) -> Result<(), BoxError> {
        if self.fail_on_rollback {
            return Err(Self::MESSAGE.into());
        }
        Ok(())
    }
}
