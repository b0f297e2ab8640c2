use parking_lot::Mutex;
use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{Database, Executor, Registry, UnitOfWorkError, UnitOfWorkResult};

/// Future returned by a unit of work body passed to [`UnitOfWork::run`].
pub type WorkFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Configuration for a [`UnitOfWork`].
#[derive(Debug, Clone, Default)]
pub struct UnitOfWorkConfig {
    /// Upper bound on how long beginning a transaction may take.
    pub begin_timeout: Option<Duration>,
}

impl UnitOfWorkConfig {
    pub fn with_begin_timeout(mut self, timeout: Duration) -> Self {
        self.begin_timeout = Some(timeout);
        self
    }
}

/// Unit of Work pattern for managing database transactions.
///
/// Binds at most one transaction at a time to a set of named repository
/// factories. The transaction is started lazily on the first repository
/// access and is shared by every repository created until it is resolved.
///
/// All operations take `&mut self`, so a single instance is always used from
/// one flow of control. Run independent units of work on separate instances.
///
/// Dropping an instance with an active transaction drops the transaction,
/// which rolls it back for sqlx backends.
pub struct UnitOfWork<D: Database> {
    db: D,
    config: UnitOfWorkConfig,
    registry: Registry<Executor<D::Transaction>>,
    state: Arc<Mutex<ActiveState<D::Transaction>>>,
}

/// Current transaction, and whether [`UnitOfWork::run`] owns it.
struct ActiveState<T> {
    executor: Option<Executor<T>>,
    running: bool,
}

/// Marks a `run` in progress. Dropping it releases the transaction, so a
/// cancelled `run` does not leave the instance stuck with an open transaction.
struct RunGuard<T> {
    state: Arc<Mutex<ActiveState<T>>>,
}

impl<T> RunGuard<T> {
    fn enter(state: Arc<Mutex<ActiveState<T>>>) -> Self {
        state.lock().running = true;
        Self { state }
    }
}

impl<T> Drop for RunGuard<T> {
    fn drop(&mut self) {
        let abandoned = {
            let mut state = self.state.lock();
            state.running = false;
            state.executor.take()
        };
        // Resolved runs have already cleared the executor.
        if let Some(executor) = abandoned {
            warn!(tx_id = %executor.id(), "unit of work dropped before completion, discarding transaction");
        }
    }
}

impl<D: Database> UnitOfWork<D> {
    /// Create a new UnitOfWork over the given database.
    pub fn new(db: D) -> Self {
        Self::with_config(db, UnitOfWorkConfig::default())
    }

    pub fn with_config(db: D, config: UnitOfWorkConfig) -> Self {
        Self {
            db,
            config,
            registry: Registry::new(),
            state: Arc::new(Mutex::new(ActiveState {
                executor: None,
                running: false,
            })),
        }
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn config(&self) -> &UnitOfWorkConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry<Executor<D::Transaction>> {
        &self.registry
    }

    /// Register a repository factory under `name`, replacing any previous one.
    pub fn register<R, F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Executor<D::Transaction>) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        self.registry.register(name, factory);
    }

    /// Remove the factory registered under `name`.
    ///
    /// Repositories already created from it keep working against the active
    /// transaction.
    pub fn unregister(&mut self, name: &str) {
        self.registry.unregister(name);
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().executor.is_some()
    }

    /// The executor of the active transaction, if any.
    pub fn executor(&self) -> Option<Executor<D::Transaction>> {
        self.state.lock().executor.clone()
    }

    /// Build the repository registered under `name`, bound to the active transaction.
    ///
    /// Starts a transaction when none is active, before the name is looked
    /// up, so a failed lookup still leaves a transaction open.
    pub async fn repository_any(&mut self, name: &str) -> UnitOfWorkResult<Box<dyn Any + Send>> {
        let executor = self.start(false).await?;
        let factory = self.registry.lookup(name)?;
        Ok(factory(executor))
    }

    /// Typed variant of [`repository_any`](Self::repository_any).
    pub async fn repository<R>(&mut self, name: &str) -> UnitOfWorkResult<R>
    where
        R: Any + Send,
    {
        self.repository_any(name)
            .await?
            .downcast::<R>()
            .map(|repository| *repository)
            .map_err(|_| UnitOfWorkError::RepositoryTypeMismatch {
                name: name.to_string(),
                expected: type_name::<R>(),
            })
    }

    /// Execute `work` inside a new transaction.
    ///
    /// The transaction is committed when `work` succeeds and rolled back when
    /// it fails. The error of `work` is returned unchanged unless the rollback
    /// fails too, in which case both are reported as
    /// [`UnitOfWorkError::Rollback`]. A failed commit is followed by a
    /// cleanup rollback and reported the same way.
    ///
    /// Fails with [`UnitOfWorkError::TransactionAlreadyStarted`] without
    /// calling `work` if a transaction is already active.
    ///
    /// Dropping the returned future before it completes discards the
    /// transaction; sqlx rolls it back once the last repository holding it
    /// is gone.
    pub async fn run<F, T, E>(&mut self, work: F) -> Result<T, E>
    where
        F: for<'a> FnOnce(&'a mut Self) -> WorkFuture<'a, T, E>,
        E: From<UnitOfWorkError> + std::error::Error + Send + Sync + 'static,
    {
        self.start(true).await?;
        let _guard = RunGuard::enter(Arc::clone(&self.state));

        let outcome = work(&mut *self).await;
        match outcome {
            Ok(value) => {
                self.commit_active().await?;
                Ok(value)
            }
            Err(err) => match self.rollback_active().await {
                Ok(()) => Err(err),
                Err(rollback) => {
                    warn!(error = %rollback, cause = %err, "rollback failed");
                    Err(UnitOfWorkError::Rollback {
                        rollback: Box::new(rollback),
                        cause: Box::new(err),
                    }
                    .into())
                }
            },
        }
    }

    /// Commit the active transaction, rolling back if the commit fails.
    ///
    /// The transaction is cleared whatever the outcome. Fails with
    /// [`UnitOfWorkError::RunInProgress`] when called from a [`run`](Self::run)
    /// body, whose transaction is resolved by `run` itself.
    pub async fn commit(&mut self) -> UnitOfWorkResult<()> {
        self.ensure_not_running()?;
        self.commit_active().await
    }

    /// Roll back the active transaction.
    ///
    /// The transaction is cleared even if the rollback itself fails. Like
    /// [`commit`](Self::commit), not available inside a [`run`](Self::run) body.
    pub async fn rollback(&mut self) -> UnitOfWorkResult<()> {
        self.ensure_not_running()?;
        self.rollback_active().await
    }

    fn ensure_not_running(&self) -> UnitOfWorkResult<()> {
        if self.state.lock().running {
            return Err(UnitOfWorkError::RunInProgress);
        }
        Ok(())
    }

    async fn commit_active(&mut self) -> UnitOfWorkResult<()> {
        let executor = self
            .executor()
            .ok_or(UnitOfWorkError::NoActiveTransaction)?;

        match executor.commit().await {
            Ok(()) => {
                self.state.lock().executor = None;
                Ok(())
            }
            // Committed; only a listener failed.
            Err(err @ UnitOfWorkError::Observer(_)) => {
                self.state.lock().executor = None;
                Err(err)
            }
            Err(err) => {
                warn!(tx_id = %executor.id(), error = %err, "commit failed, rolling back");
                match self.rollback_active().await {
                    Ok(()) => Err(err),
                    Err(rollback) => {
                        warn!(tx_id = %executor.id(), error = %rollback, "cleanup rollback failed");
                        Err(UnitOfWorkError::Rollback {
                            rollback: Box::new(rollback),
                            cause: Box::new(err),
                        })
                    }
                }
            }
        }
    }

    async fn rollback_active(&mut self) -> UnitOfWorkResult<()> {
        let executor = self
            .state
            .lock()
            .executor
            .take()
            .ok_or(UnitOfWorkError::NoActiveTransaction)?;
        executor.rollback().await
    }

    async fn start(&mut self, fail_if_started: bool) -> UnitOfWorkResult<Executor<D::Transaction>> {
        {
            let state = self.state.lock();
            if let Some(executor) = &state.executor {
                if fail_if_started {
                    return Err(UnitOfWorkError::TransactionAlreadyStarted);
                }
                return Ok(executor.clone());
            }
            // A run never begins a second transaction.
            if state.running {
                return Err(UnitOfWorkError::TransactionAlreadyResolved);
            }
        }

        let tx = self.begin_transaction().await?;
        let executor = Executor::new(tx);
        debug!(tx_id = %executor.id(), "transaction started");
        self.state.lock().executor = Some(executor.clone());
        Ok(executor)
    }

    async fn begin_transaction(&self) -> UnitOfWorkResult<D::Transaction> {
        match self.config.begin_timeout {
            Some(limit) => tokio::time::timeout(limit, self.db.begin())
                .await
                .map_err(|_| UnitOfWorkError::BeginTimeout(limit))?,
            None => self.db.begin().await,
        }
    }
}

impl<D: Database> fmt::Debug for UnitOfWork<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("executor", &self.state.lock().executor)
            .finish_non_exhaustive()
    }
}
