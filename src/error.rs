use std::time::Duration;

/// Boxed error produced by a database collaborator or a unit of work body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for unit of work operations
#[derive(Debug, thiserror::Error)]
pub enum UnitOfWorkError {
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("repository {name} is not of type {expected}")]
    RepositoryTypeMismatch { name: String, expected: &'static str },

    #[error(transparent)]
    BeginFailed(BoxError),

    #[error("timed out after {0:?} waiting to begin transaction")]
    BeginTimeout(Duration),

    #[error("transaction already started")]
    TransactionAlreadyStarted,

    #[error("transaction is managed by a running unit of work")]
    RunInProgress,

    #[error("no active transaction")]
    NoActiveTransaction,

    #[error("transaction has already been committed or rolled back")]
    TransactionAlreadyResolved,

    #[error(transparent)]
    CommitFailed(BoxError),

    #[error(transparent)]
    RollbackFailed(BoxError),

    #[error(transparent)]
    Observer(BoxError),

    /// Cleanup rollback failed after the body or the commit had already failed.
    #[error("rollback error: {rollback} due to: {cause}")]
    Rollback {
        rollback: Box<UnitOfWorkError>,
        cause: BoxError,
    },
}

impl UnitOfWorkError {
    /// Wraps a collaborator error as a begin failure.
    pub fn begin<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::BeginFailed(err.into())
    }

    /// Wraps a collaborator error as a commit failure.
    pub fn commit<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::CommitFailed(err.into())
    }

    /// Wraps a collaborator error as a rollback failure.
    pub fn rollback<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::RollbackFailed(err.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RepositoryNotFound(_))
    }
}

/// Result type for unit of work operations
pub type UnitOfWorkResult<T> = Result<T, UnitOfWorkError>;
