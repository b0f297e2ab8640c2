use sqlx_unit_of_work::UnitOfWorkError;

/// Application error used as the error type of unit of work bodies in tests
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("do error")]
    Rejected,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),
}
