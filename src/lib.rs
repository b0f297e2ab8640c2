//! Unit of Work Module
//!
//! Binds a single database transaction to a set of named repository factories.
//! Every repository obtained inside one unit of work shares the same
//! transaction, which is committed when the work succeeds and rolled back
//! when it fails.

pub mod database;
pub mod error;
pub mod executor;
pub mod registry;
pub mod transaction_aware;
pub mod unit_of_work;

pub use database::{Database, Transaction};
pub use error::{BoxError, UnitOfWorkError, UnitOfWorkResult};
pub use executor::Executor;
pub use registry::{Registry, RepositoryFactory};
pub use transaction_aware::TransactionAware;
pub use unit_of_work::{UnitOfWork, UnitOfWorkConfig, WorkFuture};
