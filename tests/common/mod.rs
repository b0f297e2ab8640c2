#![allow(dead_code)]

pub mod error;
pub mod repositories;

pub use entities::{Account, Transfer};
pub use error::AppError;
pub use repositories::{AccountRepository, FailingListener, SqliteExecutor, TransferRepository};

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// In-memory SQLite pool with a single connection, so every transaction
/// sees the same database.
pub async fn setup_database() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    sqlx::query(
        r#"
        CREATE TABLE accounts (
            id BLOB PRIMARY KEY,
            owner TEXT NOT NULL,
            balance INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create accounts table");

    sqlx::query(
        r#"
        CREATE TABLE transfers (
            id BLOB PRIMARY KEY,
            from_account BLOB NOT NULL REFERENCES accounts(id),
            to_account BLOB NOT NULL REFERENCES accounts(id),
            amount INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create transfers table");

    pool
}

/// Counts rows of `table` outside of any unit of work.
pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("Failed to count rows")
}
