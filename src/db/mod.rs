//! Database layer
//!
//! Storage for students, parents, subjects and holidays.
//! It supports:
//! - SQLite (default, and the in-memory pool used by tests)
//! - MySQL
//!
//! The driver is selected by `database.driver` in the configuration.
//!
//! # Usage
//!
//! ```ignore
//! use student_hub::config::DatabaseConfig;
//! use student_hub::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DatabasePool, DynDatabasePool};

/// Whether `err` was caused by a violated UNIQUE constraint
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    })
}
