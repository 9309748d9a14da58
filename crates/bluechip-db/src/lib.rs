//! Bluechip Database Layer
//!
//! Provides `SQLite` access to the company store with embedded migrations.
//!
//! # Architecture
//!
//! - **Migrations**: SQL migrations are embedded and versioned using `SQLx`
//! - **Connection Pooling**: a small pool; write paths check out a single
//!   connection so that it is released on every exit path
//! - **Duplicate safety**: batch inserts skip rows whose company number exists
//!
//! # Example
//!
//! ```ignore
//! use bluechip_db::Database;
//!
//! let db = Database::new("bluechip.db").await?;
//! db.run_migrations().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod companies;
pub mod connection;
pub mod error;
pub mod migrations;

// Re-export commonly used types
pub use connection::StorePool;
pub use error::{DatabaseError, Result};

use sqlx::pool::PoolConnection;
use sqlx::Sqlite;
use std::path::Path;

/// High-level database interface with migrations.
#[derive(Debug, Clone)]
pub struct Database {
    pool: StorePool,
}

impl Database {
    /// Open the database at `path` (or `:memory:`).
    ///
    /// # Errors
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let pool = StorePool::new(path).await?;
        Ok(Self { pool })
    }

    /// Run all pending database migrations.
    ///
    /// # Errors
    /// Returns `DatabaseError::Migration` if any migration fails.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(self.pool.pool()).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &sqlx::Pool<Sqlite> {
        self.pool.pool()
    }

    /// Check out one connection; it returns to the pool when dropped.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool.acquire().await
    }

    /// Close the database connection gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
