//! # uposs-db
//!
//! Embedded SQLite dedup store for the uposs pipeline.
//!
//! One table, `copy_records`, holds a row per (task kind, file name) for every
//! file copied into staging. Existence checks are always scoped to a task
//! kind so the continuous and bounded loops never see each other's records.

pub mod copy_records;
pub mod pool;

use std::path::Path;

use sqlx::{Pool, Sqlite};
use tracing::info;

use uposs_core::{Error, Result};

pub use copy_records::SqliteCopyRecordRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};

/// File name of the dedup store inside the data home.
pub const DATABASE_FILE: &str = "uposs.db";

/// Database handle with all repositories.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    pub copy_records: SqliteCopyRecordRepository,
}

impl Database {
    /// Wrap an existing pool.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            copy_records: SqliteCopyRecordRepository::new(pool.clone()),
            pool,
        }
    }

    /// Open (creating if needed) the store at `path` and apply migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_with_config(path, PoolConfig::default()).await
    }

    /// Open with custom pool configuration and apply migrations.
    pub async fn open_with_config(path: &Path, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(path, config).await?;
        let db = Self::new(pool);
        db.migrate().await?;
        Ok(db)
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        info!(subsystem = "db", op = "migrate", "Dedup store schema ready");
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close all connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
