//! SQLite-based persistence layer
//!
//! This module provides:
//! - Database initialization and migrations
//! - CRUD operations for entities, roles and permission records
//! - The [`PermissionStore`] gateway the permission index rebuilds from

mod migrations;
mod queries;

pub use migrations::run_migrations;
pub use queries::*;

use crate::error::{Error, Result, StorageError};
use crate::path::NormalizedPath;
use crate::types::{FilesystemEntity, PermissionRecord, Role};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Database connection pool type
pub type DbPool = Pool<SqliteConnectionManager>;

/// Persistence gateway consumed by the permission index and the orchestrator
pub trait PermissionStore: Send + Sync {
    fn load_all_permission_records(&self) -> Result<Vec<PermissionRecord>>;

    fn load_all_roles(&self) -> Result<Vec<Role>>;

    fn load_all_entities(&self) -> Result<Vec<FilesystemEntity>>;

    fn find_entity_by_id(&self, entity_id: &str) -> Result<Option<FilesystemEntity>>;

    fn find_entity_by_path(&self, path: &NormalizedPath) -> Result<Option<FilesystemEntity>>;

    /// Re-point entities at or under `from` to `to` after a move
    fn relocate_entities(&self, from: &NormalizedPath, to: &NormalizedPath) -> Result<usize>;

    /// Drop entities at or under `under` after a delete
    fn forget_entities(&self, under: &NormalizedPath) -> Result<usize>;
}

/// Storage manager for database operations
pub struct Storage {
    pool: DbPool,
    db_path: PathBuf,
}

impl Storage {
    /// Create a new storage instance with a directory path
    pub fn new_with_path(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();

        std::fs::create_dir_all(data_dir).map_err(|e| {
            Error::Storage(StorageError::Database(format!(
                "Failed to create data directory: {}",
                e
            )))
        })?;

        Self::from_path(data_dir.join("pathwarden.db"))
    }

    /// Create storage from a specific database file
    pub fn from_path(db_path: PathBuf) -> Result<Self> {
        info!("Database path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| Error::Storage(StorageError::Pool(e.to_string())))?;

        let storage = Self { pool, db_path };
        storage.initialize()?;

        Ok(storage)
    }

    /// Create in-memory storage (for testing)
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| Error::Storage(StorageError::Pool(e.to_string())))?;

        let storage = Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        };

        storage.initialize()?;

        Ok(storage)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.pool.get()?;
        run_migrations(&conn)?;
        info!("Database initialized successfully");
        Ok(())
    }

    /// Get a connection from the pool
    pub fn connection(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| Error::Storage(StorageError::Pool(e.to_string())))
    }

    /// Get the database path
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Get the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl PermissionStore for Storage {
    fn load_all_permission_records(&self) -> Result<Vec<PermissionRecord>> {
        let conn = self.connection()?;
        list_permission_records(&conn)
    }

    fn load_all_roles(&self) -> Result<Vec<Role>> {
        let conn = self.connection()?;
        list_roles(&conn)
    }

    fn load_all_entities(&self) -> Result<Vec<FilesystemEntity>> {
        let conn = self.connection()?;
        list_entities(&conn)
    }

    fn find_entity_by_id(&self, entity_id: &str) -> Result<Option<FilesystemEntity>> {
        let conn = self.connection()?;
        get_entity(&conn, entity_id)
    }

    fn find_entity_by_path(&self, path: &NormalizedPath) -> Result<Option<FilesystemEntity>> {
        let conn = self.connection()?;
        queries::find_entity_by_path(&conn, path)
    }

    fn relocate_entities(&self, from: &NormalizedPath, to: &NormalizedPath) -> Result<usize> {
        let conn = self.connection()?;
        let moved = queries::relocate_entities(&conn, from, to)?;
        debug!(%from, %to, moved, "Relocated tracked entities");
        Ok(moved)
    }

    fn forget_entities(&self, under: &NormalizedPath) -> Result<usize> {
        let conn = self.connection()?;
        let removed = queries::forget_entities(&conn, under)?;
        debug!(%under, removed, "Forgot tracked entities");
        Ok(removed)
    }
}
