//! Pathwarden Core Library
//!
//! This crate provides the core functionality for Pathwarden, including:
//! - Hierarchical, role-aware permission resolution over filesystem paths
//! - Hierarchical read/write path locking
//! - Safe recursive delete, move and copy with per-entry checks
//! - SQLite-based persistence of entities, roles and grants
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     pathwarden-core                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  sandbox/      - Permission index, locks, policy, mutations │
//! │  storage/      - SQLite database, queries                   │
//! │  types/        - Shared type definitions                    │
//! │  path.rs       - Normalized absolute paths                  │
//! │  config.rs     - JSON configuration                         │
//! │  error.rs      - Error types                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod path;
pub mod sandbox;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::{CoreConfig, PolicyConfig};
pub use error::{Error, Result};
pub use path::NormalizedPath;
pub use types::*;

// Re-export sandbox components
pub use sandbox::{
    FilesystemGateway, IndexSnapshot, LocalFilesystem, LockConflict, LockEntry, LockHandle,
    PathLockManager, PathPolicy, PermissionIndex, SafeMutationOrchestrator,
};

// Re-export storage
pub use storage::{PermissionStore, Storage};
