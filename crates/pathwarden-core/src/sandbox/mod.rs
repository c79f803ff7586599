//! Filesystem sandbox and permission management
//!
//! This module provides:
//! - Hierarchical permission resolution over tracked entities
//! - Hierarchical read/write path locks
//! - Path policy (protected and sensitive locations)
//! - Symlink-safe filesystem primitives
//! - Safe recursive delete, move and copy built on all of the above

mod filesystem;
mod locks;
mod orchestrator;
pub mod permissions;
mod policy;

pub use filesystem::{FilesystemGateway, LocalFilesystem};
pub use locks::{LockConflict, LockEntry, LockHandle, PathLockManager};
pub use orchestrator::SafeMutationOrchestrator;
pub use permissions::{IndexSnapshot, PermissionIndex};
pub use policy::PathPolicy;
