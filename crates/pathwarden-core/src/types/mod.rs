//! Core type definitions for Pathwarden
//!
//! This module contains the shared data model: permissions and grants,
//! tracked filesystem entities, and mutation outcomes.

mod entity_types;
mod outcome_types;
mod permission_types;

pub use entity_types::*;
pub use outcome_types::*;
pub use permission_types::*;

use serde::{Deserialize, Serialize};

/// Lock mode on a path
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    Read,
    Write,
}

/// Kind of mutation the orchestrator performs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Delete,
    Move,
    Copy,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Delete => "delete",
            MutationKind::Move => "move",
            MutationKind::Copy => "copy",
        }
    }

    /// Permission required on every source entry
    pub fn source_permission(&self) -> Permission {
        match self {
            MutationKind::Delete => Permission::Delete,
            MutationKind::Move => Permission::Move,
            MutationKind::Copy => Permission::Copy,
        }
    }

    /// Whether the source entries disappear
    pub fn removes_source(&self) -> bool {
        !matches!(self, MutationKind::Copy)
    }
}
