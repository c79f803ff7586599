//! Filesystem entity and attribute types

use crate::path::NormalizedPath;
use serde::{Deserialize, Serialize};

/// A tracked filesystem location, identified independently of its path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemEntity {
    pub entity_id: String,
    pub path: NormalizedPath,
    /// Survives renames within the same filesystem
    pub inode: Option<u64>,
    pub is_filesystem_supported: bool,
    pub owner_id: Option<String>,
}

impl FilesystemEntity {
    pub fn new(path: NormalizedPath) -> Self {
        Self {
            entity_id: uuid::Uuid::new_v4().to_string(),
            path,
            inode: None,
            is_filesystem_supported: true,
            owner_id: None,
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_inode(mut self, inode: u64) -> Self {
        self.inode = Some(inode);
        self
    }
}

/// Kind of a directory entry, as seen without following symlinks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// Metadata of a single entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryAttributes {
    pub path: NormalizedPath,
    pub kind: EntryKind,
    pub size: Option<u64>,
    pub inode: Option<u64>,
    pub modified: Option<chrono::DateTime<chrono::Utc>>,
    pub mime_type: Option<String>,
}

impl EntryAttributes {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}
