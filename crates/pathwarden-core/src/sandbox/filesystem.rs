//! Filesystem gateway
//!
//! Low-level, symlink-safe primitives the mutation orchestrator is built on.
//! Nothing here follows symlinks: a link is reported, removed, renamed and
//! copied as a link.

use crate::error::FsError;
use crate::path::NormalizedPath;
use crate::types::{EntryAttributes, EntryKind};
use std::fs;
use std::io;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Primitive filesystem operations on normalized absolute paths
#[cfg_attr(test, mockall::automock)]
pub trait FilesystemGateway: Send + Sync {
    /// Whether an entry exists at `path`, without following a final symlink
    fn exists(&self, path: &NormalizedPath) -> Result<bool, FsError>;

    fn is_directory(&self, path: &NormalizedPath) -> Result<bool, FsError>;

    /// Direct children, sorted by name
    fn list_children(&self, path: &NormalizedPath) -> Result<Vec<NormalizedPath>, FsError>;

    /// Remove a file, a symlink, or an empty directory
    fn remove_leaf(&self, path: &NormalizedPath) -> Result<(), FsError>;

    fn read_attributes(&self, path: &NormalizedPath) -> Result<EntryAttributes, FsError>;

    /// Create a single directory; the parent must exist
    fn create_directory(&self, path: &NormalizedPath) -> Result<(), FsError>;

    /// Copy a file or symlink; fails if `to` exists
    fn copy_file(&self, from: &NormalizedPath, to: &NormalizedPath) -> Result<u64, FsError>;

    /// Rename a leaf; fails if `to` exists
    fn rename(&self, from: &NormalizedPath, to: &NormalizedPath) -> Result<(), FsError>;
}

/// Gateway backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }

    fn ensure_absent(path: &NormalizedPath) -> Result<(), FsError> {
        match fs::symlink_metadata(path.as_str()) {
            Ok(_) => Err(FsError::AlreadyExists(path.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FsError::from_io(path.as_str(), e)),
        }
    }
}

impl FilesystemGateway for LocalFilesystem {
    fn exists(&self, path: &NormalizedPath) -> Result<bool, FsError> {
        match fs::symlink_metadata(path.as_str()) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FsError::from_io(path.as_str(), e)),
        }
    }

    fn is_directory(&self, path: &NormalizedPath) -> Result<bool, FsError> {
        fs::symlink_metadata(path.as_str())
            .map(|m| m.file_type().is_dir())
            .map_err(|e| FsError::from_io(path.as_str(), e))
    }

    fn list_children(&self, path: &NormalizedPath) -> Result<Vec<NormalizedPath>, FsError> {
        let mut children = Vec::new();

        for entry in WalkDir::new(path.as_str())
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| FsError::from_io(path.as_str(), io::Error::from(e)))?;
            let Some(name) = entry.file_name().to_str() else {
                warn!(parent = %path, name = ?entry.file_name(), "Skipping entry with non UTF-8 name");
                continue;
            };
            match path.join(name) {
                Ok(child) => children.push(child),
                Err(e) => warn!(parent = %path, %e, "Skipping unrepresentable entry"),
            }
        }

        Ok(children)
    }

    fn remove_leaf(&self, path: &NormalizedPath) -> Result<(), FsError> {
        let metadata =
            fs::symlink_metadata(path.as_str()).map_err(|e| FsError::from_io(path.as_str(), e))?;

        debug!("Removing: {}", path);
        let result = if metadata.file_type().is_dir() {
            fs::remove_dir(path.as_str())
        } else {
            fs::remove_file(path.as_str())
        };
        result.map_err(|e| FsError::from_io(path.as_str(), e))
    }

    fn read_attributes(&self, path: &NormalizedPath) -> Result<EntryAttributes, FsError> {
        let metadata =
            fs::symlink_metadata(path.as_str()).map_err(|e| FsError::from_io(path.as_str(), e))?;
        let file_type = metadata.file_type();

        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        #[cfg(unix)]
        let inode = {
            use std::os::unix::fs::MetadataExt;
            Some(metadata.ino())
        };
        #[cfg(not(unix))]
        let inode = None;

        Ok(EntryAttributes {
            path: path.clone(),
            kind,
            size: (kind == EntryKind::File).then(|| metadata.len()),
            inode,
            modified: metadata.modified().ok().map(|t| t.into()),
            mime_type: (kind == EntryKind::File).then(|| {
                mime_guess::from_path(path.as_str())
                    .first_or_octet_stream()
                    .to_string()
            }),
        })
    }

    fn create_directory(&self, path: &NormalizedPath) -> Result<(), FsError> {
        debug!("Creating directory: {}", path);
        fs::create_dir(path.as_str()).map_err(|e| FsError::from_io(path.as_str(), e))
    }

    fn copy_file(&self, from: &NormalizedPath, to: &NormalizedPath) -> Result<u64, FsError> {
        Self::ensure_absent(to)?;
        let metadata =
            fs::symlink_metadata(from.as_str()).map_err(|e| FsError::from_io(from.as_str(), e))?;

        debug!("Copying {} to {}", from, to);

        #[cfg(unix)]
        if metadata.file_type().is_symlink() {
            let target = fs::read_link(from.as_str()).map_err(|e| FsError::from_io(from.as_str(), e))?;
            std::os::unix::fs::symlink(&target, to.as_str())
                .map_err(|e| FsError::from_io(to.as_str(), e))?;
            return Ok(0);
        }

        if !metadata.file_type().is_file() {
            return Err(FsError::Io {
                path: from.to_string(),
                source: io::Error::new(io::ErrorKind::Unsupported, "not a regular file"),
            });
        }

        fs::copy(from.as_str(), to.as_str()).map_err(|e| FsError::from_io(to.as_str(), e))
    }

    fn rename(&self, from: &NormalizedPath, to: &NormalizedPath) -> Result<(), FsError> {
        Self::ensure_absent(to)?;
        debug!("Moving {} to {}", from, to);

        match fs::rename(from.as_str(), to.as_str()) {
            Ok(()) => Ok(()),
            Err(e) if is_cross_device(&e) => {
                debug!("Cross-device move of {}, copying instead", from);
                self.copy_file(from, to)?;
                self.remove_leaf(from)
            }
            Err(e) => Err(FsError::from_io(from.as_str(), e)),
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
const EXDEV: i32 = 18;

/// Rename across mount points; callers fall back to copy + remove
fn is_cross_device(err: &io::Error) -> bool {
    match err.raw_os_error() {
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        Some(EXDEV) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn np(path: &std::path::Path) -> NormalizedPath {
        NormalizedPath::from_path(path).unwrap()
    }

    #[test]
    fn test_list_children_sorted() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/nested.txt"), "n").unwrap();

        let fs = LocalFilesystem::new();
        let children = fs.list_children(&np(dir.path())).unwrap();
        let names: Vec<&str> = children.iter().filter_map(|c| c.file_name()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
    }

    #[test]
    fn test_remove_leaf_refuses_non_empty_directory() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("full")).unwrap();
        std::fs::write(dir.path().join("full/file"), "x").unwrap();

        let fs = LocalFilesystem::new();
        let full = np(&dir.path().join("full"));
        let result = fs.remove_leaf(&full);
        assert!(matches!(result, Err(FsError::NotEmpty(_)) | Err(FsError::Io { .. })));

        fs.remove_leaf(&full.join("file").unwrap()).unwrap();
        fs.remove_leaf(&full).unwrap();
        assert!(!fs.exists(&full).unwrap());
        assert!(matches!(fs.remove_leaf(&full), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_copy_and_rename_refuse_existing_target() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a"), "a").unwrap();
        std::fs::write(dir.path().join("b"), "b").unwrap();

        let fs = LocalFilesystem::new();
        let a = np(&dir.path().join("a"));
        let b = np(&dir.path().join("b"));
        let c = np(&dir.path().join("c"));

        assert!(matches!(fs.copy_file(&a, &b), Err(FsError::AlreadyExists(_))));
        assert!(matches!(fs.rename(&a, &b), Err(FsError::AlreadyExists(_))));

        assert_eq!(fs.copy_file(&a, &c).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(c.as_str()).unwrap(), "a");

        let d = np(&dir.path().join("d"));
        fs.rename(&c, &d).unwrap();
        assert!(!fs.exists(&c).unwrap());
        assert!(fs.exists(&d).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("target/keep.txt"), "keep").unwrap();
        std::os::unix::fs::symlink(dir.path().join("target"), dir.path().join("link")).unwrap();

        let fs = LocalFilesystem::new();
        let link = np(&dir.path().join("link"));
        assert!(!fs.is_directory(&link).unwrap());
        assert_eq!(fs.read_attributes(&link).unwrap().kind, EntryKind::Symlink);

        fs.remove_leaf(&link).unwrap();
        assert!(dir.path().join("target/keep.txt").exists());
    }

    #[test]
    fn test_cross_device_classification() {
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        assert!(is_cross_device(&io::Error::from_raw_os_error(EXDEV)));
        assert!(!is_cross_device(&io::Error::new(io::ErrorKind::Other, "boom")));
    }

    #[test]
    fn test_read_attributes() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let fs = LocalFilesystem::new();
        let attrs = fs.read_attributes(&np(&dir.path().join("notes.txt"))).unwrap();
        assert_eq!(attrs.kind, EntryKind::File);
        assert_eq!(attrs.size, Some(5));
        assert_eq!(attrs.mime_type.as_deref(), Some("text/plain"));

        let attrs = fs.read_attributes(&np(dir.path())).unwrap();
        assert!(attrs.is_dir());
        assert_eq!(attrs.size, None);
    }
}
