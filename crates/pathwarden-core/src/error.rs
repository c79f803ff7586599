//! Error types for Pathwarden Core

use thiserror::Error;

/// Main error type for Pathwarden operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Path parsing and policy pattern errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid policy pattern: {0}")]
    InvalidPattern(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

/// Low-level filesystem errors, classified from `std::io::Error`
#[derive(Error, Debug)]
pub enum FsError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("I/O failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    /// Classify an I/O error raised while operating on `path`
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound(path),
            std::io::ErrorKind::PermissionDenied => FsError::PermissionDenied(path),
            std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path),
            // ENOTEMPTY (Linux, macOS)
            _ if is_not_empty(&err) => FsError::NotEmpty(path),
            _ => FsError::Io { path, source: err },
        }
    }
}

fn is_not_empty(err: &std::io::Error) -> bool {
    match err.raw_os_error() {
        #[cfg(target_os = "linux")]
        Some(39) => true,
        #[cfg(target_os = "macos")]
        Some(66) => true,
        _ => false,
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::Storage(StorageError::Pool(err.to_string()))
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_fs_error_classification() {
        let err = FsError::from_io("/a", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, FsError::NotFound(p) if p == "/a"));

        let err = FsError::from_io("/a", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, FsError::PermissionDenied(_)));

        #[cfg(target_os = "linux")]
        {
            let err = FsError::from_io("/a", io::Error::from_raw_os_error(39));
            assert!(matches!(err, FsError::NotEmpty(_)));
        }

        let err = FsError::from_io("/a", io::Error::new(io::ErrorKind::Other, "disk on fire"));
        assert!(matches!(err, FsError::Io { .. }));
    }
}
