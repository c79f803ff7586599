//! Normalized absolute paths
//!
//! Every path that enters the permission index, the lock table or the
//! mutation orchestrator goes through [`NormalizedPath`] first. A normalized
//! path is absolute, `/`-separated, carries no trailing slash (except the
//! root itself), has no `.` segments, and has `..` segments resolved
//! lexically. Symlinks are never resolved here.

use crate::error::PathError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Normalize a raw path string.
///
/// `..` above the root is clamped to the root, matching what the kernel does
/// for `/..`.
pub fn normalize(raw: &str) -> Result<String, PathError> {
    if raw.is_empty() {
        return Err(PathError::InvalidPath("empty path".to_string()));
    }
    if raw.contains('\0') {
        return Err(PathError::InvalidPath(format!("{:?} contains NUL", raw)));
    }
    if !raw.starts_with('/') {
        return Err(PathError::InvalidPath(format!("{:?} is not absolute", raw)));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Ok("/".to_string());
    }

    let mut out = String::with_capacity(raw.len());
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    Ok(out)
}

/// An absolute, lexically normalized path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedPath(String);

impl NormalizedPath {
    /// The filesystem root `/`
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse and normalize a raw path string
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, PathError> {
        normalize(raw.as_ref()).map(Self)
    }

    /// Normalize an OS path. Non UTF-8 paths are rejected.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PathError> {
        let path = path.as_ref();
        let raw = path
            .to_str()
            .ok_or_else(|| PathError::InvalidPath(format!("{:?} is not valid UTF-8", path)))?;
        Self::parse(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Number of segments; the root has depth 0
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Path segments from the root down
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment, `None` for the root
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            self.0.rsplit('/').next()
        }
    }

    pub fn parent(&self) -> Option<NormalizedPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Strict ancestors, ordered from the root down to the parent
    pub fn ancestors(&self) -> impl Iterator<Item = &str> {
        let root = if self.is_root() { None } else { Some("/") };
        let inner = self
            .0
            .match_indices('/')
            .map(|(idx, _)| idx)
            .filter(|idx| *idx > 0)
            .map(move |idx| &self.0[..idx]);
        root.into_iter().chain(inner)
    }

    /// Segment-respecting prefix test: `/home` is an ancestor of `/home/x`
    /// but not of `/homework`. A path starts with itself.
    pub fn starts_with(&self, base: &NormalizedPath) -> bool {
        if base.is_root() || self.0 == base.0 {
            return true;
        }
        self.0.len() > base.0.len()
            && self.0.starts_with(base.as_str())
            && self.0.as_bytes()[base.0.len()] == b'/'
    }

    /// True when `self` lies strictly below `base`
    pub fn is_strict_descendant_of(&self, base: &NormalizedPath) -> bool {
        self != base && self.starts_with(base)
    }

    /// Append a single segment
    pub fn join(&self, name: &str) -> Result<NormalizedPath, PathError> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
        {
            return Err(PathError::InvalidPath(format!(
                "{:?} is not a single path segment",
                name
            )));
        }
        if self.is_root() {
            Ok(Self(format!("/{}", name)))
        } else {
            Ok(Self(format!("{}/{}", self.0, name)))
        }
    }

    /// Move `self` from under `from` to the same relative place under `to`.
    /// Returns `None` when `self` is not under `from`.
    pub fn rebase(&self, from: &NormalizedPath, to: &NormalizedPath) -> Option<NormalizedPath> {
        if !self.starts_with(from) {
            return None;
        }
        let rest = if from.is_root() {
            &self.0[..]
        } else {
            &self.0[from.0.len()..]
        };
        if rest.is_empty() || rest == "/" {
            return Some(to.clone());
        }
        if to.is_root() {
            Some(Self(rest.to_string()))
        } else {
            Some(Self(format!("{}{}", to.0, rest)))
        }
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NormalizedPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for NormalizedPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NormalizedPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<NormalizedPath> for String {
    fn from(path: NormalizedPath) -> Self {
        path.0
    }
}
