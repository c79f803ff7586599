//! Hierarchical path lock table
//!
//! Locks are advisory, in-process and non-blocking. A WRITE on a path
//! conflicts with any lock on the same path or on an ancestor, and with a
//! WRITE anywhere below it. Callers that are about to touch a whole subtree
//! pass `check_children` so that readers below the path conflict too.
//!
//! Write-held descendants are tracked as a per-ancestor counter, so the
//! common "is something below me being rewritten" question never scans the
//! table. Only `check_children` scans.
//!
//! The table mutex is held for metadata checks only; no I/O happens under it.

use crate::path::NormalizedPath;
use crate::types::LockMode;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct LockNode {
    writer: Option<u64>,
    readers: usize,
}

impl LockNode {
    fn is_free(&self) -> bool {
        self.writer.is_none() && self.readers == 0
    }
}

/// Why an acquisition was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockConflict {
    /// The path itself is held in a conflicting mode
    Path,
    /// An ancestor is held in a conflicting mode
    Ancestor(String),
    /// Something below the path is write-locked
    DescendantWriter,
    /// Something below the path is read-locked and children were checked
    DescendantReader(String),
}

impl fmt::Display for LockConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockConflict::Path => write!(f, "path is in use"),
            LockConflict::Ancestor(p) => write!(f, "parent {} is in use", p),
            LockConflict::DescendantWriter => write!(f, "an entry below is being modified"),
            // The holder belongs to another request; keep it out of messages
            LockConflict::DescendantReader(_) => write!(f, "an entry below is in use"),
        }
    }
}

/// One currently held path, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockEntry {
    pub path: String,
    pub mode: LockMode,
    pub holders: usize,
}

#[derive(Debug, Default)]
struct LockTable {
    nodes: HashMap<String, LockNode>,
    /// Number of write-locked strict descendants per path
    write_shadow: HashMap<String, usize>,
}

fn is_strict_descendant(candidate: &str, base: &str) -> bool {
    if base == "/" {
        return candidate != "/";
    }
    candidate.len() > base.len()
        && candidate.starts_with(base)
        && candidate.as_bytes()[base.len()] == b'/'
}

impl LockTable {
    fn check(
        &self,
        path: &NormalizedPath,
        mode: LockMode,
        check_children: bool,
    ) -> Result<(), LockConflict> {
        let blocks = |node: &LockNode| match mode {
            LockMode::Write => !node.is_free(),
            LockMode::Read => node.writer.is_some(),
        };

        if self.nodes.get(path.as_str()).is_some_and(blocks) {
            return Err(LockConflict::Path);
        }

        for ancestor in path.ancestors() {
            if self.nodes.get(ancestor).is_some_and(blocks) {
                return Err(LockConflict::Ancestor(ancestor.to_string()));
            }
        }

        if self.write_shadow.get(path.as_str()).copied().unwrap_or(0) > 0 {
            return Err(LockConflict::DescendantWriter);
        }

        if check_children && mode == LockMode::Write {
            if let Some((held, _)) = self
                .nodes
                .iter()
                .find(|(key, node)| node.readers > 0 && is_strict_descendant(key, path.as_str()))
            {
                return Err(LockConflict::DescendantReader(held.clone()));
            }
        }

        Ok(())
    }

    fn grant(&mut self, path: &NormalizedPath, mode: LockMode, holder: u64) {
        let node = self.nodes.entry(path.to_string()).or_default();
        match mode {
            LockMode::Write => {
                node.writer = Some(holder);
                for ancestor in path.ancestors() {
                    *self.write_shadow.entry(ancestor.to_string()).or_insert(0) += 1;
                }
            }
            LockMode::Read => node.readers += 1,
        }
    }

    fn release(&mut self, path: &NormalizedPath, mode: LockMode, holder: u64) {
        let Some(node) = self.nodes.get_mut(path.as_str()) else {
            warn!(%path, ?mode, "Releasing a lock that is not in the table");
            return;
        };

        match mode {
            LockMode::Write => {
                if node.writer != Some(holder) {
                    warn!(%path, holder, "Write lock released by a non-holder");
                    return;
                }
                node.writer = None;
                for ancestor in path.ancestors() {
                    if let Some(count) = self.write_shadow.get_mut(ancestor) {
                        *count -= 1;
                        if *count == 0 {
                            self.write_shadow.remove(ancestor);
                        }
                    }
                }
            }
            LockMode::Read => node.readers = node.readers.saturating_sub(1),
        }

        if self
            .nodes
            .get(path.as_str())
            .is_some_and(LockNode::is_free)
        {
            self.nodes.remove(path.as_str());
        }
    }
}

#[derive(Debug, Default)]
struct LockShared {
    table: Mutex<LockTable>,
    next_holder: AtomicU64,
}

/// Concurrency-safe hierarchical read/write lock manager
#[derive(Debug, Clone, Default)]
pub struct PathLockManager {
    shared: Arc<LockShared>,
}

impl PathLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to lock `path` without waiting.
    ///
    /// Always returns a handle; check [`LockHandle::is_successful`]. Failed
    /// handles hold nothing and releasing them is a no-op.
    pub fn acquire(&self, path: &NormalizedPath, mode: LockMode, check_children: bool) -> LockHandle {
        let holder = self.shared.next_holder.fetch_add(1, Ordering::Relaxed);

        let outcome = {
            let mut table = self.shared.table.lock();
            let outcome = table.check(path, mode, check_children);
            if outcome.is_ok() {
                table.grant(path, mode, holder);
            }
            outcome
        };

        match outcome {
            Ok(()) => {
                trace!(%path, ?mode, holder, "Lock acquired");
                LockHandle {
                    shared: Some(self.shared.clone()),
                    path: path.clone(),
                    mode,
                    holder,
                    conflict: None,
                }
            }
            Err(conflict) => {
                debug!(%path, ?mode, %conflict, "Lock refused");
                LockHandle {
                    shared: None,
                    path: path.clone(),
                    mode,
                    holder,
                    conflict: Some(conflict),
                }
            }
        }
    }

    /// Retry [`acquire`](Self::acquire) until it succeeds or `timeout`
    /// elapses. Not for use inside recursive operations: waiting while
    /// holding another path lock can deadlock.
    pub fn acquire_timeout(
        &self,
        path: &NormalizedPath,
        mode: LockMode,
        check_children: bool,
        timeout: Duration,
    ) -> LockHandle {
        let deadline = Instant::now() + timeout;
        loop {
            let handle = self.acquire(path, mode, check_children);
            if handle.is_successful() || Instant::now() >= deadline {
                return handle;
            }
            std::thread::sleep(RETRY_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    /// Whether any lock is currently held exactly on `path`
    pub fn is_locked(&self, path: &NormalizedPath) -> bool {
        self.shared.table.lock().nodes.contains_key(path.as_str())
    }

    /// All currently held paths, sorted
    pub fn held_paths(&self) -> Vec<LockEntry> {
        let table = self.shared.table.lock();
        let mut entries: Vec<LockEntry> = table
            .nodes
            .iter()
            .map(|(path, node)| match node.writer {
                Some(_) => LockEntry {
                    path: path.clone(),
                    mode: LockMode::Write,
                    holders: 1,
                },
                None => LockEntry {
                    path: path.clone(),
                    mode: LockMode::Read,
                    holders: node.readers,
                },
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Number of internal table entries, zero when nothing is held
    pub fn table_len(&self) -> usize {
        let table = self.shared.table.lock();
        table.nodes.len() + table.write_shadow.len()
    }
}

/// Result of a lock acquisition. Releases on drop.
#[must_use = "the lock is released as soon as the handle is dropped"]
pub struct LockHandle {
    shared: Option<Arc<LockShared>>,
    path: NormalizedPath,
    mode: LockMode,
    holder: u64,
    conflict: Option<LockConflict>,
}

impl LockHandle {
    pub fn is_successful(&self) -> bool {
        self.shared.is_some()
    }

    pub fn path(&self) -> &NormalizedPath {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Why the acquisition failed, `None` for successful handles
    pub fn conflict(&self) -> Option<&LockConflict> {
        self.conflict.as_ref()
    }

    /// Release now instead of at drop
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.table.lock().release(&self.path, self.mode, self.holder);
            trace!(path = %self.path, mode = ?self.mode, holder = self.holder, "Lock released");
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("successful", &self.is_successful())
            .field("conflict", &self.conflict)
            .finish()
    }
}
