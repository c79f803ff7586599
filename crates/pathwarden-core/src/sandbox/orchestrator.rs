//! Safe recursive delete, move and copy
//!
//! Every operation follows the same shape: cheap preconditions, hierarchical
//! path lock(s), a depth-first walk that checks policy and permissions on
//! each entry, and a single aggregated [`OpResult`]. Per-entry refusals and
//! faults are counted, never propagated: a started walk always runs to the
//! end so the caller learns exactly how much was left behind.
//!
//! Failure accounting: an entry counts once, where it failed. A directory
//! that stays because one of its children failed is not counted again.
//! A source entry that vanished mid-walk counts as handled, not as failed.

use crate::config::CoreConfig;
use crate::error::{FsError, Result};
use crate::path::NormalizedPath;
use crate::sandbox::filesystem::FilesystemGateway;
use crate::sandbox::locks::{LockHandle, PathLockManager};
use crate::sandbox::permissions::{IndexSnapshot, PermissionIndex};
use crate::sandbox::policy::PathPolicy;
use crate::types::*;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// State of one recursive walk
struct Walk<'a> {
    kind: MutationKind,
    principal: &'a Principal,
    ignore_permissions: bool,
    /// Permissions are checked against one snapshot for the whole walk
    snapshot: Arc<IndexSnapshot>,
    failed: usize,
    /// Entries fully handled: (source, destination) for moves, (path, None)
    /// for deletes
    completed: Vec<(NormalizedPath, Option<NormalizedPath>)>,
}

impl Walk<'_> {
    fn allowed(&self, path: &NormalizedPath, permission: Permission) -> bool {
        self.ignore_permissions
            || self
                .snapshot
                .resolve(path, self.principal)
                .is_some_and(|view| view.contains(permission))
    }

    fn refuse(&mut self, path: &NormalizedPath, reason: &str) {
        debug!(op = self.kind.as_str(), %path, reason, "Entry refused");
        self.failed += 1;
    }

    fn vanished(&self, path: &NormalizedPath) {
        debug!(op = self.kind.as_str(), %path, "Entry vanished during walk");
    }

    /// Every call counts one failure; a vanished source is not a failure and
    /// is handled before reaching here
    fn fs_failure(&mut self, path: &NormalizedPath, err: FsError) {
        match err {
            FsError::NotFound(_)
            | FsError::NotEmpty(_)
            | FsError::PermissionDenied(_)
            | FsError::AlreadyExists(_) => {
                info!(op = self.kind.as_str(), %path, %err, "Entry rejected by the filesystem");
            }
            FsError::Io { .. } => {
                error!(op = self.kind.as_str(), %path, error = %err, "Unexpected filesystem fault");
            }
        }
        self.failed += 1;
    }
}

/// Composes locks, permissions and policy around a filesystem gateway
pub struct SafeMutationOrchestrator {
    locks: PathLockManager,
    index: Arc<PermissionIndex>,
    policy: Arc<PathPolicy>,
    fs: Arc<dyn FilesystemGateway>,
    protected_data_folder: Option<NormalizedPath>,
}

impl SafeMutationOrchestrator {
    pub fn new(
        locks: PathLockManager,
        index: Arc<PermissionIndex>,
        policy: Arc<PathPolicy>,
        fs: Arc<dyn FilesystemGateway>,
    ) -> Self {
        Self {
            locks,
            index,
            policy,
            fs,
            protected_data_folder: None,
        }
    }

    /// Build from configuration, with a fresh lock manager
    pub fn from_config(
        config: &CoreConfig,
        index: Arc<PermissionIndex>,
        fs: Arc<dyn FilesystemGateway>,
    ) -> Result<Self> {
        let policy = Arc::new(PathPolicy::from_config(&config.policy)?);
        let orchestrator = Self::new(PathLockManager::new(), index, policy, fs);
        Ok(if config.protect_data_folder {
            orchestrator.protect_data_folder(config.data_folder.clone())
        } else {
            orchestrator
        })
    }

    /// Refuse to delete or move `folder` or anything containing it
    pub fn protect_data_folder(mut self, folder: NormalizedPath) -> Self {
        self.protected_data_folder = Some(folder);
        self
    }

    pub fn locks(&self) -> &PathLockManager {
        &self.locks
    }

    pub fn index(&self) -> &Arc<PermissionIndex> {
        &self.index
    }

    /// Recursively delete `target`
    pub fn delete(
        &self,
        target: &NormalizedPath,
        principal: &Principal,
        ignore_permissions: bool,
    ) -> OpResult<()> {
        info!(%target, user = %principal.user_id, "Delete requested");

        if let Some(reason) = self.data_folder_conflict(target) {
            return OpResult::rejected(reason);
        }
        match self.fs.exists(target) {
            Ok(true) => {}
            Ok(false) => return OpResult::NotFound,
            Err(e) => return self.fault("delete", target, e),
        }

        let _lock = match self.lock(target, LockMode::Write) {
            Ok(handle) => handle,
            Err(rejected) => return rejected,
        };

        let mut walk = self.walk(MutationKind::Delete, principal, ignore_permissions);
        if let Some(reason) = self.source_refusal(&walk, target) {
            return OpResult::rejected(reason);
        }

        self.delete_node(&mut walk, target);
        self.finish(walk, target)
    }

    /// Recursively move `source` to `destination`; `destination` must not exist
    pub fn move_entry(
        &self,
        source: &NormalizedPath,
        destination: &NormalizedPath,
        principal: &Principal,
        ignore_permissions: bool,
    ) -> OpResult<()> {
        info!(%source, %destination, user = %principal.user_id, "Move requested");

        if let Some(reason) = self.data_folder_conflict(source) {
            return OpResult::rejected(reason);
        }
        self.transfer(
            MutationKind::Move,
            source,
            destination,
            principal,
            ignore_permissions,
        )
    }

    /// Recursively copy `source` to `destination`; `destination` must not exist
    pub fn copy(
        &self,
        source: &NormalizedPath,
        destination: &NormalizedPath,
        principal: &Principal,
        ignore_permissions: bool,
    ) -> OpResult<()> {
        info!(%source, %destination, user = %principal.user_id, "Copy requested");
        self.transfer(
            MutationKind::Copy,
            source,
            destination,
            principal,
            ignore_permissions,
        )
    }

    fn transfer(
        &self,
        kind: MutationKind,
        source: &NormalizedPath,
        destination: &NormalizedPath,
        principal: &Principal,
        ignore_permissions: bool,
    ) -> OpResult<()> {
        if destination.starts_with(source) {
            return OpResult::rejected(format!(
                "cannot {} {} into itself",
                kind.as_str(),
                source
            ));
        }

        match self.fs.exists(source) {
            Ok(true) => {}
            Ok(false) => return OpResult::NotFound,
            Err(e) => return self.fault("transfer", source, e),
        }
        match self.fs.exists(destination) {
            Ok(false) => {}
            Ok(true) => return OpResult::rejected(format!("{} already exists", destination)),
            Err(e) => return self.fault("transfer", destination, e),
        }
        let Some(parent) = destination.parent() else {
            return OpResult::rejected("destination cannot be the root");
        };
        match self.fs.is_directory(&parent) {
            Ok(true) => {}
            Ok(false) | Err(FsError::NotFound(_)) => {
                return OpResult::rejected(format!("{} is not a directory", parent))
            }
            Err(e) => return self.fault("transfer", &parent, e),
        }

        let source_mode = if kind.removes_source() {
            LockMode::Write
        } else {
            LockMode::Read
        };
        let _locks = match self.lock_pair((source, source_mode), (destination, LockMode::Write)) {
            Ok(handles) => handles,
            Err(rejected) => return rejected,
        };

        let mut walk = self.walk(kind, principal, ignore_permissions);
        if let Some(reason) = self.source_refusal(&walk, source) {
            return OpResult::rejected(reason);
        }
        if let Some(reason) = self.destination_refusal(&walk, destination) {
            return OpResult::rejected(reason);
        }

        self.transfer_node(&mut walk, source, destination);
        self.finish(walk, source)
    }

    // ===== Walks =====

    /// Returns true when `path` is gone afterwards
    fn delete_node(&self, walk: &mut Walk<'_>, path: &NormalizedPath) -> bool {
        if let Some(reason) = self.source_refusal(walk, path) {
            walk.refuse(path, &reason);
            return false;
        }

        let is_dir = match self.fs.is_directory(path) {
            Ok(is_dir) => is_dir,
            Err(FsError::NotFound(_)) => {
                walk.vanished(path);
                return true;
            }
            Err(e) => {
                walk.fs_failure(path, e);
                return false;
            }
        };

        if is_dir && !self.delete_children(walk, path) {
            return false;
        }

        match self.fs.remove_leaf(path) {
            Ok(()) | Err(FsError::NotFound(_)) => {
                walk.completed.push((path.clone(), None));
                true
            }
            Err(e) => {
                walk.fs_failure(path, e);
                false
            }
        }
    }

    fn delete_children(&self, walk: &mut Walk<'_>, dir: &NormalizedPath) -> bool {
        let children = match self.fs.list_children(dir) {
            Ok(children) => children,
            // Gone already; the removal below sees NotFound too
            Err(FsError::NotFound(_)) => return true,
            Err(e) => {
                walk.fs_failure(dir, e);
                return false;
            }
        };

        let mut all_removed = true;
        for child in &children {
            // Siblings keep going after a failure
            all_removed &= self.delete_node(walk, child);
        }
        all_removed
    }

    /// Move or copy one entry. Returns true when it fully arrived.
    fn transfer_node(
        &self,
        walk: &mut Walk<'_>,
        source: &NormalizedPath,
        destination: &NormalizedPath,
    ) -> bool {
        if let Some(reason) = self.source_refusal(walk, source) {
            walk.refuse(source, &reason);
            return false;
        }
        if let Some(reason) = self.destination_refusal(walk, destination) {
            walk.refuse(destination, &reason);
            return false;
        }

        let is_dir = match self.fs.is_directory(source) {
            Ok(is_dir) => is_dir,
            Err(FsError::NotFound(_)) => {
                walk.vanished(source);
                return true;
            }
            Err(e) => {
                walk.fs_failure(source, e);
                return false;
            }
        };

        if !is_dir {
            let result = match walk.kind {
                MutationKind::Copy => self.fs.copy_file(source, destination).map(|_| ()),
                _ => self.fs.rename(source, destination),
            };
            return match result {
                Ok(()) => {
                    if walk.kind.removes_source() {
                        walk.completed.push((source.clone(), Some(destination.clone())));
                    }
                    true
                }
                Err(FsError::NotFound(ref missing)) if missing == source.as_str() => {
                    walk.vanished(source);
                    true
                }
                Err(e) => {
                    walk.fs_failure(source, e);
                    false
                }
            };
        }

        if let Err(e) = self.fs.create_directory(destination) {
            walk.fs_failure(destination, e);
            return false;
        }

        let children = match self.fs.list_children(source) {
            Ok(children) => children,
            Err(FsError::NotFound(_)) => {
                walk.vanished(source);
                Vec::new()
            }
            Err(e) => {
                walk.fs_failure(source, e);
                return false;
            }
        };

        let mut all_arrived = true;
        for child in &children {
            let Some(name) = child.file_name() else {
                continue;
            };
            let child_destination = match destination.join(name) {
                Ok(path) => path,
                Err(e) => {
                    walk.fs_failure(
                        child,
                        FsError::Io {
                            path: child.to_string(),
                            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
                        },
                    );
                    all_arrived = false;
                    continue;
                }
            };
            all_arrived &= self.transfer_node(walk, child, &child_destination);
        }

        if !all_arrived || !walk.kind.removes_source() {
            return all_arrived;
        }

        match self.fs.remove_leaf(source) {
            Ok(()) | Err(FsError::NotFound(_)) => {
                walk.completed.push((source.clone(), Some(destination.clone())));
                true
            }
            Err(e) => {
                walk.fs_failure(source, e);
                false
            }
        }
    }

    // ===== Checks =====

    fn source_refusal(&self, walk: &Walk<'_>, path: &NormalizedPath) -> Option<String> {
        if walk.kind.removes_source() && self.policy.is_non_deletable(path) {
            return Some(format!("{} is a protected system path", path));
        }
        if !walk.ignore_permissions && self.policy.is_sensitive(path) {
            return Some(format!("{} is a sensitive path", path));
        }
        let permission = walk.kind.source_permission();
        if !walk.allowed(path, permission) {
            return Some(format!("{} permission denied on {}", permission, path));
        }
        None
    }

    fn destination_refusal(&self, walk: &Walk<'_>, path: &NormalizedPath) -> Option<String> {
        if !walk.ignore_permissions && self.policy.is_sensitive(path) {
            return Some(format!("{} is a sensitive path", path));
        }
        if !walk.allowed(path, Permission::Create) {
            return Some(format!("create permission denied on {}", path));
        }
        None
    }

    fn data_folder_conflict(&self, target: &NormalizedPath) -> Option<String> {
        let folder = self.protected_data_folder.as_ref()?;
        folder.starts_with(target).then(|| {
            info!(%target, data_folder = %folder, "Refusing to touch the data folder");
            format!("{} contains the server data folder", target)
        })
    }

    // ===== Plumbing =====

    fn walk<'a>(
        &self,
        kind: MutationKind,
        principal: &'a Principal,
        ignore_permissions: bool,
    ) -> Walk<'a> {
        Walk {
            kind,
            principal,
            ignore_permissions,
            snapshot: self.index.snapshot(),
            failed: 0,
            completed: Vec::new(),
        }
    }

    fn lock(&self, path: &NormalizedPath, mode: LockMode) -> std::result::Result<LockHandle, OpResult<()>> {
        let handle = self.locks.acquire(path, mode, true);
        if handle.is_successful() {
            return Ok(handle);
        }
        let reason = handle
            .conflict()
            .map(|c| format!("{}: {}", path, c))
            .unwrap_or_else(|| format!("{} is in use", path));
        debug!(%path, %reason, "Lock not available");
        Err(OpResult::rejected(reason))
    }

    /// Lock two paths in a fixed global order so crossing transfers cannot
    /// each hold one side
    fn lock_pair(
        &self,
        a: (&NormalizedPath, LockMode),
        b: (&NormalizedPath, LockMode),
    ) -> std::result::Result<(LockHandle, LockHandle), OpResult<()>> {
        let (first, second) = if a.0.as_str() <= b.0.as_str() { (a, b) } else { (b, a) };
        let first = self.lock(first.0, first.1)?;
        let second = self.lock(second.0, second.1)?;
        Ok((first, second))
    }

    fn fault(&self, op: &str, path: &NormalizedPath, err: FsError) -> OpResult<()> {
        error!(op, %path, error = %err, "Filesystem fault before mutation");
        OpResult::internal()
    }

    fn finish(&self, walk: Walk<'_>, root: &NormalizedPath) -> OpResult<()> {
        self.write_through(walk.kind, &walk.completed);

        if walk.failed == 0 {
            info!(op = walk.kind.as_str(), %root, "Completed");
            OpResult::Ok(())
        } else {
            warn!(op = walk.kind.as_str(), %root, failed = walk.failed, "Completed with failures");
            OpResult::partial(walk.failed)
        }
    }

    /// Keep tracked entities in step with what actually happened on disk,
    /// then publish a fresh permission snapshot
    fn write_through(&self, kind: MutationKind, completed: &[(NormalizedPath, Option<NormalizedPath>)]) {
        if !kind.removes_source() || completed.is_empty() {
            return;
        }

        let store = self.index.store();
        let mut changed = 0;
        for (source, destination) in outermost(completed) {
            let result = match destination {
                Some(destination) => store.relocate_entities(source, destination),
                None => store.forget_entities(source),
            };
            match result {
                Ok(n) => changed += n,
                Err(e) => warn!(%source, error = %e, "Failed to update tracked entities"),
            }
        }

        if changed > 0 {
            if let Err(e) = self.index.load_from_database() {
                warn!(error = %e, "Failed to refresh permission index");
            }
        }
    }
}

/// Drop entries nested under another completed entry
fn outermost(
    completed: &[(NormalizedPath, Option<NormalizedPath>)],
) -> Vec<&(NormalizedPath, Option<NormalizedPath>)> {
    let mut sorted: Vec<_> = completed.iter().collect();
    sorted.sort_by_key(|(path, _)| path.depth());

    let mut kept: Vec<&(NormalizedPath, Option<NormalizedPath>)> = Vec::new();
    for entry in sorted {
        if !kept.iter().any(|(root, _)| entry.0.starts_with(root)) {
            kept.push(entry);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::filesystem::MockFilesystemGateway;
    use crate::storage::Storage;

    fn p(raw: &str) -> NormalizedPath {
        NormalizedPath::parse(raw).unwrap()
    }

    fn empty_index() -> Arc<PermissionIndex> {
        Arc::new(PermissionIndex::new(Arc::new(Storage::in_memory().unwrap())))
    }

    #[test]
    fn test_delete_data_folder_touches_nothing() {
        // No expectations: any gateway call panics
        let fs = MockFilesystemGateway::new();
        let orchestrator = SafeMutationOrchestrator::new(
            PathLockManager::new(),
            empty_index(),
            Arc::new(PathPolicy::permissive()),
            Arc::new(fs),
        )
        .protect_data_folder(p("/srv/pathwarden/data"));

        let admin = Principal::new("admin");
        let result = orchestrator.delete(&p("/srv/pathwarden/data"), &admin, true);
        assert!(matches!(result, OpResult::Rejected { .. }));

        let result = orchestrator.delete(&p("/srv"), &admin, true);
        assert!(matches!(result, OpResult::Rejected { .. }));

        let result = orchestrator.move_entry(&p("/srv/pathwarden"), &p("/tmp/x"), &admin, true);
        assert!(matches!(result, OpResult::Rejected { .. }));
        assert_eq!(orchestrator.locks().table_len(), 0);
    }

    #[test]
    fn test_delete_missing_target() {
        let mut fs = MockFilesystemGateway::new();
        fs.expect_exists().returning(|_| Ok(false));
        let orchestrator = SafeMutationOrchestrator::new(
            PathLockManager::new(),
            empty_index(),
            Arc::new(PathPolicy::permissive()),
            Arc::new(fs),
        );

        let result = orchestrator.delete(&p("/gone"), &Principal::new("u"), true);
        assert_eq!(result, OpResult::NotFound);
    }

    #[test]
    fn test_delete_rejected_while_descendant_locked() {
        let mut fs = MockFilesystemGateway::new();
        fs.expect_exists().returning(|_| Ok(true));
        fs.expect_remove_leaf().never();
        let orchestrator = SafeMutationOrchestrator::new(
            PathLockManager::new(),
            empty_index(),
            Arc::new(PathPolicy::permissive()),
            Arc::new(fs),
        );

        let reader = orchestrator
            .locks()
            .acquire(&p("/share/docs/report.pdf"), LockMode::Read, false);
        assert!(reader.is_successful());

        let result = orchestrator.delete(&p("/share"), &Principal::new("u"), true);
        assert!(matches!(result, OpResult::Rejected { .. }));

        drop(reader);
        assert_eq!(orchestrator.locks().table_len(), 0);
    }

    fn permissive(fs: MockFilesystemGateway) -> SafeMutationOrchestrator {
        SafeMutationOrchestrator::new(
            PathLockManager::new(),
            empty_index(),
            Arc::new(PathPolicy::permissive()),
            Arc::new(fs),
        )
    }

    /// Gateway where only `existing` paths exist and every parent is a directory
    fn transfer_gateway(existing: &'static [&'static str]) -> MockFilesystemGateway {
        let mut fs = MockFilesystemGateway::new();
        fs.expect_exists()
            .returning(move |path| Ok(existing.contains(&path.as_str())));
        fs.expect_is_directory().returning(|_| Ok(true));
        fs.expect_create_directory().never();
        fs.expect_rename().never();
        fs.expect_copy_file().never();
        fs.expect_remove_leaf().never();
        fs
    }

    fn rejection_reason(result: OpResult<()>) -> String {
        match result {
            OpResult::Rejected { reason } => reason,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_move_rejected_while_source_descendant_locked() {
        let orchestrator = permissive(transfer_gateway(&["/src"]));
        let reader = orchestrator
            .locks()
            .acquire(&p("/src/open.txt"), LockMode::Read, false);
        assert!(reader.is_successful());

        let result = orchestrator.move_entry(&p("/src"), &p("/dst"), &Principal::new("u"), true);
        let reason = rejection_reason(result);
        assert!(!reason.contains("open.txt"));

        // Only the outside reader is left
        let held: Vec<String> = orchestrator
            .locks()
            .held_paths()
            .into_iter()
            .map(|entry| entry.path)
            .collect();
        assert_eq!(held, vec!["/src/open.txt".to_string()]);

        drop(reader);
        assert_eq!(orchestrator.locks().table_len(), 0);
    }

    #[test]
    fn test_copy_releases_first_lock_when_second_fails() {
        let orchestrator = permissive(transfer_gateway(&["/a"]));
        let reader = orchestrator
            .locks()
            .acquire(&p("/b/inside"), LockMode::Read, false);
        assert!(reader.is_successful());

        // "/a" locks first and succeeds, "/b" then fails on the reader below it
        let result = orchestrator.copy(&p("/a"), &p("/b"), &Principal::new("u"), true);
        assert!(rejection_reason(result).starts_with("/b:"));
        assert!(!orchestrator.locks().is_locked(&p("/a")));

        drop(reader);
        assert_eq!(orchestrator.locks().table_len(), 0);
    }

    #[test]
    fn test_transfer_locks_in_path_order() {
        let orchestrator = permissive(transfer_gateway(&["/z"]));
        let low = orchestrator
            .locks()
            .acquire(&p("/a/x"), LockMode::Read, false);
        let high = orchestrator
            .locks()
            .acquire(&p("/z/x"), LockMode::Read, false);
        assert!(low.is_successful() && high.is_successful());

        // The destination sorts first, so it is the one reported
        let result = orchestrator.move_entry(&p("/z"), &p("/a"), &Principal::new("u"), true);
        assert!(rejection_reason(result).starts_with("/a:"));

        drop(low);
        drop(high);
        assert_eq!(orchestrator.locks().table_len(), 0);
    }

    #[test]
    fn test_move_treats_vanished_child_as_moved() {
        let mut fs = MockFilesystemGateway::new();
        fs.expect_exists().returning(|path| Ok(path.as_str() == "/src"));
        fs.expect_is_directory().returning(|path| match path.as_str() {
            "/src/gone" => Err(FsError::NotFound(path.to_string())),
            _ => Ok(true),
        });
        fs.expect_create_directory().times(1).returning(|_| Ok(()));
        fs.expect_list_children()
            .returning(|_| Ok(vec![NormalizedPath::parse("/src/gone").unwrap()]));
        fs.expect_remove_leaf()
            .withf(|path| path.as_str() == "/src")
            .times(1)
            .returning(|_| Ok(()));

        let orchestrator = permissive(fs);
        let result = orchestrator.move_entry(&p("/src"), &p("/dst"), &Principal::new("u"), true);
        assert_eq!(result, OpResult::Ok(()));
    }

    #[test]
    fn test_move_counts_destination_failure() {
        let mut fs = MockFilesystemGateway::new();
        fs.expect_exists().returning(|path| Ok(path.as_str() == "/src"));
        fs.expect_is_directory().returning(|_| Ok(true));
        fs.expect_create_directory()
            .returning(|path| Err(FsError::NotFound(path.to_string())));
        fs.expect_list_children().never();
        fs.expect_remove_leaf().never();

        let orchestrator = permissive(fs);
        let result = orchestrator.move_entry(&p("/src"), &p("/dst"), &Principal::new("u"), true);
        assert_eq!(result, OpResult::partial(1));
    }

    #[test]
    fn test_unexpected_exists_fault_is_generic() {
        let mut fs = MockFilesystemGateway::new();
        fs.expect_exists().returning(|path| {
            Err(FsError::Io {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "controller reset"),
            })
        });
        let orchestrator = SafeMutationOrchestrator::new(
            PathLockManager::new(),
            empty_index(),
            Arc::new(PathPolicy::permissive()),
            Arc::new(fs),
        );

        let result = orchestrator.delete(&p("/disk"), &Principal::new("u"), true);
        match result {
            OpResult::Error { message, failed } => {
                assert_eq!(failed, 0);
                assert!(!message.contains("controller"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_transfer_into_itself_rejected() {
        let fs = MockFilesystemGateway::new();
        let orchestrator = SafeMutationOrchestrator::new(
            PathLockManager::new(),
            empty_index(),
            Arc::new(PathPolicy::permissive()),
            Arc::new(fs),
        );
        let u = Principal::new("u");

        assert!(matches!(
            orchestrator.move_entry(&p("/a"), &p("/a/b"), &u, true),
            OpResult::Rejected { .. }
        ));
        assert!(matches!(
            orchestrator.copy(&p("/a"), &p("/a"), &u, true),
            OpResult::Rejected { .. }
        ));
    }

    #[test]
    fn test_outermost_collapses_nested_entries() {
        let completed = vec![
            (p("/a/b/c"), None),
            (p("/a-b"), None),
            (p("/a/b"), None),
            (p("/a/x"), None),
        ];
        let kept: Vec<String> = outermost(&completed)
            .into_iter()
            .map(|(path, _)| path.to_string())
            .collect();
        assert_eq!(kept, vec!["/a-b", "/a/b", "/a/x"]);
    }
}
