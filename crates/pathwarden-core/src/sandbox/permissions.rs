//! Permission index with longest-matching-ancestor resolution
//!
//! The index mirrors the persisted permission records in a trie keyed by path
//! segment. Resolution walks the trie along the query path and keeps the
//! deepest node that carries any grant; only that node's grants are
//! considered, so a narrow (or empty) grant close to a file overrides a broad
//! grant higher up.
//!
//! Rebuilds construct a fresh [`IndexSnapshot`] and swap it in behind a
//! short-lived write lock. Readers clone the current `Arc` and never see a
//! half-built index.

use crate::error::Result;
use crate::path::NormalizedPath;
use crate::storage::PermissionStore;
use crate::types::*;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct IndexedGrant {
    permission_id: String,
    grantee: Grantee,
    permissions: PermissionSet,
}

#[derive(Debug, Default)]
struct TrieNode {
    grants: Vec<IndexedGrant>,
    children: HashMap<String, TrieNode>,
}

impl TrieNode {
    fn insert(&mut self, path: &NormalizedPath, grant: IndexedGrant) {
        let mut node = self;
        for segment in path.segments() {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.grants.push(grant);
    }
}

/// Immutable, fully built view of all grants
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    root: TrieNode,
    roles: HashMap<String, Role>,
    record_count: usize,
}

impl IndexSnapshot {
    /// Build a snapshot. Records whose entity is unknown are skipped.
    pub fn build(
        entities: Vec<FilesystemEntity>,
        records: Vec<PermissionRecord>,
        roles: Vec<Role>,
    ) -> Self {
        let paths: HashMap<String, NormalizedPath> = entities
            .into_iter()
            .map(|e| (e.entity_id, e.path))
            .collect();

        let mut root = TrieNode::default();
        let mut record_count = 0;
        for record in records {
            let Some(path) = paths.get(&record.entity_id) else {
                warn!(
                    permission_id = %record.permission_id,
                    entity_id = %record.entity_id,
                    "Skipping permission record for unknown entity"
                );
                continue;
            };
            root.insert(
                path,
                IndexedGrant {
                    permission_id: record.permission_id,
                    grantee: record.grantee,
                    permissions: record.permissions,
                },
            );
            record_count += 1;
        }

        Self {
            root,
            roles: roles.into_iter().map(|r| (r.role_id.clone(), r)).collect(),
            record_count,
        }
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn role(&self, role_id: &str) -> Option<&Role> {
        self.roles.get(role_id)
    }

    /// Effective permissions of `principal` on `path`, `None` when no record
    /// anchored at `path` or any of its ancestors applies.
    pub fn resolve(&self, path: &NormalizedPath, principal: &Principal) -> Option<PermissionView> {
        let mut node = &self.root;
        let mut deepest: Option<(&TrieNode, usize)> =
            (!node.grants.is_empty()).then_some((node, 0));

        for (depth, segment) in path.segments().enumerate() {
            match node.children.get(segment) {
                Some(child) => {
                    node = child;
                    if !node.grants.is_empty() {
                        deepest = Some((node, depth + 1));
                    }
                }
                None => break,
            }
        }

        let (node, depth) = deepest?;
        let anchor = anchor_at(path, depth);

        let applicable: Vec<&IndexedGrant> = node
            .grants
            .iter()
            .filter(|g| g.grantee.applies_to(principal))
            .collect();

        match applicable.as_slice() {
            [] => None,
            [single] => Some(PermissionView {
                id: ViewId::Record {
                    permission_id: single.permission_id.clone(),
                },
                anchor,
                permissions: single.permissions.clone(),
            }),
            many => {
                let mut permissions = PermissionSet::empty();
                let mut sources = Vec::with_capacity(many.len());
                for grant in many {
                    permissions.extend_from(&grant.permissions);
                    sources.push(grant.permission_id.clone());
                }
                sources.sort();
                Some(PermissionView {
                    id: ViewId::Synthetic { sources },
                    anchor,
                    permissions,
                })
            }
        }
    }

    /// Union of the role-level permissions of the principal's roles
    pub fn global_permissions(&self, principal: &Principal) -> PermissionSet {
        let mut set = PermissionSet::empty();
        for role_id in &principal.roles {
            if let Some(role) = self.roles.get(role_id) {
                set.extend_from(&role.permissions);
            }
        }
        set
    }
}

/// The first `depth` segments of `path`
fn anchor_at(path: &NormalizedPath, depth: usize) -> NormalizedPath {
    if depth == 0 {
        return NormalizedPath::root();
    }
    path.ancestors()
        .nth(depth)
        .and_then(|a| NormalizedPath::parse(a).ok())
        .unwrap_or_else(|| path.clone())
}

/// Shared permission index, rebuilt wholesale from the store
pub struct PermissionIndex {
    store: Arc<dyn PermissionStore>,
    snapshot: RwLock<Arc<IndexSnapshot>>,
}

impl PermissionIndex {
    /// Create an index with an empty snapshot; call
    /// [`load_from_database`](Self::load_from_database) to populate it.
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
        }
    }

    /// Create and populate an index
    pub fn load(store: Arc<dyn PermissionStore>) -> Result<Self> {
        let index = Self::new(store);
        index.load_from_database()?;
        Ok(index)
    }

    /// Reload every entity, record and role and publish a new snapshot.
    ///
    /// On failure the previous snapshot stays in place.
    pub fn load_from_database(&self) -> Result<()> {
        let started = Instant::now();

        let entities = self.store.load_all_entities()?;
        let records = self.store.load_all_permission_records()?;
        let roles = self.store.load_all_roles()?;
        let snapshot = IndexSnapshot::build(entities, records, roles);

        let record_count = snapshot.record_count();
        *self.snapshot.write() = Arc::new(snapshot);

        info!(
            records = record_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Permission index rebuilt"
        );
        Ok(())
    }

    /// Current snapshot; stays valid across later rebuilds
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn store(&self) -> &Arc<dyn PermissionStore> {
        &self.store
    }

    pub fn resolve(&self, path: &NormalizedPath, principal: &Principal) -> Option<PermissionView> {
        let view = self.snapshot().resolve(path, principal);
        debug!(
            %path,
            user = %principal.user_id,
            resolved = view.is_some(),
            "Resolved permissions"
        );
        view
    }

    /// Whether `permission` is granted; absent resolution means no access
    pub fn is_allowed(
        &self,
        path: &NormalizedPath,
        principal: &Principal,
        permission: Permission,
    ) -> bool {
        self.snapshot()
            .resolve(path, principal)
            .map(|view| view.contains(permission))
            .unwrap_or(false)
    }

    pub fn global_permissions(&self, principal: &Principal) -> PermissionSet {
        self.snapshot().global_permissions(principal)
    }

    pub fn record_count(&self) -> usize {
        self.snapshot().record_count()
    }
}

impl std::fmt::Debug for PermissionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionIndex")
            .field("records", &self.record_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{insert_entity, insert_permission_record, upsert_role, Storage};
    use pretty_assertions::assert_eq;

    fn p(raw: &str) -> NormalizedPath {
        NormalizedPath::parse(raw).unwrap()
    }

    struct Fixture {
        storage: Arc<Storage>,
        entities: HashMap<String, String>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                storage: Arc::new(Storage::in_memory().unwrap()),
                entities: HashMap::new(),
            }
        }

        fn grant(&mut self, path: &str, grantee: Grantee, perms: &[Permission]) -> String {
            let conn = self.storage.connection().unwrap();
            let entity_id = match self.entities.get(path) {
                Some(id) => id.clone(),
                None => {
                    let entity = FilesystemEntity::new(p(path));
                    insert_entity(&conn, &entity).unwrap();
                    self.entities.insert(path.to_string(), entity.entity_id.clone());
                    entity.entity_id
                }
            };
            if let Grantee::Role(role_id) = &grantee {
                upsert_role(&conn, &Role::new(role_id, role_id, PermissionSet::empty())).unwrap();
            }
            let record = PermissionRecord::new(entity_id, grantee, perms.iter().copied().collect());
            insert_permission_record(&conn, &record).unwrap();
            record.permission_id
        }

        fn index(&self) -> PermissionIndex {
            PermissionIndex::load(self.storage.clone()).unwrap()
        }
    }

    #[test]
    fn test_root_grant_applies_everywhere() {
        let mut fx = Fixture::new();
        let id = fx.grant("/", Grantee::User("u".into()), &[Permission::Read]);
        let index = fx.index();

        let view = index.resolve(&p("/random/folder"), &Principal::new("u")).unwrap();
        assert_eq!(view.permission_id(), Some(id.as_str()));
        assert_eq!(view.permissions, PermissionSet::from([Permission::Read]));
        assert_eq!(view.anchor, NormalizedPath::root());
    }

    #[test]
    fn test_nearest_empty_grant_wins() {
        let mut fx = Fixture::new();
        fx.grant("/", Grantee::User("u".into()), &[Permission::Read]);
        let deny = fx.grant("/home/wsl/test", Grantee::User("u".into()), &[]);
        let index = fx.index();
        let user = Principal::new("u");

        let view = index.resolve(&p("/home/wsl/test"), &user).unwrap();
        assert!(view.permissions.is_empty());
        assert_eq!(view.permission_id(), Some(deny.as_str()));

        let below = index.resolve(&p("/home/wsl/test/file.txt"), &user).unwrap();
        assert!(below.permissions.is_empty());
        assert!(!index.is_allowed(&p("/home/wsl/test/file.txt"), &user, Permission::Read));

        let sibling = index.resolve(&p("/home/wsl/other"), &user).unwrap();
        assert!(sibling.contains(Permission::Read));
    }

    #[test]
    fn test_segment_boundaries() {
        let mut fx = Fixture::new();
        fx.grant("/home", Grantee::User("u".into()), &[Permission::Write]);
        let index = fx.index();
        let user = Principal::new("u");

        assert!(index.resolve(&p("/home/x"), &user).is_some());
        assert!(index.resolve(&p("/homework"), &user).is_none());
        assert!(index.resolve(&p("/"), &user).is_none());
    }

    #[test]
    fn test_no_record_is_absent() {
        let fx = Fixture::new();
        let index = fx.index();
        assert!(index.resolve(&p("/anything"), &Principal::new("u")).is_none());
        assert!(!index.is_allowed(&p("/anything"), &Principal::new("u"), Permission::Read));
    }

    #[test]
    fn test_user_and_role_grants_merge_synthetically() {
        let mut fx = Fixture::new();
        let a = fx.grant("/share", Grantee::User("u".into()), &[Permission::Read]);
        let b = fx.grant("/share", Grantee::Role("editors".into()), &[Permission::Write]);
        fx.grant("/share", Grantee::Role("others".into()), &[Permission::Manage]);
        let index = fx.index();

        let view = index
            .resolve(&p("/share/doc"), &Principal::with_roles("u", ["editors"]))
            .unwrap();
        assert!(view.is_synthetic());
        assert_eq!(view.permission_id(), None);
        assert_eq!(
            view.permissions,
            PermissionSet::from([Permission::Read, Permission::Write])
        );
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(view.id, ViewId::Synthetic { sources: expected });
    }

    #[test]
    fn test_nearest_node_without_applicable_grant_is_absent() {
        let mut fx = Fixture::new();
        fx.grant("/", Grantee::User("u".into()), &[Permission::Read]);
        fx.grant("/private", Grantee::User("someone-else".into()), &[Permission::Read]);
        let index = fx.index();

        assert!(index.resolve(&p("/private/x"), &Principal::new("u")).is_none());
        assert!(index.resolve(&p("/public"), &Principal::new("u")).is_some());
    }

    #[test]
    fn test_global_role_permissions() {
        let storage = Arc::new(Storage::in_memory().unwrap());
        {
            let conn = storage.connection().unwrap();
            upsert_role(&conn, &Role::new("admins", "Admins", PermissionSet::from([Permission::Manage])))
                .unwrap();
            upsert_role(&conn, &Role::new("uploaders", "Uploaders", PermissionSet::from([Permission::Upload])))
                .unwrap();
        }
        let index = PermissionIndex::load(storage).unwrap();

        let set = index.global_permissions(&Principal::with_roles("u", ["admins", "uploaders", "ghost"]));
        assert_eq!(set, PermissionSet::from([Permission::Upload, Permission::Manage]));
        assert!(index.global_permissions(&Principal::new("u")).is_empty());
    }

    #[test]
    fn test_records_for_unknown_entities_are_skipped() {
        let snapshot = IndexSnapshot::build(
            vec![],
            vec![PermissionRecord::new(
                "missing",
                Grantee::User("u".into()),
                PermissionSet::all(),
            )],
            vec![],
        );
        assert_eq!(snapshot.record_count(), 0);
        assert!(snapshot.resolve(&p("/"), &Principal::new("u")).is_none());
    }

    #[test]
    fn test_rebuild_swaps_snapshot() {
        let mut fx = Fixture::new();
        fx.grant("/", Grantee::User("u".into()), &[Permission::Read]);
        let index = fx.index();
        let old = index.snapshot();

        fx.grant("/docs", Grantee::User("u".into()), &[Permission::Write]);
        index.load_from_database().unwrap();

        assert_eq!(old.record_count(), 1);
        assert_eq!(index.record_count(), 2);
        let view = index.resolve(&p("/docs/a"), &Principal::new("u")).unwrap();
        assert_eq!(view.anchor, p("/docs"));
        assert!(!old.resolve(&p("/docs/a"), &Principal::new("u")).unwrap().contains(Permission::Write));
    }

    #[test]
    fn test_concurrent_resolve_during_rebuild() {
        let mut fx = Fixture::new();
        fx.grant("/", Grantee::User("u".into()), &[Permission::Read]);
        let index = Arc::new(fx.index());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let index = index.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let view = index.resolve(&p("/a/b"), &Principal::new("u"));
                        assert!(view.unwrap().contains(Permission::Read));
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            index.load_from_database().unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
