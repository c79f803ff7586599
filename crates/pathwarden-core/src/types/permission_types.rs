//! Permission, grant and principal types

use crate::path::NormalizedPath;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// A single capability on a filesystem entity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Create,
    Delete,
    Move,
    Copy,
    Upload,
    Download,
    Share,
    Manage,
}

impl Permission {
    pub const ALL: [Permission; 10] = [
        Permission::Read,
        Permission::Write,
        Permission::Create,
        Permission::Delete,
        Permission::Move,
        Permission::Copy,
        Permission::Upload,
        Permission::Download,
        Permission::Share,
        Permission::Manage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Create => "create",
            Permission::Delete => "delete",
            Permission::Move => "move",
            Permission::Copy => "copy",
            Permission::Upload => "upload",
            Permission::Download => "download",
            Permission::Share => "share",
            Permission::Manage => "manage",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown permission: {}", s))
    }
}

/// Ordered set of permissions. An empty set is an explicit "no access".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Permission::ALL.into_iter().collect()
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    /// Merge `other` into `self`
    pub fn extend_from(&mut self, other: &PermissionSet) {
        self.0.extend(other.0.iter().copied());
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Permission; N]> for PermissionSet {
    fn from(value: [Permission; N]) -> Self {
        value.into_iter().collect()
    }
}

/// Who a permission record is granted to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "scope", content = "id", rename_all = "lowercase")]
pub enum Grantee {
    User(String),
    Role(String),
}

impl Grantee {
    pub fn scope(&self) -> GrantScope {
        match self {
            Grantee::User(_) => GrantScope::User,
            Grantee::Role(_) => GrantScope::Role,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Grantee::User(id) | Grantee::Role(id) => id,
        }
    }

    /// Whether this grant applies to the given principal
    pub fn applies_to(&self, principal: &Principal) -> bool {
        match self {
            Grantee::User(id) => *id == principal.user_id,
            Grantee::Role(id) => principal.roles.contains(id),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GrantScope {
    User,
    Role,
}

/// A grant of a permission set to a user or role, anchored at an entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRecord {
    pub permission_id: String,
    pub entity_id: String,
    pub grantee: Grantee,
    pub permissions: PermissionSet,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl PermissionRecord {
    /// Create a new record with a fresh id
    pub fn new(entity_id: impl Into<String>, grantee: Grantee, permissions: PermissionSet) -> Self {
        Self {
            permission_id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            grantee,
            permissions,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Role with its globally granted permissions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub role_id: String,
    pub name: String,
    pub permissions: PermissionSet,
}

impl Role {
    pub fn new(role_id: impl Into<String>, name: impl Into<String>, permissions: PermissionSet) -> Self {
        Self {
            role_id: role_id.into(),
            name: name.into(),
            permissions,
        }
    }
}

/// Caller identity, supplied by the auth layer on every call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub roles: HashSet<String>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: HashSet::new(),
        }
    }

    pub fn with_roles<I, S>(user_id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id: user_id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

/// Identity of a resolved permission view
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ViewId {
    /// Exactly one record matched; this is its `permission_id`
    Record { permission_id: String },
    /// Several records matched at the same depth and were merged
    Synthetic { sources: Vec<String> },
}

/// Result of a permission resolution
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionView {
    pub id: ViewId,
    /// Path the matched record(s) are anchored at
    pub anchor: NormalizedPath,
    pub permissions: PermissionSet,
}

impl PermissionView {
    pub fn contains(&self, permission: Permission) -> bool {
        self.permissions.contains(permission)
    }

    pub fn permission_id(&self) -> Option<&str> {
        match &self.id {
            ViewId::Record { permission_id } => Some(permission_id),
            ViewId::Synthetic { .. } => None,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self.id, ViewId::Synthetic { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_set_serializes_as_names() {
        let set = PermissionSet::from([Permission::Delete, Permission::Read]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["read","delete"]"#);

        let back: PermissionSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);

        let empty: PermissionSet = serde_json::from_str("[]").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_grantee_applies_to() {
        let principal = Principal::with_roles("u1", ["editors"]);
        assert!(Grantee::User("u1".into()).applies_to(&principal));
        assert!(!Grantee::User("u2".into()).applies_to(&principal));
        assert!(Grantee::Role("editors".into()).applies_to(&principal));
        assert!(!Grantee::Role("admins".into()).applies_to(&principal));
    }

    #[test]
    fn test_permission_from_str() {
        assert_eq!("DELETE".parse::<Permission>().unwrap(), Permission::Delete);
        assert!("fly".parse::<Permission>().is_err());
    }
}
