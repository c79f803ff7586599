//! Database query implementations

use crate::error::{Result, StorageError};
use crate::path::NormalizedPath;
use crate::types::*;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

// ===== Entity Queries =====

/// Insert a tracked entity
pub fn insert_entity(conn: &Connection, entity: &FilesystemEntity) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO entities (entity_id, path, inode, filesystem_supported, owner_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
        params![
            entity.entity_id,
            entity.path.as_str(),
            entity.inode.map(|i| i as i64),
            entity.is_filesystem_supported,
            entity.owner_id,
        ],
    )
    .map_err(|e| duplicate_or_db(e, &entity.path.to_string()))?;

    Ok(())
}

/// Get entity by ID
pub fn get_entity(conn: &Connection, entity_id: &str) -> Result<Option<FilesystemEntity>> {
    let entity = conn
        .query_row(
            "SELECT entity_id, path, inode, filesystem_supported, owner_id FROM entities WHERE entity_id = ?",
            params![entity_id],
            row_to_entity,
        )
        .optional()?;
    Ok(entity)
}

/// Get entity by its current path
pub fn find_entity_by_path(
    conn: &Connection,
    path: &NormalizedPath,
) -> Result<Option<FilesystemEntity>> {
    let entity = conn
        .query_row(
            "SELECT entity_id, path, inode, filesystem_supported, owner_id FROM entities WHERE path = ?",
            params![path.as_str()],
            row_to_entity,
        )
        .optional()?;
    Ok(entity)
}

/// List all tracked entities
pub fn list_entities(conn: &Connection) -> Result<Vec<FilesystemEntity>> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, path, inode, filesystem_supported, owner_id FROM entities ORDER BY path",
    )?;
    let entities = stmt
        .query_map([], row_to_entity)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entities)
}

/// Point every entity at or under `from` to the same place under `to`.
///
/// Stale entities already tracked at or under `to` are dropped first.
pub fn relocate_entities(
    conn: &Connection,
    from: &NormalizedPath,
    to: &NormalizedPath,
) -> Result<usize> {
    let entities = list_entities(conn)?;
    let tx = conn.unchecked_transaction()?;

    for stale in entities.iter().filter(|e| e.path.starts_with(to)) {
        tx.execute(
            "DELETE FROM entities WHERE entity_id = ?",
            params![stale.entity_id],
        )?;
    }

    let mut moved = 0;
    for entity in &entities {
        if entity.path.starts_with(to) {
            continue;
        }
        if let Some(new_path) = entity.path.rebase(from, to) {
            tx.execute(
                "UPDATE entities SET path = ? WHERE entity_id = ?",
                params![new_path.as_str(), entity.entity_id],
            )?;
            moved += 1;
        }
    }

    tx.commit()?;
    Ok(moved)
}

/// Delete every entity at or under `under`; their grants cascade
pub fn forget_entities(conn: &Connection, under: &NormalizedPath) -> Result<usize> {
    let entities = list_entities(conn)?;
    let tx = conn.unchecked_transaction()?;

    let mut removed = 0;
    for entity in entities.iter().filter(|e| e.path.starts_with(under)) {
        removed += tx.execute(
            "DELETE FROM entities WHERE entity_id = ?",
            params![entity.entity_id],
        )?;
    }

    tx.commit()?;
    Ok(removed)
}

// ===== Role Queries =====

/// Insert or replace a role
pub fn upsert_role(conn: &Connection, role: &Role) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO roles (role_id, name, permissions)
        VALUES (?, ?, ?)
        ON CONFLICT(role_id) DO UPDATE SET name = excluded.name, permissions = excluded.permissions
        "#,
        params![
            role.role_id,
            role.name,
            serde_json::to_string(&role.permissions)?,
        ],
    )
    .map_err(|e| duplicate_or_db(e, &role.name))?;
    Ok(())
}

/// List all roles
pub fn list_roles(conn: &Connection) -> Result<Vec<Role>> {
    let mut stmt = conn.prepare("SELECT role_id, name, permissions FROM roles ORDER BY role_id")?;
    let roles = stmt
        .query_map([], |row| {
            Ok(Role {
                role_id: row.get(0)?,
                name: row.get(1)?,
                permissions: json_column(row, 2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(roles)
}

/// Delete a role; its grants cascade
pub fn delete_role(conn: &Connection, role_id: &str) -> Result<()> {
    let affected = conn.execute("DELETE FROM roles WHERE role_id = ?", params![role_id])?;
    if affected == 0 {
        return Err(StorageError::NotFound(format!("role {}", role_id)).into());
    }
    Ok(())
}

// ===== Permission Record Queries =====

/// Insert a permission record
pub fn insert_permission_record(conn: &Connection, record: &PermissionRecord) -> Result<()> {
    let (user_id, role_id) = match &record.grantee {
        Grantee::User(id) => (Some(id.as_str()), None),
        Grantee::Role(id) => (None, Some(id.as_str())),
    };
    let scope = match record.grantee.scope() {
        GrantScope::User => "user",
        GrantScope::Role => "role",
    };

    conn.execute(
        r#"
        INSERT INTO permission_records (permission_id, scope, entity_id, user_id, role_id, permissions, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            record.permission_id,
            scope,
            record.entity_id,
            user_id,
            role_id,
            serde_json::to_string(&record.permissions)?,
            record.created_at.to_rfc3339(),
        ],
    )
    .map_err(|e| duplicate_or_db(e, &record.permission_id))?;

    Ok(())
}

/// Replace the permission set of an existing record
pub fn update_permission_set(
    conn: &Connection,
    permission_id: &str,
    permissions: &PermissionSet,
) -> Result<()> {
    let affected = conn.execute(
        "UPDATE permission_records SET permissions = ? WHERE permission_id = ?",
        params![serde_json::to_string(permissions)?, permission_id],
    )?;
    if affected == 0 {
        return Err(StorageError::NotFound(format!("permission {}", permission_id)).into());
    }
    Ok(())
}

/// List all permission records
pub fn list_permission_records(conn: &Connection) -> Result<Vec<PermissionRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT permission_id, scope, entity_id, user_id, role_id, permissions, created_at
        FROM permission_records
        ORDER BY created_at
        "#,
    )?;
    let records = stmt
        .query_map([], row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// List permission records anchored at one entity
pub fn list_permission_records_for_entity(
    conn: &Connection,
    entity_id: &str,
) -> Result<Vec<PermissionRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT permission_id, scope, entity_id, user_id, role_id, permissions, created_at
        FROM permission_records
        WHERE entity_id = ?
        ORDER BY created_at
        "#,
    )?;
    let records = stmt
        .query_map(params![entity_id], row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// Delete a permission record
pub fn delete_permission_record(conn: &Connection, permission_id: &str) -> Result<()> {
    let affected = conn.execute(
        "DELETE FROM permission_records WHERE permission_id = ?",
        params![permission_id],
    )?;
    if affected == 0 {
        return Err(StorageError::NotFound(format!("permission {}", permission_id)).into());
    }
    Ok(())
}

// ===== Helper Functions =====

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<FilesystemEntity> {
    let raw_path: String = row.get(1)?;
    let path = NormalizedPath::parse(&raw_path)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(FilesystemEntity {
        entity_id: row.get(0)?,
        path,
        inode: row.get::<_, Option<i64>>(2)?.map(|i| i as u64),
        is_filesystem_supported: row.get(3)?,
        owner_id: row.get(4)?,
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<PermissionRecord> {
    let scope: String = row.get(1)?;
    let grantee = match scope.as_str() {
        "user" => Grantee::User(row.get(3)?),
        "role" => Grantee::Role(row.get(4)?),
        other => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                1,
                Type::Text,
                format!("unknown scope {:?}", other).into(),
            ))
        }
    };

    let created_at: String = row.get(6)?;
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?
        .with_timezone(&chrono::Utc);

    Ok(PermissionRecord {
        permission_id: row.get(0)?,
        entity_id: row.get(2)?,
        grantee,
        permissions: json_column(row, 5)?,
        created_at,
    })
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn duplicate_or_db(err: rusqlite::Error, key: &str) -> crate::error::Error {
    match err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StorageError::DuplicateKey(key.to_string()).into()
        }
        other => other.into(),
    }
}
