//! Database migrations

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    info!("Running database migrations");

    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )?;

    let migrations: Vec<(&str, &str)> = vec![
        ("001_initial", MIGRATION_001_INITIAL),
        ("002_permission_lookup", MIGRATION_002_PERMISSION_LOOKUP),
    ];

    for (name, sql) in migrations {
        if !migration_applied(conn, name)? {
            debug!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            mark_migration_applied(conn, name)?;
            info!("Applied migration: {}", name);
        }
    }

    info!("All migrations completed");
    Ok(())
}

fn migration_applied(conn: &Connection, name: &str) -> Result<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM migrations WHERE name = ?",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn mark_migration_applied(conn: &Connection, name: &str) -> Result<()> {
    conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    Ok(())
}

const MIGRATION_001_INITIAL: &str = r#"
-- Tracked filesystem entities
CREATE TABLE IF NOT EXISTS entities (
    entity_id TEXT PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    inode INTEGER,
    filesystem_supported INTEGER NOT NULL DEFAULT 1,
    owner_id TEXT
);

-- Roles with global permissions
CREATE TABLE IF NOT EXISTS roles (
    role_id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    permissions TEXT NOT NULL DEFAULT '[]'
);

-- Per-entity grants to a user or a role
CREATE TABLE IF NOT EXISTS permission_records (
    permission_id TEXT PRIMARY KEY,
    scope TEXT NOT NULL CHECK (scope IN ('user', 'role')),
    entity_id TEXT NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    user_id TEXT,
    role_id TEXT REFERENCES roles(role_id) ON DELETE CASCADE,
    permissions TEXT NOT NULL,
    created_at DATETIME NOT NULL,
    CHECK (
        (scope = 'user' AND user_id IS NOT NULL AND role_id IS NULL) OR
        (scope = 'role' AND role_id IS NOT NULL AND user_id IS NULL)
    )
);
"#;

const MIGRATION_002_PERMISSION_LOOKUP: &str = r#"
CREATE INDEX IF NOT EXISTS idx_permission_records_entity ON permission_records(entity_id);
CREATE INDEX IF NOT EXISTS idx_permission_records_user ON permission_records(user_id);
CREATE INDEX IF NOT EXISTS idx_permission_records_role ON permission_records(role_id);
CREATE INDEX IF NOT EXISTS idx_entities_inode ON entities(inode);
"#;
