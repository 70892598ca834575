//! Schema versioning for the tabquota database.
//!
//! Each migration runs once, in version order, and is recorded in the
//! `migrations` table. All pending migrations are applied in one transaction.
//!
//! Progress is logged through `tracing` rather than printed: migrations also
//! run when the native host opens the database, and its stdout belongs to the
//! browser.

use crate::libs::messages::Message;
use anyhow::Result;
use rusqlite::{params, Connection, Transaction};
use tracing::{debug, error, info};

const MIGRATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS migrations (
    id INTEGER PRIMARY KEY,
    version INTEGER NOT NULL UNIQUE,
    name TEXT NOT NULL,
    applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

#[derive(Debug, Clone)]
struct Migration {
    version: u32,
    name: &'static str,
    up: fn(&Transaction) -> Result<()>,
}

pub struct MigrationManager {
    migrations: Vec<Migration>,
}

impl MigrationManager {
    pub fn new() -> Self {
        let mut manager = Self { migrations: Vec::new() };
        manager.register_migrations();
        manager
    }

    fn register_migrations(&mut self) {
        // Version 1: key-value table holding the serialized rule collection
        self.add_migration(1, "create_kv_table", |tx| {
            tx.execute(
                "CREATE TABLE IF NOT EXISTS kv (
                    key TEXT NOT NULL PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                )",
                [],
            )?;
            Ok(())
        });
    }

    fn add_migration(&mut self, version: u32, name: &'static str, up: fn(&Transaction) -> Result<()>) {
        self.migrations.push(Migration { version, name, up });
    }

    pub fn run_migrations(&self, conn: &mut Connection) -> Result<()> {
        conn.execute(MIGRATIONS_TABLE, [])?;

        let current_version = self.get_current_version(conn)?;
        let pending: Vec<&Migration> = self.migrations.iter().filter(|m| m.version > current_version).collect();

        if pending.is_empty() {
            debug!("database is up to date");
            return Ok(());
        }

        info!("{}", Message::MigrationsFound(pending.len()));

        let tx = conn.transaction()?;
        for migration in pending {
            info!("{}", Message::RunningMigration(migration.version, migration.name.to_string()));

            if let Err(e) = (migration.up)(&tx) {
                error!("{}", Message::MigrationFailed(migration.version, e.to_string()));
                return Err(e);
            }
            tx.execute(
                "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
                params![migration.version, migration.name],
            )?;
            debug!("{}", Message::MigrationCompleted(migration.version));
        }
        tx.commit()?;
        info!("{}", Message::AllMigrationsCompleted);

        Ok(())
    }

    fn get_current_version(&self, conn: &Connection) -> Result<u32> {
        let version: Option<u32> = conn.query_row("SELECT MAX(version) FROM migrations", [], |row| row.get(0))?;
        Ok(version.unwrap_or(0))
    }

    fn latest_version(&self) -> u32 {
        self.migrations.last().map(|m| m.version).unwrap_or(0)
    }
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

pub fn init_with_migrations(conn: &mut Connection) -> Result<()> {
    MigrationManager::new().run_migrations(conn)
}

/// Schema version recorded in `conn`, 0 for a fresh database.
pub fn get_db_version(conn: &Connection) -> Result<u32> {
    conn.execute(MIGRATIONS_TABLE, [])?;
    MigrationManager::new().get_current_version(conn)
}

pub fn needs_migration(conn: &Connection) -> Result<bool> {
    let manager = MigrationManager::new();
    Ok(get_db_version(conn)? < manager.latest_version())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_is_migrated_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert!(needs_migration(&conn).unwrap());

        init_with_migrations(&mut conn).unwrap();
        assert!(!needs_migration(&conn).unwrap());
        assert_eq!(get_db_version(&conn).unwrap(), 1);

        // second run is a no-op
        init_with_migrations(&mut conn).unwrap();
        let applied: i64 = conn.query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0)).unwrap();
        assert_eq!(applied, 1);
    }
}
