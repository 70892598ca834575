use crate::db::migrations::init_with_migrations;
use crate::libs::data_storage::DataStorage;
use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "tabquota.db";

pub struct Db {
    pub conn: Connection,
}

impl Db {
    /// Opens the database in the application data directory.
    pub fn new() -> Result<Db> {
        let db_file_path = DataStorage::new().get_path(DB_FILE_NAME)?;
        Self::open(db_file_path)
    }

    /// Opens (or creates) a database at `path` and brings its schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Db> {
        let mut conn = Connection::open(path)?;
        // the CLI and the running host may touch the file at the same time
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        init_with_migrations(&mut conn)?;

        Ok(Db { conn })
    }

    pub fn open_in_memory() -> Result<Db> {
        let mut conn = Connection::open_in_memory()?;
        init_with_migrations(&mut conn)?;

        Ok(Db { conn })
    }
}
