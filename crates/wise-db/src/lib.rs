pub mod migrations;
pub mod queries;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use wise_core::{LocalStore, StoreError};

/// Local key-value cache on a single SQLite connection.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }
}

fn local_error(e: anyhow::Error) -> StoreError {
    StoreError::Local(format!("{:#}", e))
}

impl LocalStore for Database {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.get_value(key).map_err(local_error)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put_value(key, value).map_err(local_error)
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.delete_value(key).map(|_| ()).map_err(local_error)
    }
}
