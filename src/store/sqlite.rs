//! SQLite-backed scholar registry

use super::traits::{
    is_valid_scholar_id, OpenRegistry, ScholarRegistry, StorageError, StorageResult,
};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Registry of Google Scholar user ids in a single SQLite file.
///
/// Thread-safe via internal mutex on the connection.
pub struct SqliteRegistry {
    conn: Mutex<Connection>,
}

impl SqliteRegistry {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scholar_users (
                id TEXT PRIMARY KEY,
                added_at TEXT NOT NULL
            );

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OpenRegistry for SqliteRegistry {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ScholarRegistry for SqliteRegistry {
    fn ping(&self) -> StorageResult<()> {
        self.conn()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn list_user_ids(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id FROM scholar_users ORDER BY rowid")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn add_user(&self, id: &str) -> StorageResult<bool> {
        let id = id.trim();
        if !is_valid_scholar_id(id) {
            return Err(StorageError::InvalidScholarId(id.to_string()));
        }

        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO scholar_users (id, added_at) VALUES (?1, ?2)",
            params![id, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    fn remove_user(&self, id: &str) -> StorageResult<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM scholar_users WHERE id = ?1", params![id.trim()])?;
        Ok(removed > 0)
    }
}
