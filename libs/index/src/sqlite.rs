//! SQLite-backed location index.
//!
//! Each (image, node) pair is one row; an image with no rows has no record.
//! Rows carry an autoincrement id so holders come back in recording order.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use imgfleet_id::{ImageName, NodeAddress};
use rusqlite::{params, Connection};
use tracing::debug;

use crate::{IndexError, LocationIndex};

/// Durable location index stored in a SQLite database.
///
/// Statements run on the blocking thread pool. Mutations touching more than
/// one row run inside a transaction, so they are atomic per image.
#[derive(Clone)]
pub struct SqliteLocationIndex {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLocationIndex {
    /// Open or create an index at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::from_connection(conn)
    }

    /// Open an in-memory index (for testing).
    pub fn open_in_memory() -> Result<Self, IndexError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, IndexError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, IndexError>
    where
        F: FnOnce(&mut Connection) -> Result<T, IndexError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| IndexError::Internal("connection lock poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| IndexError::Internal(format!("index task failed: {e}")))?
    }
}

fn init_schema(conn: &Connection) -> Result<(), IndexError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS image_holders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            image TEXT NOT NULL,
            node_address TEXT NOT NULL,
            recorded_at INTEGER NOT NULL,
            UNIQUE (image, node_address)
        );

        CREATE INDEX IF NOT EXISTS idx_image_holders_image ON image_holders(image);
        "#,
    )?;

    debug!("Location index schema initialized");
    Ok(())
}

fn insert_holder(conn: &Connection, image: &str, address: &str, now: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO image_holders (image, node_address, recorded_at) VALUES (?1, ?2, ?3)",
        params![image, address, now],
    )
}

#[async_trait]
impl LocationIndex for SqliteLocationIndex {
    async fn retrieve_holders(&self, image: &ImageName) -> Result<Vec<NodeAddress>, IndexError> {
        let image = image.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT node_address FROM image_holders WHERE image = ?1 ORDER BY id",
            )?;
            let raw = stmt
                .query_map(params![image.as_str()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            if raw.is_empty() {
                return Err(IndexError::NotFound(image.to_string()));
            }

            raw.into_iter()
                .map(|s| {
                    NodeAddress::parse(s)
                        .map_err(|e| IndexError::Corrupt(format!("holder of {image}: {e}")))
                })
                .collect()
        })
        .await
    }

    async fn record_holder(
        &self,
        image: &ImageName,
        address: &NodeAddress,
    ) -> Result<(), IndexError> {
        let image = image.clone();
        let address = address.clone();
        self.with_conn(move |conn| {
            let now = chrono::Utc::now().timestamp();
            let inserted = insert_holder(conn, image.as_str(), address.as_str(), now)?;
            if inserted > 0 {
                debug!(image = %image, node = %address, "Recorded image holder");
            }
            Ok(())
        })
        .await
    }

    async fn forget_image(&self, image: &ImageName) -> Result<(), IndexError> {
        let image = image.clone();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM image_holders WHERE image = ?1",
                params![image.as_str()],
            )?;
            debug!(image = %image, removed, "Forgot image");
            Ok(())
        })
        .await
    }

    async fn replace_holders(
        &self,
        image: &ImageName,
        addresses: &[NodeAddress],
    ) -> Result<(), IndexError> {
        let image = image.clone();
        let addresses = addresses.to_vec();
        self.with_conn(move |conn| {
            let now = chrono::Utc::now().timestamp();
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM image_holders WHERE image = ?1",
                params![image.as_str()],
            )?;
            for address in &addresses {
                insert_holder(&tx, image.as_str(), address.as_str(), now)?;
            }
            tx.commit()?;

            debug!(image = %image, count = addresses.len(), "Replaced image holders");
            Ok(())
        })
        .await
    }

    async fn list_images(&self) -> Result<Vec<ImageName>, IndexError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT image FROM image_holders ORDER BY image")?;
            let raw = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            raw.into_iter()
                .map(|s| ImageName::parse(s).map_err(|e| IndexError::Corrupt(e.to_string())))
                .collect()
        })
        .await
    }
}
