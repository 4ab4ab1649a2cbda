/*!
 * SQLite Filesystem Backend
 * Durable single-table record store
 *
 * One row per node keyed by a generated id, with a secondary index on
 * `parent_id` and uniqueness on `(name, parent_id)`. Every mutating call runs
 * in its own transaction.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

use super::paths::validate_name;
use super::observable::ListenerTable;
use super::traits::StorageBackend;
use super::types::*;
use crate::core::id::next_backend_id;
use crate::core::limits::DIRECTORY_MIME_TYPE;
use crate::core::types::BackendId;

/// Id of the root directory row
pub const ROOT_ID: &str = "root";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    parent_id TEXT,
    name TEXT NOT NULL,
    directory INTEGER NOT NULL,
    mime_type TEXT NOT NULL,
    icon TEXT,
    size INTEGER NOT NULL DEFAULT 0,
    created TEXT NOT NULL,
    last_modified TEXT NOT NULL,
    extra TEXT NOT NULL DEFAULT '{}',
    data BLOB,
    UNIQUE (name, parent_id)
);
CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id);
"#;

const COLUMNS: &str = "id, name, directory, mime_type, icon, size, created, last_modified, extra";

/// Row as stored, before timestamp and metadata decoding
struct StoredRow {
    id: String,
    name: String,
    directory: bool,
    mime_type: String,
    icon: Option<String>,
    size: i64,
    created: String,
    last_modified: String,
    extra: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            directory: row.get(2)?,
            mime_type: row.get(3)?,
            icon: row.get(4)?,
            size: row.get(5)?,
            created: row.get(6)?,
            last_modified: row.get(7)?,
            extra: row.get(8)?,
        })
    }

    fn into_record(self) -> VfsResult<NodeRecord> {
        let extra: Map<String, Value> = serde_json::from_str(&self.extra)?;
        Ok(NodeRecord {
            url: format!("sqlite:nodes/{}", self.id),
            id: self.id,
            name: self.name,
            directory: self.directory,
            icon: self.icon,
            size: self.size.max(0) as u64,
            mime_type: self.mime_type,
            created: parse_timestamp(&self.created)?,
            last_modified: parse_timestamp(&self.last_modified)?,
            extra,
        })
    }
}

fn parse_timestamp(value: &str) -> VfsResult<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| VfsError::Storage(format!("bad timestamp {}: {}", value, e)))
}

fn now_timestamp() -> VfsResult<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| VfsError::Storage(format!("cannot format timestamp: {}", e)))
}

/// SQLite-backed filesystem
#[derive(Clone)]
pub struct SqliteBackend {
    id: BackendId,
    listeners: Arc<ListenerTable>,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> VfsResult<Self> {
        info!(path = %path.as_ref().display(), "Opening durable store");
        Self::init(Connection::open(path)?)
    }

    /// Create an in-memory store (for testing)
    pub fn open_in_memory() -> VfsResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> VfsResult<Self> {
        conn.execute_batch(SCHEMA)?;
        let now = now_timestamp()?;
        conn.execute(
            "INSERT OR IGNORE INTO nodes (id, parent_id, name, directory, mime_type, created, last_modified)
             VALUES (?1, NULL, '', 1, ?2, ?3, ?3)",
            params![ROOT_ID, DIRECTORY_MIME_TYPE, now],
        )?;

        Ok(Self {
            id: next_backend_id(),
            listeners: Arc::new(ListenerTable::new()),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run blocking database work off the async executor
    async fn with_conn<T, F>(&self, work: F) -> VfsResult<T>
    where
        F: FnOnce(&mut Connection) -> VfsResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            work(&mut guard)
        })
        .await
        .map_err(|e| VfsError::Storage(format!("storage task failed: {}", e)))?
    }
}

fn fetch(conn: &Connection, id: &str) -> VfsResult<NodeRecord> {
    let sql = format!("SELECT {} FROM nodes WHERE id = ?1", COLUMNS);
    conn.query_row(&sql, params![id], StoredRow::from_row)
        .optional()?
        .ok_or_else(|| VfsError::NotFound(format!("sqlite node {}", id)))?
        .into_record()
}

fn fetch_directory(conn: &Connection, id: &str) -> VfsResult<NodeRecord> {
    let record = fetch(conn, id)?;
    if !record.directory {
        return Err(VfsError::NotSupported(format!("{} is not a directory", record.name)));
    }
    Ok(record)
}

fn insert_node(
    tx: &Transaction<'_>,
    parent: &str,
    name: &str,
    directory: bool,
    mime_type: &str,
    data: Option<&[u8]>,
) -> VfsResult<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_timestamp()?;
    let size = data.map(|d| d.len() as i64).unwrap_or(0);
    tx.execute(
        "INSERT INTO nodes (id, parent_id, name, directory, mime_type, size, created, last_modified, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8)",
        params![id, parent, name, directory, mime_type, size, now, data],
    )?;
    Ok(id)
}

/// Ids of `id` and everything below it, parents before children
fn subtree_ids(conn: &Connection, id: &str) -> VfsResult<Vec<(String, Option<String>)>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE sub(id, parent_id) AS (
             SELECT id, parent_id FROM nodes WHERE id = ?1
             UNION ALL
             SELECT n.id, n.parent_id FROM nodes n JOIN sub ON n.parent_id = sub.id
         )
         SELECT id, parent_id FROM sub",
    )?;
    let rows = stmt
        .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn kind(&self) -> &str {
        "sqlite"
    }

    fn listener_table(&self) -> &ListenerTable {
        &self.listeners
    }

    async fn root(&self) -> VfsResult<NodeRecord> {
        self.stat(ROOT_ID).await
    }

    async fn stat(&self, id: &str) -> VfsResult<NodeRecord> {
        let id = id.to_string();
        self.with_conn(move |conn| fetch(conn, &id)).await
    }

    async fn children(&self, id: &str) -> VfsResult<Vec<NodeRecord>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            fetch_directory(conn, &id)?;
            let sql = format!("SELECT {} FROM nodes WHERE parent_id = ?1", COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![id], StoredRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(StoredRow::into_record).collect()
        })
        .await
    }

    async fn read_content(&self, id: &str) -> VfsResult<Vec<u8>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let row: Option<(bool, Option<Vec<u8>>)> = conn
                .query_row(
                    "SELECT directory, data FROM nodes WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match row {
                None => Err(VfsError::NotFound(format!("sqlite node {}", id))),
                Some((true, _)) => Err(VfsError::NotSupported(format!("{} is a directory", id))),
                Some((false, data)) => Ok(data.unwrap_or_default()),
            }
        })
        .await
    }

    async fn write(&self, id: &str, data: &[u8]) -> VfsResult<Vec<u8>> {
        let id = id.to_string();
        let data = data.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let record = fetch(&tx, &id)?;
            if record.directory {
                return Err(VfsError::NotSupported(format!(
                    "cannot write directory {}",
                    record.name
                )));
            }
            tx.execute(
                "UPDATE nodes SET data = ?2, size = ?3, last_modified = ?4 WHERE id = ?1",
                params![id, data, data.len() as i64, now_timestamp()?],
            )?;
            tx.commit()?;
            Ok(data)
        })
        .await
    }

    async fn add_file(
        &self,
        parent: &str,
        data: &[u8],
        name: &str,
        mime_type: &str,
    ) -> VfsResult<NodeRecord> {
        validate_name(name)?;
        let (parent, data, name, mime_type) =
            (parent.to_string(), data.to_vec(), name.to_string(), mime_type.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            fetch_directory(&tx, &parent)?;
            let id = insert_node(&tx, &parent, &name, false, &mime_type, Some(&data))?;
            let record = fetch(&tx, &id)?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn add_directory(&self, parent: &str, name: &str) -> VfsResult<NodeRecord> {
        validate_name(name)?;
        let (parent, name) = (parent.to_string(), name.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            fetch_directory(&tx, &parent)?;
            let id = insert_node(&tx, &parent, &name, true, DIRECTORY_MIME_TYPE, None)?;
            let record = fetch(&tx, &id)?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn rename(&self, id: &str, new_name: &str) -> VfsResult<NodeRecord> {
        validate_name(new_name)?;
        let (id, new_name) = (id.to_string(), new_name.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE nodes SET name = ?2, last_modified = ?3 WHERE id = ?1",
                params![id, new_name, now_timestamp()?],
            )?;
            if changed == 0 {
                return Err(VfsError::NotFound(format!("sqlite node {}", id)));
            }
            let record = fetch(&tx, &id)?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn delete(&self, id: &str) -> VfsResult<()> {
        if id == ROOT_ID {
            return Err(VfsError::NotSupported("cannot delete the root directory".into()));
        }
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            fetch(&tx, &id)?;
            tx.execute(
                "WITH RECURSIVE sub(id) AS (
                     SELECT ?1
                     UNION ALL
                     SELECT n.id FROM nodes n JOIN sub ON n.parent_id = sub.id
                 )
                 DELETE FROM nodes WHERE id IN (SELECT id FROM sub)",
                params![id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn copy(&self, id: &str, target_parent: &str) -> VfsResult<NodeRecord> {
        let (id, target) = (id.to_string(), target_parent.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            fetch_directory(&tx, &target)?;

            // Snapshot the subtree first so a copy into the source's own
            // subtree never revisits freshly inserted rows
            let subtree = subtree_ids(&tx, &id)?;
            if subtree.is_empty() {
                return Err(VfsError::NotFound(format!("sqlite node {}", id)));
            }

            let now = now_timestamp()?;
            let mut mapping: HashMap<String, String> = HashMap::new();
            for (old_id, old_parent) in subtree {
                let new_parent = if old_id == id {
                    target.clone()
                } else {
                    old_parent
                        .and_then(|p| mapping.get(&p).cloned())
                        .ok_or_else(|| VfsError::Storage(format!("orphaned row {}", old_id)))?
                };
                let new_id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO nodes (id, parent_id, name, directory, mime_type, icon, size, created, last_modified, extra, data)
                     SELECT ?1, ?2, name, directory, mime_type, icon, size, ?3, ?3, extra, data
                     FROM nodes WHERE id = ?4",
                    params![new_id, new_parent, now, old_id],
                )?;
                mapping.insert(old_id, new_id);
            }

            let copy_id = mapping
                .get(&id)
                .cloned()
                .ok_or_else(|| VfsError::NotFound(format!("sqlite node {}", id)))?;
            let record = fetch(&tx, &copy_id)?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn move_node(&self, id: &str, target_parent: &str) -> VfsResult<NodeRecord> {
        if id == ROOT_ID {
            return Err(VfsError::NotSupported("cannot move the root directory".into()));
        }
        let (id, target) = (id.to_string(), target_parent.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let record = fetch(&tx, &id)?;
            fetch_directory(&tx, &target)?;

            let inside: i64 = tx.query_row(
                "WITH RECURSIVE up(id, parent_id) AS (
                     SELECT id, parent_id FROM nodes WHERE id = ?1
                     UNION ALL
                     SELECT n.id, n.parent_id FROM nodes n JOIN up ON n.id = up.parent_id
                 )
                 SELECT COUNT(*) FROM up WHERE id = ?2",
                params![target, id],
                |row| row.get(0),
            )?;
            if inside > 0 {
                return Err(VfsError::NotSupported(format!(
                    "cannot move {} into its own subtree",
                    record.name
                )));
            }

            tx.execute(
                "UPDATE nodes SET parent_id = ?2 WHERE id = ?1",
                params![id, target],
            )?;
            let record = fetch(&tx, &id)?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }
}
