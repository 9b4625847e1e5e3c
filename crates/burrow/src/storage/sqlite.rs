//! SQLite storage engine: one database file per workspace.
//!
//! Every operation runs as one transaction on a blocking thread, so a failed
//! multi-node change (recursive remove, move, import) leaves no trace.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::tree::{self, subtree_prefix, NodeTable};
use super::{DirEntry, Metadata, Node, NodeType, StorageEngine, TreeImage};
use crate::error::{Error, Result};
use crate::navigation::path::ROOT;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS nodes (
        path TEXT PRIMARY KEY NOT NULL,
        is_dir INTEGER NOT NULL,
        data BLOB,
        modified INTEGER
    );
    INSERT OR IGNORE INTO nodes (path, is_dir, data, modified) VALUES ('/', 1, NULL, NULL);
";

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(format!("sqlite: {err}"))
    }
}

/// A workspace tree stored in a SQLite database file.
pub struct SqliteEngine {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngine")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqliteEngine {
    /// Open (creating if needed) the database at `db_path`.
    pub async fn open(db_path: PathBuf) -> Result<Self> {
        let path = db_path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::from_io(ROOT, &e))?;
            }
            let conn = Connection::open(&path)?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(join_error)??;

        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` inside one transaction, committing only on success.
    async fn transact<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqlTable<'_>) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| Error::Storage("sqlite connection lock poisoned".to_string()))?;
            let tx = conn.transaction()?;
            let value = f(&mut SqlTable { conn: &tx })?;
            tx.commit()?;
            Ok(value)
        })
        .await
        .map_err(join_error)?
    }
}

fn join_error(err: tokio::task::JoinError) -> Error {
    Error::Storage(format!("storage task failed: {err}"))
}

fn to_node(is_dir: bool, data: Option<Vec<u8>>, modified: Option<i64>) -> Node {
    if is_dir {
        return Node::Directory;
    }
    Node::File {
        data: data.unwrap_or_default(),
        modified: from_millis(modified),
    }
}

fn to_metadata(is_dir: bool, size: Option<i64>, modified: Option<i64>) -> Metadata {
    if is_dir {
        return Metadata::directory();
    }
    Metadata {
        node_type: NodeType::File,
        size: size.unwrap_or(0).max(0) as u64,
        modified: Some(from_millis(modified)),
    }
}

fn from_millis(millis: Option<i64>) -> DateTime<Utc> {
    millis
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}

struct SqlTable<'a> {
    conn: &'a Connection,
}

impl NodeTable for SqlTable<'_> {
    fn node(&self, path: &str) -> Result<Option<Node>> {
        Ok(self
            .conn
            .query_row(
                "SELECT is_dir, data, modified FROM nodes WHERE path = ?1",
                params![path],
                |row| Ok(to_node(row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?)
    }

    fn put(&mut self, path: &str, node: Node) -> Result<()> {
        match node {
            Node::Directory => self.conn.execute(
                "INSERT OR REPLACE INTO nodes (path, is_dir, data, modified) VALUES (?1, 1, NULL, NULL)",
                params![path],
            )?,
            Node::File { data, modified } => self.conn.execute(
                "INSERT OR REPLACE INTO nodes (path, is_dir, data, modified) VALUES (?1, 0, ?2, ?3)",
                params![path, data, modified.timestamp_millis()],
            )?,
        };
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM nodes WHERE path = ?1", params![path])?;
        Ok(())
    }

    fn descendants(&self, dir: &str) -> Result<Vec<(String, Node)>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, is_dir, data, modified FROM nodes
             WHERE substr(path, 1, length(?1)) = ?1 AND path != '/'
             ORDER BY path",
        )?;
        let rows = stmt.query_map(params![subtree_prefix(dir)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                to_node(row.get(1)?, row.get(2)?, row.get(3)?),
            ))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn metadata(&self, path: &str) -> Result<Option<Metadata>> {
        Ok(self
            .conn
            .query_row(
                "SELECT is_dir, length(data), modified FROM nodes WHERE path = ?1",
                params![path],
                |row| Ok(to_metadata(row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?)
    }

    fn children(&self, dir: &str) -> Result<Vec<(String, Metadata)>> {
        let prefix = subtree_prefix(dir);
        let mut stmt = self.conn.prepare(
            "SELECT substr(path, length(?1) + 1), is_dir, length(data), modified FROM nodes
             WHERE substr(path, 1, length(?1)) = ?1 AND path != '/'
               AND instr(substr(path, length(?1) + 1), '/') = 0
             ORDER BY path",
        )?;
        let rows = stmt.query_map(params![prefix], |row| {
            Ok((
                row.get::<_, String>(0)?,
                to_metadata(row.get(1)?, row.get(2)?, row.get(3)?),
            ))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[async_trait]
impl StorageEngine for SqliteEngine {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = path.to_string();
        self.transact(move |t| tree::read(&*t, &path)).await
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let path = path.to_string();
        let data = data.to_vec();
        self.transact(move |t| tree::write(t, &path, &data)).await
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let path = path.to_string();
        self.transact(move |t| tree::list(&*t, &path)).await
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let path = path.to_string();
        self.transact(move |t| tree::stat(&*t, &path)).await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.transact(move |t| tree::mkdir(t, &path)).await
    }

    async fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        let path = path.to_string();
        self.transact(move |t| tree::remove(t, &path, recursive))
            .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (from, to) = (from.to_string(), to.to_string());
        self.transact(move |t| tree::rename(t, &from, &to)).await
    }

    async fn copy(&self, from: &str, to: &str, recursive: bool) -> Result<()> {
        let (from, to) = (from.to_string(), to.to_string());
        self.transact(move |t| tree::copy(t, &from, &to, recursive))
            .await
    }

    async fn export(&self) -> Result<TreeImage> {
        self.transact(|t| Ok(TreeImage::from_nodes(t.descendants(ROOT)?)))
            .await
    }

    async fn import(&self, image: &TreeImage) -> Result<()> {
        let image = image.clone();
        self.transact(move |t| {
            t.conn.execute("DELETE FROM nodes", [])?;
            for (path, node) in image.into_nodes() {
                t.put(&path, node)?;
            }
            Ok(())
        })
        .await
    }

    async fn purge(&self) -> Result<()> {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from_io(ROOT, &e)),
        })
        .await
        .map_err(join_error)?
    }
}
