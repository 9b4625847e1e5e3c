//! Allocation of per-workspace storage and snapshot bookkeeping.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FilesystemEngine, MemoryEngine, SnapshotStats, SqliteEngine, StorageEngine, TreeImage};
use crate::error::{Error, Result};
use crate::registry::WorkspaceId;
use crate::scope::{grid_path, OwnerKey, ScopeKind};

/// Storage backend requested for a workspace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Process memory.
    #[default]
    Memory,
    /// A host directory under the storage root.
    Filesystem,
    /// A SQLite database file under the storage root.
    Sqlite,
    /// Remote object storage; not available in a local namespace.
    ObjectStore,
}

impl ProviderKind {
    /// The snake_case name of this provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Memory => "memory",
            ProviderKind::Filesystem => "filesystem",
            ProviderKind::Sqlite => "sqlite",
            ProviderKind::ObjectStore => "object_store",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(ProviderKind::Memory),
            "filesystem" => Ok(ProviderKind::Filesystem),
            "sqlite" => Ok(ProviderKind::Sqlite),
            "object_store" => Ok(ProviderKind::ObjectStore),
            other => Err(Error::InvalidArgument(format!("unknown provider: {other}"))),
        }
    }
}

/// Opaque reference to one workspace's allocated storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRef {
    /// Durable address, `{scope}/{owner}/{workspace id}`.
    pub grid_path: String,
    /// Backend holding the data.
    pub provider: ProviderKind,
}

/// Opaque handle to a captured snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotToken(String);

impl SnapshotToken {
    fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// The token as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A captured snapshot and what it contains.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Handle for restore and discard.
    pub token: SnapshotToken,
    /// Content counts at capture time.
    pub stats: SnapshotStats,
}

/// Allocates workspace storage and captures, applies, and discards snapshots.
#[async_trait]
pub trait Namespace: Send + Sync {
    /// Allocate fresh, empty storage for a workspace.
    async fn allocate(
        &self,
        scope: ScopeKind,
        owner: &OwnerKey,
        id: &WorkspaceId,
        provider: ProviderKind,
    ) -> Result<StorageRef>;

    /// Release a workspace's storage. Deallocating twice is not an error.
    async fn deallocate(&self, storage: &StorageRef) -> Result<()>;

    /// The engine serving an allocated location.
    fn engine(&self, storage: &StorageRef) -> Result<Arc<dyn StorageEngine>>;

    /// Capture a consistent image of the whole location.
    async fn snapshot(&self, storage: &StorageRef) -> Result<Snapshot>;

    /// Atomically replace the location's contents with a snapshot.
    async fn restore(&self, storage: &StorageRef, token: &SnapshotToken) -> Result<()>;

    /// Drop a snapshot. Unknown tokens are ignored.
    async fn discard(&self, token: &SnapshotToken) -> Result<()>;
}

/// A single-process namespace serving the memory, filesystem, and SQLite
/// providers, with snapshots held in memory.
pub struct LocalNamespace {
    root: PathBuf,
    engines: RwLock<HashMap<String, Arc<dyn StorageEngine>>>,
    snapshots: tokio::sync::RwLock<HashMap<SnapshotToken, TreeImage>>,
}

impl fmt::Debug for LocalNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalNamespace")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl LocalNamespace {
    /// Create a namespace whose on-disk providers live under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            engines: RwLock::new(HashMap::new()),
            snapshots: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Base directory for on-disk providers.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of snapshots currently held.
    pub async fn snapshot_count(&self) -> usize {
        self.snapshots.read().await.len()
    }

    fn lookup(&self, storage: &StorageRef) -> Result<Option<Arc<dyn StorageEngine>>> {
        let engines = self
            .engines
            .read()
            .map_err(|_| Error::Storage("engine table lock poisoned".to_string()))?;
        Ok(engines.get(&storage.grid_path).cloned())
    }
}

#[async_trait]
impl Namespace for LocalNamespace {
    async fn allocate(
        &self,
        scope: ScopeKind,
        owner: &OwnerKey,
        id: &WorkspaceId,
        provider: ProviderKind,
    ) -> Result<StorageRef> {
        let grid = grid_path(scope, owner, id);
        let engine: Arc<dyn StorageEngine> = match provider {
            ProviderKind::Memory => Arc::new(MemoryEngine::new()),
            ProviderKind::Filesystem => Arc::new(FilesystemEngine::open(self.root.join(&grid)).await?),
            ProviderKind::Sqlite => {
                Arc::new(SqliteEngine::open(self.root.join(format!("{grid}.sqlite3"))).await?)
            }
            ProviderKind::ObjectStore => {
                return Err(Error::InvalidArgument(
                    "the object_store provider is not available in a local namespace".to_string(),
                ));
            }
        };

        let mut engines = self
            .engines
            .write()
            .map_err(|_| Error::Storage("engine table lock poisoned".to_string()))?;
        if engines.contains_key(&grid) {
            return Err(Error::AlreadyExists(grid));
        }
        engines.insert(grid.clone(), engine);
        debug!(grid = %grid, provider = %provider, "allocated workspace storage");
        Ok(StorageRef {
            grid_path: grid,
            provider,
        })
    }

    async fn deallocate(&self, storage: &StorageRef) -> Result<()> {
        let Some(engine) = self.lookup(storage)? else {
            return Ok(());
        };
        engine.purge().await?;
        self.engines
            .write()
            .map_err(|_| Error::Storage("engine table lock poisoned".to_string()))?
            .remove(&storage.grid_path);
        debug!(grid = %storage.grid_path, "deallocated workspace storage");
        Ok(())
    }

    fn engine(&self, storage: &StorageRef) -> Result<Arc<dyn StorageEngine>> {
        self.lookup(storage)?
            .ok_or_else(|| Error::NotFound(format!("storage {}", storage.grid_path)))
    }

    async fn snapshot(&self, storage: &StorageRef) -> Result<Snapshot> {
        let engine = self.engine(storage)?;
        let image = engine
            .export()
            .await
            .map_err(|e| Error::SnapshotFailed(e.to_string()))?;
        let token = SnapshotToken::generate();
        let stats = image.stats();
        self.snapshots.write().await.insert(token.clone(), image);
        Ok(Snapshot { token, stats })
    }

    async fn restore(&self, storage: &StorageRef, token: &SnapshotToken) -> Result<()> {
        let engine = self.engine(storage)?;
        let image = self
            .snapshots
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("snapshot {token}")))?;
        engine
            .import(&image)
            .await
            .map_err(|e| Error::RestoreFailed(e.to_string()))
    }

    async fn discard(&self, token: &SnapshotToken) -> Result<()> {
        self.snapshots.write().await.remove(token);
        Ok(())
    }
}
