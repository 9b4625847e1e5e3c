//! Workspace registry: creation, lookup, listing, destruction, and the
//! per-caller active workspace.
//!
//! Names are unique within a `(scope, owner)` partition. Create and destroy
//! in one partition are serialized by a per-partition lock, so two concurrent
//! creates of the same name yield exactly one success. Operations in distinct
//! partitions never wait on each other.
//!
//! Destruction runs as an ordered sequence: fence the workspace so no new
//! operation can enter, wait for in-flight operations to drain, discard its
//! checkpoints, deallocate its storage, then drop it from the tables. A
//! failed step unfences the workspace and leaves it live, so the destroy can
//! be retried.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointCoordinator;
use crate::error::{DestroyStep, Error, Result};
use crate::scope::{CallerContext, CallerKey, OwnerKey, ScopeKind, ScopeResolver};
use crate::storage::{Namespace, ProviderKind, StorageEngine, StorageRef};

/// Globally unique, time-ordered workspace identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for WorkspaceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-visible description of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceHandle {
    /// Unique identifier.
    pub id: WorkspaceId,
    /// Name, unique within its scope and owner.
    pub name: String,
    /// Isolation tier.
    pub scope: ScopeKind,
    /// Owning partition.
    pub owner_key: OwnerKey,
    /// Storage backend.
    pub provider: ProviderKind,
    /// Durable address.
    pub grid_path: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the most recent operation.
    pub last_accessed_at: DateTime<Utc>,
    /// Free-form labels supplied at creation.
    pub metadata: BTreeMap<String, String>,
}

/// A live workspace: its identity, its storage engine, and the gate that
/// orders file operations against checkpoint and destroy operations.
pub struct Workspace {
    id: WorkspaceId,
    name: String,
    scope: ScopeKind,
    owner_key: OwnerKey,
    storage: StorageRef,
    created_at: DateTime<Utc>,
    sequence: u64,
    metadata: BTreeMap<String, String>,
    engine: Arc<dyn StorageEngine>,
    /// Shared for file operations, exclusive for whole-tree operations.
    gate: tokio::sync::RwLock<()>,
    retired: AtomicBool,
    last_accessed: Mutex<DateTime<Utc>>,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("grid_path", &self.storage.grid_path)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// Unique identifier.
    pub fn id(&self) -> &WorkspaceId {
        &self.id
    }

    /// Workspace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Isolation tier.
    pub fn scope(&self) -> ScopeKind {
        self.scope
    }

    /// Owning partition.
    pub fn owner_key(&self) -> &OwnerKey {
        &self.owner_key
    }

    /// Allocated storage location.
    pub fn storage(&self) -> &StorageRef {
        &self.storage
    }

    /// The storage engine serving this workspace.
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// A point-in-time description of this workspace.
    pub fn handle(&self) -> WorkspaceHandle {
        WorkspaceHandle {
            id: self.id.clone(),
            name: self.name.clone(),
            scope: self.scope,
            owner_key: self.owner_key.clone(),
            provider: self.storage.provider,
            grid_path: self.storage.grid_path.clone(),
            created_at: self.created_at,
            last_accessed_at: *self
                .last_accessed
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            metadata: self.metadata.clone(),
        }
    }

    /// Whether the workspace has been destroyed.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Enter for a file operation. Many may run at once.
    pub async fn enter_shared(&self) -> Result<RwLockReadGuard<'_, ()>> {
        let guard = self.gate.read().await;
        self.check_live()?;
        self.touch();
        Ok(guard)
    }

    /// Enter for a whole-tree operation, waiting for in-flight file
    /// operations to finish and excluding new ones until the guard drops.
    pub async fn enter_exclusive(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        let guard = self.gate.write().await;
        self.check_live()?;
        self.touch();
        Ok(guard)
    }

    fn check_live(&self) -> Result<()> {
        if self.is_retired() {
            return Err(Error::NotFound(format!("workspace {}", self.name)));
        }
        Ok(())
    }

    fn touch(&self) {
        *self
            .last_accessed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Live,
    Destroying,
}

#[derive(Debug)]
struct Entry {
    workspace: Arc<Workspace>,
    state: EntryState,
}

type NameKey = (ScopeKind, OwnerKey, String);
type PartitionKey = (ScopeKind, OwnerKey);

#[derive(Debug, Default)]
struct Tables {
    by_id: HashMap<WorkspaceId, Entry>,
    by_name: HashMap<NameKey, WorkspaceId>,
}

/// Marks a workspace as being destroyed; reverts to live on drop unless
/// disarmed. Dropping the destroy future mid-sequence therefore unfences.
struct FenceGuard<'a> {
    tables: &'a RwLock<Tables>,
    id: WorkspaceId,
    armed: bool,
}

impl FenceGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FenceGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = tables.by_id.get_mut(&self.id) {
            entry.state = EntryState::Live;
        }
    }
}

/// Registry of every workspace in the process.
pub struct WorkspaceRegistry {
    resolver: ScopeResolver,
    namespace: Arc<dyn Namespace>,
    checkpoints: Arc<CheckpointCoordinator>,
    partitions: Mutex<HashMap<PartitionKey, Arc<tokio::sync::Mutex<()>>>>,
    tables: RwLock<Tables>,
    active: Mutex<HashMap<CallerKey, WorkspaceId>>,
    created: AtomicU64,
}

impl fmt::Debug for WorkspaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceRegistry")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl WorkspaceRegistry {
    /// Create an empty registry.
    pub fn new(
        resolver: ScopeResolver,
        namespace: Arc<dyn Namespace>,
        checkpoints: Arc<CheckpointCoordinator>,
    ) -> Self {
        Self {
            resolver,
            namespace,
            checkpoints,
            partitions: Mutex::new(HashMap::new()),
            tables: RwLock::new(Tables::default()),
            active: Mutex::new(HashMap::new()),
            created: AtomicU64::new(0),
        }
    }

    /// The scope resolver in use.
    pub fn resolver(&self) -> &ScopeResolver {
        &self.resolver
    }

    fn partition(&self, scope: ScopeKind, owner: &OwnerKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut partitions = self
            .partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(partitions.entry((scope, owner.clone())).or_default())
    }

    /// Drop the lock of an empty partition once nobody holds it, so
    /// short-lived sessions do not accumulate entries.
    fn prune_partition(&self, key: &PartitionKey) {
        let mut partitions = self
            .partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let unused = partitions
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        let occupied = self
            .read_tables()
            .by_name
            .keys()
            .any(|(scope, owner, _)| *scope == key.0 && *owner == key.1);
        if unused && !occupied {
            partitions.remove(key);
        }
    }

    fn read_tables(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tables(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_map(&self) -> std::sync::MutexGuard<'_, HashMap<CallerKey, WorkspaceId>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a workspace in the caller's partition of `scope`.
    ///
    /// The first workspace a caller creates becomes its active workspace.
    pub async fn create(
        &self,
        name: &str,
        scope: ScopeKind,
        provider: ProviderKind,
        ctx: &CallerContext,
        metadata: BTreeMap<String, String>,
    ) -> Result<Arc<Workspace>> {
        validate_name(name)?;
        let owner = self.resolver.derive_owner_key(scope, ctx)?;
        let partition_key = (scope, owner);
        let partition = self.partition(scope, &partition_key.1);
        let created = {
            let _held = partition.lock().await;
            self.register(name, scope, &partition_key.1, provider, ctx, metadata)
                .await
        };
        drop(partition);
        if created.is_err() {
            self.prune_partition(&partition_key);
        }
        created
    }

    async fn register(
        &self,
        name: &str,
        scope: ScopeKind,
        owner: &OwnerKey,
        provider: ProviderKind,
        ctx: &CallerContext,
        metadata: BTreeMap<String, String>,
    ) -> Result<Arc<Workspace>> {
        let key = (scope, owner.clone(), name.to_string());
        if self.read_tables().by_name.contains_key(&key) {
            return Err(Error::AlreadyExists(format!(
                "workspace {name} in {scope} scope"
            )));
        }

        let id = WorkspaceId::generate();
        let storage = self.namespace.allocate(scope, owner, &id, provider).await?;
        let engine = match self.namespace.engine(&storage) {
            Ok(engine) => engine,
            Err(e) => {
                if let Err(cleanup) = self.namespace.deallocate(&storage).await {
                    warn!(grid = %storage.grid_path, error = %cleanup, "failed to release storage after create error");
                }
                return Err(e);
            }
        };

        let now = Utc::now();
        let workspace = Arc::new(Workspace {
            id: id.clone(),
            name: name.to_string(),
            scope,
            owner_key: owner.clone(),
            storage,
            created_at: now,
            sequence: self.created.fetch_add(1, Ordering::Relaxed),
            metadata,
            engine,
            gate: tokio::sync::RwLock::new(()),
            retired: AtomicBool::new(false),
            last_accessed: Mutex::new(now),
        });

        {
            let mut tables = self.write_tables();
            tables.by_name.insert(key, id.clone());
            tables.by_id.insert(
                id.clone(),
                Entry {
                    workspace: Arc::clone(&workspace),
                    state: EntryState::Live,
                },
            );
        }
        self.active_map().entry(ctx.caller_key()).or_insert(id);

        info!(
            workspace = %name,
            scope = %scope,
            provider = %provider,
            grid = %workspace.storage.grid_path,
            "created workspace"
        );
        Ok(workspace)
    }

    /// Find a live workspace by name in the caller's partition of `scope`.
    pub async fn lookup(
        &self,
        name: &str,
        scope: ScopeKind,
        ctx: &CallerContext,
    ) -> Result<Arc<Workspace>> {
        let owner = self.resolver.derive_owner_key(scope, ctx)?;
        let tables = self.read_tables();
        tables
            .by_name
            .get(&(scope, owner, name.to_string()))
            .and_then(|id| tables.by_id.get(id))
            .filter(|entry| entry.state == EntryState::Live)
            .map(|entry| Arc::clone(&entry.workspace))
            .ok_or_else(|| Error::NotFound(format!("workspace {name} in {scope} scope")))
    }

    /// Fetch a live workspace by id, checking the caller may act on it.
    pub async fn get(&self, id: &WorkspaceId, ctx: &CallerContext) -> Result<Arc<Workspace>> {
        let workspace = self
            .read_tables()
            .by_id
            .get(id)
            .filter(|entry| entry.state == EntryState::Live)
            .map(|entry| Arc::clone(&entry.workspace))
            .ok_or_else(|| Error::NotFound(format!("workspace {id}")))?;
        self.resolver
            .authorize(workspace.scope, &workspace.owner_key, ctx)?;
        Ok(workspace)
    }

    /// Every live workspace visible to the caller, oldest first.
    ///
    /// With a scope filter, the caller must have the identity that scope
    /// needs.
    pub async fn list(
        &self,
        ctx: &CallerContext,
        scope: Option<ScopeKind>,
    ) -> Result<Vec<WorkspaceHandle>> {
        let partitions: Vec<PartitionKey> = match scope {
            Some(scope) => vec![(scope, self.resolver.derive_owner_key(scope, ctx)?)],
            None => self.resolver.visible_partitions(ctx),
        };
        let mut visible: Vec<Arc<Workspace>> = self
            .read_tables()
            .by_id
            .values()
            .filter(|entry| entry.state == EntryState::Live)
            .filter(|entry| {
                partitions
                    .iter()
                    .any(|(s, o)| *s == entry.workspace.scope && *o == entry.workspace.owner_key)
            })
            .map(|entry| Arc::clone(&entry.workspace))
            .collect();
        visible.sort_by_key(|ws| ws.sequence);
        Ok(visible.iter().map(|ws| ws.handle()).collect())
    }

    /// Destroy a workspace and everything it owns.
    ///
    /// Waits for in-flight operations on the workspace to finish. On
    /// success the workspace is unreachable by name and by id, and any
    /// active-workspace pointers to it are cleared.
    pub async fn destroy(
        &self,
        name: &str,
        scope: ScopeKind,
        ctx: &CallerContext,
    ) -> Result<WorkspaceHandle> {
        let owner = self.resolver.derive_owner_key(scope, ctx)?;
        let partition_key = (scope, owner);
        let partition = self.partition(scope, &partition_key.1);
        let destroyed = {
            let _held = partition.lock().await;
            self.teardown(name, scope, &partition_key.1).await
        };
        drop(partition);
        if destroyed.is_ok() {
            self.prune_partition(&partition_key);
        }
        destroyed
    }

    async fn teardown(
        &self,
        name: &str,
        scope: ScopeKind,
        owner: &OwnerKey,
    ) -> Result<WorkspaceHandle> {
        let key = (scope, owner.clone(), name.to_string());
        let not_found = || Error::NotFound(format!("workspace {name} in {scope} scope"));
        let workspace = {
            let mut tables = self.write_tables();
            let id = tables.by_name.get(&key).cloned().ok_or_else(not_found)?;
            let entry = tables.by_id.get_mut(&id).ok_or_else(not_found)?;
            if entry.state != EntryState::Live {
                return Err(not_found());
            }
            entry.state = EntryState::Destroying;
            Arc::clone(&entry.workspace)
        };
        let fence = FenceGuard {
            tables: &self.tables,
            id: workspace.id.clone(),
            armed: true,
        };

        let _exclusive = workspace.gate.write().await;
        debug!(workspace = %name, "workspace fenced and drained");

        if let Err(source) = self.checkpoints.purge(&workspace.id).await {
            warn!(workspace = %name, error = %source, "destroy stopped at checkpoint cleanup");
            return Err(Error::Cascade {
                step: DestroyStep::Checkpoints,
                source: Box::new(source),
            });
        }
        if let Err(source) = self.namespace.deallocate(&workspace.storage).await {
            warn!(workspace = %name, error = %source, "destroy stopped at storage deallocation");
            return Err(Error::Cascade {
                step: DestroyStep::Storage,
                source: Box::new(source),
            });
        }

        {
            let mut tables = self.write_tables();
            tables.by_id.remove(&workspace.id);
            tables.by_name.remove(&key);
        }
        workspace.retire();
        self.active_map().retain(|_, id| *id != workspace.id);
        fence.disarm();

        info!(workspace = %name, scope = %scope, "destroyed workspace");
        Ok(workspace.handle())
    }

    /// Make a workspace the caller's active workspace.
    pub async fn switch_active(
        &self,
        name: &str,
        scope: ScopeKind,
        ctx: &CallerContext,
    ) -> Result<Arc<Workspace>> {
        let workspace = self.lookup(name, scope, ctx).await?;
        {
            // Destroy unlinks under the write lock before clearing pointers,
            // so a pointer inserted here is either seen by that sweep or
            // never inserted.
            let tables = self.read_tables();
            let live = tables
                .by_id
                .get(&workspace.id)
                .is_some_and(|entry| entry.state == EntryState::Live);
            if !live {
                return Err(Error::NotFound(format!("workspace {name} in {scope} scope")));
            }
            self.active_map()
                .insert(ctx.caller_key(), workspace.id.clone());
        }
        debug!(workspace = %name, caller = %ctx.caller_key(), "switched active workspace");
        Ok(workspace)
    }

    /// The caller's active workspace, if one is set and still live.
    pub async fn get_active(&self, ctx: &CallerContext) -> Option<Arc<Workspace>> {
        let id = self.active_map().get(&ctx.caller_key()).cloned()?;
        self.read_tables()
            .by_id
            .get(&id)
            .filter(|entry| entry.state == EntryState::Live)
            .map(|entry| Arc::clone(&entry.workspace))
    }
}

/// Workspace names are non-empty runs of ASCII letters, digits, `_`, and `-`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("workspace name is empty".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidArgument(format!(
            "workspace name {name:?} may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}
