//! Named, restorable snapshots of a workspace.
//!
//! Create and restore hold the workspace gate exclusively, so they never
//! overlap each other or an in-flight file operation. A snapshot therefore
//! always captures one consistent tree, and a restore replaces the tree in
//! one step.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::registry::{Workspace, WorkspaceId};
use crate::storage::{Namespace, SnapshotStats, SnapshotToken};

/// Unique checkpoint identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(String);

impl CheckpointId {
    fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CheckpointId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A checkpoint as callers see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointRecord {
    /// Unique identifier.
    pub id: CheckpointId,
    /// Name; not unique within a workspace.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// What the snapshot holds.
    pub stats: SnapshotStats,
}

#[derive(Debug)]
struct Stored {
    record: CheckpointRecord,
    token: SnapshotToken,
}

#[derive(Debug, Default)]
struct History {
    entries: Vec<Stored>,
    /// Checkpoints ever created, for default names.
    created: u64,
}

/// Keeps each workspace's checkpoint history and drives the namespace's
/// snapshot primitives.
pub struct CheckpointCoordinator {
    namespace: Arc<dyn Namespace>,
    histories: Mutex<HashMap<WorkspaceId, History>>,
}

impl fmt::Debug for CheckpointCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointCoordinator").finish_non_exhaustive()
    }
}

impl CheckpointCoordinator {
    /// Create a coordinator over `namespace`.
    pub fn new(namespace: Arc<dyn Namespace>) -> Self {
        Self {
            namespace,
            histories: Mutex::new(HashMap::new()),
        }
    }

    fn histories(&self) -> std::sync::MutexGuard<'_, HashMap<WorkspaceId, History>> {
        self.histories.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot the workspace and record a checkpoint.
    ///
    /// Without a name the checkpoint is called `checkpoint-{n}`, where `n`
    /// counts every checkpoint ever created in the workspace.
    pub async fn create(
        &self,
        workspace: &Workspace,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<CheckpointRecord> {
        let _exclusive = workspace.enter_exclusive().await?;
        let snapshot = self.namespace.snapshot(workspace.storage()).await?;

        let record = {
            let mut histories = self.histories();
            let history = histories.entry(workspace.id().clone()).or_default();
            history.created += 1;
            let name = match name.filter(|n| !n.is_empty()) {
                Some(name) => name.to_string(),
                None => format!("checkpoint-{}", history.created),
            };
            let record = CheckpointRecord {
                id: CheckpointId::generate(),
                name,
                description: description.unwrap_or_default().to_string(),
                workspace_id: workspace.id().clone(),
                created_at: Utc::now(),
                stats: snapshot.stats,
            };
            history.entries.push(Stored {
                record: record.clone(),
                token: snapshot.token,
            });
            record
        };

        info!(
            workspace = %workspace.name(),
            checkpoint = %record.id,
            name = %record.name,
            files = record.stats.files,
            "created checkpoint"
        );
        Ok(record)
    }

    /// Replace the workspace's live tree with a checkpoint.
    ///
    /// `key` matches a checkpoint id first, then the most recent checkpoint
    /// with that name.
    pub async fn restore(&self, workspace: &Workspace, key: &str) -> Result<CheckpointRecord> {
        let _exclusive = workspace.enter_exclusive().await?;
        let (record, token) = {
            let histories = self.histories();
            let entries = histories
                .get(workspace.id())
                .map(|h| h.entries.as_slice())
                .unwrap_or_default();
            entries
                .iter()
                .find(|s| s.record.id.as_str() == key)
                .or_else(|| entries.iter().rev().find(|s| s.record.name == key))
                .map(|s| (s.record.clone(), s.token.clone()))
                .ok_or_else(|| Error::NotFound(format!("checkpoint {key}")))?
        };

        self.namespace.restore(workspace.storage(), &token).await?;
        info!(workspace = %workspace.name(), checkpoint = %record.id, "restored checkpoint");
        Ok(record)
    }

    /// The workspace's checkpoints, oldest first.
    pub fn list(&self, workspace: &Workspace) -> Result<Vec<CheckpointRecord>> {
        if workspace.is_retired() {
            return Err(Error::NotFound(format!("workspace {}", workspace.name())));
        }
        Ok(self
            .histories()
            .get(workspace.id())
            .map(|h| h.entries.iter().map(|s| s.record.clone()).collect())
            .unwrap_or_default())
    }

    /// Delete one checkpoint and release its snapshot.
    pub async fn delete(&self, workspace: &Workspace, id: &str) -> Result<CheckpointRecord> {
        let _exclusive = workspace.enter_exclusive().await?;
        let (record, token) = self
            .histories()
            .get(workspace.id())
            .and_then(|h| h.entries.iter().find(|s| s.record.id.as_str() == id))
            .map(|s| (s.record.clone(), s.token.clone()))
            .ok_or_else(|| Error::NotFound(format!("checkpoint {id}")))?;

        self.namespace.discard(&token).await?;
        if let Some(history) = self.histories().get_mut(workspace.id()) {
            history.entries.retain(|s| s.record.id != record.id);
        }
        debug!(workspace = %workspace.name(), checkpoint = %record.id, "deleted checkpoint");
        Ok(record)
    }

    /// Discard every checkpoint of a workspace.
    ///
    /// Checkpoints are released one at a time; on failure the ones not yet
    /// released stay recorded so a retry finishes the job. The caller must
    /// already hold the workspace exclusively.
    pub(crate) async fn purge(&self, workspace: &WorkspaceId) -> Result<()> {
        let pending: Vec<(CheckpointId, SnapshotToken)> = self
            .histories()
            .get(workspace)
            .map(|h| {
                h.entries
                    .iter()
                    .map(|s| (s.record.id.clone(), s.token.clone()))
                    .collect()
            })
            .unwrap_or_default();

        for (id, token) in pending {
            self.namespace.discard(&token).await?;
            if let Some(history) = self.histories().get_mut(workspace) {
                history.entries.retain(|s| s.record.id != id);
            }
        }
        self.histories().remove(workspace);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::WorkspaceRegistry;
    use crate::scope::{CallerContext, ScopeKind, ScopeResolver};
    use crate::storage::{LocalNamespace, ProviderKind};

    struct Fixture {
        namespace: Arc<LocalNamespace>,
        checkpoints: Arc<CheckpointCoordinator>,
        workspace: Arc<Workspace>,
    }

    async fn fixture() -> Fixture {
        let namespace = Arc::new(LocalNamespace::new(std::env::temp_dir()));
        let dyn_ns: Arc<dyn Namespace> = namespace.clone();
        let checkpoints = Arc::new(CheckpointCoordinator::new(Arc::clone(&dyn_ns)));
        let registry =
            WorkspaceRegistry::new(ScopeResolver::default(), dyn_ns, Arc::clone(&checkpoints));
        let workspace = registry
            .create(
                "cp",
                ScopeKind::Session,
                ProviderKind::Memory,
                &CallerContext::session("s"),
                BTreeMap::new(),
            )
            .await
            .unwrap();
        Fixture {
            namespace,
            checkpoints,
            workspace,
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let f = fixture().await;
        let engine = f.workspace.engine();
        engine.write("/x.txt", b"1").await.unwrap();
        f.checkpoints
            .create(&f.workspace, Some("A"), None)
            .await
            .unwrap();
        engine.write("/x.txt", b"2").await.unwrap();

        f.checkpoints.restore(&f.workspace, "A").await.unwrap();
        assert_eq!(engine.read("/x.txt").await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_default_names_count_history() {
        let f = fixture().await;
        let a = f.checkpoints.create(&f.workspace, None, None).await.unwrap();
        let b = f.checkpoints.create(&f.workspace, None, Some("second")).await.unwrap();
        assert_eq!(a.name, "checkpoint-1");
        assert_eq!(b.name, "checkpoint-2");
        assert_eq!(b.description, "second");

        f.checkpoints.delete(&f.workspace, a.id.as_str()).await.unwrap();
        let c = f.checkpoints.create(&f.workspace, None, None).await.unwrap();
        assert_eq!(c.name, "checkpoint-3");
    }

    #[tokio::test]
    async fn test_restore_by_name_picks_newest() {
        let f = fixture().await;
        let engine = f.workspace.engine();
        engine.write("/v", b"old").await.unwrap();
        let old = f.checkpoints.create(&f.workspace, Some("same"), None).await.unwrap();
        engine.write("/v", b"new").await.unwrap();
        f.checkpoints.create(&f.workspace, Some("same"), None).await.unwrap();
        engine.write("/v", b"latest").await.unwrap();

        f.checkpoints.restore(&f.workspace, "same").await.unwrap();
        assert_eq!(engine.read("/v").await.unwrap(), b"new");

        f.checkpoints.restore(&f.workspace, old.id.as_str()).await.unwrap();
        assert_eq!(engine.read("/v").await.unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_list_oldest_first_and_delete() {
        let f = fixture().await;
        for name in ["one", "two", "three"] {
            f.checkpoints.create(&f.workspace, Some(name), None).await.unwrap();
        }
        let names: Vec<_> = f
            .checkpoints
            .list(&f.workspace)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["one", "two", "three"]);

        let err = f.checkpoints.delete(&f.workspace, "missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = f.checkpoints.restore(&f.workspace, "missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(f.namespace.snapshot_count().await, 3);
    }

    #[tokio::test]
    async fn test_purge_releases_snapshots() {
        let f = fixture().await;
        f.checkpoints.create(&f.workspace, None, None).await.unwrap();
        f.checkpoints.create(&f.workspace, None, None).await.unwrap();
        f.checkpoints.purge(f.workspace.id()).await.unwrap();
        assert_eq!(f.namespace.snapshot_count().await, 0);
        assert!(f.checkpoints.list(&f.workspace).unwrap().is_empty());
    }
}
