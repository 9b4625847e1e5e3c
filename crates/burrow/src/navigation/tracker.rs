//! Per-(workspace, caller) working directories.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use super::path::{self, ROOT};
use crate::error::{Error, Result};
use crate::registry::{Workspace, WorkspaceId};
use crate::scope::CallerKey;

type Slot = Arc<tokio::sync::Mutex<String>>;

/// Tracks one current directory per `(workspace, caller)` pair.
///
/// Pairs start at `/`. Different callers in the same workspace never see
/// each other's directory.
#[derive(Debug, Default)]
pub struct WorkingDirectories {
    slots: Mutex<HashMap<(WorkspaceId, CallerKey), Slot>>,
}

impl WorkingDirectories {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, workspace: &WorkspaceId, caller: &CallerKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry((workspace.clone(), caller.clone()))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(ROOT.to_string()))),
        )
    }

    fn existing_slot(&self, workspace: &WorkspaceId, caller: &CallerKey) -> Option<Slot> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&(workspace.clone(), caller.clone()))
            .map(Arc::clone)
    }

    /// The caller's current directory; `/` if never changed.
    pub async fn pwd(&self, workspace: &WorkspaceId, caller: &CallerKey) -> String {
        match self.existing_slot(workspace, caller) {
            Some(slot) => slot.lock().await.clone(),
            None => ROOT.to_string(),
        }
    }

    /// Resolve `raw` against the caller's current directory without
    /// touching storage.
    pub async fn resolve(&self, workspace: &WorkspaceId, caller: &CallerKey, raw: &str) -> Result<String> {
        let cwd = self.pwd(workspace, caller).await;
        let resolved = path::resolve(&cwd, raw)?;
        debug!(cwd = %cwd, raw = %raw, resolved = %resolved, "resolved path");
        Ok(resolved)
    }

    /// Resolve `raw`, first confirming the current directory still exists
    /// when a relative path depends on it.
    ///
    /// A directory removed out from under the caller is reported instead of
    /// silently resolving into a missing tree.
    pub async fn resolve_checked(
        &self,
        workspace: &Workspace,
        caller: &CallerKey,
        raw: &str,
    ) -> Result<String> {
        let cwd = self.pwd(workspace.id(), caller).await;
        if !raw.starts_with('/') && cwd != ROOT {
            let still_there = match workspace.engine().stat(&cwd).await {
                Ok(meta) => meta.is_dir(),
                Err(e) if e.kind() == crate::error::ErrorKind::NotFound => false,
                Err(e) => return Err(e),
            };
            if !still_there {
                warn!(workspace = %workspace.name(), cwd = %cwd, "working directory no longer exists");
                return Err(Error::NotFound(format!(
                    "working directory {cwd} no longer exists; cd to a valid directory"
                )));
            }
        }
        let resolved = path::resolve(&cwd, raw)?;
        debug!(cwd = %cwd, raw = %raw, resolved = %resolved, "resolved path");
        Ok(resolved)
    }

    /// Change the caller's current directory.
    ///
    /// The target must be an existing directory. On failure the current
    /// directory is unchanged.
    pub async fn cd(&self, workspace: &Workspace, caller: &CallerKey, raw: &str) -> Result<String> {
        let slot = self.slot(workspace.id(), caller);
        let mut cwd = slot.lock().await;
        let target = path::resolve(&cwd, raw)?;
        let meta = workspace.engine().stat(&target).await?;
        if !meta.is_dir() {
            return Err(Error::NotADirectory(target));
        }
        *cwd = target.clone();
        debug!(workspace = %workspace.name(), cwd = %target, "changed directory");
        Ok(target)
    }

    /// Drop all state for a workspace.
    pub fn forget_workspace(&self, workspace: &WorkspaceId) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(id, _), _| id != workspace);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::checkpoint::CheckpointCoordinator;
    use crate::error::ErrorKind;
    use crate::registry::WorkspaceRegistry;
    use crate::scope::{CallerContext, ScopeKind, ScopeResolver};
    use crate::storage::{LocalNamespace, Namespace, ProviderKind};

    async fn workspace() -> Arc<Workspace> {
        let namespace: Arc<dyn Namespace> = Arc::new(LocalNamespace::new(std::env::temp_dir()));
        let checkpoints = Arc::new(CheckpointCoordinator::new(Arc::clone(&namespace)));
        let registry = WorkspaceRegistry::new(ScopeResolver::default(), namespace, checkpoints);
        let ws = registry
            .create(
                "nav",
                ScopeKind::Session,
                ProviderKind::Memory,
                &CallerContext::session("s"),
                BTreeMap::new(),
            )
            .await
            .unwrap();
        ws.engine().mkdir("/src").await.unwrap();
        ws.engine().mkdir("/src/lib").await.unwrap();
        ws.engine().write("/src/main.rs", b"fn main() {}").await.unwrap();
        ws
    }

    #[tokio::test]
    async fn test_starts_at_root() {
        let ws = workspace().await;
        let dirs = WorkingDirectories::new();
        let caller = CallerContext::session("s").caller_key();
        assert_eq!(dirs.pwd(ws.id(), &caller).await, "/");
        assert_eq!(dirs.resolve(ws.id(), &caller, "a/b").await.unwrap(), "/a/b");
    }

    #[tokio::test]
    async fn test_cd_then_relative_resolution() {
        let ws = workspace().await;
        let dirs = WorkingDirectories::new();
        let caller = CallerContext::session("s").caller_key();

        assert_eq!(dirs.cd(&ws, &caller, "src/lib").await.unwrap(), "/src/lib");
        assert_eq!(dirs.cd(&ws, &caller, "..").await.unwrap(), "/src");
        assert_eq!(
            dirs.resolve_checked(&ws, &caller, "main.rs").await.unwrap(),
            "/src/main.rs"
        );
    }

    #[tokio::test]
    async fn test_failed_cd_keeps_directory() {
        let ws = workspace().await;
        let dirs = WorkingDirectories::new();
        let caller = CallerContext::session("s").caller_key();
        dirs.cd(&ws, &caller, "/src").await.unwrap();

        let err = dirs.cd(&ws, &caller, "missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = dirs.cd(&ws, &caller, "main.rs").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotADirectory);
        assert_eq!(dirs.pwd(ws.id(), &caller).await, "/src");
    }

    #[tokio::test]
    async fn test_callers_are_independent() {
        let ws = workspace().await;
        let dirs = WorkingDirectories::new();
        let a = CallerContext::session("a").caller_key();
        let b = CallerContext::session("b").caller_key();
        dirs.cd(&ws, &a, "/src/lib").await.unwrap();
        assert_eq!(dirs.pwd(ws.id(), &b).await, "/");
    }

    #[tokio::test]
    async fn test_stale_directory_reported() {
        let ws = workspace().await;
        let dirs = WorkingDirectories::new();
        let caller = CallerContext::session("s").caller_key();
        dirs.cd(&ws, &caller, "/src/lib").await.unwrap();
        ws.engine().remove("/src", true).await.unwrap();

        let err = dirs.resolve_checked(&ws, &caller, "file.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        // Absolute paths still work.
        assert_eq!(dirs.resolve_checked(&ws, &caller, "/x").await.unwrap(), "/x");
    }

    #[tokio::test]
    async fn test_forget_workspace() {
        let ws = workspace().await;
        let dirs = WorkingDirectories::new();
        let caller = CallerContext::session("s").caller_key();
        dirs.cd(&ws, &caller, "/src").await.unwrap();
        dirs.forget_workspace(ws.id());
        assert_eq!(dirs.pwd(ws.id(), &caller).await, "/");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cd_commits_whole_moves() {
        let ws = workspace().await;
        let dirs = Arc::new(WorkingDirectories::new());
        let caller = CallerContext::session("s").caller_key();
        let valid = ["/", "/src", "/src/lib"];

        for _ in 0..20 {
            let mut tasks = Vec::new();
            for target in ["/src", "/src/lib", "/", "/missing", "/src/main.rs"] {
                let (ws, dirs, caller) = (Arc::clone(&ws), Arc::clone(&dirs), caller.clone());
                tasks.push(tokio::spawn(async move {
                    let moved = dirs.cd(&ws, &caller, target).await;
                    let seen = dirs.pwd(ws.id(), &caller).await;
                    (moved, seen)
                }));
            }
            for task in tasks {
                let (moved, seen) = task.await.unwrap();
                if let Ok(cwd) = moved {
                    assert!(valid.contains(&cwd.as_str()), "committed {cwd}");
                }
                assert!(valid.contains(&seen.as_str()), "observed {seen}");
            }

            let cwd = dirs.pwd(ws.id(), &caller).await;
            assert!(valid.contains(&cwd.as_str()), "final {cwd}");
            assert!(ws.engine().stat(&cwd).await.unwrap().is_dir());
        }
    }
}
