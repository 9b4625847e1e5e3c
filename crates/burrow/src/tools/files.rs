//! File and navigation handlers.
//!
//! Every handler enters the workspace gate shared, so file operations run
//! concurrently with each other but never overlap a checkpoint or destroy.

use futures::future::{BoxFuture, FutureExt};

use super::{Call, Entry, Payload, TreeNode};
use crate::error::{Error, ErrorKind, Result};
use crate::navigation::path;
use crate::registry::Workspace;
use crate::runtime::Burrow;
use crate::storage::{Metadata, NodeType, StorageEngine};

impl Burrow {
    pub(crate) async fn resolve(
        &self,
        call: Call<'_>,
        workspace: &Workspace,
        raw: &str,
    ) -> Result<String> {
        self.directories
            .resolve_checked(workspace, &call.ctx.caller_key(), raw)
            .await
    }

    pub(crate) async fn read_file(&self, call: Call<'_>, raw: &str) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let _shared = workspace.enter_shared().await?;
        let path = self.resolve(call, &workspace, raw).await?;
        let data = workspace.engine().read(&path).await?;
        Ok(Payload::File {
            size: data.len() as u64,
            content: String::from_utf8_lossy(&data).into_owned(),
            path,
        })
    }

    /// Missing parent directories are created first.
    pub(crate) async fn write_file(
        &self,
        call: Call<'_>,
        raw: &str,
        content: &str,
    ) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let _shared = workspace.enter_shared().await?;
        let path = self.resolve(call, &workspace, raw).await?;
        let engine = workspace.engine();
        for dir in path::ancestors(&path) {
            ensure_dir(engine.as_ref(), &dir).await?;
        }
        engine.write(&path, content.as_bytes()).await?;
        Ok(Payload::Written {
            path,
            size: content.len() as u64,
        })
    }

    pub(crate) async fn list_dir(&self, call: Call<'_>, raw: &str) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let _shared = workspace.enter_shared().await?;
        let path = self.resolve(call, &workspace, raw).await?;
        let entries = workspace
            .engine()
            .list(&path)
            .await?
            .into_iter()
            .map(|entry| Entry {
                path: path::child(&path, &entry.name),
                name: entry.name,
                node_type: entry.metadata.node_type,
                size: entry.metadata.size,
                modified: entry.metadata.modified,
            })
            .collect();
        Ok(Payload::Listing { path, entries })
    }

    pub(crate) async fn tree(
        &self,
        call: Call<'_>,
        raw: &str,
        max_depth: Option<usize>,
    ) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let _shared = workspace.enter_shared().await?;
        let path = self.resolve(call, &workspace, raw).await?;
        let max_depth = max_depth.unwrap_or(self.config.search.default_tree_depth);
        let engine = workspace.engine().as_ref();
        let meta = engine.stat(&path).await?;
        let root = build_tree(engine, path, meta, 0, max_depth).await?;
        Ok(Payload::Tree { root })
    }

    pub(crate) async fn make_dir(&self, call: Call<'_>, raw: &str) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let _shared = workspace.enter_shared().await?;
        let path = self.resolve(call, &workspace, raw).await?;
        workspace.engine().mkdir(&path).await?;
        Ok(Payload::Created { path })
    }

    pub(crate) async fn remove(&self, call: Call<'_>, raw: &str, recursive: bool) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let _shared = workspace.enter_shared().await?;
        let path = self.resolve(call, &workspace, raw).await?;
        let engine = workspace.engine();
        if engine.stat(&path).await?.is_dir() && !recursive {
            return Err(Error::InvalidArgument(format!(
                "{path} is a directory; set recursive to remove it"
            )));
        }
        engine.remove(&path, recursive).await?;
        Ok(Payload::Removed { path })
    }

    pub(crate) async fn move_path(&self, call: Call<'_>, source: &str, dest: &str) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let _shared = workspace.enter_shared().await?;
        let source = self.resolve(call, &workspace, source).await?;
        let dest = self.resolve(call, &workspace, dest).await?;
        workspace.engine().rename(&source, &dest).await?;
        Ok(Payload::Moved { source, dest })
    }

    pub(crate) async fn copy_path(
        &self,
        call: Call<'_>,
        source: &str,
        dest: &str,
        recursive: bool,
    ) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let _shared = workspace.enter_shared().await?;
        let source = self.resolve(call, &workspace, source).await?;
        let dest = self.resolve(call, &workspace, dest).await?;
        workspace.engine().copy(&source, &dest, recursive).await?;
        Ok(Payload::Copied { source, dest })
    }

    pub(crate) async fn change_dir(&self, call: Call<'_>, raw: &str) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let _shared = workspace.enter_shared().await?;
        let cwd = self
            .directories
            .cd(&workspace, &call.ctx.caller_key(), raw)
            .await?;
        Ok(Payload::Cwd { cwd })
    }

    pub(crate) async fn print_dir(&self, call: Call<'_>) -> Result<Payload> {
        let workspace = self.target(call).await?;
        let cwd = self
            .directories
            .pwd(workspace.id(), &call.ctx.caller_key())
            .await;
        Ok(Payload::Cwd { cwd })
    }
}

async fn ensure_dir(engine: &dyn StorageEngine, dir: &str) -> Result<()> {
    match engine.stat(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::NotADirectory(dir.to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => match engine.mkdir(dir).await {
            // Lost a race with a concurrent writer creating the same directory.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            other => other,
        },
        Err(e) => Err(e),
    }
}

fn build_tree(
    engine: &dyn StorageEngine,
    path: String,
    meta: Metadata,
    depth: usize,
    max_depth: usize,
) -> BoxFuture<'_, Result<TreeNode>> {
    async move {
        let name = path::file_name(&path).to_string();
        if meta.node_type == NodeType::File {
            return Ok(TreeNode {
                name,
                node_type: NodeType::File,
                size: Some(meta.size),
                children: Vec::new(),
                truncated: false,
            });
        }

        let entries = engine.list(&path).await?;
        if depth >= max_depth {
            return Ok(TreeNode {
                name,
                node_type: NodeType::Directory,
                size: None,
                children: Vec::new(),
                truncated: !entries.is_empty(),
            });
        }
        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            let child = path::child(&path, &entry.name);
            children.push(build_tree(engine, child, entry.metadata, depth + 1, max_depth).await?);
        }
        Ok(TreeNode {
            name,
            node_type: NodeType::Directory,
            size: None,
            children,
            truncated: false,
        })
    }
    .boxed()
}
