//! Host-directory storage engine.
//!
//! Each workspace owns one directory under the storage root. Virtual paths map
//! onto it one to one; the mapping never leaves that directory because paths
//! are checked for normal form before use.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{DirEntry, Metadata, Node, NodeType, StorageEngine, TreeImage};
use crate::error::{Error, Result};
use crate::navigation::path::{self, ROOT};

/// A workspace tree stored as a directory on the host filesystem.
#[derive(Debug)]
pub struct FilesystemEngine {
    root: PathBuf,
    /// Shared for reads, exclusive for mutations.
    lock: RwLock<()>,
}

impl FilesystemEngine {
    /// Open (creating if needed) the workspace directory at `root`.
    pub async fn open(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::from_io(ROOT, &e))?;
        Ok(Self {
            root,
            lock: RwLock::new(()),
        })
    }

    fn host(&self, path: &str) -> Result<PathBuf> {
        path::check(path)?;
        Ok(host_path(&self.root, path))
    }

    async fn metadata(&self, path: &str) -> Result<Option<Metadata>> {
        let host = self.host(path)?;
        match fs::metadata(&host).await {
            Ok(meta) => Ok(Some(to_metadata(&meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::from_io(path, &e)),
        }
    }

    async fn require_parent_dir(&self, path: &str) -> Result<()> {
        let parent = path::parent(path)
            .ok_or_else(|| Error::InvalidPath("the root has no parent".to_string()))?;
        match self.metadata(parent).await? {
            None => Err(Error::NotFound(parent.to_string())),
            Some(meta) if !meta.is_dir() => Err(Error::NotADirectory(parent.to_string())),
            Some(_) => Ok(()),
        }
    }

    async fn stat_required(&self, path: &str) -> Result<Metadata> {
        self.metadata(path)
            .await?
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn destination(&self, from: &str, to: &str) -> Result<String> {
        match self.metadata(to).await? {
            Some(meta) if meta.is_dir() => Ok(path::child(to, path::file_name(from))),
            _ => Ok(to.to_string()),
        }
    }

    async fn check_target(&self, source: &Metadata, target: &str) -> Result<()> {
        if let Some(existing) = self.metadata(target).await? {
            if existing.is_dir() || source.is_dir() {
                return Err(Error::AlreadyExists(target.to_string()));
            }
        }
        self.require_parent_dir(target).await
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .root
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.root.with_file_name(name)
    }
}

fn host_path(root: &Path, path: &str) -> PathBuf {
    let relative = path.trim_start_matches('/');
    if relative.is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

fn to_metadata(meta: &std::fs::Metadata) -> Metadata {
    let node_type = if meta.is_dir() {
        NodeType::Directory
    } else {
        NodeType::File
    };
    Metadata {
        node_type,
        size: if meta.is_dir() { 0 } else { meta.len() },
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
    }
}

/// Copy a host directory tree without recursion.
async fn copy_tree(from: &Path, to: &Path, virtual_path: &str) -> Result<()> {
    let io = |e: std::io::Error| Error::from_io(virtual_path, &e);
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dst)) = pending.pop() {
        fs::create_dir(&dst).await.map_err(io)?;
        let mut entries = fs::read_dir(&src).await.map_err(io)?;
        while let Some(entry) = entries.next_entry().await.map_err(io)? {
            let child_dst = dst.join(entry.file_name());
            if entry.file_type().await.map_err(io)?.is_dir() {
                pending.push((entry.path(), child_dst));
            } else {
                fs::copy(entry.path(), child_dst).await.map_err(io)?;
            }
        }
    }
    Ok(())
}

/// Materialize an image into an empty directory at `dir`.
async fn write_image(dir: &Path, image: &TreeImage) -> Result<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::from_io(ROOT, &e))?;
    for (p, node) in image.iter() {
        if p == ROOT {
            continue;
        }
        let host = host_path(dir, p);
        let result = match node {
            Node::Directory => fs::create_dir(&host).await,
            Node::File { data, .. } => fs::write(&host, data).await,
        };
        result.map_err(|e| Error::from_io(p, &e))?;
    }
    Ok(())
}

#[async_trait]
impl StorageEngine for FilesystemEngine {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let _guard = self.lock.read().await;
        let meta = self.stat_required(path).await?;
        if meta.is_dir() {
            return Err(Error::NotAFile(path.to_string()));
        }
        fs::read(self.host(path)?)
            .await
            .map_err(|e| Error::from_io(path, &e))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let _guard = self.lock.write().await;
        let host = self.host(path)?;
        if path == ROOT {
            return Err(Error::NotAFile(path.to_string()));
        }
        if let Some(existing) = self.metadata(path).await? {
            if existing.is_dir() {
                return Err(Error::NotAFile(path.to_string()));
            }
        }
        self.require_parent_dir(path).await?;
        fs::write(&host, data)
            .await
            .map_err(|e| Error::from_io(path, &e))
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let _guard = self.lock.read().await;
        let meta = self.stat_required(path).await?;
        if !meta.is_dir() {
            return Err(Error::NotADirectory(path.to_string()));
        }
        let io = |e: std::io::Error| Error::from_io(path, &e);
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(self.host(path)?).await.map_err(io)?;
        while let Some(entry) = dir.next_entry().await.map_err(io)? {
            let metadata = entry.metadata().await.map_err(io)?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                metadata: to_metadata(&metadata),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let _guard = self.lock.read().await;
        self.stat_required(path).await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let _guard = self.lock.write().await;
        let host = self.host(path)?;
        if self.metadata(path).await?.is_some() {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        self.require_parent_dir(path).await?;
        fs::create_dir(&host)
            .await
            .map_err(|e| Error::from_io(path, &e))
    }

    async fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        let _guard = self.lock.write().await;
        let host = self.host(path)?;
        if path == ROOT {
            return Err(Error::InvalidPath("cannot remove the root directory".to_string()));
        }
        let meta = self.stat_required(path).await?;
        let io = |e: std::io::Error| Error::from_io(path, &e);
        if !meta.is_dir() {
            return fs::remove_file(&host).await.map_err(io);
        }
        if recursive {
            return fs::remove_dir_all(&host).await.map_err(io);
        }
        let mut entries = fs::read_dir(&host).await.map_err(io)?;
        if entries.next_entry().await.map_err(io)?.is_some() {
            return Err(Error::DirectoryNotEmpty(path.to_string()));
        }
        fs::remove_dir(&host).await.map_err(io)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let _guard = self.lock.write().await;
        let source_host = self.host(from)?;
        self.host(to)?;
        if from == ROOT {
            return Err(Error::InvalidPath("cannot move the root directory".to_string()));
        }
        let source = self.stat_required(from).await?;
        let target = self.destination(from, to).await?;
        if target == from {
            return Ok(());
        }
        if path::is_within(&target, from) {
            return Err(Error::InvalidPath(format!(
                "cannot move {from} into its own subtree"
            )));
        }
        self.check_target(&source, &target).await?;
        fs::rename(&source_host, host_path(&self.root, &target))
            .await
            .map_err(|e| Error::from_io(from, &e))
    }

    async fn copy(&self, from: &str, to: &str, recursive: bool) -> Result<()> {
        let _guard = self.lock.write().await;
        let source_host = self.host(from)?;
        self.host(to)?;
        let source = self.stat_required(from).await?;
        if source.is_dir() && !recursive {
            return Err(Error::InvalidArgument(format!(
                "{from} is a directory; set recursive to copy it"
            )));
        }
        let target = self.destination(from, to).await?;
        if path::is_within(&target, from) {
            if target == from {
                return Err(Error::AlreadyExists(target));
            }
            return Err(Error::InvalidPath(format!(
                "cannot copy {from} into its own subtree"
            )));
        }
        self.check_target(&source, &target).await?;
        let target_host = host_path(&self.root, &target);
        if source.is_dir() {
            copy_tree(&source_host, &target_host, from).await
        } else {
            fs::copy(&source_host, &target_host)
                .await
                .map(|_| ())
                .map_err(|e| Error::from_io(from, &e))
        }
    }

    async fn export(&self) -> Result<TreeImage> {
        let _guard = self.lock.read().await;
        let mut nodes = Vec::new();
        let mut pending = vec![ROOT.to_string()];
        while let Some(dir) = pending.pop() {
            let io = |e: std::io::Error| Error::from_io(&dir, &e);
            let mut entries = fs::read_dir(host_path(&self.root, &dir)).await.map_err(io)?;
            while let Some(entry) = entries.next_entry().await.map_err(io)? {
                let child = path::child(&dir, &entry.file_name().to_string_lossy());
                let meta = entry.metadata().await.map_err(io)?;
                if meta.is_dir() {
                    nodes.push((child.clone(), Node::Directory));
                    pending.push(child);
                } else {
                    let data = fs::read(entry.path())
                        .await
                        .map_err(|e| Error::from_io(&child, &e))?;
                    let modified = meta
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(|_| Utc::now());
                    nodes.push((child, Node::File { data, modified }));
                }
            }
        }
        Ok(TreeImage::from_nodes(nodes))
    }

    async fn import(&self, image: &TreeImage) -> Result<()> {
        let _guard = self.lock.write().await;
        let staging = self.sibling(".staging");
        let retired = self.sibling(".retired");
        for leftover in [&staging, &retired] {
            if fs::metadata(leftover).await.is_ok() {
                fs::remove_dir_all(leftover)
                    .await
                    .map_err(|e| Error::from_io(ROOT, &e))?;
            }
        }

        if let Err(e) = write_image(&staging, image).await {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        fs::rename(&self.root, &retired)
            .await
            .map_err(|e| Error::from_io(ROOT, &e))?;
        if let Err(e) = fs::rename(&staging, &self.root).await {
            // Put the previous tree back before reporting.
            if let Err(rollback) = fs::rename(&retired, &self.root).await {
                warn!(error = %rollback, "failed to roll back workspace directory swap");
            }
            let _ = fs::remove_dir_all(&staging).await;
            return Err(Error::from_io(ROOT, &e));
        }

        if let Err(e) = fs::remove_dir_all(&retired).await {
            warn!(error = %e, "failed to remove retired workspace tree");
        }
        debug!(nodes = image.len(), "imported tree image");
        Ok(())
    }

    async fn purge(&self) -> Result<()> {
        let _guard = self.lock.write().await;
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from_io(ROOT, &e)),
        }
    }
}
