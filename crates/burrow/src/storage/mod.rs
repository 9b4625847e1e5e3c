//! Storage substrate behind every workspace.
//!
//! A [`StorageEngine`] is one workspace's tree of files and directories,
//! addressed by normalized absolute paths. A [`Namespace`] allocates engines
//! by grid path and owns snapshot tokens.
//!
//! Three engines are provided:
//!
//! - [`MemoryEngine`]: process-local, lost on exit
//! - [`FilesystemEngine`]: a host directory under the storage root
//! - [`SqliteEngine`]: one SQLite database file per workspace

mod filesystem;
mod memory;
mod namespace;
mod sqlite;
mod tree;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::navigation::path::ROOT;

pub use filesystem::FilesystemEngine;
pub use memory::MemoryEngine;
pub use namespace::{LocalNamespace, Namespace, ProviderKind, Snapshot, SnapshotToken, StorageRef};
pub use sqlite::SqliteEngine;

/// Kind of a node in a workspace tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

/// Metadata for a file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// File or directory.
    pub node_type: NodeType,
    /// Size in bytes; zero for directories.
    pub size: u64,
    /// Last modification time, when the engine tracks one.
    pub modified: Option<DateTime<Utc>>,
}

impl Metadata {
    pub(crate) fn directory() -> Self {
        Self {
            node_type: NodeType::Directory,
            size: 0,
            modified: None,
        }
    }

    /// Whether this is a directory.
    pub fn is_dir(&self) -> bool {
        self.node_type == NodeType::Directory
    }

    /// Whether this is a regular file.
    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }
}

/// A directory entry returned by [`StorageEngine::list`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Entry name, without its parent path.
    pub name: String,
    /// Entry metadata.
    pub metadata: Metadata,
}

/// One node of an exported tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A directory; its children are the paths beneath it.
    Directory,
    /// A file and its content.
    File {
        /// File content.
        data: Vec<u8>,
        /// Last modification time.
        modified: DateTime<Utc>,
    },
}

impl Node {
    pub(crate) fn file(data: Vec<u8>) -> Self {
        Node::File {
            data,
            modified: Utc::now(),
        }
    }

    pub(crate) fn metadata(&self) -> Metadata {
        match self {
            Node::Directory => Metadata::directory(),
            Node::File { data, modified } => Metadata {
                node_type: NodeType::File,
                size: data.len() as u64,
                modified: Some(*modified),
            },
        }
    }
}

/// Content counts of a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    /// Number of regular files.
    pub files: u64,
    /// Number of directories, excluding the root.
    pub directories: u64,
    /// Total file bytes.
    pub bytes: u64,
}

/// A complete, self-contained copy of one workspace tree.
///
/// Keys are normalized absolute paths. The root is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeImage {
    nodes: BTreeMap<String, Node>,
}

impl Default for TreeImage {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT.to_string(), Node::Directory);
        Self { nodes }
    }
}

impl TreeImage {
    /// An image holding only the root directory.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an image from `(path, node)` pairs; the root is added if absent.
    pub fn from_nodes(nodes: impl IntoIterator<Item = (String, Node)>) -> Self {
        let mut image = Self::default();
        image.nodes.extend(nodes);
        image.nodes.insert(ROOT.to_string(), Node::Directory);
        image
    }

    /// Iterate nodes in path order, parents before children.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.nodes.iter()
    }

    /// Number of nodes including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root is present.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Count files, directories, and bytes.
    pub fn stats(&self) -> SnapshotStats {
        let mut stats = SnapshotStats::default();
        for (path, node) in &self.nodes {
            match node {
                Node::Directory if path == ROOT => {}
                Node::Directory => stats.directories += 1,
                Node::File { data, .. } => {
                    stats.files += 1;
                    stats.bytes += data.len() as u64;
                }
            }
        }
        stats
    }

    pub(crate) fn nodes(&self) -> &BTreeMap<String, Node> {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut BTreeMap<String, Node> {
        &mut self.nodes
    }

    pub(crate) fn into_nodes(self) -> BTreeMap<String, Node> {
        self.nodes
    }
}

/// One workspace's file tree.
///
/// Paths are normalized absolute paths (see [`crate::navigation::path`]);
/// engines reject anything else with `InvalidPath`. The root always exists
/// and cannot be removed or renamed.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Read an entire file.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or replace a file. The parent directory must exist.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// List a directory's entries, sorted by name.
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Get metadata for a path.
    async fn stat(&self, path: &str) -> Result<Metadata>;

    /// Whether a path exists.
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == crate::error::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create one directory. The parent must exist and the path must not.
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Remove a file or directory.
    ///
    /// A non-empty directory is only removed when `recursive` is set.
    async fn remove(&self, path: &str, recursive: bool) -> Result<()>;

    /// Move a file or directory.
    ///
    /// When `to` is an existing directory the source moves inside it.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Copy a file or, with `recursive`, a directory tree.
    async fn copy(&self, from: &str, to: &str, recursive: bool) -> Result<()>;

    /// Capture the whole tree.
    async fn export(&self) -> Result<TreeImage>;

    /// Replace the whole tree. Either all of `image` becomes visible or the
    /// tree is left as it was.
    async fn import(&self, image: &TreeImage) -> Result<()>;

    /// Release backing resources. Called once when the workspace is destroyed.
    async fn purge(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_always_has_root() {
        let image = TreeImage::from_nodes(vec![("/a".to_string(), Node::file(b"hi".to_vec()))]);
        assert!(image.nodes().contains_key("/"));
        assert_eq!(image.len(), 2);
        assert!(TreeImage::empty().is_empty());
    }

    #[test]
    fn test_stats_exclude_root() {
        let image = TreeImage::from_nodes(vec![
            ("/docs".to_string(), Node::Directory),
            ("/docs/a.md".to_string(), Node::file(b"hello".to_vec())),
            ("/b.txt".to_string(), Node::file(b"abc".to_vec())),
        ]);
        assert_eq!(
            image.stats(),
            SnapshotStats {
                files: 2,
                directories: 1,
                bytes: 8
            }
        );
    }
}
