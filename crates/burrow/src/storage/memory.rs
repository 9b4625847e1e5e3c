//! In-memory storage engine.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::tree;
use super::{DirEntry, Metadata, StorageEngine, TreeImage};
use crate::error::Result;

/// A workspace tree held in process memory.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    tree: RwLock<TreeImage>,
}

impl MemoryEngine {
    /// Create an engine holding only the root directory.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        tree::read(&*self.tree.read().await, path)
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        tree::write(&mut *self.tree.write().await, path, data)
    }

    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        tree::list(&*self.tree.read().await, path)
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        tree::stat(&*self.tree.read().await, path)
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        tree::mkdir(&mut *self.tree.write().await, path)
    }

    async fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        tree::remove(&mut *self.tree.write().await, path, recursive)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        tree::rename(&mut *self.tree.write().await, from, to)
    }

    async fn copy(&self, from: &str, to: &str, recursive: bool) -> Result<()> {
        tree::copy(&mut *self.tree.write().await, from, to, recursive)
    }

    async fn export(&self) -> Result<TreeImage> {
        Ok(self.tree.read().await.clone())
    }

    async fn import(&self, image: &TreeImage) -> Result<()> {
        *self.tree.write().await = TreeImage::from_nodes(image.nodes().clone());
        Ok(())
    }

    async fn purge(&self) -> Result<()> {
        *self.tree.write().await = TreeImage::empty();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_basic_file_ops() {
        let engine = MemoryEngine::new();
        engine.mkdir("/notes").await.unwrap();
        engine.write("/notes/a.txt", b"alpha").await.unwrap();

        assert_eq!(engine.read("/notes/a.txt").await.unwrap(), b"alpha");
        assert!(engine.exists("/notes").await.unwrap());
        assert!(!engine.exists("/nope").await.unwrap());

        let meta = engine.stat("/notes/a.txt").await.unwrap();
        assert!(meta.is_file());
        assert_eq!(meta.size, 5);
    }

    #[tokio::test]
    async fn test_export_import_replaces_everything() {
        let engine = MemoryEngine::new();
        engine.write("/keep.txt", b"1").await.unwrap();
        let image = engine.export().await.unwrap();

        engine.write("/keep.txt", b"2").await.unwrap();
        engine.write("/extra.txt", b"x").await.unwrap();
        engine.import(&image).await.unwrap();

        assert_eq!(engine.read("/keep.txt").await.unwrap(), b"1");
        assert_eq!(
            engine.read("/extra.txt").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
