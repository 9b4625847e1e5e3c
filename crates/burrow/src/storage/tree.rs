//! Tree operations shared by engines that store nodes keyed by path.
//!
//! An engine only needs point lookups, upserts, deletes and a prefix scan;
//! everything else (parent checks, recursive moves and copies, subtree
//! guards) lives here so the memory and SQLite engines agree exactly.

use crate::error::{Error, Result};
use crate::navigation::path::{self, ROOT};

use super::{DirEntry, Metadata, Node, TreeImage};

/// Path-keyed node storage.
pub(crate) trait NodeTable {
    /// Fetch one node.
    fn node(&self, path: &str) -> Result<Option<Node>>;

    /// Insert or replace one node.
    fn put(&mut self, path: &str, node: Node) -> Result<()>;

    /// Delete one node; absent paths are ignored.
    fn delete(&mut self, path: &str) -> Result<()>;

    /// Every node strictly beneath `dir`, in path order.
    fn descendants(&self, dir: &str) -> Result<Vec<(String, Node)>>;

    fn metadata(&self, path: &str) -> Result<Option<Metadata>> {
        Ok(self.node(path)?.map(|n| n.metadata()))
    }

    /// Direct children of `dir`, as `(name, metadata)`.
    fn children(&self, dir: &str) -> Result<Vec<(String, Metadata)>> {
        Ok(self
            .descendants(dir)?
            .into_iter()
            .filter(|(p, _)| path::parent(p) == Some(dir))
            .map(|(p, n)| (path::file_name(&p).to_string(), n.metadata()))
            .collect())
    }
}

impl NodeTable for TreeImage {
    fn node(&self, path: &str) -> Result<Option<Node>> {
        Ok(self.nodes().get(path).cloned())
    }

    fn put(&mut self, path: &str, node: Node) -> Result<()> {
        self.nodes_mut().insert(path.to_string(), node);
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        self.nodes_mut().remove(path);
        Ok(())
    }

    fn descendants(&self, dir: &str) -> Result<Vec<(String, Node)>> {
        let prefix = subtree_prefix(dir);
        Ok(self
            .nodes()
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter(|(p, _)| p.as_str() != ROOT)
            .map(|(p, n)| (p.clone(), n.clone()))
            .collect())
    }

    fn metadata(&self, path: &str) -> Result<Option<Metadata>> {
        Ok(self.nodes().get(path).map(Node::metadata))
    }
}

/// String every strict descendant of `dir` starts with.
pub(crate) fn subtree_prefix(dir: &str) -> String {
    if dir == ROOT {
        ROOT.to_string()
    } else {
        format!("{dir}/")
    }
}

pub(crate) fn stat<T: NodeTable + ?Sized>(table: &T, path: &str) -> Result<Metadata> {
    path::check(path)?;
    table
        .metadata(path)?
        .ok_or_else(|| Error::NotFound(path.to_string()))
}

pub(crate) fn read<T: NodeTable + ?Sized>(table: &T, path: &str) -> Result<Vec<u8>> {
    path::check(path)?;
    match table.node(path)? {
        None => Err(Error::NotFound(path.to_string())),
        Some(Node::Directory) => Err(Error::NotAFile(path.to_string())),
        Some(Node::File { data, .. }) => Ok(data),
    }
}

pub(crate) fn write<T: NodeTable + ?Sized>(table: &mut T, path: &str, data: &[u8]) -> Result<()> {
    path::check(path)?;
    if path == ROOT {
        return Err(Error::NotAFile(path.to_string()));
    }
    if let Some(existing) = table.metadata(path)? {
        if existing.is_dir() {
            return Err(Error::NotAFile(path.to_string()));
        }
    }
    require_parent_dir(table, path)?;
    table.put(path, Node::file(data.to_vec()))
}

pub(crate) fn mkdir<T: NodeTable + ?Sized>(table: &mut T, path: &str) -> Result<()> {
    path::check(path)?;
    if table.metadata(path)?.is_some() {
        return Err(Error::AlreadyExists(path.to_string()));
    }
    require_parent_dir(table, path)?;
    table.put(path, Node::Directory)
}

pub(crate) fn list<T: NodeTable + ?Sized>(table: &T, path: &str) -> Result<Vec<DirEntry>> {
    let meta = stat(table, path)?;
    if !meta.is_dir() {
        return Err(Error::NotADirectory(path.to_string()));
    }
    let mut entries: Vec<DirEntry> = table
        .children(path)?
        .into_iter()
        .map(|(name, metadata)| DirEntry { name, metadata })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

pub(crate) fn remove<T: NodeTable + ?Sized>(table: &mut T, path: &str, recursive: bool) -> Result<()> {
    path::check(path)?;
    if path == ROOT {
        return Err(Error::InvalidPath("cannot remove the root directory".to_string()));
    }
    let meta = stat(table, path)?;
    if meta.is_dir() {
        let below = table.descendants(path)?;
        if !below.is_empty() && !recursive {
            return Err(Error::DirectoryNotEmpty(path.to_string()));
        }
        for (p, _) in below.iter().rev() {
            table.delete(p)?;
        }
    }
    table.delete(path)
}

pub(crate) fn rename<T: NodeTable + ?Sized>(table: &mut T, from: &str, to: &str) -> Result<()> {
    path::check(from)?;
    path::check(to)?;
    if from == ROOT {
        return Err(Error::InvalidPath("cannot move the root directory".to_string()));
    }
    let source = stat(table, from)?;
    let target = destination(table, from, to)?;
    if target == from {
        return Ok(());
    }
    if path::is_within(&target, from) {
        return Err(Error::InvalidPath(format!(
            "cannot move {from} into its own subtree"
        )));
    }
    check_target(table, &source, &target)?;

    let moved = collect_subtree(table, from, &source)?;
    for (p, _) in moved.iter().rev() {
        table.delete(p)?;
    }
    for (p, node) in moved {
        table.put(&rebase(&p, from, &target), node)?;
    }
    Ok(())
}

pub(crate) fn copy<T: NodeTable + ?Sized>(
    table: &mut T,
    from: &str,
    to: &str,
    recursive: bool,
) -> Result<()> {
    path::check(from)?;
    path::check(to)?;
    let source = stat(table, from)?;
    if source.is_dir() && !recursive {
        return Err(Error::InvalidArgument(format!(
            "{from} is a directory; set recursive to copy it"
        )));
    }
    let target = destination(table, from, to)?;
    if path::is_within(&target, from) {
        if target == from {
            return Err(Error::AlreadyExists(target));
        }
        return Err(Error::InvalidPath(format!(
            "cannot copy {from} into its own subtree"
        )));
    }
    check_target(table, &source, &target)?;

    for (p, node) in collect_subtree(table, from, &source)? {
        let node = match node {
            Node::File { data, .. } => Node::file(data),
            Node::Directory => Node::Directory,
        };
        table.put(&rebase(&p, from, &target), node)?;
    }
    Ok(())
}

/// Where `from` lands when asked to go to `to`: inside `to` if that is an
/// existing directory, otherwise `to` itself.
fn destination<T: NodeTable + ?Sized>(table: &T, from: &str, to: &str) -> Result<String> {
    match table.metadata(to)? {
        Some(meta) if meta.is_dir() => Ok(path::child(to, path::file_name(from))),
        _ => Ok(to.to_string()),
    }
}

/// A file may replace a file; anything else colliding is an error.
fn check_target<T: NodeTable + ?Sized>(table: &T, source: &Metadata, target: &str) -> Result<()> {
    if let Some(existing) = table.metadata(target)? {
        if existing.is_dir() || source.is_dir() {
            return Err(Error::AlreadyExists(target.to_string()));
        }
    }
    require_parent_dir(table, target)
}

fn require_parent_dir<T: NodeTable + ?Sized>(table: &T, path: &str) -> Result<()> {
    let parent =
        path::parent(path).ok_or_else(|| Error::InvalidPath("the root has no parent".to_string()))?;
    match table.metadata(parent)? {
        None => Err(Error::NotFound(parent.to_string())),
        Some(meta) if !meta.is_dir() => Err(Error::NotADirectory(parent.to_string())),
        Some(_) => Ok(()),
    }
}

fn collect_subtree<T: NodeTable + ?Sized>(
    table: &T,
    root: &str,
    meta: &Metadata,
) -> Result<Vec<(String, Node)>> {
    let node = table
        .node(root)?
        .ok_or_else(|| Error::NotFound(root.to_string()))?;
    let mut nodes = vec![(root.to_string(), node)];
    if meta.is_dir() {
        nodes.extend(table.descendants(root)?);
    }
    Ok(nodes)
}

fn rebase(p: &str, from: &str, to: &str) -> String {
    format!("{to}{}", &p[from.len()..])
}
