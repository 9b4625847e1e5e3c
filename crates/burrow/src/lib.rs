//! Burrow: virtual filesystem workspaces for tool-calling agents
//!
//! Agents get named, isolated workspaces holding a tree of files and
//! directories. Workspaces are partitioned by scope (one conversation, one
//! user, or the whole sandbox), carry a per-caller working directory, and
//! can be checkpointed and restored. Contents live in memory, in a host
//! directory, or in a SQLite database.
//!
//! Transports (MCP, the JSON-lines CLI) speak the same [`ToolRequest`] /
//! [`ToolResponse`] shapes through one [`Burrow`].

mod checkpoint;
mod config;
mod error;
pub mod navigation;
mod registry;
mod runtime;
mod scope;
pub mod storage;
mod tools;

pub use checkpoint::{CheckpointCoordinator, CheckpointId, CheckpointRecord};
pub use config::{BurrowConfig, SearchLimits};
pub use error::{DestroyStep, Error, ErrorKind, Result};
pub use navigation::WorkingDirectories;
pub use registry::{Workspace, WorkspaceHandle, WorkspaceId, WorkspaceRegistry, validate_name};
pub use runtime::Burrow;
pub use scope::{CallerContext, CallerKey, OwnerKey, ScopeKind, ScopeResolver, grid_path};
pub use storage::{
    DirEntry, Metadata, Namespace, NodeType, ProviderKind, SnapshotStats, StorageEngine,
    StorageRef, TreeImage,
};
pub use tools::{
    Entry, GrepMatch, Operation, Payload, ToolError, ToolRequest, ToolResponse, TreeNode,
};
