//! Tool façade: the request and response shapes every transport speaks.
//!
//! A [`ToolRequest`] names one [`Operation`] plus the caller's identity and,
//! optionally, the workspace to act on. [`Burrow::call`](crate::Burrow::call)
//! turns it into a [`ToolResponse`].
//!
//! ```json
//! {"context": {"session_id": "s1"}, "operation": "write", "path": "notes.md", "content": "hi"}
//! ```

mod checkpoint;
mod files;
mod search;
mod workspace;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointRecord;
use crate::error::{Error, ErrorKind};
use crate::registry::WorkspaceHandle;
use crate::scope::{CallerContext, ScopeKind};
use crate::storage::{NodeType, ProviderKind};

fn current_dir() -> String {
    ".".to_string()
}

/// One tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Identity supplied by the transport.
    #[serde(default)]
    pub context: CallerContext,
    /// Workspace to act on; the caller's active workspace when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Scope of `workspace`, and of workspace operations; the configured
    /// default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeKind>,
    /// What to do.
    #[serde(flatten)]
    pub operation: Operation,
}

impl ToolRequest {
    /// A request with no workspace or scope override.
    pub fn new(context: CallerContext, operation: Operation) -> Self {
        Self {
            context,
            workspace: None,
            scope: None,
            operation,
        }
    }

    /// Target a named workspace.
    pub fn in_workspace(mut self, name: impl Into<String>) -> Self {
        self.workspace = Some(name.into());
        self
    }

    /// Set the scope.
    pub fn with_scope(mut self, scope: ScopeKind) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Every operation the façade serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    /// Create a workspace.
    WorkspaceCreate {
        /// Workspace name.
        name: String,
        /// Storage backend; the configured default when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<ProviderKind>,
        /// Free-form labels.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        metadata: BTreeMap<String, String>,
    },
    /// Destroy a workspace and its checkpoints.
    WorkspaceDestroy {
        /// Workspace name.
        name: String,
    },
    /// List visible workspaces.
    WorkspaceList {},
    /// Make a workspace the caller's active workspace.
    WorkspaceSwitch {
        /// Workspace name.
        name: String,
    },
    /// Describe the target workspace.
    WorkspaceInfo {},
    /// Read a file.
    Read {
        /// File path.
        path: String,
    },
    /// Write a file, creating missing parent directories.
    Write {
        /// File path.
        path: String,
        /// New content.
        content: String,
    },
    /// List a directory.
    Ls {
        /// Directory path.
        #[serde(default = "current_dir")]
        path: String,
    },
    /// Render a directory tree.
    Tree {
        /// Root of the rendering.
        #[serde(default = "current_dir")]
        path: String,
        /// Levels below the root to render.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_depth: Option<usize>,
    },
    /// Create a directory.
    Mkdir {
        /// Directory path.
        path: String,
    },
    /// Remove a file or directory.
    Rm {
        /// Path to remove.
        path: String,
        /// Required to remove a directory.
        #[serde(default)]
        recursive: bool,
    },
    /// Move or rename.
    Mv {
        /// Existing path.
        source: String,
        /// New path, or a directory to move into.
        dest: String,
    },
    /// Copy.
    Cp {
        /// Existing path.
        source: String,
        /// New path, or a directory to copy into.
        dest: String,
        /// Required to copy a directory.
        #[serde(default)]
        recursive: bool,
    },
    /// Change the working directory.
    Cd {
        /// Directory path.
        path: String,
    },
    /// Print the working directory.
    Pwd {},
    /// Find entries whose name matches a glob.
    Find {
        /// Glob matched against entry names.
        pattern: String,
        /// Where to start.
        #[serde(default = "current_dir")]
        path: String,
        /// Result limit.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_results: Option<usize>,
    },
    /// Find lines containing a substring.
    Grep {
        /// Substring to find.
        pattern: String,
        /// File or directory to search.
        #[serde(default = "current_dir")]
        path: String,
        /// Result limit.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_results: Option<usize>,
    },
    /// Snapshot the workspace.
    CheckpointCreate {
        /// Checkpoint name; generated when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Free-form description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Restore the workspace to a checkpoint.
    CheckpointRestore {
        /// Checkpoint id, or name of the newest checkpoint with that name.
        checkpoint: String,
    },
    /// List the workspace's checkpoints, oldest first.
    CheckpointList {},
    /// Delete a checkpoint.
    CheckpointDelete {
        /// Checkpoint id.
        checkpoint_id: String,
    },
}

impl Operation {
    /// The wire name of this operation.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::WorkspaceCreate { .. } => "workspace_create",
            Operation::WorkspaceDestroy { .. } => "workspace_destroy",
            Operation::WorkspaceList {} => "workspace_list",
            Operation::WorkspaceSwitch { .. } => "workspace_switch",
            Operation::WorkspaceInfo {} => "workspace_info",
            Operation::Read { .. } => "read",
            Operation::Write { .. } => "write",
            Operation::Ls { .. } => "ls",
            Operation::Tree { .. } => "tree",
            Operation::Mkdir { .. } => "mkdir",
            Operation::Rm { .. } => "rm",
            Operation::Mv { .. } => "mv",
            Operation::Cp { .. } => "cp",
            Operation::Cd { .. } => "cd",
            Operation::Pwd {} => "pwd",
            Operation::Find { .. } => "find",
            Operation::Grep { .. } => "grep",
            Operation::CheckpointCreate { .. } => "checkpoint_create",
            Operation::CheckpointRestore { .. } => "checkpoint_restore",
            Operation::CheckpointList {} => "checkpoint_list",
            Operation::CheckpointDelete { .. } => "checkpoint_delete",
        }
    }
}

/// A directory entry in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// Entry name.
    pub name: String,
    /// Absolute path.
    pub path: String,
    /// File or directory.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

/// One node of a rendered tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    /// Entry name; `/` for the workspace root.
    pub name: String,
    /// File or directory.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// File size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Directory contents, when rendered.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
    /// Set on a directory whose contents lie beyond the depth limit.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// One matching line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrepMatch {
    /// File containing the line.
    pub path: String,
    /// Line number, starting at 1.
    pub line: usize,
    /// The line itself.
    pub text: String,
}

/// Operation-specific success payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// A workspace was created, selected, or described.
    Workspace {
        /// The workspace.
        workspace: WorkspaceHandle,
        /// Whether it is the caller's active workspace.
        active: bool,
        /// The caller's working directory in it.
        cwd: String,
    },
    /// A workspace was destroyed.
    WorkspaceDestroyed {
        /// The workspace as it was.
        workspace: WorkspaceHandle,
    },
    /// Visible workspaces, oldest first.
    Workspaces {
        /// The workspaces.
        workspaces: Vec<WorkspaceHandle>,
        /// Name of the caller's active workspace.
        #[serde(skip_serializing_if = "Option::is_none")]
        active: Option<String>,
    },
    /// File content.
    File {
        /// Absolute path.
        path: String,
        /// Content as UTF-8, with invalid sequences replaced.
        content: String,
        /// Size in bytes.
        size: u64,
    },
    /// A file was written.
    Written {
        /// Absolute path.
        path: String,
        /// Bytes written.
        size: u64,
    },
    /// Directory contents.
    Listing {
        /// Absolute path.
        path: String,
        /// Entries, sorted by name.
        entries: Vec<Entry>,
    },
    /// A rendered tree.
    Tree {
        /// Root node.
        root: TreeNode,
    },
    /// A directory was created.
    Created {
        /// Absolute path.
        path: String,
    },
    /// A path was removed.
    Removed {
        /// Absolute path.
        path: String,
    },
    /// A path was moved.
    Moved {
        /// Absolute source.
        source: String,
        /// Absolute destination.
        dest: String,
    },
    /// A path was copied.
    Copied {
        /// Absolute source.
        source: String,
        /// Absolute destination.
        dest: String,
    },
    /// The caller's working directory.
    Cwd {
        /// Absolute path.
        cwd: String,
    },
    /// Paths whose name matched.
    Found {
        /// The glob.
        pattern: String,
        /// Matching absolute paths.
        matches: Vec<String>,
        /// More matches exist beyond the limit.
        truncated: bool,
    },
    /// Lines that matched.
    GrepMatches {
        /// The substring.
        pattern: String,
        /// Matching lines.
        matches: Vec<GrepMatch>,
        /// More matches exist beyond the limit.
        truncated: bool,
    },
    /// A checkpoint was created.
    Checkpoint {
        /// The checkpoint.
        checkpoint: CheckpointRecord,
    },
    /// The workspace was restored.
    Restored {
        /// The checkpoint restored.
        checkpoint: CheckpointRecord,
    },
    /// Checkpoints, oldest first.
    Checkpoints {
        /// The checkpoints.
        checkpoints: Vec<CheckpointRecord>,
    },
    /// A checkpoint was deleted.
    CheckpointDeleted {
        /// The checkpoint as it was.
        checkpoint: CheckpointRecord,
    },
}

/// Caller-visible failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    /// Stable classification.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl From<&Error> for ToolError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResponse {
    /// The operation succeeded.
    Success(Payload),
    /// The operation failed.
    Error(ToolError),
}

impl ToolResponse {
    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, ToolResponse::Success(_))
    }

    /// The error kind, if the call failed.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ToolResponse::Success(_) => None,
            ToolResponse::Error(err) => Some(err.kind),
        }
    }
}

/// Per-call inputs shared by every handler.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Call<'a> {
    pub(crate) ctx: &'a CallerContext,
    pub(crate) workspace: Option<&'a str>,
    pub(crate) scope: Option<ScopeKind>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_flat_operation() {
        let json = r#"{
            "context": {"user_id": "alice", "session_id": "s1"},
            "workspace": "proj",
            "scope": "user",
            "operation": "write",
            "path": "notes/todo.md",
            "content": "ship it"
        }"#;
        let request: ToolRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.workspace.as_deref(), Some("proj"));
        assert_eq!(request.scope, Some(ScopeKind::User));
        assert_eq!(
            request.operation,
            Operation::Write {
                path: "notes/todo.md".to_string(),
                content: "ship it".to_string()
            }
        );
    }

    #[test]
    fn test_defaults_fill_optional_fields() {
        let request: ToolRequest =
            serde_json::from_str(r#"{"operation": "ls"}"#).unwrap();
        assert!(request.context.is_empty());
        assert_eq!(request.operation, Operation::Ls { path: ".".to_string() });

        let request: ToolRequest =
            serde_json::from_str(r#"{"operation": "rm", "path": "d"}"#).unwrap();
        assert_eq!(
            request.operation,
            Operation::Rm {
                path: "d".to_string(),
                recursive: false
            }
        );
    }

    #[test]
    fn test_unknown_operation_rejected() {
        assert!(serde_json::from_str::<ToolRequest>(r#"{"operation": "mount"}"#).is_err());
    }

    #[test]
    fn test_response_shape() {
        let ok = ToolResponse::Success(Payload::Cwd { cwd: "/".to_string() });
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({"success": {"type": "cwd", "cwd": "/"}})
        );

        let err = ToolResponse::Error(ToolError::from(&Error::NotFound("/x".to_string())));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({"error": {"kind": "not_found", "message": "not found: /x"}})
        );
    }

    #[test]
    fn test_operation_names_match_tags() {
        let op = Operation::CheckpointList {};
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["operation"], op.name());
    }
}
