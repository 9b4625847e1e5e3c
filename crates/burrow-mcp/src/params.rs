//! Tool parameters as the model sees them, one struct per tool, and their
//! mapping onto [`burrow::Operation`].

use std::collections::BTreeMap;

use burrow::{CallerContext, Operation, ProviderKind, ScopeKind, ToolRequest};
use rmcp::schemars::{self, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// An MCP tool backed by one façade operation.
pub trait ToolParams: DeserializeOwned + JsonSchema {
    /// Tool name; the operation's wire tag.
    const NAME: &'static str;
    /// Short human-readable title.
    const TITLE: &'static str;
    /// What the model reads when choosing a tool.
    const DESCRIPTION: &'static str;

    /// Build the façade request for `ctx`.
    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest>;
}

fn parse_scope(scope: Option<&str>) -> burrow::Result<Option<ScopeKind>> {
    scope.map(str::parse).transpose()
}

/// Which workspace a file or checkpoint tool acts on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Target {
    /// Workspace name; the active workspace when omitted.
    #[serde(default)]
    pub workspace: Option<String>,
    /// Scope of `workspace`: `session`, `user`, or `sandbox`.
    #[serde(default)]
    pub scope: Option<String>,
}

impl Target {
    fn request(self, ctx: &CallerContext, operation: Operation) -> burrow::Result<ToolRequest> {
        Ok(ToolRequest {
            context: ctx.clone(),
            workspace: self.workspace,
            scope: parse_scope(self.scope.as_deref())?,
            operation,
        })
    }
}

fn scoped(
    ctx: &CallerContext,
    scope: Option<&str>,
    operation: Operation,
) -> burrow::Result<ToolRequest> {
    Ok(ToolRequest {
        context: ctx.clone(),
        workspace: None,
        scope: parse_scope(scope)?,
        operation,
    })
}

fn here() -> String {
    ".".to_string()
}

// =============================================================================
// Workspaces
// =============================================================================

/// Parameters for `workspace_create`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkspaceCreateParams {
    /// Workspace name: letters, digits, `_` and `-`.
    pub name: String,
    /// `session` (this conversation), `user` (all of this user's
    /// conversations), or `sandbox` (everyone in this deployment).
    #[serde(default)]
    pub scope: Option<String>,
    /// Storage backend: `memory`, `filesystem`, or `sqlite`.
    #[serde(default)]
    pub provider: Option<String>,
    /// Free-form labels.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ToolParams for WorkspaceCreateParams {
    const NAME: &'static str = "workspace_create";
    const TITLE: &'static str = "Create Workspace";
    const DESCRIPTION: &'static str = "Create an isolated virtual filesystem workspace. Your first \
        workspace becomes active automatically; file and checkpoint tools act on the active \
        workspace unless another is named.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        let provider = self
            .provider
            .as_deref()
            .map(str::parse::<ProviderKind>)
            .transpose()?;
        scoped(
            ctx,
            self.scope.as_deref(),
            Operation::WorkspaceCreate {
                name: self.name,
                provider,
                metadata: self.metadata,
            },
        )
    }
}

/// Parameters for `workspace_destroy`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkspaceDestroyParams {
    /// Workspace name.
    pub name: String,
    /// Scope the workspace lives in.
    #[serde(default)]
    pub scope: Option<String>,
}

impl ToolParams for WorkspaceDestroyParams {
    const NAME: &'static str = "workspace_destroy";
    const TITLE: &'static str = "Destroy Workspace";
    const DESCRIPTION: &'static str =
        "Permanently delete a workspace, its files, and all of its checkpoints.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        scoped(
            ctx,
            self.scope.as_deref(),
            Operation::WorkspaceDestroy { name: self.name },
        )
    }
}

/// Parameters for `workspace_list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WorkspaceListParams {
    /// Only list workspaces in this scope.
    #[serde(default)]
    pub scope: Option<String>,
}

impl ToolParams for WorkspaceListParams {
    const NAME: &'static str = "workspace_list";
    const TITLE: &'static str = "List Workspaces";
    const DESCRIPTION: &'static str =
        "List the workspaces you can see, oldest first, and which one is active.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        scoped(ctx, self.scope.as_deref(), Operation::WorkspaceList {})
    }
}

/// Parameters for `workspace_switch`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkspaceSwitchParams {
    /// Workspace name.
    pub name: String,
    /// Scope the workspace lives in.
    #[serde(default)]
    pub scope: Option<String>,
}

impl ToolParams for WorkspaceSwitchParams {
    const NAME: &'static str = "workspace_switch";
    const TITLE: &'static str = "Switch Workspace";
    const DESCRIPTION: &'static str = "Make a workspace the active one for later tool calls.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        scoped(
            ctx,
            self.scope.as_deref(),
            Operation::WorkspaceSwitch { name: self.name },
        )
    }
}

/// Parameters for `workspace_info`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WorkspaceInfoParams {
    /// Workspace to describe.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for WorkspaceInfoParams {
    const NAME: &'static str = "workspace_info";
    const TITLE: &'static str = "Workspace Info";
    const DESCRIPTION: &'static str =
        "Describe a workspace (the active one by default), including your working directory.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        self.target.request(ctx, Operation::WorkspaceInfo {})
    }
}

// =============================================================================
// Files and navigation
// =============================================================================

/// Parameters for `read`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadParams {
    /// File path, absolute or relative to the working directory.
    pub path: String,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for ReadParams {
    const NAME: &'static str = "read";
    const TITLE: &'static str = "Read File";
    const DESCRIPTION: &'static str = "Read a file as text.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        self.target.request(ctx, Operation::Read { path: self.path })
    }
}

/// Parameters for `write`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WriteParams {
    /// File path, absolute or relative to the working directory.
    pub path: String,
    /// New file content.
    pub content: String,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for WriteParams {
    const NAME: &'static str = "write";
    const TITLE: &'static str = "Write File";
    const DESCRIPTION: &'static str =
        "Create or overwrite a file, creating missing parent directories.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        self.target.request(
            ctx,
            Operation::Write {
                path: self.path,
                content: self.content,
            },
        )
    }
}

/// Parameters for `ls`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LsParams {
    /// Directory to list; the working directory by default.
    #[serde(default)]
    pub path: Option<String>,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for LsParams {
    const NAME: &'static str = "ls";
    const TITLE: &'static str = "List Directory";
    const DESCRIPTION: &'static str = "List a directory's entries with their types and sizes.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        let path = self.path.unwrap_or_else(here);
        self.target.request(ctx, Operation::Ls { path })
    }
}

/// Parameters for `tree`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TreeParams {
    /// Root of the rendering; the working directory by default.
    #[serde(default)]
    pub path: Option<String>,
    /// Levels to render below the root (default 3).
    #[serde(default)]
    pub max_depth: Option<usize>,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for TreeParams {
    const NAME: &'static str = "tree";
    const TITLE: &'static str = "Directory Tree";
    const DESCRIPTION: &'static str =
        "Show the directory tree. Directories deeper than max_depth are marked truncated.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        let path = self.path.unwrap_or_else(here);
        self.target.request(
            ctx,
            Operation::Tree {
                path,
                max_depth: self.max_depth,
            },
        )
    }
}

/// Parameters for `mkdir`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MkdirParams {
    /// Directory to create; its parent must exist.
    pub path: String,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for MkdirParams {
    const NAME: &'static str = "mkdir";
    const TITLE: &'static str = "Make Directory";
    const DESCRIPTION: &'static str = "Create a directory.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        self.target.request(ctx, Operation::Mkdir { path: self.path })
    }
}

/// Parameters for `rm`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RmParams {
    /// Path to remove.
    pub path: String,
    /// Required to remove a directory and everything in it.
    #[serde(default)]
    pub recursive: bool,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for RmParams {
    const NAME: &'static str = "rm";
    const TITLE: &'static str = "Remove";
    const DESCRIPTION: &'static str =
        "Remove a file, or a directory when recursive is true.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        self.target.request(
            ctx,
            Operation::Rm {
                path: self.path,
                recursive: self.recursive,
            },
        )
    }
}

/// Parameters for `mv`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MvParams {
    /// Existing path.
    pub source: String,
    /// New path, or an existing directory to move into.
    pub dest: String,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for MvParams {
    const NAME: &'static str = "mv";
    const TITLE: &'static str = "Move";
    const DESCRIPTION: &'static str = "Move or rename a file or directory.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        self.target.request(
            ctx,
            Operation::Mv {
                source: self.source,
                dest: self.dest,
            },
        )
    }
}

/// Parameters for `cp`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CpParams {
    /// Existing path.
    pub source: String,
    /// New path, or an existing directory to copy into.
    pub dest: String,
    /// Required to copy a directory.
    #[serde(default)]
    pub recursive: bool,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for CpParams {
    const NAME: &'static str = "cp";
    const TITLE: &'static str = "Copy";
    const DESCRIPTION: &'static str =
        "Copy a file, or a directory when recursive is true.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        self.target.request(
            ctx,
            Operation::Cp {
                source: self.source,
                dest: self.dest,
                recursive: self.recursive,
            },
        )
    }
}

/// Parameters for `cd`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CdParams {
    /// Directory to move to.
    pub path: String,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for CdParams {
    const NAME: &'static str = "cd";
    const TITLE: &'static str = "Change Directory";
    const DESCRIPTION: &'static str =
        "Change your working directory. Relative paths in later calls resolve against it.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        self.target.request(ctx, Operation::Cd { path: self.path })
    }
}

/// Parameters for `pwd`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PwdParams {
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for PwdParams {
    const NAME: &'static str = "pwd";
    const TITLE: &'static str = "Working Directory";
    const DESCRIPTION: &'static str = "Print your working directory.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        self.target.request(ctx, Operation::Pwd {})
    }
}

/// Parameters for `find`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FindParams {
    /// Glob matched against entry names, e.g. `*.rs`.
    pub pattern: String,
    /// Where to start; the working directory by default.
    #[serde(default)]
    pub path: Option<String>,
    /// Result limit (default 100, at most 1000).
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for FindParams {
    const NAME: &'static str = "find";
    const TITLE: &'static str = "Find Files";
    const DESCRIPTION: &'static str = "Find files and directories whose name matches a glob.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        let path = self.path.unwrap_or_else(here);
        self.target.request(
            ctx,
            Operation::Find {
                pattern: self.pattern,
                path,
                max_results: self.max_results,
            },
        )
    }
}

/// Parameters for `grep`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GrepParams {
    /// Text to search for.
    pub pattern: String,
    /// File or directory to search; the working directory by default.
    #[serde(default)]
    pub path: Option<String>,
    /// Result limit (default 100, at most 1000).
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for GrepParams {
    const NAME: &'static str = "grep";
    const TITLE: &'static str = "Search Content";
    const DESCRIPTION: &'static str =
        "Find lines containing a substring, with file paths and line numbers.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        let path = self.path.unwrap_or_else(here);
        self.target.request(
            ctx,
            Operation::Grep {
                pattern: self.pattern,
                path,
                max_results: self.max_results,
            },
        )
    }
}

// =============================================================================
// Checkpoints
// =============================================================================

/// Parameters for `checkpoint_create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CheckpointCreateParams {
    /// Checkpoint name; `checkpoint-N` when omitted.
    #[serde(default)]
    pub name: Option<String>,
    /// What this checkpoint captures.
    #[serde(default)]
    pub description: Option<String>,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for CheckpointCreateParams {
    const NAME: &'static str = "checkpoint_create";
    const TITLE: &'static str = "Create Checkpoint";
    const DESCRIPTION: &'static str =
        "Snapshot the whole workspace so it can be restored later. Take one before risky changes.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        self.target.request(
            ctx,
            Operation::CheckpointCreate {
                name: self.name,
                description: self.description,
            },
        )
    }
}

/// Parameters for `checkpoint_restore`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckpointRestoreParams {
    /// Checkpoint id, or a name (the newest checkpoint with that name wins).
    pub checkpoint: String,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for CheckpointRestoreParams {
    const NAME: &'static str = "checkpoint_restore";
    const TITLE: &'static str = "Restore Checkpoint";
    const DESCRIPTION: &'static str =
        "Replace the workspace's contents with a checkpoint. Changes made since are lost.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        self.target.request(
            ctx,
            Operation::CheckpointRestore {
                checkpoint: self.checkpoint,
            },
        )
    }
}

/// Parameters for `checkpoint_list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CheckpointListParams {
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for CheckpointListParams {
    const NAME: &'static str = "checkpoint_list";
    const TITLE: &'static str = "List Checkpoints";
    const DESCRIPTION: &'static str = "List the workspace's checkpoints, oldest first.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        self.target.request(ctx, Operation::CheckpointList {})
    }
}

/// Parameters for `checkpoint_delete`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckpointDeleteParams {
    /// Checkpoint id.
    pub checkpoint_id: String,
    /// Workspace to use.
    #[serde(flatten)]
    pub target: Target,
}

impl ToolParams for CheckpointDeleteParams {
    const NAME: &'static str = "checkpoint_delete";
    const TITLE: &'static str = "Delete Checkpoint";
    const DESCRIPTION: &'static str = "Delete a checkpoint by id.";

    fn into_request(self, ctx: &CallerContext) -> burrow::Result<ToolRequest> {
        self.target.request(
            ctx,
            Operation::CheckpointDelete {
                checkpoint_id: self.checkpoint_id,
            },
        )
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn ctx() -> CallerContext {
        CallerContext::session("mcp")
    }

    #[test]
    fn test_ls_defaults_to_working_directory() {
        let params: LsParams = serde_json::from_str("{}").expect("parse failed");
        let request = params.into_request(&ctx()).expect("request");
        assert_eq!(request.operation, Operation::Ls { path: ".".to_string() });
        assert!(request.workspace.is_none());
        assert_eq!(request.context, ctx());
    }

    #[test]
    fn test_target_is_flattened() {
        let params: MvParams = serde_json::from_str(
            r#"{"source": "a", "dest": "b", "workspace": "w", "scope": "user"}"#,
        )
        .expect("parse failed");
        let request = params.into_request(&ctx()).expect("request");
        assert_eq!(
            request.operation,
            Operation::Mv {
                source: "a".to_string(),
                dest: "b".to_string()
            }
        );
        assert_eq!(request.workspace.as_deref(), Some("w"));
        assert_eq!(request.scope, Some(ScopeKind::User));
    }

    #[test]
    fn test_required_fields_enforced_by_schema() {
        assert!(serde_json::from_str::<ReadParams>("{}").is_err());
        assert!(serde_json::from_str::<WorkspaceCreateParams>("{}").is_err());
    }

    #[test]
    fn test_bad_scope_and_provider_rejected() {
        let params: WorkspaceListParams =
            serde_json::from_str(r#"{"scope": "planet"}"#).expect("parse failed");
        let err = params.into_request(&ctx()).expect_err("bad scope");
        assert_eq!(err.kind(), burrow::ErrorKind::InvalidArgument);

        let params: WorkspaceCreateParams =
            serde_json::from_str(r#"{"name": "w", "provider": "tape"}"#).expect("parse failed");
        assert!(params.into_request(&ctx()).is_err());
    }

    #[test]
    fn test_names_match_operation_tags() {
        let request = CheckpointRestoreParams {
            checkpoint: "before-refactor".to_string(),
            target: Target::default(),
        }
        .into_request(&ctx())
        .expect("request");
        assert_eq!(request.operation.name(), CheckpointRestoreParams::NAME);

        let request = WorkspaceCreateParams {
            name: "w".to_string(),
            scope: None,
            provider: Some("sqlite".to_string()),
            metadata: BTreeMap::new(),
        }
        .into_request(&ctx())
        .expect("request");
        assert_eq!(request.operation.name(), WorkspaceCreateParams::NAME);
    }
}
