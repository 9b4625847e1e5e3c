//! The `Burrow` façade: one object owning the registry, navigation state,
//! and checkpoint history, serving [`ToolRequest`]s.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::checkpoint::CheckpointCoordinator;
use crate::config::BurrowConfig;
use crate::error::{Error, Result};
use crate::navigation::WorkingDirectories;
use crate::registry::{Workspace, WorkspaceRegistry};
use crate::scope::{ScopeKind, ScopeResolver};
use crate::storage::{LocalNamespace, Namespace};
use crate::tools::{Call, Operation, Payload, ToolError, ToolRequest, ToolResponse};

/// Workspace service for tool-calling agents.
///
/// Every transport builds one `Burrow` and forwards requests to
/// [`call`](Self::call). All state is in-process; concurrent calls are safe.
///
/// # Example
///
/// ```rust,no_run
/// use burrow::{Burrow, CallerContext, Operation, ToolRequest};
///
/// # async fn example() {
/// let burrow = Burrow::in_memory();
/// let ctx = CallerContext::session("conversation-1");
/// burrow
///     .call(ToolRequest::new(
///         ctx.clone(),
///         Operation::WorkspaceCreate {
///             name: "scratch".into(),
///             provider: None,
///             metadata: Default::default(),
///         },
///     ))
///     .await;
/// let response = burrow
///     .call(ToolRequest::new(ctx, Operation::Pwd {}))
///     .await;
/// assert!(response.is_success());
/// # }
/// ```
pub struct Burrow {
    pub(crate) config: BurrowConfig,
    pub(crate) registry: WorkspaceRegistry,
    pub(crate) directories: WorkingDirectories,
    pub(crate) checkpoints: Arc<CheckpointCoordinator>,
}

impl fmt::Debug for Burrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Burrow")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Burrow {
    /// Create a service whose persistent providers live under
    /// `config.storage_root`.
    pub fn new(config: BurrowConfig) -> Result<Self> {
        let namespace = Arc::new(LocalNamespace::new(config.storage_root.clone()));
        Self::with_namespace(config, namespace)
    }

    /// Create a service over a custom namespace.
    pub fn with_namespace(config: BurrowConfig, namespace: Arc<dyn Namespace>) -> Result<Self> {
        let resolver = ScopeResolver::new(config.sandbox_id.as_deref())?;
        Ok(Self::assemble(config, resolver, namespace))
    }

    /// A service with default configuration, suited to tests and demos.
    ///
    /// Memory workspaces never touch disk; filesystem and SQLite ones land
    /// under the system temp directory.
    pub fn in_memory() -> Self {
        let config = BurrowConfig::default();
        let namespace = Arc::new(LocalNamespace::new(config.storage_root.clone()));
        Self::assemble(config, ScopeResolver::default(), namespace)
    }

    fn assemble(
        config: BurrowConfig,
        resolver: ScopeResolver,
        namespace: Arc<dyn Namespace>,
    ) -> Self {
        let checkpoints = Arc::new(CheckpointCoordinator::new(Arc::clone(&namespace)));
        let registry = WorkspaceRegistry::new(resolver, namespace, Arc::clone(&checkpoints));
        Self {
            config,
            registry,
            directories: WorkingDirectories::new(),
            checkpoints,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &BurrowConfig {
        &self.config
    }

    /// The workspace registry.
    pub fn registry(&self) -> &WorkspaceRegistry {
        &self.registry
    }

    /// Per-caller working directories.
    pub fn directories(&self) -> &WorkingDirectories {
        &self.directories
    }

    /// Checkpoint history.
    pub fn checkpoints(&self) -> &CheckpointCoordinator {
        &self.checkpoints
    }

    /// Serve one request, folding failures into the response.
    pub async fn call(&self, request: ToolRequest) -> ToolResponse {
        let operation = request.operation.name();
        match self.execute(request).await {
            Ok(payload) => ToolResponse::Success(payload),
            Err(err) => {
                match &err {
                    Error::Storage(_) | Error::Cascade { .. } => {
                        warn!(operation, error = %err, "tool call failed")
                    }
                    _ => debug!(operation, error = %err, "tool call rejected"),
                }
                ToolResponse::Error(ToolError::from(&err))
            }
        }
    }

    /// Serve one request.
    pub async fn execute(&self, request: ToolRequest) -> Result<Payload> {
        let ToolRequest {
            context,
            workspace,
            scope,
            operation,
        } = request;
        let call = Call {
            ctx: &context,
            workspace: workspace.as_deref(),
            scope,
        };
        debug!(
            operation = operation.name(),
            caller = %context.caller_key(),
            workspace = workspace.as_deref().unwrap_or("<active>"),
            "tool call"
        );

        match operation {
            Operation::WorkspaceCreate {
                name,
                provider,
                metadata,
            } => self.workspace_create(call, &name, provider, metadata).await,
            Operation::WorkspaceDestroy { name } => self.workspace_destroy(call, &name).await,
            Operation::WorkspaceList {} => self.workspace_list(call).await,
            Operation::WorkspaceSwitch { name } => self.workspace_switch(call, &name).await,
            Operation::WorkspaceInfo {} => self.workspace_info(call).await,
            Operation::Read { path } => self.read_file(call, &path).await,
            Operation::Write { path, content } => self.write_file(call, &path, &content).await,
            Operation::Ls { path } => self.list_dir(call, &path).await,
            Operation::Tree { path, max_depth } => self.tree(call, &path, max_depth).await,
            Operation::Mkdir { path } => self.make_dir(call, &path).await,
            Operation::Rm { path, recursive } => self.remove(call, &path, recursive).await,
            Operation::Mv { source, dest } => self.move_path(call, &source, &dest).await,
            Operation::Cp {
                source,
                dest,
                recursive,
            } => self.copy_path(call, &source, &dest, recursive).await,
            Operation::Cd { path } => self.change_dir(call, &path).await,
            Operation::Pwd {} => self.print_dir(call).await,
            Operation::Find {
                pattern,
                path,
                max_results,
            } => self.find(call, &pattern, &path, max_results).await,
            Operation::Grep {
                pattern,
                path,
                max_results,
            } => self.grep(call, &pattern, &path, max_results).await,
            Operation::CheckpointCreate { name, description } => {
                self.checkpoint_create(call, name.as_deref(), description.as_deref())
                    .await
            }
            Operation::CheckpointRestore { checkpoint } => {
                self.checkpoint_restore(call, &checkpoint).await
            }
            Operation::CheckpointList {} => self.checkpoint_list(call).await,
            Operation::CheckpointDelete { checkpoint_id } => {
                self.checkpoint_delete(call, &checkpoint_id).await
            }
        }
    }

    pub(crate) fn scope_or_default(&self, scope: Option<ScopeKind>) -> ScopeKind {
        scope.unwrap_or(self.config.default_scope)
    }

    /// The workspace a call acts on: the named one, else the caller's
    /// active workspace.
    pub(crate) async fn target(&self, call: Call<'_>) -> Result<Arc<Workspace>> {
        match call.workspace {
            Some(name) => {
                self.registry
                    .lookup(name, self.scope_or_default(call.scope), call.ctx)
                    .await
            }
            None => self.registry.get_active(call.ctx).await.ok_or_else(|| {
                Error::NotFound(
                    "no active workspace; create one or switch to an existing one".to_string(),
                )
            }),
        }
    }
}
