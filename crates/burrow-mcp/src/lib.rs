//! Burrow MCP Server
//!
//! Exposes Burrow workspaces to AI agents with one MCP tool per operation,
//! each named by its operation tag (`workspace_create`, `read`, `grep`,
//! `checkpoint_restore`, ...). Every call acts as the caller identity the
//! server was started with.

pub mod params;

use std::sync::Arc;

use burrow::{Burrow, CallerContext, ToolError, ToolRequest, ToolResponse};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    model::*,
    service::{RequestContext, RoleServer},
};
use serde::de::DeserializeOwned;

use crate::params::*;

/// MCP server serving one [`Burrow`] as one caller.
#[derive(Clone)]
pub struct BurrowServer {
    burrow: Arc<Burrow>,
    context: CallerContext,
}

impl std::fmt::Debug for BurrowServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BurrowServer")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

fn parse<P: DeserializeOwned>(tool: &str, arguments: Option<JsonObject>) -> Result<P, McpError> {
    // Tools whose parameters are all optional may be called without arguments.
    let arguments = arguments.unwrap_or_default();
    serde_json::from_value(serde_json::Value::Object(arguments)).map_err(|e| {
        McpError::invalid_params(format!("Invalid parameters for '{tool}': {e}"), None)
    })
}

fn tool<P: ToolParams>() -> Tool {
    let schema = rmcp::schemars::schema_for!(P);
    let schema_json = serde_json::to_value(schema).unwrap_or_default();
    let input_schema = match schema_json {
        serde_json::Value::Object(map) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    };

    Tool {
        name: P::NAME.into(),
        title: Some(P::TITLE.into()),
        description: Some(P::DESCRIPTION.into()),
        input_schema,
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

impl BurrowServer {
    /// Serve `burrow` on behalf of `context`.
    pub fn new(burrow: Arc<Burrow>, context: CallerContext) -> Self {
        Self { burrow, context }
    }

    /// The caller identity attached to every request.
    pub fn context(&self) -> &CallerContext {
        &self.context
    }

    /// Run a request and render the response as the tool result.
    ///
    /// The JSON body is the same `{"success": ...}` / `{"error": ...}`
    /// shape every transport returns; failures also set `isError`.
    async fn dispatch(&self, request: burrow::Result<ToolRequest>) -> CallToolResult {
        let response = match request {
            Ok(request) => self.burrow.call(request).await,
            Err(err) => ToolResponse::Error(ToolError::from(&err)),
        };
        let text = serde_json::to_string_pretty(&response).unwrap_or_else(|e| {
            format!(r#"{{"error": {{"kind": "storage", "message": "unserializable response: {e}"}}}}"#)
        });
        if response.is_success() {
            CallToolResult::success(vec![Content::text(text)])
        } else {
            CallToolResult::error(vec![Content::text(text)])
        }
    }

    /// Parse `arguments` as `P` and run the request it describes.
    async fn run<P: ToolParams>(
        &self,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        let params = parse::<P>(P::NAME, arguments)?;
        Ok(self.dispatch(params.into_request(&self.context)).await)
    }

    fn tools() -> Vec<Tool> {
        vec![
            tool::<WorkspaceCreateParams>(),
            tool::<WorkspaceDestroyParams>(),
            tool::<WorkspaceListParams>(),
            tool::<WorkspaceSwitchParams>(),
            tool::<WorkspaceInfoParams>(),
            tool::<ReadParams>(),
            tool::<WriteParams>(),
            tool::<LsParams>(),
            tool::<TreeParams>(),
            tool::<MkdirParams>(),
            tool::<RmParams>(),
            tool::<MvParams>(),
            tool::<CpParams>(),
            tool::<CdParams>(),
            tool::<PwdParams>(),
            tool::<FindParams>(),
            tool::<GrepParams>(),
            tool::<CheckpointCreateParams>(),
            tool::<CheckpointRestoreParams>(),
            tool::<CheckpointListParams>(),
            tool::<CheckpointDeleteParams>(),
        ]
    }
}

impl ServerHandler for BurrowServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Burrow provides persistent virtual filesystem workspaces. Start with \
                'workspace_create', then use the file tools (read, write, ls, cd, grep, ...) \
                and take checkpoints before risky changes. Relative paths resolve against \
                your working directory and can never leave the workspace root. Results are \
                JSON with either a 'success' or an 'error' object."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request.arguments;
        match request.name.as_ref() {
            WorkspaceCreateParams::NAME => self.run::<WorkspaceCreateParams>(arguments).await,
            WorkspaceDestroyParams::NAME => self.run::<WorkspaceDestroyParams>(arguments).await,
            WorkspaceListParams::NAME => self.run::<WorkspaceListParams>(arguments).await,
            WorkspaceSwitchParams::NAME => self.run::<WorkspaceSwitchParams>(arguments).await,
            WorkspaceInfoParams::NAME => self.run::<WorkspaceInfoParams>(arguments).await,
            ReadParams::NAME => self.run::<ReadParams>(arguments).await,
            WriteParams::NAME => self.run::<WriteParams>(arguments).await,
            LsParams::NAME => self.run::<LsParams>(arguments).await,
            TreeParams::NAME => self.run::<TreeParams>(arguments).await,
            MkdirParams::NAME => self.run::<MkdirParams>(arguments).await,
            RmParams::NAME => self.run::<RmParams>(arguments).await,
            MvParams::NAME => self.run::<MvParams>(arguments).await,
            CpParams::NAME => self.run::<CpParams>(arguments).await,
            CdParams::NAME => self.run::<CdParams>(arguments).await,
            PwdParams::NAME => self.run::<PwdParams>(arguments).await,
            FindParams::NAME => self.run::<FindParams>(arguments).await,
            GrepParams::NAME => self.run::<GrepParams>(arguments).await,
            CheckpointCreateParams::NAME => self.run::<CheckpointCreateParams>(arguments).await,
            CheckpointRestoreParams::NAME => self.run::<CheckpointRestoreParams>(arguments).await,
            CheckpointListParams::NAME => self.run::<CheckpointListParams>(arguments).await,
            CheckpointDeleteParams::NAME => self.run::<CheckpointDeleteParams>(arguments).await,
            other => Err(McpError::invalid_params(
                format!("Unknown tool: {other}"),
                None,
            )),
        }
    }
}
