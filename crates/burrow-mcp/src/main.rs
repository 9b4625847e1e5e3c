//! Burrow MCP Server
//!
//! This binary serves Burrow workspaces as an MCP server over stdio.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use burrow::{Burrow, BurrowConfig, CallerContext, ProviderKind, ScopeKind};
use burrow_mcp::BurrowServer;
use clap::Parser;
use rmcp::ServiceExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Serve Burrow workspaces over MCP (stdio).
#[derive(Debug, Parser)]
#[command(name = "burrow-mcp", version)]
struct Args {
    /// JSON configuration file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding filesystem and SQLite workspaces.
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// Sandbox partition served by this process.
    #[arg(long)]
    sandbox_id: Option<String>,

    /// Provider for new workspaces: memory, filesystem, or sqlite.
    #[arg(long)]
    default_provider: Option<ProviderKind>,

    /// Scope used when a call names none: session, user, or sandbox.
    #[arg(long)]
    default_scope: Option<ScopeKind>,

    /// User identity attached to every call.
    #[arg(long, env = "BURROW_USER_ID")]
    user_id: Option<String>,

    /// Session identity attached to every call; a fresh one when unset.
    #[arg(long, env = "BURROW_SESSION_ID")]
    session_id: Option<String>,
}

impl Args {
    fn config(&self) -> anyhow::Result<BurrowConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
            }
            None => BurrowConfig::default(),
        };
        if let Some(root) = &self.storage_root {
            config.storage_root = root.clone();
        }
        if let Some(id) = &self.sandbox_id {
            config.sandbox_id = Some(id.clone());
        }
        if let Some(provider) = self.default_provider {
            config.default_provider = provider;
        }
        if let Some(scope) = self.default_scope {
            config.default_scope = scope;
        }
        Ok(config)
    }

    fn context(&self) -> CallerContext {
        CallerContext {
            user_id: self.user_id.clone(),
            session_id: Some(
                self.session_id
                    .clone()
                    .unwrap_or_else(|| ulid::Ulid::new().to_string()),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interfere with MCP stdio
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let config = args.config()?;
    let context = args.context();
    tracing::info!(
        storage_root = %config.storage_root.display(),
        provider = %config.default_provider,
        caller = %context.caller_key(),
        "Starting Burrow MCP server"
    );

    let burrow = Burrow::new(config)?;
    let server = BurrowServer::new(Arc::new(burrow), context);

    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("Failed to start MCP service: {}", e);
        })?;

    tracing::info!("Burrow MCP server running");
    service.waiting().await?;
    tracing::info!("Burrow MCP server shutting down");

    Ok(())
}
