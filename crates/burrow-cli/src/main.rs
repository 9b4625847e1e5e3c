//! Burrow CLI - JSON-lines harness for Burrow workspaces
//!
//! Usage:
//!   burrow -c '{"operation": "pwd"}'   Run one request
//!   burrow script.jsonl                Run each line of a file
//!   burrow                             Read requests from stdin
//!
//! Each request is a JSON object in the tool request shape; each response
//! is printed as one JSON line. Requests without identity use the
//! `--user-id` / `--session-id` defaults.

use std::path::PathBuf;

use anyhow::Context;
use burrow::{Burrow, BurrowConfig, CallerContext, ProviderKind, ToolRequest};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "burrow", version, about = "Run Burrow tool requests as JSON lines")]
struct Args {
    /// Run a single request given inline.
    #[arg(short = 'c', conflicts_with = "script")]
    command: Option<String>,

    /// File of newline-separated requests.
    script: Option<PathBuf>,

    /// Directory holding filesystem and SQLite workspaces.
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// Sandbox partition served by this process.
    #[arg(long)]
    sandbox_id: Option<String>,

    /// Provider for new workspaces: memory, filesystem, or sqlite.
    #[arg(long)]
    default_provider: Option<ProviderKind>,

    /// User identity for requests that carry none.
    #[arg(long, env = "BURROW_USER_ID")]
    user_id: Option<String>,

    /// Session identity for requests that carry none.
    #[arg(long, env = "BURROW_SESSION_ID", default_value = "cli")]
    session_id: String,
}

impl Args {
    fn config(&self) -> BurrowConfig {
        let mut config = BurrowConfig::default();
        if let Some(root) = &self.storage_root {
            config.storage_root = root.clone();
        }
        config.sandbox_id = self.sandbox_id.clone();
        if let Some(provider) = self.default_provider {
            config.default_provider = provider;
        }
        config
    }

    fn default_context(&self) -> CallerContext {
        CallerContext {
            user_id: self.user_id.clone(),
            session_id: Some(self.session_id.clone()),
        }
    }
}

/// Parse and run one line, returning the response line.
async fn run_line(burrow: &Burrow, defaults: &CallerContext, line: &str) -> String {
    let response = match serde_json::from_str::<ToolRequest>(line) {
        Ok(mut request) => {
            if request.context.is_empty() {
                request.context = defaults.clone();
            }
            serde_json::to_string(&burrow.call(request).await)
        }
        Err(e) => serde_json::to_string(&serde_json::json!({
            "error": {"kind": "invalid_argument", "message": format!("bad request: {e}")}
        })),
    };
    response.unwrap_or_else(|e| format!(r#"{{"error":{{"kind":"storage","message":"{e}"}}}}"#))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let args = Args::parse();
    let burrow = Burrow::new(args.config()).context("invalid configuration")?;
    let defaults = args.default_context();
    let mut stdout = tokio::io::stdout();

    let lines: Vec<String> = if let Some(command) = &args.command {
        vec![command.clone()]
    } else if let Some(script) = &args.script {
        std::fs::read_to_string(script)
            .with_context(|| format!("burrow: {}", script.display()))?
            .lines()
            .map(str::to_string)
            .collect()
    } else {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = run_line(&burrow, &defaults, &line).await;
            stdout.write_all(format!("{response}\n").as_bytes()).await?;
            stdout.flush().await?;
        }
        return Ok(());
    };

    for line in lines.iter().filter(|l| !l.trim().is_empty()) {
        let response = run_line(&burrow, &defaults, line).await;
        stdout.write_all(format!("{response}\n").as_bytes()).await?;
    }
    stdout.flush().await?;
    Ok(())
}
