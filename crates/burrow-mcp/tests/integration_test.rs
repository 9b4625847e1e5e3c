//! Integration tests for the Burrow MCP server.
//!
//! These tests spawn the actual MCP server binary and talk to it over stdio
//! using JSON-RPC, so they cover argument parsing, logging setup, and the
//! transport as well as the tools.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

/// Helper to spawn the MCP server process
struct McpServerProcess {
    child: Child,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
    root: TempDir,
}

impl McpServerProcess {
    fn spawn() -> Self {
        Self::spawn_with_args(&[])
    }

    fn spawn_with_args(args: &[&str]) -> Self {
        let root = TempDir::new().expect("create temp dir");
        let binary = env!("CARGO_BIN_EXE_burrow-mcp");

        let mut child = Command::new(binary)
            .arg("--storage-root")
            .arg(root.path())
            .args(["--session-id", "integration"])
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap_or_else(|e| panic!("Failed to spawn MCP server at {binary}: {e}"));
        let stdout = BufReader::new(child.stdout.take().expect("stdout not captured"));

        Self {
            child,
            stdout,
            next_id: 1,
            root,
        }
    }

    fn root(&self) -> &std::path::Path {
        self.root.path()
    }

    /// Send a JSON-RPC request and get the response
    fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }));

        let mut line = String::new();
        self.stdout.read_line(&mut line).expect("read response");
        let response: Value = serde_json::from_str(&line)
            .unwrap_or_else(|e| panic!("parse response '{}': {}", line.trim(), e));
        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["id"], id);
        response
    }

    /// Send a notification (no response expected)
    fn notify(&mut self, method: &str) {
        self.send(&json!({"jsonrpc": "2.0", "method": method}));
    }

    fn send(&mut self, message: &Value) {
        let stdin = self.child.stdin.as_mut().expect("stdin not captured");
        let raw = serde_json::to_string(message).expect("serialize message");
        writeln!(stdin, "{raw}").expect("write message");
        stdin.flush().expect("flush stdin");
    }

    /// Call a tool and return `(is_error, parsed JSON body)`.
    fn call(&mut self, tool: &str, arguments: Value) -> (bool, Value) {
        let response = self.request(
            "tools/call",
            json!({"name": tool, "arguments": arguments}),
        );
        let result = response
            .get("result")
            .unwrap_or_else(|| panic!("Expected result, got: {response}"));
        let text = result["content"][0]["text"].as_str().expect("text content");
        let body = serde_json::from_str(text).expect("tool output is JSON");
        (result["isError"] == true, body)
    }
}

impl Drop for McpServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Perform MCP initialization handshake
fn initialize(server: &mut McpServerProcess) -> Value {
    let response = server.request(
        "initialize",
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "burrow-mcp-test", "version": "0.1.0"}
        }),
    );
    assert!(
        response.get("result").is_some(),
        "Expected result in initialize response, got: {response}"
    );
    server.notify("notifications/initialized");

    // Give the server a moment to process
    std::thread::sleep(Duration::from_millis(50));
    response
}

#[test]
fn test_mcp_initialize() {
    let mut server = McpServerProcess::spawn();
    let response = initialize(&mut server);

    let result = &response["result"];
    assert!(result.get("serverInfo").is_some(), "Expected serverInfo");
    assert!(
        result["capabilities"].get("tools").is_some(),
        "Expected tools capability"
    );
}

#[test]
fn test_mcp_list_tools() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let response = server.request("tools/list", json!({}));
    let tools = response["result"]["tools"]
        .as_array()
        .expect("tools should be an array");
    let names: Vec<_> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert_eq!(tools.len(), 21);
    for expected in ["workspace_create", "read", "write", "cd", "grep", "checkpoint_restore"] {
        assert!(names.contains(&expected), "missing tool {expected}: {names:?}");
    }

    for tool in tools {
        assert!(tool.get("description").is_some(), "Tool should have description");
        assert!(
            tool["inputSchema"]["properties"].is_object(),
            "Tool should have an object inputSchema: {tool}"
        );
    }
}

#[test]
fn test_mcp_write_then_read() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let (is_error, body) = server.call("workspace_create", json!({"name": "notes"}));
    assert!(!is_error, "create failed: {body}");
    assert_eq!(body["success"]["active"], true);

    let (is_error, body) = server.call(
        "write",
        json!({"path": "drafts/today.md", "content": "hello burrow"}),
    );
    assert!(!is_error, "write failed: {body}");
    assert_eq!(body["success"]["path"], "/drafts/today.md");

    server.call("cd", json!({"path": "drafts"}));
    let (is_error, body) = server.call("read", json!({"path": "today.md"}));
    assert!(!is_error, "read failed: {body}");
    assert_eq!(body["success"]["content"], "hello burrow");
}

#[test]
fn test_mcp_tool_errors_are_reported() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let (is_error, body) = server.call("pwd", json!({}));
    assert!(is_error);
    assert_eq!(body["error"]["kind"], "not_found");

    server.call("workspace_create", json!({"name": "w"}));
    let (is_error, body) = server.call("read", json!({"path": "../../etc/passwd"}));
    assert!(is_error);
    assert_eq!(body["error"]["kind"], "not_found");

    let (is_error, body) = server.call("workspace_create", json!({"name": "bad name!"}));
    assert!(is_error);
    assert_eq!(body["error"]["kind"], "invalid_argument");

    // Missing required parameters never reach the workspace.
    let response = server.request("tools/call", json!({"name": "read", "arguments": {}}));
    assert!(
        response.get("error").is_some(),
        "Expected invalid params, got: {response}"
    );
}

#[test]
fn test_mcp_unknown_tool() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let response = server.request(
        "tools/call",
        json!({"name": "nonexistent_tool", "arguments": {}}),
    );
    assert!(
        response.get("error").is_some(),
        "Expected error for unknown tool, got: {response}"
    );
}

#[test]
fn test_mcp_checkpoint_round_trip() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    server.call("workspace_create", json!({"name": "w"}));
    server.call("write", json!({"path": "/f", "content": "v1"}));
    let (is_error, body) = server.call("checkpoint_create", json!({"name": "v1"}));
    assert!(!is_error, "checkpoint failed: {body}");

    server.call("write", json!({"path": "/f", "content": "v2"}));
    let (is_error, body) = server.call("checkpoint_restore", json!({"checkpoint": "v1"}));
    assert!(!is_error, "restore failed: {body}");

    let (_, body) = server.call("read", json!({"path": "/f"}));
    assert_eq!(body["success"]["content"], "v1");
}

#[test]
fn test_mcp_filesystem_provider_writes_to_storage_root() {
    let mut server = McpServerProcess::spawn_with_args(&["--default-provider", "filesystem"]);
    initialize(&mut server);

    let (is_error, body) = server.call("workspace_create", json!({"name": "disk"}));
    assert!(!is_error, "create failed: {body}");
    let grid = body["success"]["workspace"]["grid_path"]
        .as_str()
        .expect("grid path")
        .to_string();
    assert!(grid.starts_with("session/sess-integration/"), "grid {grid}");

    server.call("write", json!({"path": "/out.txt", "content": "on disk"}));
    let host = server.root().join(&grid).join("out.txt");
    let content = std::fs::read_to_string(&host).expect("read host file");
    assert_eq!(content, "on disk");
}
