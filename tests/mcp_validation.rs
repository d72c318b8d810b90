//! MCP server validation tests.
//!
//! Drives the compiled binary over stdio: handshake, tool listing, tool calls
//! against an unreachable deployment, and startup failures.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

const BIN: &str = env!("CARGO_BIN_EXE_skyvern-mcp");

/// Nothing listens on the discard port.
const UNREACHABLE: &str = "http://127.0.0.1:9";

// JSON-RPC 2.0 types
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl JsonRpcRequest {
    fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    #[allow(dead_code)]
    message: String,
}

fn fixture_spec() -> String {
    format!(
        "{}/tests/fixtures/skyvern_openapi.json",
        env!("CARGO_MANIFEST_DIR")
    )
}

/// Command for the binary with a clean Skyvern environment, run from an empty
/// directory so no `.env` file is picked up.
fn command(dir: &tempfile::TempDir, args: &[&str], env: &[(&str, &str)]) -> Command {
    let mut cmd = Command::new(BIN);
    cmd.args(args)
        .current_dir(dir.path())
        .env_remove("SKYVERN_URL")
        .env_remove("SKYVERN_API_KEY")
        .env_remove("SKYVERN_TIMEOUT_SECS")
        .env_remove("SKYVERN_OPENAPI_URL")
        .env("RUST_LOG", "warn")
        .kill_on_drop(true);
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd
}

/// MCP test client for validating the server.
struct McpTestClient {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    _dir: tempfile::TempDir,
}

impl McpTestClient {
    async fn spawn(args: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut child = command(
            &dir,
            args,
            &[("SKYVERN_URL", UNREACHABLE), ("SKYVERN_API_KEY", "test-key")],
        )
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn skyvern-mcp");

        let stdin = child.stdin.take().expect("stdin");
        let stdout = BufReader::new(child.stdout.take().expect("stdout"));
        Self {
            child,
            stdin,
            stdout,
            _dir: dir,
        }
    }

    async fn send_line(&mut self, line: &str) -> JsonRpcResponse {
        self.stdin.write_all(line.as_bytes()).await.expect("write");
        self.stdin.write_all(b"\n").await.expect("write");
        self.stdin.flush().await.expect("flush");

        let mut response = String::new();
        let read = timeout(Duration::from_secs(10), self.stdout.read_line(&mut response))
            .await
            .expect("response within timeout")
            .expect("read");
        assert!(read > 0, "server closed connection");
        serde_json::from_str(&response).expect("valid JSON-RPC response")
    }

    async fn send_request(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        let json = serde_json::to_string(&request).expect("serialize");
        self.send_line(&json).await
    }

    async fn initialize(&mut self) -> JsonRpcResponse {
        self.send_request(JsonRpcRequest::new(
            1,
            "initialize",
            Some(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "0.1.0"}
            })),
        ))
        .await
    }

    async fn call_tool(&mut self, id: u64, name: &str, arguments: Value) -> JsonRpcResponse {
        self.send_request(JsonRpcRequest::new(
            id,
            "tools/call",
            Some(json!({"name": name, "arguments": arguments})),
        ))
        .await
    }

    async fn tool_names(&mut self) -> Vec<String> {
        let response = self
            .send_request(JsonRpcRequest::new(2, "tools/list", None))
            .await;
        assert!(response.error.is_none(), "tools/list failed: {:?}", response.error);
        response.result.expect("result")["tools"]
            .as_array()
            .expect("tools array")
            .iter()
            .map(|t| t["name"].as_str().expect("name").to_string())
            .collect()
    }

    async fn close(mut self) {
        let _ = self.child.kill().await;
    }
}

fn envelope_of(response: &JsonRpcResponse) -> Value {
    let result = response.result.as_ref().expect("tool result");
    let text = result["content"][0]["text"].as_str().expect("text content");
    serde_json::from_str(text).expect("envelope is JSON")
}

/// Run the binary to completion with stdin closed.
async fn run_to_exit(args: &[&str], env: &[(&str, &str)]) -> std::process::Output {
    let dir = tempfile::tempdir().expect("tempdir");
    let child = command(&dir, args, env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn skyvern-mcp");
    timeout(Duration::from_secs(20), child.wait_with_output())
        .await
        .expect("process exits")
        .expect("wait")
}

// ============================================================================
// Protocol Compliance Tests
// ============================================================================

#[tokio::test]
async fn test_initialize_handshake() {
    let mut client = McpTestClient::spawn(&["--server", "skyvern"]).await;

    let response = client.initialize().await;
    assert_eq!(response.jsonrpc, "2.0");
    assert_eq!(response.id, Some(1));
    assert!(response.error.is_none(), "Should not have error");

    let result = response.result.expect("result");
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "skyvern");
    assert!(result["capabilities"]["tools"].is_object());

    client.close().await;
}

#[tokio::test]
async fn test_list_tools() {
    let mut client = McpTestClient::spawn(&["-s", "skyvern"]).await;
    client.initialize().await;

    assert_eq!(
        client.tool_names().await,
        vec!["initiate_task", "get_task_details", "cancel_task"]
    );

    client.close().await;
}

#[tokio::test]
async fn test_list_before_initialize_is_rejected() {
    let mut client = McpTestClient::spawn(&["-s", "skyvern"]).await;

    let response = client
        .send_request(JsonRpcRequest::new(1, "tools/list", None))
        .await;
    assert_eq!(response.error.expect("error").code, -32603);

    client.close().await;
}

#[tokio::test]
async fn test_parse_error_and_unknown_method() {
    let mut client = McpTestClient::spawn(&["-s", "skyvern"]).await;

    let response = client.send_line("this is not json").await;
    assert_eq!(response.id, None);
    assert_eq!(response.error.expect("error").code, -32700);

    let response = client
        .send_request(JsonRpcRequest::new(7, "prompts/list", None))
        .await;
    assert_eq!(response.id, Some(7));
    assert_eq!(response.error.expect("error").code, -32601);

    client.close().await;
}

// ============================================================================
// Tool Calls
// ============================================================================

#[tokio::test]
async fn test_get_task_details_unreachable_returns_network_error() {
    let mut client = McpTestClient::spawn(&["-s", "skyvern"]).await;
    client.initialize().await;

    let response = client
        .call_tool(3, "get_task_details", json!({"run_id": "tsk_123"}))
        .await;
    assert!(response.error.is_none(), "envelope is a normal result");
    assert_eq!(response.result.as_ref().expect("result")["isError"], false);

    let envelope = envelope_of(&response);
    assert_eq!(envelope["error"], "NetworkError");
    assert_eq!(
        envelope["message"],
        "Failed to connect to Skyvern API or other network issue."
    );
    assert!(envelope["details"].is_string());

    client.close().await;
}

#[tokio::test]
async fn test_invalid_arguments_are_rejected() {
    let mut client = McpTestClient::spawn(&["-s", "skyvern"]).await;
    client.initialize().await;

    let response = client
        .call_tool(4, "initiate_task", json!({"url": "https://example.com", "prompt": "p"}))
        .await;
    assert_eq!(response.error.expect("error").code, -32602);

    let response = client
        .call_tool(
            5,
            "initiate_task",
            json!({"url": "https://example.com", "prompt": "p", "title": "t", "engine": "skyvern-3.0"}),
        )
        .await;
    assert_eq!(response.error.expect("error").code, -32602);

    let response = client.call_tool(6, "no_such_tool", json!({})).await;
    assert_eq!(response.error.expect("error").code, -32601);

    client.close().await;
}

#[tokio::test]
async fn test_shutdown_exits_cleanly() {
    let mut client = McpTestClient::spawn(&["-s", "skyvern"]).await;
    client.initialize().await;

    let response = client
        .send_request(JsonRpcRequest::new(9, "shutdown", None))
        .await;
    assert!(response.error.is_none());

    let status = timeout(Duration::from_secs(10), client.child.wait())
        .await
        .expect("exits after shutdown")
        .expect("wait");
    assert!(status.success());
}

// ============================================================================
// Generated Adapter
// ============================================================================

#[tokio::test]
async fn test_generated_server_lists_fixture_routes() {
    let spec = fixture_spec();
    let mut client =
        McpTestClient::spawn(&["--server", "skyvern-openapi", "--openapi-url", &spec]).await;

    let response = client.initialize().await;
    let result = response.result.expect("result");
    assert_eq!(result["serverInfo"]["name"], "Skyvern");
    assert!(result["capabilities"].get("resources").is_none());

    assert_eq!(
        client.tool_names().await,
        vec!["run_task", "get_run", "cancel_run", "get_v1_workflows"]
    );

    client.close().await;
}

#[tokio::test]
async fn test_generated_tool_failure_is_flagged() {
    let spec = fixture_spec();
    let mut client =
        McpTestClient::spawn(&["-s", "skyvern_openapi", "--openapi-url", &spec]).await;
    client.initialize().await;

    let response = client.call_tool(3, "get_run", json!({"run_id": "tsk_1"})).await;
    assert_eq!(response.result.as_ref().expect("result")["isError"], true);
    assert_eq!(envelope_of(&response)["error"], "NetworkError");

    let response = client.call_tool(4, "get_run", json!({})).await;
    assert_eq!(response.error.expect("error").code, -32602);

    client.close().await;
}

// ============================================================================
// Startup Failures
// ============================================================================

#[tokio::test]
async fn test_missing_environment_exits_nonzero() {
    let output = run_to_exit(&["-s", "skyvern"], &[]).await;
    assert!(!output.status.success());
    assert!(output.stdout.is_empty(), "nothing written to the protocol channel");
    assert!(String::from_utf8_lossy(&output.stderr).contains("SKYVERN_URL"));

    let output = run_to_exit(&["-s", "skyvern"], &[("SKYVERN_URL", UNREACHABLE)]).await;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("SKYVERN_API_KEY"));
}

#[tokio::test]
async fn test_unknown_selector_exits_nonzero() {
    let env = [("SKYVERN_URL", UNREACHABLE), ("SKYVERN_API_KEY", "k")];

    let output = run_to_exit(&["--server", "bogus"], &env).await;
    assert!(!output.status.success());

    let output = run_to_exit(&[], &env).await;
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_unreachable_spec_fails_fast() {
    let env = [("SKYVERN_URL", UNREACHABLE), ("SKYVERN_API_KEY", "k")];

    let output = run_to_exit(
        &["-s", "skyvern-openapi", "--openapi-url", "http://127.0.0.1:9/openapi.json"],
        &env,
    )
    .await;
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());

    let output = run_to_exit(
        &["-s", "skyvern-openapi", "--openapi-url", "/no/such/openapi.json"],
        &env,
    )
    .await;
    assert!(!output.status.success());
}
