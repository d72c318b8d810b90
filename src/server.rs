//! MCP server implementation.

use std::io::BufRead;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;

use crate::error::{codes, Error, Result};
use crate::protocol::{
    InitializeParams, InitializeResult, JsonRpcId, JsonRpcRequest, JsonRpcResponse,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, McpMessage,
    ReadResourceParams, ResourcesCapability, ServerCapabilities, ServerInfo, ToolCallParams,
    ToolsCapability,
};
use crate::resources::ResourceRegistry;
use crate::tools::ToolRegistry;

/// MCP protocol version.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server version.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialization.
    Uninitialized,
    /// Server is initialized and ready.
    Ready,
    /// Server is shutting down.
    ShuttingDown,
}

/// Names of everything a server publishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    /// Tool names.
    pub tools: Vec<String>,
    /// Resource names.
    pub resources: Vec<String>,
    /// Resource template names.
    pub templates: Vec<String>,
}

impl Inventory {
    /// Log one line per category.
    pub fn log(&self) {
        tracing::info!("{} Tool(s): {}", self.tools.len(), self.tools.join(", "));
        tracing::info!(
            "{} Resource(s): {}",
            self.resources.len(),
            self.resources.join(", ")
        );
        tracing::info!(
            "{} Resource Template(s): {}",
            self.templates.len(),
            self.templates.join(", ")
        );
    }
}

/// MCP server over a fixed set of tools and resources.
pub struct McpServer {
    name: String,
    state: RwLock<ServerState>,
    tools: ToolRegistry,
    resources: ResourceRegistry,
}

impl McpServer {
    /// Create a server publishing the given registries.
    pub fn new(name: impl Into<String>, tools: ToolRegistry, resources: ResourceRegistry) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(ServerState::Uninitialized),
            tools,
            resources,
        }
    }

    /// Advertised server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enumerate published tools, resources and templates.
    pub fn inventory(&self) -> Inventory {
        Inventory {
            tools: self.tools.names(),
            resources: self
                .resources
                .list_resources()
                .into_iter()
                .map(|r| r.name)
                .collect(),
            templates: self
                .resources
                .list_templates()
                .into_iter()
                .map(|t| t.name)
                .collect(),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// Run the server on stdio until EOF, `shutdown` or `exit`.
    ///
    /// `tools/call` and `resources/read` run as separate tasks; every response
    /// goes through a single writer task.
    pub async fn run_stdio(self: Arc<Self>) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(response) = rx.recv().await {
                let json = serde_json::to_string(&response)?;
                tracing::debug!("Sending: {}", json);
                stdout.write_all(json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            Ok::<(), Error>(())
        });

        tracing::info!("MCP server '{}' starting on stdio", self.name);

        let mut lines = spawn_stdin_reader();
        let mut in_flight = JoinSet::new();

        while let Some(line) = lines.recv().await {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            tracing::debug!("Received: {}", line);

            match McpMessage::parse(line) {
                Ok(McpMessage::Request(request)) if runs_detached(&request.method) => {
                    let server = Arc::clone(&self);
                    let tx = tx.clone();
                    in_flight.spawn(async move {
                        let response = server.handle_request(request).await;
                        let _ = tx.send(response);
                    });
                }
                Ok(message) => {
                    if let Some(response) = self.dispatch(message).await {
                        let _ = tx.send(response);
                    }
                }
                Err(e) => {
                    let _ = tx.send(JsonRpcResponse::from_error(None, &e));
                }
            }

            // Reap finished calls so the set does not grow unbounded.
            while in_flight.try_join_next().is_some() {}

            if self.state().await == ServerState::ShuttingDown {
                break;
            }
        }

        while in_flight.join_next().await.is_some() {}
        drop(tx);
        writer
            .await
            .map_err(|e| Error::Internal(format!("writer task failed: {e}")))??;

        tracing::info!("MCP server shutting down");
        Ok(())
    }

    /// Handle an incoming message.
    pub async fn handle_message(&self, json: &str) -> Option<JsonRpcResponse> {
        match McpMessage::parse(json) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => Some(JsonRpcResponse::from_error(None, &e)),
        }
    }

    async fn dispatch(&self, message: McpMessage) -> Option<JsonRpcResponse> {
        match message {
            McpMessage::Request(request) => Some(self.handle_request(request).await),
            McpMessage::Notification(notification) => {
                self.handle_notification(notification).await;
                None
            }
            // We don't expect responses in this direction
            McpMessage::Response(_) => None,
        }
    }

    /// Handle a JSON-RPC request.
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params).await,
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => self.handle_tools_list(id).await,
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "resources/list" => self.handle_resources_list(id).await,
            "resources/templates/list" => self.handle_templates_list(id).await,
            "resources/read" => self.handle_resources_read(id, request.params).await,
            "shutdown" => {
                *self.state.write().await = ServerState::ShuttingDown;
                JsonRpcResponse::success(id, serde_json::json!({}))
            }
            _ => JsonRpcResponse::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("method not found: {}", request.method),
            ),
        }
    }

    /// Handle a notification (no response expected).
    async fn handle_notification(&self, notification: JsonRpcRequest) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                tracing::info!("Client initialized");
            }
            "notifications/cancelled" => {
                tracing::debug!("Request cancelled by client");
            }
            "exit" => {
                *self.state.write().await = ServerState::ShuttingDown;
            }
            _ => {
                tracing::debug!("Unknown notification: {}", notification.method);
            }
        }
    }

    async fn handle_initialize(
        &self,
        id: Option<JsonRpcId>,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        let params: InitializeParams = match parse_params(params, "initialize") {
            Ok(params) => params,
            Err(e) => return JsonRpcResponse::from_error(id, &e),
        };
        tracing::info!(
            "Initializing for {} {} (protocol {})",
            params.client_info.name,
            params.client_info.version,
            params.protocol_version
        );

        *self.state.write().await = ServerState::Ready;

        let resources = (!self.resources.is_empty()).then(ResourcesCapability::default);
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
                resources,
            },
            server_info: ServerInfo {
                name: self.name.clone(),
                version: SERVER_VERSION.into(),
            },
        };

        JsonRpcResponse::success(id, result)
    }

    async fn ensure_ready(&self) -> Result<()> {
        match self.state().await {
            ServerState::Ready => Ok(()),
            _ => Err(Error::NotInitialized),
        }
    }

    async fn handle_tools_list(&self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        if let Err(e) = self.ensure_ready().await {
            return JsonRpcResponse::from_error(id, &e);
        }
        JsonRpcResponse::success(
            id,
            ListToolsResult {
                tools: self.tools.list_tools(),
            },
        )
    }

    async fn handle_tools_call(
        &self,
        id: Option<JsonRpcId>,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        if let Err(e) = self.ensure_ready().await {
            return JsonRpcResponse::from_error(id, &e);
        }
        let params: ToolCallParams = match parse_params(params, "tool call") {
            Ok(params) => params,
            Err(e) => return JsonRpcResponse::from_error(id, &e),
        };

        match self.tools.execute(&params.name, params.arguments).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                tracing::error!("Tool {} failed: {}", params.name, e);
                JsonRpcResponse::from_error(id, &e)
            }
        }
    }

    async fn handle_resources_list(&self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        if let Err(e) = self.ensure_ready().await {
            return JsonRpcResponse::from_error(id, &e);
        }
        JsonRpcResponse::success(
            id,
            ListResourcesResult {
                resources: self.resources.list_resources(),
            },
        )
    }

    async fn handle_templates_list(&self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        if let Err(e) = self.ensure_ready().await {
            return JsonRpcResponse::from_error(id, &e);
        }
        JsonRpcResponse::success(
            id,
            ListResourceTemplatesResult {
                resource_templates: self.resources.list_templates(),
            },
        )
    }

    async fn handle_resources_read(
        &self,
        id: Option<JsonRpcId>,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        if let Err(e) = self.ensure_ready().await {
            return JsonRpcResponse::from_error(id, &e);
        }
        let params: ReadResourceParams = match parse_params(params, "resource read") {
            Ok(params) => params,
            Err(e) => return JsonRpcResponse::from_error(id, &e),
        };

        match self.resources.read(&params.uri).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                tracing::error!("Reading {} failed: {}", params.uri, e);
                JsonRpcResponse::from_error(id, &e)
            }
        }
    }
}

/// Read stdin lines on a detached thread.
///
/// A blocking stdin read cannot be cancelled, so it must not live on the
/// runtime or shutdown would wait for the next input line.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Requests that may wait on the upstream API.
fn runs_detached(method: &str) -> bool {
    matches!(method, "tools/call" | "resources/read")
}

fn parse_params<T>(params: Option<serde_json::Value>, what: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let params = params.ok_or_else(|| Error::InvalidParams(format!("{what} params required")))?;
    serde_json::from_value(params)
        .map_err(|e| Error::InvalidParams(format!("invalid {what} params: {e}")))
}
