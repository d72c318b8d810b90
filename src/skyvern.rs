//! Hand-written Skyvern task tools.
//!
//! - `initiate_task`: start a browser-automation task
//! - `get_task_details`: fetch a run by id
//! - `cancel_task`: cancel a run by id
//!
//! Upstream failures come back as a normal tool result carrying the failure
//! envelope; only malformed arguments produce a JSON-RPC error.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::client::{SkyvernClient, TaskRequest};
use crate::envelope::is_failure;
use crate::error::Result;
use crate::protocol::{ToolCallResult, ToolDefinition};
use crate::tools::{parse_arguments, Tool, ToolRegistry};

/// MCP server name advertised by the hand-written adapter.
pub const SERVER_NAME: &str = "skyvern";

/// Build a registry holding the three task tools.
pub fn registry(client: SkyvernClient) -> ToolRegistry {
    let client = Arc::new(client);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(InitiateTaskTool::new(Arc::clone(&client))));
    registry.register(Arc::new(GetTaskDetailsTool::new(Arc::clone(&client))));
    registry.register(Arc::new(CancelTaskTool::new(client)));
    registry
}

/// Tool for starting a Skyvern task.
pub struct InitiateTaskTool {
    client: Arc<SkyvernClient>,
}

impl InitiateTaskTool {
    /// Create the tool.
    pub fn new(client: Arc<SkyvernClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for InitiateTaskTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "initiate_task".into(),
            description: "Initiates a task with the Skyvern API. Returns the Skyvern API response or a structured error object.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The starting URL for the task."
                    },
                    "prompt": {
                        "type": "string",
                        "description": "The goal or task for Skyvern to accomplish. Prompt specifically and simply, define a single clear goal with guardrails (e.g. 'close cookie dialogs'), say when to complete or terminate, and give concrete examples."
                    },
                    "title": {
                        "type": "string",
                        "description": "The title for the task."
                    },
                    "engine": {
                        "type": "string",
                        "enum": ["skyvern-1.0", "skyvern-2.0"],
                        "default": "skyvern-2.0",
                        "description": "The Skyvern engine version to use for this task."
                    },
                    "proxy_location": {
                        "type": "string",
                        "default": "RESIDENTIAL",
                        "description": "Geographic proxy location to route the browser traffic through."
                    },
                    "data_extraction_schema": {
                        "type": "object",
                        "description": "Schema defining what data should be extracted from the webpage."
                    },
                    "error_code_mapping": {
                        "type": "object",
                        "description": "Custom mapping of error codes to error messages if Skyvern encounters an error."
                    },
                    "max_steps": {
                        "type": "integer",
                        "minimum": 1,
                        "default": 10,
                        "description": "Maximum number of steps the task can take before timing out."
                    },
                    "webhook_url": {
                        "type": "string",
                        "description": "URL to send task status updates to after a run is finished."
                    },
                    "totp_identifier": {
                        "type": "string",
                        "description": "Identifier for TOTP authentication if codes are being pushed to Skyvern."
                    },
                    "totp_url": {
                        "type": "string",
                        "description": "URL Skyvern should poll for 2FA codes."
                    },
                    "browser_session_id": {
                        "type": "string",
                        "description": "ID of an existing browser session to reuse, continuing from its current screen state."
                    },
                    "publish_workflow": {
                        "type": "boolean",
                        "default": false,
                        "description": "Whether to publish this task as a reusable workflow."
                    }
                },
                "required": ["url", "prompt", "title"]
            }),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolCallResult> {
        let request: TaskRequest = parse_arguments(arguments)?;
        request.validate()?;

        tracing::debug!(title = %request.title, url = %request.url, "Initiating Skyvern task");
        let result = self.client.initiate_task(&request).await;
        if !is_failure(&result) {
            let run_id = result.get("run_id").and_then(|v| v.as_str()).unwrap_or("<unknown>");
            tracing::info!(run_id, "Skyvern task initiated");
        }
        ToolCallResult::json(&result, false)
    }
}

#[derive(Debug, Deserialize)]
struct RunArgs {
    /// Run identifier.
    run_id: String,
}

fn run_id_schema(description: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "run_id": {
                "type": "string",
                "description": description
            }
        },
        "required": ["run_id"]
    })
}

/// Tool for fetching a task.
pub struct GetTaskDetailsTool {
    client: Arc<SkyvernClient>,
}

impl GetTaskDetailsTool {
    /// Create the tool.
    pub fn new(client: Arc<SkyvernClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for GetTaskDetailsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_task_details".into(),
            description: "Gets details about a specific Skyvern task. Returns the task details or a structured error object.".into(),
            input_schema: run_id_schema("The unique identifier for the task."),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolCallResult> {
        let args: RunArgs = parse_arguments(arguments)?;
        let result = self.client.get_task_details(&args.run_id).await;
        ToolCallResult::json(&result, false)
    }
}

/// Tool for cancelling a task.
pub struct CancelTaskTool {
    client: Arc<SkyvernClient>,
}

impl CancelTaskTool {
    /// Create the tool.
    pub fn new(client: Arc<SkyvernClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for CancelTaskTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "cancel_task".into(),
            description: "Cancels a running Skyvern task. Returns the cancellation response or a structured error object.".into(),
            input_schema: run_id_schema("The unique identifier for the task to cancel."),
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolCallResult> {
        let args: RunArgs = parse_arguments(arguments)?;
        tracing::info!(run_id = %args.run_id, "Cancelling Skyvern task");
        let result = self.client.cancel_task(&args.run_id).await;
        ToolCallResult::json(&result, false)
    }
}
