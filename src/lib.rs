//! # skyvern-mcp
//!
//! MCP (Model Context Protocol) server exposing the Skyvern browser-automation
//! API as tools for AI assistants.
//!
//! Two adapters are available:
//!
//! - **`skyvern`**: three hand-written tools (`initiate_task`,
//!   `get_task_details`, `cancel_task`) that always answer with either the
//!   Skyvern response body or a normalized failure envelope.
//! - **`skyvern-openapi`**: one tool per route of the Skyvern OpenAPI
//!   document, generated at startup.
//!
//! ## Configuration
//!
//! `SKYVERN_URL` and `SKYVERN_API_KEY` are required and may come from a
//! `.env` file. See [`config`] for the optional settings.
//!
//! ## Usage with VS Code
//!
//! Add to your `.vscode/mcp.json`:
//!
//! ```json
//! {
//!   "servers": {
//!     "skyvern": {
//!       "command": "skyvern-mcp",
//!       "args": ["--server", "skyvern"],
//!       "env": {
//!         "SKYVERN_URL": "https://api.skyvern.com",
//!         "SKYVERN_API_KEY": "..."
//!       }
//!     }
//!   }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod generated;
pub mod openapi;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod skyvern;
pub mod tools;

pub use client::{SkyvernClient, TaskRequest};
pub use config::SkyvernConfig;
pub use envelope::ApiFailure;
pub use error::{Error, Result};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, McpMessage};
pub use server::McpServer;
pub use tools::{Tool, ToolRegistry};
