//! skyvern-mcp - MCP server for the Skyvern browser-automation API
//!
//! Serves either the hand-written task tools or tools generated from the
//! Skyvern OpenAPI document over stdio.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use skyvern_mcp::config::SkyvernConfig;
use skyvern_mcp::resources::ResourceRegistry;
use skyvern_mcp::server::{McpServer, SERVER_VERSION};
use skyvern_mcp::{generated, openapi, skyvern, SkyvernClient};

/// Which adapter to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ServerKind {
    /// Hand-written task tools.
    Skyvern,
    /// Tools generated from the OpenAPI document.
    #[value(name = "skyvern-openapi", alias = "skyvern_openapi")]
    SkyvernOpenapi,
}

/// MCP server for the Skyvern API.
#[derive(Parser, Debug)]
#[command(name = "skyvern-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server to run.
    #[arg(short, long, value_enum)]
    server: ServerKind,

    /// OpenAPI document URL or file path (overrides SKYVERN_OPENAPI_URL).
    #[arg(long)]
    openapi_url: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Load .env before anything reads the environment.
    let dotenv = dotenvy::dotenv();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Log to stderr (not stdout, which is used for MCP protocol)
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    tracing::info!("Starting skyvern-mcp v{}", SERVER_VERSION);

    let server = match build_server(&args).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Startup failed: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    server.inventory().log();

    match server.run_stdio().await {
        Ok(()) => {
            tracing::info!("Server exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn build_server(args: &Args) -> anyhow::Result<Arc<McpServer>> {
    let mut config = SkyvernConfig::from_env().context("invalid configuration")?;
    if let Some(url) = &args.openapi_url {
        config = config.with_openapi_spec(url.clone());
    }
    tracing::debug!(?config, "Resolved configuration");

    let server = match args.server {
        ServerKind::Skyvern => {
            let client = SkyvernClient::new(&config)?;
            McpServer::new(
                skyvern::SERVER_NAME,
                skyvern::registry(client),
                ResourceRegistry::new(),
            )
        }
        ServerKind::SkyvernOpenapi => {
            let source = openapi::spec_source(&config.openapi_spec, config.timeout)?;
            let api = generated::build(&config, source.as_ref(), &generated::default_route_maps())
                .await
                .with_context(|| format!("loading OpenAPI spec from {}", source.location()))?;
            if let Some(title) = &api.title {
                tracing::info!("Generated tools from '{}'", title);
            }
            McpServer::new(generated::SERVER_NAME, api.tools, api.resources)
        }
    };

    Ok(Arc::new(server))
}
