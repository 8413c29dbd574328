//! Tool servers.
//!
//! `newsletter serve mcp` exposes the [`ToolRegistry`] to AI assistants over
//! one of two transports:
//!
//! - **stdio** (default): MCP JSON-RPC on stdin/stdout. Logs go to stderr.
//! - **HTTP** (`--http`): MCP streamable HTTP at `/mcp`, plus a plain JSON API.
//!
//! # HTTP endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/mcp` | MCP streamable HTTP transport |
//! | `GET`  | `/tools/list` | List all tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "get_articles_batch: too many articles requested: 6 (max 5)" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `tool_error` (500).
//!
//! # Client configuration
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "newsletter": {
//!       "command": "newsletter",
//!       "args": ["--config", "/path/to/newsletter.toml", "serve", "mcp"]
//!     }
//!   }
//! }
//! ```

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::io::stdio;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use rmcp::ServiceExt;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::ArchiveError;
use crate::mcp::McpBridge;
use crate::query::QueryService;
use crate::store::ArchiveStore;
use crate::tools::{ToolContext, ToolRegistry};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
}

/// Open the archive read path shared by both transports.
async fn open_tools(config: &Config) -> anyhow::Result<(ToolContext, Arc<ToolRegistry>)> {
    let store = ArchiveStore::open_read_only(&config.db.path)
        .await
        .with_context(|| format!("Failed to open archive at {}", config.db.path.display()))?;
    let ctx = ToolContext::new(Arc::new(QueryService::new(store)));
    Ok((ctx, Arc::new(ToolRegistry::with_builtins())))
}

/// `newsletter serve mcp`: serve MCP over stdin/stdout until the client hangs up.
pub async fn run_stdio_server(config: &Config) -> anyhow::Result<()> {
    let (ctx, tools) = open_tools(config).await?;

    if atty::is(atty::Stream::Stdin) {
        tracing::warn!(
            "serve mcp speaks JSON-RPC on stdin/stdout and is meant to be launched by an MCP client; use --http for a network server"
        );
    }

    let bridge = McpBridge::new(ctx, tools);
    let running = bridge
        .serve(stdio())
        .await
        .context("Failed to start MCP stdio transport")?;
    tracing::info!("MCP stdio server ready");
    running.waiting().await?;
    Ok(())
}

/// `newsletter serve mcp --http`: serve MCP streamable HTTP and the JSON tool API.
pub async fn run_http_server(config: &Config) -> anyhow::Result<()> {
    let (ctx, tools) = open_tools(config).await?;
    let app = router(ctx, tools);

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    eprintln!("MCP server listening on http://{}/mcp", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

/// Build the HTTP router. Exposed for in-process tests.
pub fn router(ctx: ToolContext, tools: Arc<ToolRegistry>) -> Router {
    let mcp_ctx = ctx.clone();
    let mcp_tools = tools.clone();
    let mcp_service: StreamableHttpService<McpBridge, LocalSessionManager> =
        StreamableHttpService::new(
            move || Ok(McpBridge::new(mcp_ctx.clone(), mcp_tools.clone())),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig::default(),
        );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .with_state(AppState { ctx, tools })
        .nest_service("/mcp", mcp_service)
        .layer(cors)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// Map a tool failure to an HTTP status using the underlying [`ArchiveError`].
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let message = format!("{}: {:#}", tool_name, err);
    match err.downcast_ref::<ArchiveError>() {
        Some(ArchiveError::NotFound(_)) => not_found(message),
        Some(e) if e.is_client_error() => AppError {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message,
        },
        _ => {
            tracing::error!(tool = tool_name, error = %message, "tool failed");
            AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "tool_error",
                message,
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        })
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

/// Returns `404` for an unknown tool, `400` for bad parameters, `500` otherwise.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let result = tool
        .execute(params, &state.ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_errors_map_to_status_codes() {
        let cases = [
            (
                anyhow::Error::from(ArchiveError::TooManyRequested {
                    requested: 6,
                    max: 5,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                anyhow::Error::from(ArchiveError::InvalidInput("bad".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                anyhow::Error::from(ArchiveError::NotFound("article 9".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                anyhow::Error::from(ArchiveError::Constraint {
                    url: "https://x.test/p/a".into(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                anyhow::anyhow!("disk on fire"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(classify_tool_error("t", err).status, status);
        }
    }
}
