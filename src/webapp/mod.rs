pub mod auth;
pub mod cleanup;
pub mod handlers;
pub mod models;
pub mod sessions;
pub mod state;
pub mod trace;


pub use cleanup::cleanup_loop;
pub use models::{HealthResponse, SESSION_HEADER, WalletResponse};
pub use state::AppState;

use std::sync::Arc;

use anyhow::Result;
use axum::{Json, Router, middleware, routing::get, routing::post};
use clap::Args;
use utoipa::OpenApi;

use crate::config::GlobalConfig;
use crate::mcp::{McpServer, ToolDispatcher};
use crate::x402::PayAndFetch;

/// OpenAPI documentation for the plain HTTP endpoints
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Asrai MCP",
        version = env!("CARGO_PKG_VERSION"),
        description = "MCP server for Asrai crypto market data. Every data request is paid per call \
                       over x402 from the connecting client's own wallet. MCP clients connect to \
                       /mcp (streamable HTTP) or /sse (legacy) with ?key=0x<private_key>.",
        license(
            name = "MIT OR Apache-2.0",
        ),
    ),
    paths(
        handlers::health::health_handler,
        handlers::wallet::generate_wallet_handler,
    ),
    components(
        schemas(
            models::HealthResponse,
            models::WalletResponse,
        )
    ),
    tags(
        (name = "Health", description = "Service health and status endpoints"),
        (name = "Wallet", description = "Wallet helpers for new users"),
    )
)]
struct ApiDoc;

async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Creates the axum app with all routes and state configured
pub fn create_app(config: Arc<GlobalConfig>, fetcher: Arc<dyn PayAndFetch>) -> (Router, AppState) {
    let server = McpServer::new(ToolDispatcher::new(fetcher));
    let state = AppState::new(config, server);

    let app = Router::new()
        .route("/sse", get(handlers::sse::sse_handler))
        .route("/messages", post(handlers::sse::messages_handler))
        .route(
            "/mcp",
            post(handlers::streamable::post_handler)
                .get(handlers::streamable::get_handler)
                .delete(handlers::streamable::delete_handler),
        )
        .route("/generate-wallet", post(handlers::wallet::generate_wallet_handler))
        .route("/health", get(handlers::health::health_handler))
        .route("/api-docs/openapi.json", get(openapi_handler))
        .layer(middleware::from_fn(trace::trace_request))
        .with_state(state.clone());

    (app, state)
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Write process ID to the specified file
    #[arg(long, value_name = "./pid.file")]
    pub pid: Option<String>,

    /// Write readiness marker to the specified file once server is listening
    ///
    /// Useful for scripts that need to wait for the server to be fully started.
    #[arg(long)]
    pub ready_file: Option<String>,
}

pub async fn run(args: ServeArgs, config: Arc<GlobalConfig>, fetcher: Arc<dyn PayAndFetch>) -> Result<()> {
    if let Some(pid_file) = &args.pid {
        std::fs::write(pid_file, std::process::id().to_string())?;
    }

    let (app, state) = create_app(config.clone(), fetcher);

    if let Some(idle) = config.session_idle() {
        tokio::spawn(cleanup_loop(state, idle));
    }

    let addr = format!("{}:{}", config.host(), config.port());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local = listener.local_addr()?;

    tracing::info!(
        listen = %local,
        upstream = config.api_url(),
        max_spend = config.max_spend(),
        default_key = config.default_key().is_some(),
        "Server started"
    );
    tracing::info!("  HTTP streamable: http://{local}/mcp?key=0x<private_key>");
    tracing::info!("  SSE (legacy):    http://{local}/sse?key=0x<private_key>");
    tracing::info!("  Generate wallet: POST http://{local}/generate-wallet");

    if let Some(ready_file) = &args.ready_file {
        std::fs::write(ready_file, format!("ready {}", std::process::id()))?;
    }

    axum::serve(listener, app).await?;

    Ok(())
}
