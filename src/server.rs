//! HTTP front end for the two assistants.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Companion turn: `{message, session_id?}` → `{reply}` |
//! | `POST` | `/query` | Support turn: `{query, session_id?}` → `{connie_reply}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every well-formed request is answered with `200`, including blank
//! messages, which go through the pipeline like any other. When a pipeline
//! fails, the reply is the assistant's canned fallback plus an `error` field
//! naming the failure kind:
//!
//! ```json
//! { "connie_reply": "I'm having trouble ...", "error": "upstream_quota" }
//! ```
//!
//! # CORS
//!
//! Origins come from `[server].cors_origins`; credentials are allowed. A
//! `"*"` entry allows any origin without credentials.

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::companion::Companion;
use crate::config::Config;
use crate::error::ErrorKind;
use crate::services::Services;
use crate::session::DEFAULT_SESSION;
use crate::support::SupportAssistant;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub support: Arc<SupportAssistant>,
    pub companion: Arc<Companion>,
}

impl AppState {
    pub fn new(config: &Config, services: &Services) -> Self {
        Self {
            support: Arc::new(SupportAssistant::new(
                services,
                config.support.clone(),
                config.router.clone(),
            )),
            companion: Arc::new(Companion::new(services, config.companion.clone())),
        }
    }
}

/// Build the router with CORS applied.
pub fn build_router(state: AppState, cors_origins: &[String]) -> anyhow::Result<Router> {
    Ok(Router::new()
        .route("/chat", post(handle_chat))
        .route("/query", post(handle_query))
        .route("/health", get(handle_health))
        .layer(cors_layer(cors_origins)?)
        .with_state(state))
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    if origins.iter().any(|o| o == "*") {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).map_err(|_| anyhow::anyhow!("invalid CORS origin: {}", o))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    // credentials rule out wildcard methods and headers
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true))
}

/// Starts the HTTP server.
///
/// Builds every provider from `config` (failing fast on missing API keys),
/// binds to `[server].bind` and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config)?;
    let state = AppState::new(config, &services);
    let app = build_router(state, &config.server.cors_origins)?;

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("connie listening on http://{}", bind_addr);
    tracing::info!("serving /chat, /query and /health on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn session_or_default(session_id: Option<String>) -> String {
    session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string())
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

// ============ POST /chat ============

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let session_id = session_or_default(req.session_id);
    let outcome = state
        .companion
        .reply(&req.message, Some(session_id.as_str()))
        .await;

    Json(ChatResponse {
        reply: outcome.reply,
        error: outcome.error,
    })
}

// ============ POST /query ============

#[derive(Deserialize)]
pub struct SupportRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct SupportResponse {
    pub connie_reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<SupportRequest>,
) -> Json<SupportResponse> {
    let session_id = session_or_default(req.session_id);
    let outcome = state.support.answer(&req.query, &session_id).await;

    Json(SupportResponse {
        connie_reply: outcome.reply,
        error: outcome.error,
    })
}
