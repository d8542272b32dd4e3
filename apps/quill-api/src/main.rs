use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use quill_engine::{Engine, EngineBuilder};
use quill_protocol::{
    Document, DocumentId, DocumentUpdate, EditCommand, EditRecord, EditSession, EngineError,
    ErrorCode, SessionId, SessionStatus, ToolRequest, ToolResponse, TurnId,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "quill-api")]
#[command(about = "Quill document reconciliation API")]
struct Cli {
    #[arg(long, default_value = ".quill")]
    root: PathBuf,
    #[arg(long, default_value = "127.0.0.1:8788")]
    listen: SocketAddr,
}

#[derive(Clone)]
struct AppState {
    engine: Engine,
}

#[derive(Debug, Deserialize)]
struct SeedDocumentRequest {
    #[serde(default)]
    id: Option<String>,
    content: String,
}

#[derive(Debug, Deserialize)]
struct DocumentToolRequest {
    #[serde(flatten)]
    command: EditCommand,
    #[serde(default)]
    turn: Option<TurnId>,
}

#[derive(Debug, Deserialize)]
struct ResolveSessionRequest {
    status: SessionStatus,
}

#[derive(Debug, Serialize)]
struct EditListResponse {
    session_id: SessionId,
    edits: Vec<EditRecord>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    code: ErrorCode,
    message: String,
}

impl ApiError {
    fn no_open_session(document_id: &DocumentId) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: ErrorCode::SessionNotFound,
            message: format!("no open session for document {document_id}"),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        let code = error.code();
        let status = match code {
            ErrorCode::DocNotFound | ErrorCode::SessionNotFound => StatusCode::NOT_FOUND,
            ErrorCode::StaleRevision | ErrorCode::OrderConflict => StatusCode::CONFLICT,
            ErrorCode::NoMatch | ErrorCode::AmbiguousMatch | ErrorCode::InvalidCommand => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            code,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.message, "error_code": self.code })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let engine = EngineBuilder::new(&cli.root).build();
    let state = AppState { engine };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/tool", post(dispatch_tool))
        .route("/documents", post(seed_document))
        .route(
            "/documents/{document_id}",
            get(get_document).put(update_document),
        )
        .route("/documents/{document_id}/tool", post(document_tool))
        .route("/documents/{document_id}/session", get(get_active_session))
        .route("/sessions/{session_id}/resolve", post(resolve_session))
        .route("/sessions/{session_id}/edits", get(list_edits))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(listen = %cli.listen, root = %cli.root.display(), "quill-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "quill-api"
    }))
}

/// Path-addressed tool dispatch: the body carries a slash-delimited document
/// path resolved through the engine's resolver port. Failures come back as
/// a tagged envelope with the wire error code, not as HTTP errors — the
/// LLM collaborator reads the body either way.
async fn dispatch_tool(
    State(state): State<AppState>,
    Json(request): Json<ToolRequest>,
) -> Json<ToolResponse> {
    Json(state.engine.dispatch(request).await)
}

async fn document_tool(
    Path(document_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<DocumentToolRequest>,
) -> Json<ToolResponse> {
    let document_id = DocumentId::from_string(document_id);
    Json(
        state
            .engine
            .dispatch_for(document_id, request.command, request.turn)
            .await,
    )
}

async fn seed_document(
    State(state): State<AppState>,
    Json(request): Json<SeedDocumentRequest>,
) -> ApiResult<Json<Document>> {
    let id = match request.id {
        Some(id) => DocumentId::from_string(id),
        None => DocumentId::new_uuid(),
    };
    let document = state.engine.seed_document(id, request.content).await?;
    Ok(Json(document))
}

async fn get_document(
    Path(document_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Document>> {
    let document = state
        .engine
        .document(&DocumentId::from_string(document_id))
        .await?;
    Ok(Json(document))
}

/// The update endpoint: `ai_version` omitted keeps the draft, explicit null
/// closes the open session, and any write touching the draft must carry the
/// base revision captured at the last hydration (409 when stale).
async fn update_document(
    Path(document_id): Path<String>,
    State(state): State<AppState>,
    Json(update): Json<DocumentUpdate>,
) -> ApiResult<Json<Document>> {
    let document = state
        .engine
        .apply_update(&DocumentId::from_string(document_id), update)
        .await?;
    Ok(Json(document))
}

async fn get_active_session(
    Path(document_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<EditSession>> {
    let document_id = DocumentId::from_string(document_id);
    let session = state
        .engine
        .session_for(&document_id)
        .await?
        .ok_or_else(|| ApiError::no_open_session(&document_id))?;
    Ok(Json(session))
}

async fn resolve_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ResolveSessionRequest>,
) -> ApiResult<Json<EditSession>> {
    let session = state
        .engine
        .resolve_session(&SessionId::from_string(session_id), request.status)
        .await?;
    Ok(Json(session))
}

async fn list_edits(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<EditListResponse>> {
    let session_id = SessionId::from_string(session_id);
    let edits = state.engine.edit_history(&session_id).await?;
    Ok(Json(EditListResponse { session_id, edits }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGTERM handler");
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
