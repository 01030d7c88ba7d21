use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use dropwatch_bridge::{actions, PipelineContext, SendOutcome, SendRequest};
use dropwatch_shared::{ChatEvent, ChatId, ConnectionState};

use crate::error::ServerError;

/// History sync batches can be large.
const MAX_EVENT_BODY: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub ctx: PipelineContext,
    pub events: mpsc::Sender<ChatEvent>,
    pub connection: watch::Receiver<ConnectionState>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/events", post(ingest_event))
        .route("/api/send", post(send_message))
        .route("/api/download", post(download_media))
        .layer(DefaultBodyLimit::max(MAX_EVENT_BODY))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    connection: ConnectionState,
}

#[derive(Serialize)]
struct EventAccepted {
    accepted: bool,
    kind: &'static str,
}

#[derive(Deserialize)]
struct DownloadRequest {
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    chat_jid: String,
}

#[derive(Serialize)]
struct DownloadResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        connection: *state.connection.borrow(),
    })
}

async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<ChatEvent>,
) -> Result<(StatusCode, Json<EventAccepted>), ServerError> {
    let kind = event.kind();
    state
        .events
        .send(event)
        .await
        .map_err(|_| ServerError::DispatcherStopped)?;

    Ok((StatusCode::ACCEPTED, Json(EventAccepted { accepted: true, kind })))
}

async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> Result<(StatusCode, Json<SendOutcome>), ServerError> {
    if request.recipient.trim().is_empty() {
        return Err(ServerError::BadRequest("Recipient is required".into()));
    }
    if request.message.is_empty() && request.media_path.is_none() {
        return Err(ServerError::BadRequest("Message or media path is required".into()));
    }

    let outcome = actions::send_message(&state.ctx, request).await;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(outcome)))
}

async fn download_media(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Result<(StatusCode, Json<DownloadResponse>), ServerError> {
    if request.message_id.is_empty() || request.chat_jid.is_empty() {
        return Err(ServerError::BadRequest(
            "Message ID and Chat JID are required".into(),
        ));
    }

    let chat = ChatId::new(request.chat_jid);
    match actions::download_media(&state.ctx, &request.message_id, &chat).await {
        Ok(media) => {
            info!(id = %request.message_id, chat = %chat, path = %media.path.display(), "media download served");
            Ok((
                StatusCode::OK,
                Json(DownloadResponse {
                    success: true,
                    message: format!("Successfully downloaded {} media", media.kind),
                    filename: Some(media.filename),
                    path: Some(media.path.display().to_string()),
                }),
            ))
        }
        Err(e) => {
            warn!(id = %request.message_id, chat = %chat, error = %e, "media download failed");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DownloadResponse {
                    success: false,
                    message: format!("Failed to download media: {e}"),
                    filename: None,
                    path: None,
                }),
            ))
        }
    }
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
