mod responder;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, patch, post},
};
use intake_flow::{
    InMemoryRecordStore, InMemorySessionStore, IntakeConfig, IntakeError, MessageResponse,
    Orchestrator, Session, StoredRecord,
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::responder::OpenRouterResponder;

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Deserialize)]
struct MessageRequest {
    user_id: String,
    content: String,
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EditFieldRequest {
    value: String,
}

/// Initialize structured JSON tracing based on environment variables
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "health_intake_service=debug,intake_flow=debug,tower_http=debug".into()
    });

    match log_format.as_str() {
        "pretty" => {
            // Human-readable logging for development
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = IntakeConfig::from_env();
    let sweep_interval = config.sweep_interval();
    let sessions = Arc::new(InMemorySessionStore::new(config.transcript_limit));
    let records = Arc::new(InMemoryRecordStore::new());

    let mut orchestrator = Orchestrator::new(config, sessions, records);
    match OpenRouterResponder::from_env() {
        Some(responder) => {
            info!("Using OpenRouter for general health questions");
            orchestrator = orchestrator.with_responder(Arc::new(responder));
        }
        None => warn!("OPENROUTER_API_KEY not set, general health questions get a static reply"),
    }
    let orchestrator = Arc::new(orchestrator);

    spawn_sweeper(orchestrator.clone(), sweep_interval);

    let app_state = AppState { orchestrator };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/message", post(handle_message))
        .route("/session/{user_id}", get(get_session))
        .route("/session/{user_id}/fields/{field}", patch(edit_field))
        .route("/records/{user_id}", get(get_records))
        .layer(from_fn(correlation_id_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app_state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically drop sessions that have been idle past their time to live.
fn spawn_sweeper(orchestrator: Arc<Orchestrator>, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = orchestrator.sweep_idle().await {
                error!(error = %e, "Session sweep failed");
            }
        }
    });
}

async fn health_check() -> &'static str {
    "OK"
}

async fn handle_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, StatusCode> {
    if request.user_id.trim().is_empty() {
        error!("Missing user id");
        return Err(StatusCode::BAD_REQUEST);
    }

    info!(
        user_id = %request.user_id,
        session_id = ?request.session_id,
        content_length = %request.content.len(),
        "Processing message"
    );

    let response = state
        .orchestrator
        .handle_message(
            &request.user_id,
            &request.content,
            request.session_id.as_deref(),
        )
        .await;

    info!(
        user_id = %request.user_id,
        state = %response.state,
        complete = response.is_complete,
        "Message handled"
    );

    Ok(Json(response))
}

async fn get_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Session>, StatusCode> {
    match state.orchestrator.session(&user_id).await {
        Ok(Some(session)) => Ok(Json(session)),
        Ok(None) => {
            info!(user_id = %user_id, "Session not found");
            Err(StatusCode::NOT_FOUND)
        }
        Err(e) => {
            error!(user_id = %user_id, error = %e, "Failed to get session");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn edit_field(
    State(state): State<AppState>,
    Path((user_id, field)): Path<(String, String)>,
    Json(request): Json<EditFieldRequest>,
) -> Result<Json<MessageResponse>, StatusCode> {
    match state
        .orchestrator
        .edit_field(&user_id, &field, &request.value)
        .await
    {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            warn!(user_id = %user_id, field = %field, error = %e, "Field edit rejected");
            Err(status_for(&e))
        }
    }
}

async fn get_records(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<StoredRecord>>, StatusCode> {
    state.orchestrator.records(&user_id).await.map(Json).map_err(|e| {
        error!(user_id = %user_id, error = %e, "Failed to list records");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn status_for(error: &IntakeError) -> StatusCode {
    match error {
        IntakeError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        IntakeError::NoActiveCollection => StatusCode::CONFLICT,
        IntakeError::SchemaViolation { .. } | IntakeError::UnreadableValue { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
