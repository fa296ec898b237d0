//! Invoice Intake - add-invoice session server with OCR pre-fill.

mod api;
mod config;
mod error;
mod form;
mod intake;
mod normalize;
mod ocr;
mod session;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use config::AppConfig;
use error::IntakeError;
use intake::{FormEdit, IntakeService, SubmitOutcome};
use ocr::{OcrUpload, ALLOWED_EXTENSIONS};
use serde_json::json;
use session::SessionView;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    intake: IntakeService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "invoice_intake=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let client = reqwest::Client::new();
    let ocr = ocr::http::HttpOcrClient::new(client.clone(), &config.api_base)
        .with_token(config.api_token.clone())
        .with_timeout(config.ocr_timeout);
    let api = api::HttpInvoiceApi::new(client, &config.api_base)
        .with_token(config.api_token.clone());

    let state = AppState {
        intake: IntakeService::new(Arc::new(ocr), Arc::new(api), config.redirect_delay),
    };

    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(close_session))
        .route("/sessions/:id/fields", put(edit_fields))
        .route("/sessions/:id/upload", post(upload_invoice))
        .route("/sessions/:id/submit", post(submit_invoice))
        .route("/sessions/:id/dismiss", post(dismiss_banner))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

struct ApiError(IntakeError);

impl From<IntakeError> for ApiError {
    fn from(e: IntakeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            IntakeError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            IntakeError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IntakeError::SubmissionInFlight | IntakeError::AlreadySubmitted => StatusCode::CONFLICT,
            IntakeError::UnsupportedFile(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            IntakeError::Transport(_)
            | IntakeError::Server { .. }
            | IntakeError::MalformedResponse { .. }
            | IntakeError::OcrRejected(_) => StatusCode::BAD_GATEWAY,
        };
        let body = match &self.0 {
            IntakeError::Validation(errors) => json!({
                "message": self.0.to_string(),
                "field_errors": errors,
            }),
            other => json!({ "message": other.user_message() }),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    (StatusCode::CREATED, Json(state.intake.create_session().await))
}

async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    Ok(Json(state.intake.view(id).await?))
}

async fn close_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    state.intake.close_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn edit_fields(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(edit): Json<FormEdit>,
) -> ApiResult<SessionView> {
    Ok(Json(state.intake.edit(id, edit).await?))
}

/// Accept an invoice file and pre-fill the session's form from OCR.
async fn upload_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        if field.name() == Some("invoice_file") {
            let filename = field.file_name().unwrap_or("invoice").to_string();
            let data = field.bytes().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?.to_vec();
            upload = Some(OcrUpload::new(filename, data));
            break;
        }
    }

    let upload = match upload {
        Some(u) if !u.data.is_empty() => u,
        _ => return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string())),
    };

    if !upload.is_allowed() {
        warn!("Rejected upload {}: extension not in {:?}", upload.filename, ALLOWED_EXTENSIONS);
        return Err((
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            IntakeError::UnsupportedFile(upload.filename).to_string(),
        ));
    }

    info!("Session {}: received {} ({} bytes)", id, upload.filename, upload.data.len());

    state
        .intake
        .upload(id, upload)
        .await
        .map(Json)
        .map_err(|e| match e {
            IntakeError::SessionNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
            IntakeError::SubmissionInFlight | IntakeError::AlreadySubmitted => {
                (StatusCode::CONFLICT, e.to_string())
            }
            other => (StatusCode::BAD_GATEWAY, other.user_message()),
        })
}

async fn submit_invoice(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SubmitOutcome> {
    Ok(Json(state.intake.submit(id).await?))
}

async fn dismiss_banner(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    Ok(Json(state.intake.dismiss_banner(id).await?))
}
