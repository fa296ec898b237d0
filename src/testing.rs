//! In-process stand-in for the invoice REST API, used by the client and
//! end-to-end tests.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub size: usize,
}

#[derive(Default)]
struct Recorded {
    uploads: Vec<RecordedUpload>,
    created: Vec<Value>,
    authorization: Option<String>,
}

#[derive(Clone)]
struct FakeState {
    ocr_response: (StatusCode, Value),
    create_response: (StatusCode, Value),
    recorded: Arc<Mutex<Recorded>>,
}

pub struct FakeUpstreamBuilder {
    ocr_response: (StatusCode, Value),
    create_response: (StatusCode, Value),
}

impl FakeUpstreamBuilder {
    pub fn ocr(mut self, status: StatusCode, body: Value) -> Self {
        self.ocr_response = (status, body);
        self
    }

    pub fn create(mut self, status: StatusCode, body: Value) -> Self {
        self.create_response = (status, body);
        self
    }

    pub async fn spawn(self) -> FakeUpstream {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let state = FakeState {
            ocr_response: self.ocr_response,
            create_response: self.create_response,
            recorded: recorded.clone(),
        };

        let app = Router::new()
            .route("/api/invoices/ocr", post(ocr))
            .route("/api/invoices", post(create))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake upstream");
        let addr = listener.local_addr().expect("fake upstream addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        FakeUpstream {
            base_url: format!("http://{}/api", addr),
            recorded,
        }
    }
}

pub struct FakeUpstream {
    base_url: String,
    recorded: Arc<Mutex<Recorded>>,
}

impl FakeUpstream {
    pub fn builder() -> FakeUpstreamBuilder {
        FakeUpstreamBuilder {
            ocr_response: (StatusCode::OK, json!({"status": "success", "data": {}})),
            create_response: (StatusCode::CREATED, json!({"id": 1})),
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }

    pub async fn ocr_uploads(&self) -> Vec<RecordedUpload> {
        self.recorded.lock().await.uploads.clone()
    }

    pub async fn created(&self) -> Vec<Value> {
        self.recorded.lock().await.created.clone()
    }

    pub async fn last_authorization(&self) -> Option<String> {
        self.recorded.lock().await.authorization.clone()
    }
}

async fn ocr(
    State(state): State<FakeState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let mut recorded = state.recorded.lock().await;
    recorded.authorization = authorization(&headers);
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let size = field.bytes().await.map(|b| b.len()).unwrap_or_default();
        recorded.uploads.push(RecordedUpload {
            field: name,
            filename,
            content_type,
            size,
        });
    }
    let (status, body) = state.ocr_response.clone();
    (status, Json(body))
}

async fn create(
    State(state): State<FakeState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut recorded = state.recorded.lock().await;
    recorded.authorization = authorization(&headers);
    recorded.created.push(body);
    let (status, body) = state.create_response.clone();
    (status, Json(body))
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
