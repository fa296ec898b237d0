//! OCR over the invoice REST API (`POST {API_BASE}/invoices/ocr`).

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{OcrClient, OcrUpload, RawOcrResult};
use crate::error::{server_message, IntakeError};

/// Multipart field the endpoint reads the file from.
const FILE_FIELD: &str = "invoice_file";

/// Response envelope (private deserialization type).
#[derive(Debug, Deserialize)]
struct OcrEnvelope {
    status: String,
    #[serde(default)]
    data: Option<RawOcrResult>,
    #[serde(default)]
    message: Option<String>,
}

pub struct HttpOcrClient {
    url: String,
    token: Option<String>,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl HttpOcrClient {
    pub fn new(client: reqwest::Client, api_base: &str) -> Self {
        Self {
            url: format!("{}/invoices/ocr", api_base.trim_end_matches('/')),
            token: None,
            timeout: None,
            client,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl OcrClient for HttpOcrClient {
    async fn extract(&self, upload: &OcrUpload) -> Result<RawOcrResult, IntakeError> {
        info!(
            "HttpOcrClient: sending {} ({} bytes) to {}",
            upload.filename,
            upload.data.len(),
            self.url
        );

        let part = Part::bytes(upload.data.clone())
            .file_name(upload.filename.clone())
            .mime_str(upload.mime_type())?;
        let form = Form::new().part(FILE_FIELD, part);

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(IntakeError::Server {
                status: status.as_u16(),
                message: server_message(&text),
            });
        }

        let body = response.text().await?;
        let envelope: OcrEnvelope = serde_json::from_str(&body).map_err(|e| {
            warn!("HttpOcrClient: undecodable response from {}: {}", self.url, e);
            IntakeError::MalformedResponse {
                endpoint: "invoices/ocr",
                detail: e.to_string(),
            }
        })?;
        debug!("HttpOcrClient: status={} message={:?}", envelope.status, envelope.message);

        match envelope {
            OcrEnvelope {
                status,
                data: Some(data),
                ..
            } if status == "success" => Ok(data),
            OcrEnvelope { message, .. } => Err(IntakeError::OcrRejected(
                message.unwrap_or_else(|| "Could not read the invoice".to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeUpstream;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_success_envelope() {
        let upstream = FakeUpstream::builder()
            .ocr(
                StatusCode::OK,
                json!({"status": "success", "data": {"invoiceNumber": "A-1", "amount": "10,5"}}),
            )
            .spawn()
            .await;
        let client = HttpOcrClient::new(reqwest::Client::new(), &upstream.base_url());

        let raw = client
            .extract(&OcrUpload::new("fatura.pdf", b"%PDF-1.4".to_vec()))
            .await
            .unwrap();

        assert_eq!(raw.invoice_number.as_deref(), Some("A-1"));
        assert_eq!(raw.amount.as_deref(), Some("10,5"));

        let uploads = upstream.ocr_uploads().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].field, "invoice_file");
        assert_eq!(uploads[0].filename, "fatura.pdf");
        assert_eq!(uploads[0].content_type, "application/pdf");
        assert_eq!(uploads[0].size, 8);
    }

    #[tokio::test]
    async fn test_failure_status_is_rejected() {
        let upstream = FakeUpstream::builder()
            .ocr(StatusCode::OK, json!({"status": "error", "message": "Unreadable scan"}))
            .spawn()
            .await;
        let client = HttpOcrClient::new(reqwest::Client::new(), &upstream.base_url());

        let err = client
            .extract(&OcrUpload::new("scan.png", vec![1, 2, 3]))
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::OcrRejected(ref m) if m == "Unreadable scan"));
    }

    #[tokio::test]
    async fn test_success_without_data_is_rejected() {
        let upstream = FakeUpstream::builder()
            .ocr(StatusCode::OK, json!({"status": "success"}))
            .spawn()
            .await;
        let client = HttpOcrClient::new(reqwest::Client::new(), &upstream.base_url());

        let err = client
            .extract(&OcrUpload::new("scan.png", vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::OcrRejected(_)));
    }

    #[tokio::test]
    async fn test_numeric_field_is_malformed_response() {
        let upstream = FakeUpstream::builder()
            .ocr(StatusCode::OK, json!({"status": "success", "data": {"amount": 150.75}}))
            .spawn()
            .await;
        let client = HttpOcrClient::new(reqwest::Client::new(), &upstream.base_url());

        let err = client
            .extract(&OcrUpload::new("scan.pdf", vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::MalformedResponse { .. }), "{:?}", err);
        assert_eq!(err.user_message(), "The server returned an unexpected response.");
    }

    #[tokio::test]
    async fn test_http_error_maps_to_server_error() {
        let upstream = FakeUpstream::builder()
            .ocr(StatusCode::INTERNAL_SERVER_ERROR, json!({"message": "tesseract crashed"}))
            .spawn()
            .await;
        let client = HttpOcrClient::new(reqwest::Client::new(), &upstream.base_url());

        let err = client
            .extract(&OcrUpload::new("scan.jpg", vec![1]))
            .await
            .unwrap_err();
        match err {
            IntakeError::Server { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "tesseract crashed");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let client = HttpOcrClient::new(reqwest::Client::new(), "http://127.0.0.1:1");
        let err = client
            .extract(&OcrUpload::new("scan.jpg", vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Transport(_)));
    }
}
