//! Error types shared by the OCR client, the invoice API client and the session layer.

use std::collections::BTreeMap;

use crate::form::InvoiceField;

/// Field-scoped validation errors, keyed by the offending form field.
pub type FieldErrors = BTreeMap<InvoiceField, String>;

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    /// Network failure.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream answered with a non-2xx status.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Upstream answered 2xx with a body that does not match the expected shape.
    #[error("unexpected response from {endpoint}: {detail}")]
    MalformedResponse { endpoint: &'static str, detail: String },

    /// OCR endpoint answered but did not report success.
    #[error("OCR extraction failed: {0}")]
    OcrRejected(String),

    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("invoice form has {} invalid field(s)", .0.len())]
    Validation(FieldErrors),

    #[error("a submission is already in progress")]
    SubmissionInFlight,

    #[error("invoice has already been saved")]
    AlreadySubmitted,

    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
}

impl IntakeError {
    /// Message suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            IntakeError::Transport(_) => "Could not reach the server. Please try again.".to_string(),
            IntakeError::Server { message, .. } if !message.is_empty() => message.clone(),
            IntakeError::Server { status, .. } => format!("Server returned an error ({})", status),
            IntakeError::MalformedResponse { .. } => {
                "The server returned an unexpected response.".to_string()
            }
            IntakeError::OcrRejected(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Pull a human-readable message out of an error response body.
///
/// The API answers failures with `{ "message": "..." }`; anything else is
/// passed through verbatim.
pub(crate) fn server_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
