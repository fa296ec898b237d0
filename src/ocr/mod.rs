//! OCR ingestion client abstraction.
//!
//! Defines the [`OcrClient`] trait and the upload/result types so the HTTP
//! backend can be swapped for an in-process fake in tests.

pub mod http;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IntakeError;

/// Extensions accepted by the upload widget.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "jpg", "jpeg", "png"];

/// Fields as returned by the OCR service; no normalization guarantees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOcrResult {
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub amount: Option<String>,
    pub provider: Option<String>,
    pub due_date: Option<String>,
    pub period: Option<String>,
    pub consumption: Option<String>,
    pub unit: Option<String>,
    pub account_number: Option<String>,
    pub installation_number: Option<String>,
    pub customer_number: Option<String>,
    pub average_consumption: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub consumer_group: Option<String>,
}

/// A single uploaded invoice file.
#[derive(Debug, Clone)]
pub struct OcrUpload {
    pub filename: String,
    pub data: Vec<u8>,
}

impl OcrUpload {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }

    /// Lowercased extension, if the filename has one.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Whether the file would pass the upload widget's filter.
    pub fn is_allowed(&self) -> bool {
        self.extension()
            .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    pub fn mime_type(&self) -> &'static str {
        match self.extension().as_deref() {
            Some("pdf") => "application/pdf",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("png") => "image/png",
            _ => "application/octet-stream",
        }
    }

    /// SHA-256 of the file contents, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.data);
        format!("{:x}", hasher.finalize())
    }
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrClient: Send + Sync {
    async fn extract(&self, upload: &OcrUpload) -> Result<RawOcrResult, IntakeError>;
}
