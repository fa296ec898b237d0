//! Invoice REST API client (`POST {API_BASE}/invoices`).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{server_message, IntakeError};
use crate::form::CreateInvoiceRequest;

/// Invoice record as stored by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: serde_json::Value,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub invoice_date: Option<String>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    /// Everything else the API returned.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The API wraps some responses as `{ "data": {...} }` and returns others bare.
#[derive(Deserialize)]
#[serde(untagged)]
enum CreateResponse {
    Wrapped { data: InvoiceRecord },
    Bare(InvoiceRecord),
}

#[async_trait::async_trait]
pub trait InvoiceApi: Send + Sync {
    async fn create_invoice(
        &self,
        request: &CreateInvoiceRequest,
    ) -> Result<InvoiceRecord, IntakeError>;
}

#[derive(Clone)]
pub struct HttpInvoiceApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpInvoiceApi {
    pub fn new(client: Client, api_base: &str) -> Self {
        Self {
            client,
            base_url: api_base.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

#[async_trait::async_trait]
impl InvoiceApi for HttpInvoiceApi {
    async fn create_invoice(
        &self,
        request: &CreateInvoiceRequest,
    ) -> Result<InvoiceRecord, IntakeError> {
        let url = format!("{}/invoices", self.base_url);
        debug!("Creating invoice {} at {}", request.invoice_number, url);

        let mut builder = self.client.post(&url).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let resp = builder.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(IntakeError::Server {
                status: status.as_u16(),
                message: server_message(&text),
            });
        }

        let body = resp.text().await?;
        let parsed: CreateResponse = serde_json::from_str(&body).map_err(|e| {
            warn!("Undecodable create-invoice response: {}", e);
            IntakeError::MalformedResponse {
                endpoint: "invoices",
                detail: e.to_string(),
            }
        })?;
        let record = match parsed {
            CreateResponse::Wrapped { data } => data,
            CreateResponse::Bare(record) => record,
        };
        info!("Invoice created: id={}", record.id);
        Ok(record)
    }
}
