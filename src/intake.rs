//! Add-invoice orchestration: runs OCR and create-invoice requests on behalf
//! of a session and feeds their outcomes back as session actions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::api::{InvoiceApi, InvoiceRecord};
use crate::error::IntakeError;
use crate::form::InvoiceField;
use crate::normalize;
use crate::ocr::{OcrClient, OcrUpload};
use crate::session::{Action, Session, SessionView, UploadInfo};

/// Where the UI goes after a successful save.
pub const REDIRECT_TARGET: &str = "/invoices";

/// In-memory session store.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Session) {
        self.inner.write().await.insert(session.id(), session);
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.inner.write().await.remove(&id).is_some()
    }

    /// Run `f` against a session under the write lock. Never await inside `f`.
    pub async fn with<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session) -> Result<T, IntakeError>,
    ) -> Result<T, IntakeError> {
        let mut sessions = self.inner.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(IntakeError::SessionNotFound(id))?;
        f(session)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

/// A batch of user edits.
#[derive(Debug, Default, Deserialize)]
pub struct FormEdit {
    #[serde(default)]
    pub fields: BTreeMap<InvoiceField, String>,
    #[serde(default)]
    pub is_paid: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub invoice: InvoiceRecord,
    pub redirect_to: String,
    pub redirect_after_ms: u64,
}

#[derive(Clone)]
pub struct IntakeService {
    ocr: Arc<dyn OcrClient>,
    api: Arc<dyn InvoiceApi>,
    sessions: SessionStore,
    redirect_delay: Duration,
}

impl IntakeService {
    pub fn new(ocr: Arc<dyn OcrClient>, api: Arc<dyn InvoiceApi>, redirect_delay: Duration) -> Self {
        Self {
            ocr,
            api,
            sessions: SessionStore::new(),
            redirect_delay,
        }
    }

    pub async fn create_session(&self) -> SessionView {
        let mut session = Session::new();
        let view = session.view();
        self.sessions.insert(session).await;
        info!("Session {} opened ({} active)", view.id, self.sessions.len().await);
        view
    }

    pub async fn close_session(&self, id: Uuid) -> Result<(), IntakeError> {
        if self.sessions.remove(id).await {
            info!("Session {} closed", id);
            Ok(())
        } else {
            Err(IntakeError::SessionNotFound(id))
        }
    }

    pub async fn view(&self, id: Uuid) -> Result<SessionView, IntakeError> {
        self.sessions.with(id, |s| Ok(s.view())).await
    }

    pub async fn edit(&self, id: Uuid, edit: FormEdit) -> Result<SessionView, IntakeError> {
        self.sessions
            .with(id, |s| {
                for (field, value) in edit.fields {
                    s.apply(Action::Edit { field, value })?;
                }
                if let Some(paid) = edit.is_paid {
                    s.apply(Action::SetPaid(paid))?;
                }
                Ok(s.view())
            })
            .await
    }

    pub async fn dismiss_banner(&self, id: Uuid) -> Result<SessionView, IntakeError> {
        self.sessions
            .with(id, |s| {
                s.apply(Action::DismissBanner)?;
                Ok(s.view())
            })
            .await
    }

    /// Send a file to OCR and merge the result into the session's form.
    ///
    /// An OCR failure is reported through the session's notifications and
    /// leaves the form untouched; it is not returned as an error.
    pub async fn upload(&self, id: Uuid, upload: OcrUpload) -> Result<SessionView, IntakeError> {
        let info = UploadInfo {
            filename: upload.filename.clone(),
            size: upload.data.len(),
            sha256: upload.fingerprint(),
        };
        let token = self
            .sessions
            .with(id, |s| s.begin_upload(info))
            .await?;

        let result = self.ocr.extract(&upload).await;

        self.sessions
            .with(id, |s| {
                let action = match result {
                    Ok(raw) => Action::UploadSucceeded {
                        token,
                        draft: normalize::normalize(raw),
                    },
                    Err(e) => {
                        error!("OCR for {} failed: {}", upload.filename, e);
                        Action::UploadFailed {
                            token,
                            message: e.user_message(),
                        }
                    }
                };
                s.apply(action)?;
                Ok(s.view())
            })
            .await
    }

    /// Validate the form and create the invoice.
    ///
    /// Validation errors return before any request is made.
    pub async fn submit(&self, id: Uuid) -> Result<SubmitOutcome, IntakeError> {
        let request = self
            .sessions
            .with(id, |s| s.begin_submit())
            .await?;

        let result = self.api.create_invoice(&request).await;

        self.sessions
            .with(id, |s| match result {
                Ok(record) => {
                    s.apply(Action::SubmitSucceeded(record.clone()))?;
                    Ok(SubmitOutcome {
                        invoice: record,
                        redirect_to: REDIRECT_TARGET.to_string(),
                        redirect_after_ms: self.redirect_delay.as_millis() as u64,
                    })
                }
                Err(e) => {
                    error!("Creating invoice {} failed: {}", request.invoice_number, e);
                    s.apply(Action::SubmitFailed(e.user_message()))?;
                    Err(e)
                }
            })
            .await
    }
}
