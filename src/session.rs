//! Add-invoice session state.
//!
//! A session is a plain state container. Requests are opened with
//! [`Session::begin_upload`] / [`Session::begin_submit`] and their outcomes
//! reduced with typed [`Action`]s. It does no I/O itself. Phases:
//!
//! ```text
//! Idle -> Uploading -> Extracted -> Editing -> Submitting -> Succeeded
//!                                      ^            |
//!                                      +-- Failed <-+
//! ```
//!
//! Uploading may be skipped entirely (manual entry).

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::InvoiceRecord;
use crate::error::{FieldErrors, IntakeError};
use crate::form::{CreateInvoiceRequest, InvoiceField, InvoiceFormState};
use crate::normalize::{ExtractionWarning, NormalizedInvoiceDraft};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Uploading,
    Extracted,
    Editing,
    Submitting,
    Succeeded,
    Failed,
}

/// Identifies one OCR request; only the latest one may complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RequestToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Transient user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// What was sent to OCR most recently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadInfo {
    pub filename: String,
    pub size: usize,
    pub sha256: String,
}

#[derive(Debug)]
pub enum Action {
    Edit { field: InvoiceField, value: String },
    SetPaid(bool),
    UploadSucceeded { token: RequestToken, draft: NormalizedInvoiceDraft },
    UploadFailed { token: RequestToken, message: String },
    SubmitSucceeded(InvoiceRecord),
    SubmitFailed(String),
    DismissBanner,
}

/// Result of applying an action.
#[derive(Debug, PartialEq)]
pub enum Transition {
    Updated,
    Merged { filled: Vec<InvoiceField> },
    /// A completion for a superseded OCR request; nothing changed.
    StaleIgnored,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    phase: Phase,
    form: InvoiceFormState,
    next_token: u64,
    ocr_in_flight: Option<RequestToken>,
    submit_in_flight: bool,
    phase_before_upload: Phase,
    extraction_complete: bool,
    warnings: Vec<ExtractionWarning>,
    field_errors: FieldErrors,
    last_upload: Option<UploadInfo>,
    created: Option<InvoiceRecord>,
    notifications: Vec<Notification>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: Phase::Idle,
            form: InvoiceFormState::default(),
            next_token: 0,
            ocr_in_flight: None,
            submit_in_flight: false,
            phase_before_upload: Phase::Idle,
            extraction_complete: false,
            warnings: Vec::new(),
            field_errors: FieldErrors::new(),
            last_upload: None,
            created: None,
            notifications: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[cfg(test)]
    pub fn form(&self) -> &InvoiceFormState {
        &self.form
    }

    /// True while an OCR request is outstanding.
    pub fn extracting(&self) -> bool {
        self.ocr_in_flight.is_some()
    }

    #[cfg(test)]
    pub fn extraction_complete(&self) -> bool {
        self.extraction_complete
    }

    #[cfg(test)]
    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    #[cfg(test)]
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        self.notifications.push(Notification {
            level,
            message: message.into(),
        });
    }

    /// Leaving the pre-edit phases on any user change. `Succeeded` is terminal.
    fn touch(&mut self) {
        if matches!(self.phase, Phase::Idle | Phase::Extracted | Phase::Failed) {
            self.phase = Phase::Editing;
        }
    }

    fn is_current(&self, token: RequestToken) -> bool {
        self.ocr_in_flight == Some(token)
    }

    /// Issue a token for a new OCR request, superseding any outstanding one.
    ///
    /// Refused while a submission is in flight or after the invoice was saved.
    pub fn begin_upload(&mut self, info: UploadInfo) -> Result<RequestToken, IntakeError> {
        if self.submit_in_flight {
            return Err(IntakeError::SubmissionInFlight);
        }
        if self.phase == Phase::Succeeded {
            return Err(IntakeError::AlreadySubmitted);
        }
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        if let Some(previous) = self.ocr_in_flight.replace(token) {
            debug!("Session {}: OCR request {:?} superseded by {:?}", self.id, previous, token);
        } else {
            self.phase_before_upload = self.phase;
        }
        if self.last_upload.as_ref().map(|u| &u.sha256) == Some(&info.sha256) {
            info!("Session {}: re-uploading identical file {}", self.id, info.filename);
            self.notify(NotificationLevel::Info, "This file was already uploaded; reading it again.");
        }
        self.extraction_complete = false;
        self.last_upload = Some(info);
        self.phase = Phase::Uploading;
        Ok(token)
    }

    /// Validate the form and enter `Submitting`.
    ///
    /// Fails without changing phase while another submission is in flight
    /// or once the invoice has been saved.
    pub fn begin_submit(&mut self) -> Result<CreateInvoiceRequest, IntakeError> {
        if self.submit_in_flight {
            return Err(IntakeError::SubmissionInFlight);
        }
        if self.phase == Phase::Succeeded {
            return Err(IntakeError::AlreadySubmitted);
        }
        match self.form.validate() {
            Ok(request) => {
                self.field_errors.clear();
                self.submit_in_flight = true;
                self.phase = Phase::Submitting;
                Ok(request)
            }
            Err(errors) => {
                debug!("Session {}: validation failed on {:?}", self.id, errors.keys());
                self.field_errors = errors.clone();
                self.touch();
                Err(IntakeError::Validation(errors))
            }
        }
    }

    pub fn apply(&mut self, action: Action) -> Result<Transition, IntakeError> {
        match action {
            Action::Edit { field, value } => {
                self.form.set(field, value);
                self.field_errors.remove(&field);
                self.touch();
                Ok(Transition::Updated)
            }

            Action::SetPaid(paid) => {
                self.form.is_paid = paid;
                self.touch();
                Ok(Transition::Updated)
            }

            Action::UploadSucceeded { token, draft } => {
                if !self.is_current(token) {
                    debug!("Session {}: dropping stale OCR result {:?}", self.id, token);
                    return Ok(Transition::StaleIgnored);
                }
                self.ocr_in_flight = None;

                let filled = self.form.merge_draft(&draft);
                for field in &filled {
                    self.field_errors.remove(field);
                }
                self.warnings = draft.warnings;
                self.extraction_complete = true;
                if !self.submit_in_flight {
                    self.phase = Phase::Extracted;
                }

                info!(
                    "Session {}: merged OCR draft, filled {} field(s), {} warning(s)",
                    self.id,
                    filled.len(),
                    self.warnings.len()
                );
                self.notify(NotificationLevel::Success, "Invoice data extracted. Please review the form.");
                if !self.warnings.is_empty() {
                    let fields: Vec<&str> = self.warnings.iter().map(|w| w.field.as_str()).collect();
                    self.notify(
                        NotificationLevel::Warning,
                        format!("Some values could not be read reliably: {}", fields.join(", ")),
                    );
                }
                Ok(Transition::Merged { filled })
            }

            Action::UploadFailed { token, message } => {
                if !self.is_current(token) {
                    debug!("Session {}: dropping stale OCR failure {:?}", self.id, token);
                    return Ok(Transition::StaleIgnored);
                }
                self.ocr_in_flight = None;
                if self.phase == Phase::Uploading && !self.submit_in_flight {
                    self.phase = self.phase_before_upload;
                }
                warn!("Session {}: OCR failed: {}", self.id, message);
                self.notify(NotificationLevel::Error, message);
                Ok(Transition::Updated)
            }

            Action::SubmitSucceeded(record) => {
                self.submit_in_flight = false;
                self.phase = Phase::Succeeded;
                self.created = Some(record);
                self.notify(NotificationLevel::Success, "Invoice saved.");
                Ok(Transition::Updated)
            }

            Action::SubmitFailed(message) => {
                self.submit_in_flight = false;
                self.phase = Phase::Failed;
                self.notify(NotificationLevel::Error, message);
                Ok(Transition::Updated)
            }

            Action::DismissBanner => {
                self.extraction_complete = false;
                Ok(Transition::Updated)
            }
        }
    }

    /// Serializable snapshot. Drains pending notifications.
    pub fn view(&mut self) -> SessionView {
        SessionView {
            id: self.id,
            phase: self.phase,
            form: self.form.clone(),
            extracting: self.extracting(),
            extraction_complete: self.extraction_complete,
            warnings: self.warnings.clone(),
            field_errors: self.field_errors.clone(),
            last_upload: self.last_upload.clone(),
            created_invoice: self.created.clone(),
            notifications: self.take_notifications(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub phase: Phase,
    pub form: InvoiceFormState,
    pub extracting: bool,
    pub extraction_complete: bool,
    pub warnings: Vec<ExtractionWarning>,
    pub field_errors: FieldErrors,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_upload: Option<UploadInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_invoice: Option<InvoiceRecord>,
    pub notifications: Vec<Notification>,
}
