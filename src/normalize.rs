//! Normalization of raw OCR fields into a form-ready draft.
//!
//! Pure functions, no async. Values that cannot be reconciled are passed
//! through unchanged and reported as [`ExtractionWarning`]s instead of
//! being dropped or treated as errors.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::form::InvoiceField;
use crate::ocr::RawOcrResult;

/// Normalized-but-unmerged invoice fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedInvoiceDraft {
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
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ExtractionWarning>,
}

impl NormalizedInvoiceDraft {
    /// Draft value for a form field. OCR never supplies the invoice type.
    pub fn get(&self, field: InvoiceField) -> Option<&str> {
        let value = match field {
            InvoiceField::InvoiceNumber => &self.invoice_number,
            InvoiceField::InvoiceDate => &self.invoice_date,
            InvoiceField::Amount => &self.amount,
            InvoiceField::Provider => &self.provider,
            InvoiceField::InvoiceType => return None,
            InvoiceField::DueDate => &self.due_date,
            InvoiceField::Consumption => &self.consumption,
            InvoiceField::Unit => &self.unit,
            InvoiceField::Period => &self.period,
            InvoiceField::AccountNumber => &self.account_number,
            InvoiceField::InstallationNumber => &self.installation_number,
            InvoiceField::CustomerNumber => &self.customer_number,
            InvoiceField::AverageConsumption => &self.average_consumption,
            InvoiceField::Name => &self.name,
            InvoiceField::Address => &self.address,
            InvoiceField::ConsumerGroup => &self.consumer_group,
        };
        value.as_deref()
    }
}

/// A value that was kept as-is because it could not be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionWarning {
    pub field: InvoiceField,
    pub raw: String,
    pub kind: WarningKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Not one of the recognized date layouts.
    UnrecognizedDate,
    /// Recognized layout, but no such calendar day.
    InvalidDate,
    /// Cleaned value still does not parse as a number.
    AmbiguousNumber,
}

/// Result of date reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateOutcome {
    /// Already `YYYY-MM-DD`.
    Canonical(String),
    /// Rewritten from a day-first layout.
    Converted(String),
    /// Left untouched.
    Unrecognized(String),
}

impl DateOutcome {
    #[cfg(test)]
    pub fn value(&self) -> &str {
        match self {
            DateOutcome::Canonical(v) | DateOutcome::Converted(v) | DateOutcome::Unrecognized(v) => v,
        }
    }

    pub fn into_value(self) -> String {
        match self {
            DateOutcome::Canonical(v) | DateOutcome::Converted(v) | DateOutcome::Unrecognized(v) => v,
        }
    }
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("static regex"))
}

fn day_first_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([0-9]{1,2})([./-])([0-9]{1,2})([./-])([0-9]{4})$").expect("static regex")
    })
}

/// Reconcile `DD.MM.YYYY`, `DD/MM/YYYY` and `DD-MM-YYYY` into `YYYY-MM-DD`.
///
/// Separators must agree; single-digit parts are zero-padded. Only ASCII
/// digits are recognized. Anything else, including two-digit years, comes
/// back unchanged.
pub fn normalize_date(raw: &str) -> DateOutcome {
    let trimmed = raw.trim();

    if iso_date_re().is_match(trimmed) {
        return DateOutcome::Canonical(trimmed.to_string());
    }

    if let Some(cap) = day_first_re().captures(trimmed) {
        if let (true, Ok(day), Ok(month)) =
            (cap[2] == cap[4], cap[1].parse::<u32>(), cap[3].parse::<u32>())
        {
            return DateOutcome::Converted(format!("{}-{:02}-{:02}", &cap[5], month, day));
        }
    }

    DateOutcome::Unrecognized(raw.to_string())
}

/// Turn decimal commas into periods, then keep only digits and periods.
///
/// No thousands-separator handling: `"1.234,56 ₺"` becomes `"1.234.56"`.
pub fn clean_numeric(raw: &str) -> String {
    raw.replace(',', ".")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

fn clean_text(raw: Option<String>) -> Option<String> {
    let value = raw?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn date_field(
    raw: Option<String>,
    field: InvoiceField,
    warnings: &mut Vec<ExtractionWarning>,
) -> Option<String> {
    let raw = clean_text(raw)?;
    let outcome = normalize_date(&raw);
    match &outcome {
        DateOutcome::Unrecognized(_) => warnings.push(ExtractionWarning {
            field,
            raw: raw.clone(),
            kind: WarningKind::UnrecognizedDate,
        }),
        DateOutcome::Canonical(v) | DateOutcome::Converted(v) => {
            if NaiveDate::parse_from_str(v, "%Y-%m-%d").is_err() {
                warnings.push(ExtractionWarning {
                    field,
                    raw: raw.clone(),
                    kind: WarningKind::InvalidDate,
                });
            }
        }
    }
    Some(outcome.into_value())
}

fn numeric_field(
    raw: Option<String>,
    field: InvoiceField,
    warnings: &mut Vec<ExtractionWarning>,
) -> Option<String> {
    let raw = clean_text(raw)?;
    let cleaned = clean_numeric(&raw);
    if cleaned.is_empty() {
        warnings.push(ExtractionWarning {
            field,
            raw,
            kind: WarningKind::AmbiguousNumber,
        });
        return None;
    }
    if cleaned.parse::<f64>().is_err() {
        warnings.push(ExtractionWarning {
            field,
            raw,
            kind: WarningKind::AmbiguousNumber,
        });
    }
    Some(cleaned)
}

/// Build a draft from a raw OCR result.
pub fn normalize(raw: RawOcrResult) -> NormalizedInvoiceDraft {
    let mut warnings = Vec::new();

    let draft = NormalizedInvoiceDraft {
        invoice_number: clean_text(raw.invoice_number),
        invoice_date: date_field(raw.invoice_date, InvoiceField::InvoiceDate, &mut warnings),
        amount: numeric_field(raw.amount, InvoiceField::Amount, &mut warnings),
        provider: clean_text(raw.provider),
        due_date: date_field(raw.due_date, InvoiceField::DueDate, &mut warnings),
        period: clean_text(raw.period),
        consumption: numeric_field(raw.consumption, InvoiceField::Consumption, &mut warnings),
        unit: clean_text(raw.unit),
        account_number: clean_text(raw.account_number),
        installation_number: clean_text(raw.installation_number),
        customer_number: clean_text(raw.customer_number),
        average_consumption: numeric_field(
            raw.average_consumption,
            InvoiceField::AverageConsumption,
            &mut warnings,
        ),
        name: clean_text(raw.name),
        address: clean_text(raw.address),
        consumer_group: clean_text(raw.consumer_group),
        warnings: Vec::new(),
    };

    if !warnings.is_empty() {
        debug!("Normalization produced {} warning(s): {:?}", warnings.len(), warnings);
    }

    NormalizedInvoiceDraft { warnings, ..draft }
}
