//! Add-invoice form state: field access, non-destructive OCR merge and
//! submit-time validation into a create-invoice request.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FieldErrors;
use crate::normalize::NormalizedInvoiceDraft;

/// Every user-editable text field of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceField {
    InvoiceNumber,
    InvoiceDate,
    Amount,
    Provider,
    InvoiceType,
    DueDate,
    Consumption,
    Unit,
    Period,
    AccountNumber,
    InstallationNumber,
    CustomerNumber,
    AverageConsumption,
    Name,
    Address,
    ConsumerGroup,
}

impl InvoiceField {
    pub const ALL: [InvoiceField; 16] = [
        InvoiceField::InvoiceNumber,
        InvoiceField::InvoiceDate,
        InvoiceField::Amount,
        InvoiceField::Provider,
        InvoiceField::InvoiceType,
        InvoiceField::DueDate,
        InvoiceField::Consumption,
        InvoiceField::Unit,
        InvoiceField::Period,
        InvoiceField::AccountNumber,
        InvoiceField::InstallationNumber,
        InvoiceField::CustomerNumber,
        InvoiceField::AverageConsumption,
        InvoiceField::Name,
        InvoiceField::Address,
        InvoiceField::ConsumerGroup,
    ];

    pub const REQUIRED: [InvoiceField; 5] = [
        InvoiceField::InvoiceNumber,
        InvoiceField::InvoiceDate,
        InvoiceField::Amount,
        InvoiceField::Provider,
        InvoiceField::InvoiceType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceField::InvoiceNumber => "invoice_number",
            InvoiceField::InvoiceDate => "invoice_date",
            InvoiceField::Amount => "amount",
            InvoiceField::Provider => "provider",
            InvoiceField::InvoiceType => "invoice_type",
            InvoiceField::DueDate => "due_date",
            InvoiceField::Consumption => "consumption",
            InvoiceField::Unit => "unit",
            InvoiceField::Period => "period",
            InvoiceField::AccountNumber => "account_number",
            InvoiceField::InstallationNumber => "installation_number",
            InvoiceField::CustomerNumber => "customer_number",
            InvoiceField::AverageConsumption => "average_consumption",
            InvoiceField::Name => "name",
            InvoiceField::Address => "address",
            InvoiceField::ConsumerGroup => "consumer_group",
        }
    }
}

impl fmt::Display for InvoiceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Utility the invoice is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Electricity,
    Water,
    NaturalGas,
}

impl InvoiceType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "electricity" => Some(Self::Electricity),
            "water" => Some(Self::Water),
            "natural_gas" | "gas" => Some(Self::NaturalGas),
            _ => None,
        }
    }
}

/// Live state of the add-invoice form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceFormState {
    pub invoice_number: String,
    pub invoice_date: String,
    pub amount: String,
    pub provider: String,
    pub invoice_type: String,
    pub due_date: String,
    pub consumption: String,
    pub unit: String,
    pub period: String,
    pub account_number: String,
    pub installation_number: String,
    pub customer_number: String,
    pub average_consumption: String,
    pub name: String,
    pub address: String,
    pub consumer_group: String,
    pub is_paid: bool,
}

impl InvoiceFormState {
    pub fn get(&self, field: InvoiceField) -> &str {
        match field {
            InvoiceField::InvoiceNumber => &self.invoice_number,
            InvoiceField::InvoiceDate => &self.invoice_date,
            InvoiceField::Amount => &self.amount,
            InvoiceField::Provider => &self.provider,
            InvoiceField::InvoiceType => &self.invoice_type,
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
        }
    }

    fn slot(&mut self, field: InvoiceField) -> &mut String {
        match field {
            InvoiceField::InvoiceNumber => &mut self.invoice_number,
            InvoiceField::InvoiceDate => &mut self.invoice_date,
            InvoiceField::Amount => &mut self.amount,
            InvoiceField::Provider => &mut self.provider,
            InvoiceField::InvoiceType => &mut self.invoice_type,
            InvoiceField::DueDate => &mut self.due_date,
            InvoiceField::Consumption => &mut self.consumption,
            InvoiceField::Unit => &mut self.unit,
            InvoiceField::Period => &mut self.period,
            InvoiceField::AccountNumber => &mut self.account_number,
            InvoiceField::InstallationNumber => &mut self.installation_number,
            InvoiceField::CustomerNumber => &mut self.customer_number,
            InvoiceField::AverageConsumption => &mut self.average_consumption,
            InvoiceField::Name => &mut self.name,
            InvoiceField::Address => &mut self.address,
            InvoiceField::ConsumerGroup => &mut self.consumer_group,
        }
    }

    /// Overwrite a field with a user-entered value.
    pub fn set(&mut self, field: InvoiceField, value: impl Into<String>) {
        *self.slot(field) = value.into();
    }

    /// Fill empty fields from an OCR draft.
    ///
    /// Each field is decided on its own: a value that is non-empty after
    /// trimming is never replaced. Returns the fields that were filled.
    pub fn merge_draft(&mut self, draft: &NormalizedInvoiceDraft) -> Vec<InvoiceField> {
        let mut filled = Vec::new();
        for field in InvoiceField::ALL {
            let Some(incoming) = draft.get(field) else {
                continue;
            };
            if incoming.is_empty() {
                continue;
            }
            let slot = self.slot(field);
            if slot.trim().is_empty() {
                *slot = incoming.to_string();
                filled.push(field);
            }
        }
        filled
    }

    /// Check the form and build the create-invoice request.
    ///
    /// Every problem is reported, keyed by field; nothing is sent when any exist.
    pub fn validate(&self) -> Result<CreateInvoiceRequest, FieldErrors> {
        let mut errors = FieldErrors::new();

        for field in InvoiceField::REQUIRED {
            if self.get(field).trim().is_empty() {
                errors.insert(field, format!("{} is required", field));
            }
        }

        let invoice_date = check_date(&self.invoice_date, InvoiceField::InvoiceDate, &mut errors);
        let due_date = optional(&self.due_date)
            .and_then(|_| check_date(&self.due_date, InvoiceField::DueDate, &mut errors));

        let total_amount = check_number(&self.amount, InvoiceField::Amount, &mut errors);
        if let Some(amount) = total_amount {
            if amount < 0.0 {
                errors.insert(InvoiceField::Amount, "amount must not be negative".to_string());
            }
        }
        let consumption = optional(&self.consumption)
            .and_then(|_| check_number(&self.consumption, InvoiceField::Consumption, &mut errors));
        let average_consumption = optional(&self.average_consumption).and_then(|_| {
            check_number(
                &self.average_consumption,
                InvoiceField::AverageConsumption,
                &mut errors,
            )
        });

        let invoice_type = match optional(&self.invoice_type) {
            Some(raw) => {
                let parsed = InvoiceType::parse(raw);
                if parsed.is_none() {
                    errors.insert(
                        InvoiceField::InvoiceType,
                        format!("unknown invoice type '{}'", raw),
                    );
                }
                parsed
            }
            None => None,
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        // All required values are present once the error map is empty.
        let (Some(invoice_date), Some(total_amount), Some(invoice_type)) =
            (invoice_date, total_amount, invoice_type)
        else {
            return Err(errors);
        };

        Ok(CreateInvoiceRequest {
            invoice_number: self.invoice_number.trim().to_string(),
            invoice_date,
            due_date,
            total_amount,
            provider: self.provider.trim().to_string(),
            invoice_type,
            consumption,
            unit: optional(&self.unit).map(str::to_string),
            period: optional(&self.period).map(str::to_string),
            is_paid: self.is_paid,
            account_number: optional(&self.account_number).map(str::to_string),
            installation_number: optional(&self.installation_number).map(str::to_string),
            customer_number: optional(&self.customer_number).map(str::to_string),
            average_consumption,
            name: optional(&self.name).map(str::to_string),
            address: optional(&self.address).map(str::to_string),
            consumer_group: optional(&self.consumer_group).map(str::to_string),
        })
    }
}

fn optional(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn check_date(raw: &str, field: InvoiceField, errors: &mut FieldErrors) -> Option<NaiveDate> {
    let raw = optional(raw)?;
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.insert(field, format!("'{}' is not a valid YYYY-MM-DD date", raw));
            None
        }
    }
}

fn check_number(raw: &str, field: InvoiceField, errors: &mut FieldErrors) -> Option<f64> {
    let raw = optional(raw)?;
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => Some(n),
        _ => {
            errors.insert(field, format!("'{}' is not a valid number", raw));
            None
        }
    }
}

/// Body of `POST {API_BASE}/invoices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub total_amount: f64,
    pub provider: String,
    pub invoice_type: InvoiceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumption: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    pub is_paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_consumption: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_group: Option<String>,
}
