//! Invoice snapshot, party details, and the per-invoice submission state.
//!
//! The invoice itself is owned by the host accounting system; the core reads
//! its business fields and only ever appends to the attached
//! [`SubmissionState`].
pub mod payload;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Host-side classification of the accounting document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceKind {
    CustomerInvoice,
    CustomerCredit,
    VendorBill,
    Entry,
}

/// Counterparty classification used to derive the transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    #[default]
    Business,
    Consumer,
    Government,
}

/// EIMS document type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    CreditNote,
    DebitNote,
    InterestNote,
    FinalNote,
}

impl DocumentType {
    pub fn code(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "INV",
            DocumentType::CreditNote => "CRE",
            DocumentType::DebitNote => "DEB",
            DocumentType::InterestNote => "INT",
            DocumentType::FinalNote => "FIN",
        }
    }

    /// Credit, debit, interest and final notes must reference the document
    /// they amend.
    pub fn requires_reference(&self) -> bool {
        !matches!(self, DocumentType::Invoice)
    }
}

/// Transaction type derived from seller and buyer classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    B2b,
    B2c,
    B2g,
    G2b,
    G2c,
}

impl TransactionType {
    pub fn derive(seller: PartyKind, buyer: PartyKind) -> Self {
        match (seller, buyer) {
            (PartyKind::Government, PartyKind::Consumer) => TransactionType::G2c,
            (PartyKind::Government, _) => TransactionType::G2b,
            (_, PartyKind::Government) => TransactionType::B2g,
            (_, PartyKind::Consumer) => TransactionType::B2c,
            _ => TransactionType::B2b,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TransactionType::B2b => "B2B",
            TransactionType::B2c => "B2C",
            TransactionType::B2g => "B2G",
            TransactionType::G2b => "G2B",
            TransactionType::G2c => "G2C",
        }
    }

    /// Consumer-facing transactions carry no buyer tax identifiers.
    pub fn buyer_is_anonymous(&self) -> bool {
        matches!(self, TransactionType::B2c | TransactionType::G2c)
    }
}

/// Party shape mirroring the authority's seller/buyer schema.
///
/// Every field except `kind` is explicitly optional; the payload builder maps
/// `None` to JSON `null` (or a configured default where the schema demands a
/// value).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyDetails {
    pub kind: PartyKind,
    pub tin: Option<String>,
    pub legal_name: Option<String>,
    pub city: Option<String>,
    pub wereda: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub kebele: Option<String>,
    pub sub_tin: Option<String>,
    pub country: Option<String>,
    pub sub_city: Option<String>,
    pub locality: Option<String>,
    pub trade_name: Option<String>,
    pub house_number: Option<String>,
    pub id_type: Option<String>,
    pub id_number: Option<String>,
}

/// Single invoice line as the host computed it; the core never recomputes
/// accounting amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub item_code: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    pub pre_tax_value: f64,
    pub tax_amount: f64,
    pub total_line_amount: f64,
    pub tax_code: Option<String>,
    pub nature_of_supplies: Option<String>,
    #[serde(default)]
    pub discount: f64,
    pub harmonization_code: Option<String>,
}

/// Read-only invoice snapshot plus its EIMS submission state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Host identifier, used to key log entries.
    pub id: String,
    /// Document number as printed on the invoice.
    pub number: String,
    pub kind: InvoiceKind,
    pub document_type: DocumentType,
    pub issue_date: NaiveDate,
    pub currency: String,
    pub exchange_rate: Option<f64>,
    pub amount_total: f64,
    pub amount_tax: f64,
    /// Free-text reason, required for documents that amend another.
    pub reference: Option<String>,
    /// Document number of the amended invoice, if any.
    pub origin: Option<String>,
    pub seller: PartyDetails,
    pub buyer: PartyDetails,
    pub lines: Vec<LineItem>,
    #[serde(default)]
    pub submission: SubmissionState,
}

impl Invoice {
    pub fn transaction_type(&self) -> TransactionType {
        TransactionType::derive(self.seller.kind, self.buyer.kind)
    }

    /// Only outbound customer invoices go to EIMS.
    pub fn is_submittable(&self) -> bool {
        matches!(self.kind, InvoiceKind::CustomerInvoice)
    }
}

/// Submission status of an invoice.
///
/// `Sent` is a legacy alias some hosts still persist for in-flight attempts;
/// the engine itself only writes `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    #[default]
    Draft,
    Pending,
    Sent,
    Success,
    Failed,
}

impl SubmissionStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SubmissionStatus::Pending | SubmissionStatus::Sent)
    }
}

/// Invalid submission state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("invoice already acknowledged by EIMS; resubmission is not allowed")]
    AlreadyAcknowledged,
    #[error("cannot mark success from {0:?}")]
    NotInFlight(SubmissionStatus),
    #[error("EIMS returned an empty reference number")]
    EmptyReference,
}

/// EIMS state attached 1:1 to an invoice.
///
/// The reference number is private: once the authority assigns one it is
/// immutable and every later submission attempt becomes a no-op.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionState {
    pub status: SubmissionStatus,
    reference_number: Option<String>,
    pub last_error: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub qr_image: Option<Vec<u8>>,
    pub signed_document: Option<String>,
}

impl SubmissionState {
    pub fn reference_number(&self) -> Option<&str> {
        self.reference_number.as_deref()
    }

    pub fn has_reference(&self) -> bool {
        self.reference_number
            .as_deref()
            .is_some_and(|r| !r.is_empty())
    }

    /// Start an attempt: clear the previous error and move to `Pending`.
    ///
    /// Re-checks the reference number so a retry racing a concurrent success
    /// cannot resubmit an acknowledged invoice.
    pub fn begin_attempt(&mut self) -> Result<(), StateError> {
        if self.has_reference() || self.status == SubmissionStatus::Success {
            return Err(StateError::AlreadyAcknowledged);
        }
        self.last_error = None;
        self.status = SubmissionStatus::Pending;
        Ok(())
    }

    /// Record acceptance by the authority.
    pub fn mark_success(
        &mut self,
        reference_number: impl Into<String>,
        acknowledged_at: DateTime<Utc>,
    ) -> Result<(), StateError> {
        if self.has_reference() {
            return Err(StateError::AlreadyAcknowledged);
        }
        if !self.status.is_in_flight() {
            return Err(StateError::NotInFlight(self.status));
        }
        let reference_number = reference_number.into();
        if reference_number.is_empty() {
            return Err(StateError::EmptyReference);
        }
        self.reference_number = Some(reference_number);
        self.status = SubmissionStatus::Success;
        self.acknowledged_at = Some(acknowledged_at);
        self.last_error = None;
        Ok(())
    }

    /// Record a failed attempt. Never demotes an acknowledged invoice.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        if self.has_reference() {
            return;
        }
        self.status = SubmissionStatus::Failed;
        self.last_error = Some(error.into());
    }

    /// Failed and never acknowledged: eligible for the retry sweep.
    pub fn can_retry(&self) -> bool {
        self.status == SubmissionStatus::Failed && !self.has_reference()
    }
}
