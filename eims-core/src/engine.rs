//! Submission engine: orchestrates login, payload build, signing, transport
//! and state/log bookkeeping for one invoice at a time.
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::auth::{truncate_body, AuthClient, AuthError, MAX_ERROR_BODY};
use crate::canonical::canonical_json;
use crate::certificate::{CertificateError, CertificateStore, ExpiryGrade};
use crate::config::EimsConfig;
use crate::invoice::payload::{build_request, CounterSource, SystemCounter};
use crate::invoice::{Invoice, StateError};
use crate::log::{LogEntry, LogState, LogStore};
use crate::qr::QrRenderer;
use crate::sign::{encode_certificate, sign_sha512, EnvelopeError, KeyError};

/// Everything that can go wrong during one submission attempt.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("submission prerequisites not met: {0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("EIMS rejected the submission with HTTP {status}: {message}")]
    Remote { status: u16, message: String },
    #[error(transparent)]
    Encoding(#[from] crate::canonical::EncodingError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<EnvelopeError> for SubmitError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Key(e) => SubmitError::Key(e),
            EnvelopeError::Encoding(e) => SubmitError::Encoding(e),
        }
    }
}

impl SubmitError {
    /// Transient failures are worth an automatic retry; everything else
    /// needs an operator or a code change first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmitError::Auth(_) | SubmitError::Transport(_) | SubmitError::Remote { .. }
        )
    }
}

/// Why an invoice was skipped without an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Not an outbound customer invoice.
    NotSubmittable,
    /// Already acknowledged; resubmission would double-register.
    AlreadyAcknowledged,
}

/// Result of [`SubmissionEngine::submit_invoice`] when the attempt itself
/// completed. Retryable failures surface here; terminal defects are `Err`.
#[derive(Debug)]
pub enum SubmitOutcome {
    Skipped(SkipReason),
    Accepted { reference_number: String },
    Failed(SubmitError),
}

struct AttemptRecord {
    request_json: Option<Value>,
    response_json: Option<Value>,
    http_status: Option<u16>,
    response_time_ms: Option<u64>,
    irn: Option<String>,
}

impl AttemptRecord {
    fn new() -> Self {
        Self {
            request_json: None,
            response_json: None,
            http_status: None,
            response_time_ms: None,
            irn: None,
        }
    }
}

/// One engine per tenant configuration; shared state lives behind `Arc`s.
pub struct SubmissionEngine {
    config: EimsConfig,
    http: Client,
    auth: AuthClient,
    certificates: Arc<CertificateStore>,
    log: Arc<LogStore>,
    qr: Arc<dyn QrRenderer>,
    counter: Arc<dyn CounterSource>,
}

impl SubmissionEngine {
    /// Build the engine and its HTTP client. The configured timeout and TLS
    /// policy apply to both the login and the submission call.
    ///
    /// # Errors
    /// Returns [`SubmitError::Http`] if the HTTP client cannot be built.
    pub fn new(
        config: EimsConfig,
        certificates: Arc<CertificateStore>,
        log: Arc<LogStore>,
        qr: Arc<dyn QrRenderer>,
    ) -> Result<Self, SubmitError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;
        let auth = AuthClient::new(http.clone(), config.login_url.clone());
        Ok(Self {
            config,
            http,
            auth,
            certificates,
            log,
            qr,
            counter: Arc::new(SystemCounter::default()),
        })
    }

    /// Replace the default in-process counter with a host-backed sequence.
    pub fn with_counter(mut self, counter: Arc<dyn CounterSource>) -> Self {
        self.counter = counter;
        self
    }

    pub fn certificates(&self) -> &CertificateStore {
        &self.certificates
    }

    /// Tenant TIN this engine submits for.
    pub fn tenant(&self) -> &str {
        &self.config.credentials.tin
    }

    pub fn log_store(&self) -> &LogStore {
        &self.log
    }

    /// Posting hook. Submits eligible invoices when `auto_submit` is on;
    /// failures only propagate to the caller under `block_on_error`.
    pub async fn on_invoice_posted(&self, invoice: &mut Invoice) -> Result<(), SubmitError> {
        if !self.config.auto_submit {
            return Ok(());
        }
        match self.submit_invoice(invoice).await {
            Ok(SubmitOutcome::Failed(err)) if self.config.block_on_error => Err(err),
            Ok(_) => Ok(()),
            Err(err) if self.config.block_on_error => Err(err),
            Err(err) => {
                tracing::error!(invoice = %invoice.id, error = %err, "submission failed; invoice left in failed state");
                Ok(())
            }
        }
    }

    /// Submit one invoice to EIMS.
    ///
    /// Returns `Ok(SubmitOutcome::Failed(_))` for retryable failures (the
    /// state machine and log already record them) and `Err` for terminal
    /// ones. Acknowledged invoices are skipped without any network traffic.
    ///
    /// # Errors
    /// Non-retryable failures: missing prerequisites, key or certificate
    /// defects, state machine violations.
    pub async fn submit_invoice(&self, invoice: &mut Invoice) -> Result<SubmitOutcome, SubmitError> {
        if !invoice.is_submittable() {
            return Ok(SubmitOutcome::Skipped(SkipReason::NotSubmittable));
        }
        if invoice.submission.has_reference() {
            tracing::debug!(invoice = %invoice.id, "already acknowledged; skipping");
            return Ok(SubmitOutcome::Skipped(SkipReason::AlreadyAcknowledged));
        }

        invoice.submission.begin_attempt()?;
        let mut record = AttemptRecord::new();
        let started = Instant::now();

        match self.run_attempt(invoice, &mut record).await {
            Ok(reference_number) => {
                invoice
                    .submission
                    .mark_success(reference_number.clone(), Utc::now())?;
                self.decorate_success(invoice, record.response_json.as_ref());
                self.append_log(invoice, LogState::Success, record, None, None);
                tracing::info!(
                    invoice = %invoice.id,
                    reference = %reference_number,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "invoice acknowledged by EIMS"
                );
                Ok(SubmitOutcome::Accepted { reference_number })
            }
            Err(err) => {
                let message = err.to_string();
                invoice.submission.mark_failed(&message);
                let error_code = record
                    .response_json
                    .as_ref()
                    .and_then(extract_error_code);
                self.append_log(invoice, LogState::Failed, record, Some(message), error_code);
                if err.is_retryable() {
                    tracing::warn!(invoice = %invoice.id, error = %err, "submission failed; eligible for retry");
                    Ok(SubmitOutcome::Failed(err))
                } else {
                    tracing::error!(invoice = %invoice.id, error = %err, "submission failed terminally");
                    Err(err)
                }
            }
        }
    }

    async fn run_attempt(
        &self,
        invoice: &Invoice,
        record: &mut AttemptRecord,
    ) -> Result<String, SubmitError> {
        self.check_prerequisites(invoice)?;
        let request = build_request(invoice, &self.config.defaults, self.counter.as_ref());
        let (key_pem, cert_pem) = self.load_key_material().await?;

        let token = self
            .auth
            .login(&self.config.credentials, &key_pem, &cert_pem)
            .await?;

        let canonical = canonical_json(&request)?;
        let signature = sign_sha512(&canonical, &key_pem)?;
        let envelope = json!({
            "request": request,
            "signature": signature,
            "certificate": encode_certificate(&cert_pem),
        });
        record.request_json = Some(envelope.clone());

        let sent_at = Instant::now();
        let response = self
            .http
            .post(&self.config.submit_url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .bearer_auth(&token)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        record.http_status = Some(status.as_u16());
        record.response_time_ms = Some(sent_at.elapsed().as_millis() as u64);
        let parsed: Option<Value> = serde_json::from_str(&body).ok();
        record.response_json = parsed.clone();

        if !status.is_success() {
            return Err(SubmitError::Remote {
                status: status.as_u16(),
                message: remote_message(status.as_u16(), parsed.as_ref(), &body),
            });
        }

        let parsed = parsed.ok_or_else(|| SubmitError::Remote {
            status: status.as_u16(),
            message: format!(
                "HTTP {}: unparseable acknowledgement: {}",
                status.as_u16(),
                truncate_body(&body, MAX_ERROR_BODY)
            ),
        })?;
        let irn = parsed
            .pointer("/body/irn")
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SubmitError::Remote {
                status: status.as_u16(),
                message: "acknowledgement carries no body.irn".into(),
            })?;
        record.irn = Some(irn.clone());
        Ok(irn)
    }

    fn check_prerequisites(&self, invoice: &Invoice) -> Result<(), SubmitError> {
        if invoice.seller.tin.as_deref().map_or(true, str::is_empty) {
            return Err(SubmitError::Validation("seller has no TIN".into()));
        }
        if invoice
            .buyer
            .legal_name
            .as_deref()
            .map_or(true, str::is_empty)
        {
            return Err(SubmitError::Validation("buyer has no legal name".into()));
        }
        if invoice.lines.is_empty() {
            return Err(SubmitError::Validation("invoice has no lines".into()));
        }

        let today = Utc::now().date_naive();
        let certificate = self
            .certificates
            .active_for(&self.config.credentials.tin)
            .ok_or_else(|| {
                SubmitError::Validation(format!(
                    "no active certificate for tenant {}",
                    self.config.credentials.tin
                ))
            })?;
        if certificate.is_expired(today) {
            return Err(SubmitError::Validation(format!(
                "active certificate {} expired on {}",
                certificate.id,
                certificate
                    .expiry_date
                    .map(|d| d.to_string())
                    .unwrap_or_default()
            )));
        }
        if let Some(days) = certificate.days_to_expiry(today) {
            if let Some(grade) = ExpiryGrade::classify(days) {
                tracing::warn!(
                    certificate_id = certificate.id,
                    days_to_expiry = days,
                    ?grade,
                    "active certificate is approaching expiry"
                );
            }
        }
        Ok(())
    }

    async fn load_key_material(&self) -> Result<(Vec<u8>, Vec<u8>), SubmitError> {
        let key = tokio::fs::read(&self.config.private_key_path)
            .await
            .map_err(|e| {
                SubmitError::Validation(format!(
                    "private key unreadable at {}: {e}",
                    self.config.private_key_path.display()
                ))
            })?;
        let cert = tokio::fs::read(&self.config.certificate_path)
            .await
            .map_err(|e| {
                SubmitError::Validation(format!(
                    "certificate unreadable at {}: {e}",
                    self.config.certificate_path.display()
                ))
            })?;
        Ok((key, cert))
    }

    fn map_transport(&self, err: reqwest::Error) -> SubmitError {
        if err.is_timeout() {
            SubmitError::Transport(format!(
                "request timed out after {} seconds",
                self.config.timeout_secs
            ))
        } else if err.is_connect() {
            SubmitError::Transport(format!("connection failed: {err}"))
        } else {
            SubmitError::Transport(err.to_string())
        }
    }

    fn append_log(
        &self,
        invoice: &Invoice,
        state: LogState,
        record: AttemptRecord,
        error_text: Option<String>,
        error_code: Option<String>,
    ) {
        self.log.append(LogEntry {
            invoice_id: invoice.id.clone(),
            attempted_at: Utc::now(),
            state,
            request_json: record.request_json,
            response_json: record.response_json,
            http_status: record.http_status,
            response_time_ms: record.response_time_ms,
            error_text,
            error_code,
            irn: record.irn,
        });
    }

    /// Attach the QR image and signed document from the acknowledgement.
    /// QR rendering failures are logged and swallowed.
    fn decorate_success(&self, invoice: &mut Invoice, acknowledgement: Option<&Value>) {
        let mut qr_data = None;
        if let Some(ack) = acknowledgement {
            if let Some(signed) = ack
                .pointer("/body/signedInvoice")
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty())
            {
                invoice.submission.signed_document = Some(signed.to_string());
            }
            qr_data = ack
                .pointer("/body/qrCode")
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
        }
        // The authority-provided QR payload wins; the reference number is
        // the fallback.
        let qr_data = qr_data.or_else(|| {
            invoice
                .submission
                .reference_number()
                .map(str::to_string)
        });
        if let Some(data) = qr_data {
            match self.qr.render(&data) {
                Ok(image) if !image.is_empty() => invoice.submission.qr_image = Some(image),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(invoice = %invoice.id, error = %err, "QR rendering failed; continuing without image");
                }
            }
        }
    }
}

fn extract_error_code(response: &Value) -> Option<String> {
    ["code", "errorCode"]
        .iter()
        .find_map(|key| response.get(key))
        .and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Best human-readable rejection message: `message`, then `error`, then the
/// first entry of `errors`, then the raw body excerpt.
fn remote_message(status: u16, parsed: Option<&Value>, body: &str) -> String {
    if let Some(parsed) = parsed {
        for key in ["message", "error"] {
            if let Some(text) = parsed.get(key).and_then(|v| v.as_str()) {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
        if let Some(first) = parsed.get("errors").and_then(|v| v.get(0)) {
            return match first.as_str() {
                Some(text) => text.to_string(),
                None => first.to_string(),
            };
        }
    }
    format!("HTTP {status}: {}", truncate_body(body, MAX_ERROR_BODY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_message_prefers_message_field() {
        let parsed = json!({"message": "seller tin invalid", "error": "other"});
        assert_eq!(remote_message(422, Some(&parsed), "{}"), "seller tin invalid");
    }

    #[test]
    fn remote_message_falls_back_to_error_then_errors() {
        let parsed = json!({"error": "bad request"});
        assert_eq!(remote_message(400, Some(&parsed), "{}"), "bad request");

        let parsed = json!({"errors": ["first failure", "second"]});
        assert_eq!(remote_message(400, Some(&parsed), "{}"), "first failure");

        let parsed = json!({"errors": [{"field": "Tin"}]});
        assert_eq!(remote_message(400, Some(&parsed), "{}"), r#"{"field":"Tin"}"#);
    }

    #[test]
    fn remote_message_uses_body_excerpt_without_known_fields() {
        let message = remote_message(500, None, "<html>Internal Server Error</html>");
        assert!(message.starts_with("HTTP 500:"));
        assert!(message.contains("Internal Server Error"));
    }

    #[test]
    fn error_code_is_read_from_either_key() {
        assert_eq!(
            extract_error_code(&json!({"code": "E-100"})),
            Some("E-100".into())
        );
        assert_eq!(
            extract_error_code(&json!({"errorCode": 42})),
            Some("42".into())
        );
        assert_eq!(extract_error_code(&json!({"other": true})), None);
    }

    #[test]
    fn retryability_follows_the_failure_class() {
        assert!(SubmitError::Transport("timeout".into()).is_retryable());
        assert!(SubmitError::Remote {
            status: 500,
            message: "boom".into()
        }
        .is_retryable());
        assert!(SubmitError::Auth(AuthError::Timeout).is_retryable());
        assert!(!SubmitError::Validation("no tin".into()).is_retryable());
        assert!(!SubmitError::Key(KeyError::NotPem).is_retryable());
        assert!(!SubmitError::State(StateError::AlreadyAcknowledged).is_retryable());
    }
}
