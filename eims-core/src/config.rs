//! Runtime configuration for the EIMS integration.
//!
//! All settings travel in an explicit [`EimsConfig`] handed to each component
//! at construction. There is no process-wide mutable state; concurrent
//! submissions therefore cannot race on shared configuration.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Credentials issued by the authority for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub api_key: String,
    /// Tenant tax identification number.
    pub tin: String,
}

/// Payload defaults applied when the invoice carries no explicit value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadDefaults {
    pub region: String,
    pub wereda: String,
    pub system_type: String,
    pub system_number: String,
    pub payment_term: String,
    pub payment_mode: String,
    pub nature_of_supply: String,
    pub tax_code: String,
}

impl Default for PayloadDefaults {
    fn default() -> Self {
        Self {
            region: "11".into(),
            wereda: "01".into(),
            system_type: "POS".into(),
            system_number: "UNSET".into(),
            payment_term: "IMMEDIATE".into(),
            payment_mode: "Cash".into(),
            nature_of_supply: "Goods".into(),
            tax_code: "VAT".into(),
        }
    }
}

/// Full configuration surface supplied by the host environment.
///
/// # Examples
/// ```rust
/// let config: eims_core::config::EimsConfig = serde_json::from_str(r#"{
///     "credentials": {
///         "client_id": "id", "client_secret": "secret",
///         "api_key": "key", "tin": "0062192232"
///     },
///     "login_url": "https://core.mor.gov.et/auth/login",
///     "submit_url": "https://core.mor.gov.et/v1/register",
///     "private_key_path": "/etc/eims/private_key.pem",
///     "certificate_path": "/etc/eims/certificate.pem"
/// }"#)?;
/// assert!(config.verify_tls);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EimsConfig {
    pub credentials: Credentials,
    pub login_url: String,
    pub submit_url: String,
    pub private_key_path: PathBuf,
    pub certificate_path: PathBuf,
    /// Request timeout applied to both the login and submission calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Single TLS-verification policy for every outbound call.
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    /// Submit automatically when an eligible invoice is posted.
    #[serde(default = "default_true")]
    pub auto_submit: bool,
    /// Surface submission failures synchronously to the posting caller.
    #[serde(default)]
    pub block_on_error: bool,
    #[serde(default)]
    pub defaults: PayloadDefaults,
}

impl EimsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}
