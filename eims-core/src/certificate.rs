//! PKCS#12 certificate store with expiry tracking.
//!
//! Each tenant may hold many certificates but at most one active at a time.
//! Import never blocks on a broken container: metadata extraction soft-fails
//! and the record is stored with an unknown expiry so operators can replace
//! it later.
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate};
use p12::PFX;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x509_cert::der::Decode;
use x509_cert::Certificate;

/// Errors raised by certificate import, activation and verification.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("PKCS#12 container is malformed: {0}")]
    Malformed(String),
    #[error("PKCS#12 password is incorrect")]
    BadPassword,
    #[error("PKCS#12 container holds no certificate")]
    NoCertificate,
    #[error("no certificate with id {0}")]
    NotFound(u64),
    #[error("tenant {tenant} already has active certificate {active_id}")]
    Conflict { tenant: String, active_id: u64 },
}

/// Severity of an approaching expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryGrade {
    Info,
    Warning,
    Critical,
    Expired,
}

impl ExpiryGrade {
    /// Grade by days remaining. Day zero already counts as expired: a
    /// certificate is unusable on its expiry date, not the day after.
    pub fn classify(days_to_expiry: i64) -> Option<Self> {
        match days_to_expiry {
            d if d <= 0 => Some(ExpiryGrade::Expired),
            d if d <= 7 => Some(ExpiryGrade::Critical),
            d if d <= 15 => Some(ExpiryGrade::Warning),
            d if d <= 30 => Some(ExpiryGrade::Info),
            _ => None,
        }
    }
}

/// One finding of the expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryAlert {
    pub certificate_id: u64,
    pub tenant: String,
    pub name: String,
    pub expiry_date: NaiveDate,
    pub days_to_expiry: i64,
    pub grade: ExpiryGrade,
}

/// Stored certificate container plus extracted metadata.
#[derive(Debug, Clone)]
pub struct CertificateRecord {
    pub id: u64,
    pub tenant: String,
    pub name: String,
    pub pkcs12: Vec<u8>,
    pub password: String,
    /// `None` when metadata extraction soft-failed at import time.
    pub expiry_date: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: NaiveDate,
}

impl CertificateRecord {
    pub fn days_to_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.expiry_date
            .map(|expiry| (expiry - today).num_days())
    }

    /// Expired on the expiry date itself, not the day after.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry <= today)
    }

    pub fn is_usable(&self, today: NaiveDate) -> bool {
        self.is_active && !self.is_expired(today)
    }
}

/// Parse a PKCS#12 container and return the leaf certificate expiry date.
///
/// # Errors
/// [`CertificateError::BadPassword`] when the MAC does not verify,
/// [`CertificateError::Malformed`] when the container or the embedded
/// certificate cannot be parsed.
pub fn extract_expiry(pkcs12: &[u8], password: &str) -> Result<NaiveDate, CertificateError> {
    let pfx = PFX::parse(pkcs12).map_err(|e| CertificateError::Malformed(format!("{e:?}")))?;
    if !pfx.verify_mac(password) {
        return Err(CertificateError::BadPassword);
    }
    let bags = pfx
        .cert_bags(password)
        .map_err(|e| CertificateError::Malformed(format!("{e:?}")))?;
    let der = bags.first().ok_or(CertificateError::NoCertificate)?;
    let cert =
        Certificate::from_der(der).map_err(|e| CertificateError::Malformed(e.to_string()))?;
    let not_after = cert
        .tbs_certificate
        .validity
        .not_after
        .to_system_time()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| CertificateError::Malformed("validity predates the epoch".into()))?;
    let when = DateTime::from_timestamp(not_after.as_secs() as i64, 0)
        .ok_or_else(|| CertificateError::Malformed("validity out of range".into()))?;
    Ok(when.date_naive())
}

#[derive(Debug, Default)]
struct StoreInner {
    next_id: u64,
    records: Vec<CertificateRecord>,
}

/// In-memory certificate registry, shared across the engine and sweeps.
#[derive(Debug, Default)]
pub struct CertificateStore {
    inner: RwLock<StoreInner>,
}

impl CertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a container. Metadata extraction soft-fails: a record is
    /// created either way, inactive, and a warning is logged when the expiry
    /// could not be read.
    pub fn import(
        &self,
        tenant: impl Into<String>,
        name: impl Into<String>,
        pkcs12: Vec<u8>,
        password: impl Into<String>,
        today: NaiveDate,
    ) -> u64 {
        let tenant = tenant.into();
        let name = name.into();
        let password = password.into();
        let expiry_date = match extract_expiry(&pkcs12, &password) {
            Ok(expiry) => Some(expiry),
            Err(err) => {
                tracing::warn!(%tenant, %name, error = %err, "certificate metadata extraction failed; storing without expiry");
                None
            }
        };
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.push(CertificateRecord {
            id,
            tenant,
            name,
            pkcs12,
            password,
            expiry_date,
            is_active: false,
            created_at: today,
        });
        id
    }

    /// Activate a certificate. Fails while another certificate is active for
    /// the same tenant; the old one must be deactivated first.
    pub fn activate(&self, id: u64) -> Result<(), CertificateError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let tenant = inner
            .records
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.tenant.clone())
            .ok_or(CertificateError::NotFound(id))?;
        if let Some(active) = inner
            .records
            .iter()
            .find(|r| r.tenant == tenant && r.is_active && r.id != id)
        {
            return Err(CertificateError::Conflict {
                tenant,
                active_id: active.id,
            });
        }
        for record in inner.records.iter_mut() {
            if record.id == id {
                record.is_active = true;
            }
        }
        Ok(())
    }

    pub fn deactivate(&self, id: u64) -> Result<(), CertificateError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(CertificateError::NotFound(id))?;
        record.is_active = false;
        Ok(())
    }

    pub fn get(&self, id: u64) -> Option<CertificateRecord> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.records.iter().find(|r| r.id == id).cloned()
    }

    /// The single active certificate for a tenant, if any.
    pub fn active_for(&self, tenant: &str) -> Option<CertificateRecord> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .records
            .iter()
            .find(|r| r.tenant == tenant && r.is_active)
            .cloned()
    }

    /// Re-parse a stored container against its stored password. Unlike
    /// import, this is a hard probe: every defect is reported.
    pub fn verify(&self, id: u64) -> Result<NaiveDate, CertificateError> {
        let record = self.get(id).ok_or(CertificateError::NotFound(id))?;
        extract_expiry(&record.pkcs12, &record.password)
    }

    /// Grade every active certificate by days to expiry, auto-deactivating
    /// the expired ones. Records without a known expiry are skipped.
    pub fn sweep_expiry(&self, today: NaiveDate) -> Vec<ExpiryAlert> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let mut alerts = Vec::new();
        for record in inner.records.iter_mut() {
            if !record.is_active {
                continue;
            }
            let Some(expiry_date) = record.expiry_date else {
                continue;
            };
            let days_to_expiry = (expiry_date - today).num_days();
            let Some(grade) = ExpiryGrade::classify(days_to_expiry) else {
                continue;
            };
            if grade == ExpiryGrade::Expired {
                record.is_active = false;
                tracing::warn!(
                    certificate_id = record.id,
                    tenant = %record.tenant,
                    %expiry_date,
                    "expired certificate deactivated"
                );
            }
            alerts.push(ExpiryAlert {
                certificate_id: record.id,
                tenant: record.tenant.clone(),
                name: record.name.clone(),
                expiry_date,
                days_to_expiry,
                grade,
            });
        }
        alerts
    }
}
