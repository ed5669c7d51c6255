//! Core toolkit for Ethiopian EIMS e-invoicing (signed login, canonical
//! payloads, certificate store, submission engine, retry sweeps).
//!
//! # Examples
//! ```rust
//! use serde_json::json;
//! use eims_core::canonical::canonical_json;
//!
//! let bytes = canonical_json(&json!({"tin": "0062192232", "apikey": "k"}))?;
//! assert_eq!(bytes, br#"{"apikey":"k","tin":"0062192232"}"#);
//! # Ok::<(), eims_core::canonical::EncodingError>(())
//! ```
pub mod auth;
pub mod canonical;
pub mod certificate;
pub mod config;
pub mod engine;
pub mod invoice;
pub mod log;
pub mod qr;
pub mod retry;
pub mod sign;

use thiserror::Error;

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Encoding(#[from] canonical::EncodingError),
    #[error(transparent)]
    Key(#[from] sign::KeyError),
    #[error(transparent)]
    Auth(#[from] auth::AuthError),
    #[error(transparent)]
    Certificate(#[from] certificate::CertificateError),
    #[error(transparent)]
    State(#[from] invoice::StateError),
    #[error(transparent)]
    Submit(#[from] engine::SubmitError),
    #[error(transparent)]
    Qr(#[from] qr::QrError),
}
