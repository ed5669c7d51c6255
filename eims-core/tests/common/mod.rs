use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use httpmock::MockServer;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;

use eims_core::certificate::CertificateStore;
use eims_core::config::{Credentials, EimsConfig, PayloadDefaults};
use eims_core::engine::SubmissionEngine;
use eims_core::invoice::{
    DocumentType, Invoice, InvoiceKind, LineItem, PartyDetails, PartyKind, SubmissionState,
};
use eims_core::log::LogStore;
use eims_core::qr::NoopQrRenderer;

pub const TENANT_TIN: &str = "0062192232";

pub fn unique_temp_path(prefix: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    path.push(format!("{prefix}-{nonce}"));
    path
}

/// Write a fresh PKCS#8 RSA key and a placeholder PEM certificate to disk.
pub fn write_key_material() -> (PathBuf, PathBuf) {
    let mut rng = rand::thread_rng();
    let key_pem = RsaPrivateKey::new(&mut rng, 2048)
        .expect("generate key")
        .to_pkcs8_pem(LineEnding::LF)
        .expect("encode key")
        .to_string();
    let cert_pem = "-----BEGIN CERTIFICATE-----\nTESTCERT\n-----END CERTIFICATE-----\n";

    let key_path = unique_temp_path("eims-key");
    let cert_path = unique_temp_path("eims-cert");
    std::fs::write(&key_path, key_pem.as_bytes()).expect("write key");
    std::fs::write(&cert_path, cert_pem.as_bytes()).expect("write cert");
    (key_path, cert_path)
}

pub fn test_config(server: &MockServer, key_path: PathBuf, cert_path: PathBuf) -> EimsConfig {
    EimsConfig {
        credentials: Credentials {
            client_id: "client".into(),
            client_secret: "secret".into(),
            api_key: "apikey".into(),
            tin: TENANT_TIN.into(),
        },
        login_url: server.url("/auth/login"),
        submit_url: server.url("/v1/register"),
        private_key_path: key_path,
        certificate_path: cert_path,
        timeout_secs: 30,
        verify_tls: true,
        auto_submit: true,
        block_on_error: false,
        defaults: PayloadDefaults::default(),
    }
}

/// Engine with an active certificate for the tenant. The stored container
/// is opaque bytes: import soft-fails metadata extraction, which leaves the
/// record usable with an unknown expiry.
pub fn engine_with_certificate(config: EimsConfig) -> SubmissionEngine {
    let certificates = Arc::new(CertificateStore::new());
    let id = certificates.import(
        TENANT_TIN,
        "test",
        b"opaque-container".to_vec(),
        "pw",
        Utc::now().date_naive(),
    );
    certificates.activate(id).expect("activate");
    SubmissionEngine::new(
        config,
        certificates,
        Arc::new(LogStore::new()),
        Arc::new(NoopQrRenderer),
    )
    .expect("engine")
}

pub fn engine_without_certificate(config: EimsConfig) -> SubmissionEngine {
    SubmissionEngine::new(
        config,
        Arc::new(CertificateStore::new()),
        Arc::new(LogStore::new()),
        Arc::new(NoopQrRenderer),
    )
    .expect("engine")
}

pub fn sample_invoice(id: &str) -> Invoice {
    Invoice {
        id: id.into(),
        number: format!("INV/2026/{id}"),
        kind: InvoiceKind::CustomerInvoice,
        document_type: DocumentType::Invoice,
        issue_date: NaiveDate::from_ymd_opt(2026, 3, 14).expect("date"),
        currency: "ETB".into(),
        exchange_rate: None,
        amount_total: 1150.0,
        amount_tax: 150.0,
        reference: None,
        origin: None,
        seller: PartyDetails {
            kind: PartyKind::Business,
            tin: Some(TENANT_TIN.into()),
            legal_name: Some("Seller PLC".into()),
            ..Default::default()
        },
        buyer: PartyDetails {
            kind: PartyKind::Business,
            tin: Some("0011223344".into()),
            legal_name: Some("Buyer PLC".into()),
            ..Default::default()
        },
        lines: vec![LineItem {
            description: "Widget".into(),
            item_code: "W-1".into(),
            quantity: 10.0,
            unit: "PCS".into(),
            unit_price: 100.0,
            pre_tax_value: 1000.0,
            tax_amount: 150.0,
            total_line_amount: 1150.0,
            tax_code: None,
            nature_of_supplies: None,
            discount: 0.0,
            harmonization_code: None,
        }],
        submission: SubmissionState::default(),
    }
}
