use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use eims_core::canonical::canonical_json;
use eims_core::certificate::CertificateStore;
use eims_core::config::EimsConfig;
use eims_core::engine::{SubmissionEngine, SubmitOutcome};
use eims_core::invoice::Invoice;
use eims_core::log::LogStore;
use eims_core::qr::NoopQrRenderer;
use eims_core::sign::sign_sha512;

#[derive(Parser)]
#[command(name = "eims")]
#[command(about = "Ethiopian EIMS e-invoice submission CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one invoice through the full signed pipeline.
    Submit {
        /// JSON configuration file (credentials, endpoints, key paths).
        #[arg(long)]
        config: PathBuf,
        /// Invoice snapshot as JSON.
        #[arg(long)]
        invoice: PathBuf,
        /// PKCS#12 container for the tenant.
        #[arg(long)]
        pkcs12: PathBuf,
        #[arg(long, default_value = "")]
        pkcs12_password: String,
    },
    /// Print the leaf certificate expiry of a PKCS#12 container.
    CertExpiry {
        #[arg(long)]
        pkcs12: PathBuf,
        #[arg(long, default_value = "")]
        password: String,
    },
    /// Print the canonical signature-input bytes of a JSON document.
    Canonicalize {
        #[arg(long)]
        request: PathBuf,
    },
    /// Canonicalize and sign a JSON document, printing the base64 signature.
    SignRequest {
        #[arg(long)]
        request: PathBuf,
        #[arg(long)]
        key: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            config,
            invoice,
            pkcs12,
            pkcs12_password,
        } => {
            let config: EimsConfig = serde_json::from_str(
                &std::fs::read_to_string(&config)
                    .with_context(|| format!("reading {}", config.display()))?,
            )
            .context("parsing configuration")?;
            let mut invoice: Invoice = serde_json::from_str(
                &std::fs::read_to_string(&invoice)
                    .with_context(|| format!("reading {}", invoice.display()))?,
            )
            .context("parsing invoice")?;
            let container = std::fs::read(&pkcs12)
                .with_context(|| format!("reading {}", pkcs12.display()))?;

            let certificates = Arc::new(CertificateStore::new());
            let id = certificates.import(
                config.credentials.tin.clone(),
                pkcs12.display().to_string(),
                container,
                pkcs12_password,
                chrono::Utc::now().date_naive(),
            );
            certificates.activate(id)?;

            let engine = SubmissionEngine::new(
                config,
                certificates,
                Arc::new(LogStore::new()),
                Arc::new(NoopQrRenderer),
            )?;
            match engine.submit_invoice(&mut invoice).await? {
                SubmitOutcome::Accepted { reference_number } => {
                    println!("accepted: {reference_number}");
                }
                SubmitOutcome::Skipped(reason) => {
                    println!("skipped: {reason:?}");
                }
                SubmitOutcome::Failed(err) => {
                    anyhow::bail!("submission failed (retryable): {err}");
                }
            }
        }
        Commands::CertExpiry { pkcs12, password } => {
            let container = std::fs::read(&pkcs12)
                .with_context(|| format!("reading {}", pkcs12.display()))?;
            let expiry = eims_core::certificate::extract_expiry(&container, &password)?;
            let days = (expiry - chrono::Utc::now().date_naive()).num_days();
            match eims_core::certificate::ExpiryGrade::classify(days) {
                Some(grade) => println!("{expiry} ({days} days, {grade:?})"),
                None => println!("{expiry} ({days} days)"),
            }
        }
        Commands::Canonicalize { request } => {
            let value: serde_json::Value = serde_json::from_str(
                &std::fs::read_to_string(&request)
                    .with_context(|| format!("reading {}", request.display()))?,
            )
            .context("parsing request")?;
            let bytes = canonical_json(&value)?;
            println!("{}", String::from_utf8_lossy(&bytes));
        }
        Commands::SignRequest { request, key } => {
            let value: serde_json::Value = serde_json::from_str(
                &std::fs::read_to_string(&request)
                    .with_context(|| format!("reading {}", request.display()))?,
            )
            .context("parsing request")?;
            let key_pem =
                std::fs::read(&key).with_context(|| format!("reading {}", key.display()))?;
            let bytes = canonical_json(&value)?;
            let signature = sign_sha512(&bytes, &key_pem)?;
            println!("{signature}");
        }
    }

    Ok(())
}
