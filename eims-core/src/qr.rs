//! QR rendering seam.
//!
//! The core never renders images itself; hosts plug in a renderer for the
//! reference number returned by the authority. Rendering failures are
//! cosmetic and must not affect submission outcomes.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QrError {
    #[error("QR rendering failed: {0}")]
    Render(String),
}

/// Renders the acknowledged reference number into an image for printing.
pub trait QrRenderer: Send + Sync {
    fn render(&self, data: &str) -> Result<Vec<u8>, QrError>;
}

/// Default renderer producing no image.
#[derive(Debug, Default)]
pub struct NoopQrRenderer;

impl QrRenderer for NoopQrRenderer {
    fn render(&self, _data: &str) -> Result<Vec<u8>, QrError> {
        Ok(Vec::new())
    }
}
