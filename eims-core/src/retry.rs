//! Flat retry sweep over failed, never-acknowledged invoices.
use chrono::Utc;

use crate::engine::{SubmissionEngine, SubmitOutcome};
use crate::invoice::Invoice;

/// Tally of one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Left untouched because no usable certificate exists for the tenant.
    pub skipped_no_certificate: usize,
}

/// Periodic retry driver. Each invoice gets exactly one fresh attempt per
/// sweep; there is no backoff schedule, the sweep interval is the backoff.
pub struct RetryScheduler<'a> {
    engine: &'a SubmissionEngine,
}

impl<'a> RetryScheduler<'a> {
    pub fn new(engine: &'a SubmissionEngine) -> Self {
        Self { engine }
    }

    /// Re-attempt every retryable invoice in the batch.
    pub async fn sweep(&self, invoices: &mut [Invoice]) -> SweepReport {
        let today = Utc::now().date_naive();
        let mut report = SweepReport::default();

        for invoice in invoices.iter_mut() {
            if !invoice.submission.can_retry() {
                continue;
            }
            // Without a usable certificate the attempt cannot even be
            // signed off; keep the invoice failed and move on.
            let usable = self
                .engine
                .certificates()
                .active_for(self.engine.tenant())
                .map(|c| c.is_usable(today))
                .unwrap_or(false);
            if !usable {
                report.skipped_no_certificate += 1;
                tracing::debug!(invoice = %invoice.id, "retry skipped: no usable certificate");
                continue;
            }

            report.attempted += 1;
            match self.engine.submit_invoice(invoice).await {
                Ok(SubmitOutcome::Accepted { .. }) => report.succeeded += 1,
                Ok(SubmitOutcome::Failed(_)) | Err(_) => report.failed += 1,
                Ok(SubmitOutcome::Skipped(_)) => {}
            }
        }

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped_no_certificate = report.skipped_no_certificate,
            "retry sweep finished"
        );
        report
    }
}
