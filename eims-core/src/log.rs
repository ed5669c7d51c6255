//! Append-only submission log with retention, statistics and health checks.
use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal outcome of one submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogState {
    Success,
    Failed,
}

/// One attempt record. Entries are never mutated after append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub invoice_id: String,
    pub attempted_at: DateTime<Utc>,
    pub state: LogState,
    /// Full signed envelope as sent, for audit replay.
    pub request_json: Option<Value>,
    pub response_json: Option<Value>,
    /// Absent when the attempt failed before reaching the network.
    pub http_status: Option<u16>,
    pub response_time_ms: Option<u64>,
    pub error_text: Option<String>,
    pub error_code: Option<String>,
    pub irn: Option<String>,
}

/// Aggregate statistics over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// Percentage of successful attempts; 100 when the window is empty.
    pub success_rate: f64,
    pub avg_response_time_ms: Option<f64>,
}

/// One grouped error with its occurrence count, most frequent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorGroup {
    pub message: String,
    pub count: usize,
}

const ERROR_GROUP_KEY_LEN: usize = 100;

/// In-memory attempt log shared across the engine and maintenance jobs.
#[derive(Debug, Default)]
pub struct LogStore {
    entries: RwLock<Vec<LogEntry>>,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: LogEntry) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push(entry);
    }

    pub fn entries_for(&self, invoice_id: &str) -> Vec<LogEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|e| e.invoice_id == invoice_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Purge entries older than `retention`. Returns how many were removed.
    pub fn cleanup(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let cutoff = now - retention;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|e| e.attempted_at >= cutoff);
        before - entries.len()
    }

    /// Statistics over attempts within `window` before `now`.
    pub fn stats(&self, now: DateTime<Utc>, window: Duration) -> IntegrationStats {
        let cutoff = now - window;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let recent: Vec<&LogEntry> = entries.iter().filter(|e| e.attempted_at >= cutoff).collect();

        let total = recent.len();
        let success = recent.iter().filter(|e| e.state == LogState::Success).count();
        let failed = total - success;
        let success_rate = if total == 0 {
            100.0
        } else {
            success as f64 * 100.0 / total as f64
        };
        let timings: Vec<u64> = recent.iter().filter_map(|e| e.response_time_ms).collect();
        let avg_response_time_ms = if timings.is_empty() {
            None
        } else {
            Some(timings.iter().sum::<u64>() as f64 / timings.len() as f64)
        };

        IntegrationStats {
            total,
            success,
            failed,
            success_rate,
            avg_response_time_ms,
        }
    }

    /// Group recent failures by their first error line, most frequent first.
    pub fn error_summary(&self, now: DateTime<Utc>, window: Duration) -> Vec<ErrorGroup> {
        let cutoff = now - window;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut groups: HashMap<String, usize> = HashMap::new();
        for entry in entries
            .iter()
            .filter(|e| e.state == LogState::Failed && e.attempted_at >= cutoff)
        {
            let text = entry.error_text.as_deref().unwrap_or("unknown error");
            let first_line = text.lines().next().unwrap_or("unknown error");
            let key = crate::auth::truncate_body(first_line, ERROR_GROUP_KEY_LEN);
            *groups.entry(key).or_default() += 1;
        }
        let mut summary: Vec<ErrorGroup> = groups
            .into_iter()
            .map(|(message, count)| ErrorGroup { message, count })
            .collect();
        summary.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
        summary
    }

    /// Warn when the last 24 hours dip below an 80% success rate.
    pub fn health_check(&self, now: DateTime<Utc>) -> IntegrationStats {
        let stats = self.stats(now, Duration::hours(24));
        if stats.total > 0 && stats.success_rate < 80.0 {
            tracing::warn!(
                success_rate = stats.success_rate,
                total = stats.total,
                failed = stats.failed,
                "submission success rate degraded over the last 24h"
            );
        }
        stats
    }
}
