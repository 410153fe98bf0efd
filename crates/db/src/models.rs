//! Row models and bulk-operation records for the `tbl_log_status` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle state of a log submission.
///
/// Transitions are confined to `RECEIVED -> PROCESSING -> {COMPLETED,
/// FAILED}`, plus `RECEIVED -> FAILED` when the retry cap is hit at claim
/// time. Terminal states are never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Received,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Received => "RECEIVED",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    /// Whether this state ends the lifecycle of a request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row from the `tbl_log_status` table.
///
/// The ledger columns (`tx_hash`, `block_height`, `log_hash_on_chain`) are
/// populated only when `status` is `COMPLETED`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LogStatusRow {
    pub request_id: String,
    pub log_hash: String,
    pub source_org_id: String,
    pub received_timestamp: DateTime<Utc>,
    pub status: TaskStatus,
    pub received_at_db: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_finished_at: Option<DateTime<Utc>>,
    pub tx_hash: Option<String>,
    pub block_height: Option<i64>,
    pub log_hash_on_chain: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i32,
}

/// Input for the ingestion-side bulk insert. Rows always start at
/// `RECEIVED` with a zero retry count; `received_at_db` is stamped by the
/// store.
#[derive(Debug, Clone)]
pub struct NewLogStatus {
    pub request_id: String,
    pub log_hash: String,
    pub source_org_id: String,
    pub received_timestamp: DateTime<Utc>,
}

/// One successfully notarized entry, carrying the proof of the batch
/// transaction it travelled in.
#[derive(Debug, Clone)]
pub struct CompletionRecord {
    pub request_id: String,
    pub tx_hash: String,
    pub log_hash_on_chain: String,
    pub block_height: u64,
}

/// One terminally failed entry with the message explaining why.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub request_id: String,
    pub error_message: String,
}
