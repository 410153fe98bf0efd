//! The authoritative state store seam.
//!
//! Both processing stages mutate `tbl_log_status` exclusively through the
//! bulk primitives below. Each primitive is a single transaction in the
//! PostgreSQL implementation, so queue acknowledgements downstream can key
//! off the durable commit of one call.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::models::{CompletionRecord, FailureRecord, LogStatusRow, NewLogStatus};

/// Error message written to rows promoted to `FAILED` at claim time.
pub const MAX_RETRIES_EXCEEDED: &str = "max retries exceeded";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Transient failure raised by non-database implementations.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Bulk lifecycle operations on log status rows.
///
/// The ingestion batcher only calls `insert_batch`; workers call the rest.
/// Nothing else writes to the table.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Insert a batch of rows at `RECEIVED` with `retry_count = 0`.
    ///
    /// Idempotent on `request_id` conflicts so an at-least-once re-flush
    /// cannot fail the whole batch.
    async fn insert_batch(&self, rows: &[NewLogStatus]) -> Result<(), StoreError>;

    /// Atomically claim a batch of rows for processing.
    ///
    /// Per id: absent or `COMPLETED` rows are omitted from the result
    /// (duplicate-delivery signal); rows at the retry cap in `RECEIVED` or
    /// `PROCESSING` are promoted to `FAILED` with [`MAX_RETRIES_EXCEEDED`]
    /// and returned in that state; every other eligible row gets
    /// `retry_count + 1`, moves to `PROCESSING`, and is returned.
    async fn claim_batch(
        &self,
        request_ids: &[String],
        max_retries: i32,
    ) -> Result<HashMap<String, LogStatusRow>, StoreError>;

    /// Move claimed rows to `COMPLETED`, populating the ledger columns.
    /// No-op for rows not currently in `PROCESSING`.
    async fn mark_completed_batch(&self, completions: &[CompletionRecord])
        -> Result<(), StoreError>;

    /// Move rows to `FAILED` with an error message. No-op for rows already
    /// in a terminal state.
    async fn mark_failed_batch(&self, failures: &[FailureRecord]) -> Result<(), StoreError>;

    /// Record a whole-batch ledger failure without changing status: the
    /// rows stay `PROCESSING` and the redelivered messages re-enter
    /// `claim_batch`, which retries or promotes to `FAILED` at the cap.
    async fn mark_for_retry(
        &self,
        request_ids: &[String],
        error_message: &str,
    ) -> Result<(), StoreError>;

    /// Fetch a single row by request id.
    async fn find_by_request_id(&self, request_id: &str)
        -> Result<Option<LogStatusRow>, StoreError>;

    /// Cheap connectivity check for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}
