//! In-memory implementation of [`StatusStore`].
//!
//! Applies exactly the same transition rules as the PostgreSQL store and is
//! used by the end-to-end pipeline tests and the mock deployment profile.
//! All lifecycle state lives inside the instance; there are no globals.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{CompletionRecord, FailureRecord, LogStatusRow, NewLogStatus, TaskStatus};
use crate::store::{StatusStore, StoreError, MAX_RETRIES_EXCEEDED};

/// Mutex-guarded map keyed by `request_id`.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, LogStatusRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held. Test helper.
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn insert_batch(&self, rows: &[NewLogStatus]) -> Result<(), StoreError> {
        let mut guard = self.rows.lock().unwrap();
        for new in rows {
            // Same semantics as ON CONFLICT DO NOTHING.
            if guard.contains_key(&new.request_id) {
                continue;
            }
            guard.insert(
                new.request_id.clone(),
                LogStatusRow {
                    request_id: new.request_id.clone(),
                    log_hash: new.log_hash.clone(),
                    source_org_id: new.source_org_id.clone(),
                    received_timestamp: new.received_timestamp,
                    status: TaskStatus::Received,
                    received_at_db: Utc::now(),
                    processing_started_at: None,
                    processing_finished_at: None,
                    tx_hash: None,
                    block_height: None,
                    log_hash_on_chain: None,
                    error_message: None,
                    retry_count: 0,
                },
            );
        }
        Ok(())
    }

    async fn claim_batch(
        &self,
        request_ids: &[String],
        max_retries: i32,
    ) -> Result<HashMap<String, LogStatusRow>, StoreError> {
        let mut guard = self.rows.lock().unwrap();
        let mut result = HashMap::new();

        for id in request_ids {
            let Some(row) = guard.get_mut(id) else {
                continue;
            };
            match row.status {
                TaskStatus::Completed => continue,
                TaskStatus::Failed => continue,
                TaskStatus::Received | TaskStatus::Processing => {
                    if row.retry_count >= max_retries {
                        row.status = TaskStatus::Failed;
                        row.error_message = Some(MAX_RETRIES_EXCEEDED.to_string());
                        row.processing_finished_at = Some(Utc::now());
                    } else {
                        row.status = TaskStatus::Processing;
                        row.retry_count += 1;
                        row.processing_started_at = Some(Utc::now());
                    }
                    result.insert(id.clone(), row.clone());
                }
            }
        }
        Ok(result)
    }

    async fn mark_completed_batch(
        &self,
        completions: &[CompletionRecord],
    ) -> Result<(), StoreError> {
        let mut guard = self.rows.lock().unwrap();
        for c in completions {
            let Some(row) = guard.get_mut(&c.request_id) else {
                continue;
            };
            if row.status != TaskStatus::Processing {
                continue;
            }
            row.status = TaskStatus::Completed;
            row.tx_hash = Some(c.tx_hash.clone());
            row.log_hash_on_chain = Some(c.log_hash_on_chain.clone());
            row.block_height = Some(c.block_height as i64);
            row.processing_finished_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_failed_batch(&self, failures: &[FailureRecord]) -> Result<(), StoreError> {
        let mut guard = self.rows.lock().unwrap();
        for f in failures {
            let Some(row) = guard.get_mut(&f.request_id) else {
                continue;
            };
            if row.status.is_terminal() {
                continue;
            }
            row.status = TaskStatus::Failed;
            row.error_message = Some(f.error_message.clone());
            row.processing_finished_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_for_retry(
        &self,
        request_ids: &[String],
        error_message: &str,
    ) -> Result<(), StoreError> {
        let mut guard = self.rows.lock().unwrap();
        for id in request_ids {
            let Some(row) = guard.get_mut(id) else {
                continue;
            };
            if row.status == TaskStatus::Processing {
                row.error_message = Some(error_message.to_string());
            }
        }
        Ok(())
    }

    async fn find_by_request_id(
        &self,
        request_id: &str,
    ) -> Result<Option<LogStatusRow>, StoreError> {
        Ok(self.rows.lock().unwrap().get(request_id).cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
