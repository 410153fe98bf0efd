//! PostgreSQL implementation of [`StatusStore`].
//!
//! Every primitive runs in a single transaction and takes row locks in
//! ascending `request_id` order, so two workers racing on overlapping
//! batches cannot deadlock.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{CompletionRecord, FailureRecord, LogStatusRow, NewLogStatus};
use crate::store::{StatusStore, StoreError, MAX_RETRIES_EXCEEDED};

/// Column list for `tbl_log_status` queries.
const COLUMNS: &str = "\
    request_id, log_hash, source_org_id, received_timestamp, status, \
    received_at_db, processing_started_at, processing_finished_at, \
    tx_hash, block_height, log_hash_on_chain, error_message, retry_count";

/// PostgreSQL-backed state store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Sorted, deduplicated copy of `ids` — the deterministic lock order
    /// shared by every bulk statement.
    fn lock_order(ids: &[String]) -> Vec<String> {
        let mut sorted: Vec<String> = ids.to_vec();
        sorted.sort();
        sorted.dedup();
        sorted
    }
}

#[async_trait]
impl StatusStore for PgStore {
    async fn insert_batch(&self, rows: &[NewLogStatus]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut sorted: Vec<&NewLogStatus> = rows.iter().collect();
        sorted.sort_by(|a, b| a.request_id.cmp(&b.request_id));

        let request_ids: Vec<String> = sorted.iter().map(|r| r.request_id.clone()).collect();
        let log_hashes: Vec<String> = sorted.iter().map(|r| r.log_hash.clone()).collect();
        let org_ids: Vec<String> = sorted.iter().map(|r| r.source_org_id.clone()).collect();
        let timestamps: Vec<chrono::DateTime<chrono::Utc>> =
            sorted.iter().map(|r| r.received_timestamp).collect();

        sqlx::query(
            "INSERT INTO tbl_log_status \
                 (request_id, log_hash, source_org_id, received_timestamp, status, retry_count) \
             SELECT u.request_id, u.log_hash, u.source_org_id, u.received_timestamp, 'RECEIVED', 0 \
             FROM UNNEST($1::text[], $2::text[], $3::text[], $4::timestamptz[]) \
                 AS u(request_id, log_hash, source_org_id, received_timestamp) \
             ON CONFLICT (request_id) DO NOTHING",
        )
        .bind(&request_ids)
        .bind(&log_hashes)
        .bind(&org_ids)
        .bind(&timestamps)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_batch(
        &self,
        request_ids: &[String],
        max_retries: i32,
    ) -> Result<HashMap<String, LogStatusRow>, StoreError> {
        if request_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = Self::lock_order(request_ids);

        let mut tx = self.pool.begin().await?;

        // Take the row locks up front in sorted order. Absent and COMPLETED
        // rows simply do not lock anything.
        sqlx::query(
            "SELECT request_id FROM tbl_log_status \
             WHERE request_id = ANY($1) ORDER BY request_id FOR UPDATE",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        // Rows at the cap are forced to FAILED before any ledger traffic.
        let forced_query = format!(
            "UPDATE tbl_log_status \
             SET status = 'FAILED', error_message = $2, processing_finished_at = NOW() \
             WHERE request_id = ANY($1) \
               AND retry_count >= $3 \
               AND status IN ('RECEIVED', 'PROCESSING') \
             RETURNING {COLUMNS}"
        );
        let forced = sqlx::query_as::<_, LogStatusRow>(&forced_query)
            .bind(&ids)
            .bind(MAX_RETRIES_EXCEEDED)
            .bind(max_retries)
            .fetch_all(&mut *tx)
            .await?;

        // Everything else under the cap is claimed, bumping the attempt
        // counter in the same statement.
        let claimed_query = format!(
            "UPDATE tbl_log_status \
             SET status = 'PROCESSING', retry_count = retry_count + 1, \
                 processing_started_at = NOW() \
             WHERE request_id = ANY($1) \
               AND retry_count < $2 \
               AND status IN ('RECEIVED', 'PROCESSING') \
             RETURNING {COLUMNS}"
        );
        let claimed = sqlx::query_as::<_, LogStatusRow>(&claimed_query)
            .bind(&ids)
            .bind(max_retries)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut result = HashMap::with_capacity(forced.len() + claimed.len());
        for row in forced.into_iter().chain(claimed) {
            result.insert(row.request_id.clone(), row);
        }
        Ok(result)
    }

    async fn mark_completed_batch(
        &self,
        completions: &[CompletionRecord],
    ) -> Result<(), StoreError> {
        if completions.is_empty() {
            return Ok(());
        }

        let mut sorted: Vec<&CompletionRecord> = completions.iter().collect();
        sorted.sort_by(|a, b| a.request_id.cmp(&b.request_id));

        let request_ids: Vec<String> = sorted.iter().map(|c| c.request_id.clone()).collect();
        let tx_hashes: Vec<String> = sorted.iter().map(|c| c.tx_hash.clone()).collect();
        let chain_hashes: Vec<String> =
            sorted.iter().map(|c| c.log_hash_on_chain.clone()).collect();
        let block_heights: Vec<i64> = sorted.iter().map(|c| c.block_height as i64).collect();

        sqlx::query(
            "UPDATE tbl_log_status AS t \
             SET status = 'COMPLETED', tx_hash = u.tx_hash, \
                 log_hash_on_chain = u.log_hash_on_chain, \
                 block_height = u.block_height, processing_finished_at = NOW() \
             FROM UNNEST($1::text[], $2::text[], $3::text[], $4::bigint[]) \
                 AS u(request_id, tx_hash, log_hash_on_chain, block_height) \
             WHERE t.request_id = u.request_id AND t.status = 'PROCESSING'",
        )
        .bind(&request_ids)
        .bind(&tx_hashes)
        .bind(&chain_hashes)
        .bind(&block_heights)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed_batch(&self, failures: &[FailureRecord]) -> Result<(), StoreError> {
        if failures.is_empty() {
            return Ok(());
        }

        let mut sorted: Vec<&FailureRecord> = failures.iter().collect();
        sorted.sort_by(|a, b| a.request_id.cmp(&b.request_id));

        let request_ids: Vec<String> = sorted.iter().map(|f| f.request_id.clone()).collect();
        let messages: Vec<String> = sorted.iter().map(|f| f.error_message.clone()).collect();

        sqlx::query(
            "UPDATE tbl_log_status AS t \
             SET status = 'FAILED', error_message = u.error_message, \
                 processing_finished_at = NOW() \
             FROM UNNEST($1::text[], $2::text[]) AS u(request_id, error_message) \
             WHERE t.request_id = u.request_id \
               AND t.status IN ('RECEIVED', 'PROCESSING')",
        )
        .bind(&request_ids)
        .bind(&messages)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_for_retry(
        &self,
        request_ids: &[String],
        error_message: &str,
    ) -> Result<(), StoreError> {
        if request_ids.is_empty() {
            return Ok(());
        }
        let ids = Self::lock_order(request_ids);

        sqlx::query(
            "UPDATE tbl_log_status SET error_message = $2 \
             WHERE request_id = ANY($1) AND status = 'PROCESSING'",
        )
        .bind(&ids)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_request_id(
        &self,
        request_id: &str,
    ) -> Result<Option<LogStatusRow>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM tbl_log_status WHERE request_id = $1");
        let row = sqlx::query_as::<_, LogStatusRow>(&query)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
