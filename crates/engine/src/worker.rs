//! Batch processing worker.
//!
//! A worker owns one queue consumer and runs a single-threaded loop: poll
//! with a short deadline, coalesce messages into a batch, and process when
//! the batch fills or its timer expires. Acknowledgement is driven by the
//! durable outcome in the state store, never by local success of one step:
//! per-entry ledger verdicts (including rejections) are terminal and ack;
//! only whole-batch failures nack, so redelivery re-enters `claim_batch`
//! and the retry cap can do its job.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use attest_core::config::WorkerConfig;
use attest_core::LogMessage;
use attest_db::models::{CompletionRecord, FailureRecord, TaskStatus};
use attest_db::StatusStore;
use attest_ledger::{EntryOutcome, LedgerClient, LedgerError, LogEntry};
use attest_queue::{AckHandle, Consumer, QueueError};

/// How long one consume poll may block, so the loop stays responsive to
/// the batch timer and to cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct Worker {
    id: usize,
    cfg: WorkerConfig,
    store: Arc<dyn StatusStore>,
    ledger: Arc<dyn LedgerClient>,
    consumer: Box<dyn Consumer>,
}

impl Worker {
    pub fn new(
        id: usize,
        cfg: WorkerConfig,
        store: Arc<dyn StatusStore>,
        ledger: Arc<dyn LedgerClient>,
        consumer: Box<dyn Consumer>,
    ) -> Self {
        Self {
            id,
            cfg,
            store,
            ledger,
            consumer,
        }
    }

    /// Run until cancelled. In-flight messages held at cancellation time
    /// are abandoned so the queue redelivers them.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            worker = self.id,
            batch_size = self.cfg.batch_size,
            batch_timeout_ms = self.cfg.batch_timeout.as_millis() as u64,
            "Worker started"
        );

        let mut pending: Vec<(LogMessage, AckHandle)> = Vec::with_capacity(self.cfg.batch_size);
        let mut batch_deadline: Option<Instant> = None;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let poll = match batch_deadline {
                Some(deadline) => deadline
                    .saturating_duration_since(Instant::now())
                    .min(POLL_INTERVAL),
                None => POLL_INTERVAL,
            };

            match tokio::time::timeout(poll, self.consumer.consume(&cancel)).await {
                // Poll deadline: fall through to the batch checks.
                Err(_elapsed) => {}
                Ok(Ok((message, ack))) => {
                    if pending.is_empty() {
                        batch_deadline = Some(Instant::now() + self.cfg.batch_timeout);
                    }
                    pending.push((message, ack));
                }
                Ok(Err(QueueError::Cancelled)) => break,
                Ok(Err(QueueError::Deserialize(e))) => {
                    // Offset already committed by the consumer; count and go on.
                    tracing::warn!(worker = self.id, error = %e, "Skipped undecodable message");
                }
                Ok(Err(e)) => {
                    tracing::error!(worker = self.id, error = %e, "Consumer error");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.cfg.consumer_retry_delay) => {}
                    }
                }
            }

            let timer_expired = batch_deadline.is_some_and(|d| Instant::now() >= d);
            if pending.len() >= self.cfg.batch_size || (timer_expired && !pending.is_empty()) {
                let batch = std::mem::take(&mut pending);
                batch_deadline = None;
                self.process_batch(batch).await;
            }
        }

        if !pending.is_empty() {
            tracing::info!(
                worker = self.id,
                pending = pending.len(),
                "Abandoning in-flight messages for redelivery"
            );
            for (_message, ack) in pending {
                ack.abandon();
            }
        }
        self.consumer.close();
        tracing::info!(worker = self.id, "Worker stopped");
    }

    /// Drive one batch through claim -> ledger -> terminal transition, then
    /// acknowledge the queue according to the durable outcome.
    async fn process_batch(&self, batch: Vec<(LogMessage, AckHandle)>) {
        let batch_start = Instant::now();
        let batch_size = batch.len();

        // Empty request ids are unprocessable; their acks ride along with
        // the batch outcome (commits are cumulative per partition, so a
        // lone early commit could acknowledge in-flight neighbours).
        let mut messages = Vec::with_capacity(batch.len());
        let mut acks = Vec::with_capacity(batch.len());
        for (message, ack) in batch {
            if message.request_id.is_empty() {
                tracing::warn!(worker = self.id, "Message with empty request_id in batch");
                acks.push(ack);
                continue;
            }
            messages.push(message);
            acks.push(ack);
        }
        if messages.is_empty() {
            for ack in acks {
                ack.commit();
            }
            return;
        }
        let request_ids: Vec<String> = messages.iter().map(|m| m.request_id.clone()).collect();

        // --- 1. Claim rows, enforcing the retry cap ---
        let claim_start = Instant::now();
        let claimed = match self
            .store
            .claim_batch(&request_ids, self.cfg.max_task_retries)
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::error!(worker = self.id, error = %e, "claim_batch failed, nacking batch");
                for ack in acks {
                    ack.abandon();
                }
                return;
            }
        };
        let claim_duration = claim_start.elapsed();

        // --- 2. Build ledger entries for the claimed PROCESSING rows ---
        // Content, org, and timestamp come from the message: the state row
        // does not store the content. Rows returned as FAILED (retry cap)
        // are already durably terminal and only need the ack.
        let mut entries = Vec::new();
        let mut processing_ids = Vec::new();
        for message in &messages {
            if let Some(row) = claimed.get(&message.request_id) {
                if row.status == TaskStatus::Processing {
                    processing_ids.push(message.request_id.clone());
                    entries.push(LogEntry {
                        log_hash: message.log_hash.clone(),
                        log_content: message.log_content.clone(),
                        sender_org_id: message.source_org_id.clone(),
                        timestamp: message.received_timestamp.clone(),
                    });
                }
            }
        }

        if entries.is_empty() {
            // Everything was a duplicate delivery or force-failed: all
            // outcomes are already durable.
            for ack in acks {
                ack.commit();
            }
            return;
        }

        // --- 3. Submit to the ledger, bounded by the ledger timeout ---
        let ledger_start = Instant::now();
        let submitted = match tokio::time::timeout(
            self.cfg.ledger_timeout,
            self.ledger.submit_batch(&entries),
        )
        .await
        {
            Err(_elapsed) => Err(LedgerError::Timeout),
            Ok(result) => result,
        };
        let ledger_duration = ledger_start.elapsed();

        let (proof, outcomes) = match submitted {
            Ok(ok) => ok,
            Err(e) => {
                // Whole-batch failure: record it, keep the rows PROCESSING,
                // and nack so redelivery re-enters claim_batch.
                tracing::error!(worker = self.id, error = %e, "Ledger batch failed");
                if let Err(mark_err) = self
                    .store
                    .mark_for_retry(&processing_ids, &e.to_string())
                    .await
                {
                    tracing::error!(
                        worker = self.id,
                        error = %mark_err,
                        "CRITICAL: mark_for_retry failed"
                    );
                }
                for ack in acks {
                    ack.abandon();
                }
                return;
            }
        };

        // --- 4. Reconcile per-entry verdicts into terminal transitions ---
        // Outcomes are matched by log_hash; occurrences pair up in order,
        // which keeps same-hash entries within one batch distinct.
        let mut by_hash: HashMap<&str, VecDeque<&EntryOutcome>> = HashMap::new();
        for outcome in &outcomes {
            by_hash
                .entry(outcome.log_hash.as_str())
                .or_default()
                .push_back(outcome);
        }

        let mut completions = Vec::new();
        let mut failures = Vec::new();
        for (request_id, entry) in processing_ids.iter().zip(&entries) {
            match by_hash
                .get_mut(entry.log_hash.as_str())
                .and_then(VecDeque::pop_front)
            {
                None => failures.push(FailureRecord {
                    request_id: request_id.clone(),
                    error_message: format!(
                        "missing result for log_hash {} (tx {})",
                        entry.log_hash, proof.transaction_id
                    ),
                }),
                Some(outcome) if outcome.status.is_success() => {
                    completions.push(CompletionRecord {
                        request_id: request_id.clone(),
                        tx_hash: proof.transaction_id.clone(),
                        log_hash_on_chain: outcome.log_hash.clone(),
                        block_height: proof.block_height,
                    });
                }
                Some(outcome) => failures.push(FailureRecord {
                    request_id: request_id.clone(),
                    error_message: format!(
                        "Contract failed: {} - {}",
                        outcome.status, outcome.message
                    ),
                }),
            }
        }

        let update_start = Instant::now();
        let mut update_failed = false;
        if !completions.is_empty() {
            if let Err(e) = self.store.mark_completed_batch(&completions).await {
                tracing::error!(worker = self.id, error = %e, "Completion update failed");
                update_failed = true;
            }
        }
        if !failures.is_empty() {
            if let Err(e) = self.store.mark_failed_batch(&failures).await {
                tracing::error!(worker = self.id, error = %e, "Failure update failed");
                update_failed = true;
            }
        }
        let update_duration = update_start.elapsed();

        // --- 5. Acknowledge ---
        // The transaction is on-chain either way; but the ack may only be
        // issued once the terminal transitions are durable. Both mark
        // operations are idempotent, so redelivery after a failed update
        // finishes the resolution without double effects.
        if update_failed {
            for ack in acks {
                ack.abandon();
            }
        } else {
            for ack in acks {
                ack.commit();
            }
        }

        tracing::info!(
            worker = self.id,
            size = batch_size,
            valid = processing_ids.len(),
            completions = completions.len(),
            failures = failures.len(),
            claim_ms = claim_duration.as_millis() as u64,
            ledger_ms = ledger_duration.as_millis() as u64,
            update_ms = update_duration.as_millis() as u64,
            total_ms = batch_start.elapsed().as_millis() as u64,
            "Batch processed"
        );
    }
}
