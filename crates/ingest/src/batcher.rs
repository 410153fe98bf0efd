//! Ingestion batcher: commits accepted records in batches to the state
//! store and the queue.
//!
//! A mutex-guarded buffer accumulates records. A timer task flushes it
//! every `batch_timeout`; a submission that fills the buffer to
//! `batch_size` drains it immediately onto a bounded flush channel. A
//! single flush worker performs the two-step commit: bulk insert at
//! `RECEIVED` first, bulk publish second — a queue message must never
//! reference a row that does not exist yet. When the flush channel is
//! full, the drained batch goes back to the head of the buffer and the
//! next timer tick retries.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use attest_core::config::BatcherConfig;
use attest_core::LogMessage;
use attest_db::models::NewLogStatus;
use attest_db::StatusStore;
use attest_queue::Producer;

/// One accepted submission waiting for its flush.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub message: LogMessage,
    pub received_timestamp: DateTime<Utc>,
}

/// Handles for the batcher's background tasks. The supervisor awaits them
/// after cancellation; the flush worker drains its channel and performs
/// one final flush of the buffer before exiting.
pub struct BatcherTasks {
    pub timer: JoinHandle<()>,
    pub flusher: JoinHandle<()>,
}

pub struct Batcher {
    cfg: BatcherConfig,
    buffer: Mutex<Vec<PendingRecord>>,
    flush_tx: mpsc::Sender<Vec<PendingRecord>>,
}

impl Batcher {
    /// Create the batcher and spawn its timer and flush worker.
    pub fn start(
        cfg: BatcherConfig,
        store: Arc<dyn StatusStore>,
        producer: Arc<dyn Producer>,
        cancel: CancellationToken,
    ) -> (Arc<Self>, BatcherTasks) {
        let (flush_tx, flush_rx) = mpsc::channel(cfg.flush_channel_capacity);
        let batcher = Arc::new(Self {
            cfg: cfg.clone(),
            buffer: Mutex::new(Vec::with_capacity(cfg.batch_size)),
            flush_tx,
        });

        let timer = tokio::spawn(run_timer(Arc::clone(&batcher), cancel.clone()));
        let flusher = tokio::spawn(run_flusher(
            Arc::clone(&batcher),
            store,
            producer,
            flush_rx,
            cancel,
        ));

        (batcher, BatcherTasks { timer, flusher })
    }

    /// Append one record; drain the buffer onto the flush channel when it
    /// reaches `batch_size`. Never blocks on the flush itself.
    pub fn submit(&self, record: PendingRecord) {
        let drained = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.push(record);
            if buffer.len() >= self.cfg.batch_size {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };

        if let Some(batch) = drained {
            self.enqueue_or_merge_back(batch);
        }
    }

    /// Buffered record count. Test helper.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    fn flush_tick(&self) {
        let batch = {
            let mut buffer = self.buffer.lock().unwrap();
            if buffer.is_empty() {
                return;
            }
            std::mem::take(&mut *buffer)
        };
        self.enqueue_or_merge_back(batch);
    }

    /// Hand a drained batch to the flush worker, or put it back at the
    /// head of the buffer when the channel cannot take it right now.
    fn enqueue_or_merge_back(&self, batch: Vec<PendingRecord>) {
        if let Err(err) = self.flush_tx.try_send(batch) {
            tracing::warn!(
                "Flush channel unavailable, batch returns to the buffer until the next tick"
            );
            let mut returned = err.into_inner();
            let mut buffer = self.buffer.lock().unwrap();
            let tail = std::mem::take(&mut *buffer);
            returned.extend(tail);
            *buffer = returned;
        }
    }

    /// Drain whatever is left in the buffer. Used by the flush worker on
    /// shutdown, after the flush channel is empty.
    fn drain_buffer(&self) -> Vec<PendingRecord> {
        std::mem::take(&mut *self.buffer.lock().unwrap())
    }
}

async fn run_timer(batcher: Arc<Batcher>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(batcher.cfg.batch_timeout);
    // The first tick completes immediately; skip it.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Batch timer stopping");
                break;
            }
            _ = ticker.tick() => batcher.flush_tick(),
        }
    }
}

async fn run_flusher(
    batcher: Arc<Batcher>,
    store: Arc<dyn StatusStore>,
    producer: Arc<dyn Producer>,
    mut flush_rx: mpsc::Receiver<Vec<PendingRecord>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = flush_rx.recv() => match received {
                Some(batch) => flush_batch(&store, &producer, &batcher.cfg, batch).await,
                None => return,
            }
        }
    }

    // Shutdown: drain queued batches, then whatever is still buffered.
    while let Ok(batch) = flush_rx.try_recv() {
        flush_batch(&store, &producer, &batcher.cfg, batch).await;
    }
    let remaining = batcher.drain_buffer();
    if !remaining.is_empty() {
        tracing::info!(records = remaining.len(), "Final flush on shutdown");
        flush_batch(&store, &producer, &batcher.cfg, remaining).await;
    }
}

/// The two-step commit for one batch. Each step retries with doubling
/// backoff up to `flush_retry_limit` attempts before surrendering.
async fn flush_batch(
    store: &Arc<dyn StatusStore>,
    producer: &Arc<dyn Producer>,
    cfg: &BatcherConfig,
    batch: Vec<PendingRecord>,
) {
    let started = Instant::now();
    let rows: Vec<NewLogStatus> = batch
        .iter()
        .map(|record| NewLogStatus {
            request_id: record.message.request_id.clone(),
            log_hash: record.message.log_hash.clone(),
            source_org_id: record.message.source_org_id.clone(),
            received_timestamp: record.received_timestamp,
        })
        .collect();
    let messages: Vec<LogMessage> = batch.iter().map(|record| record.message.clone()).collect();

    // Step 1: rows become durable at RECEIVED.
    let mut attempt: u32 = 0;
    loop {
        match store.insert_batch(&rows).await {
            Ok(()) => break,
            Err(e) if attempt + 1 < cfg.flush_retry_limit => {
                attempt += 1;
                tracing::warn!(error = %e, attempt, "Batch insert failed, retrying");
                tokio::time::sleep(cfg.flush_retry_backoff * 2u32.pow(attempt - 1)).await;
            }
            Err(e) => {
                let lost: Vec<&str> =
                    rows.iter().map(|row| row.request_id.as_str()).collect();
                tracing::error!(
                    error = %e,
                    records = rows.len(),
                    request_ids = ?lost,
                    "Batch insert failed after retries, dropping batch"
                );
                return;
            }
        }
    }

    // Step 2: only now may the messages reference those rows.
    let mut attempt: u32 = 0;
    loop {
        match producer.publish_batch(&messages).await {
            Ok(()) => break,
            Err(e) if attempt + 1 < cfg.flush_retry_limit => {
                attempt += 1;
                tracing::warn!(error = %e, attempt, "Batch publish failed, retrying");
                tokio::time::sleep(cfg.flush_retry_backoff * 2u32.pow(attempt - 1)).await;
            }
            Err(e) => {
                let stranded: Vec<&str> =
                    messages.iter().map(|m| m.request_id.as_str()).collect();
                tracing::error!(
                    error = %e,
                    records = messages.len(),
                    request_ids = ?stranded,
                    "Batch publish failed after retries; rows remain RECEIVED for the sweeper"
                );
                return;
            }
        }
    }

    tracing::debug!(
        records = batch.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Batch flushed"
    );
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use attest_db::models::LogStatusRow;
    use attest_db::store::StoreError;
    use attest_db::MemoryStore;
    use attest_queue::Broker;

    use super::*;

    fn record(id: &str) -> PendingRecord {
        PendingRecord {
            message: LogMessage {
                request_id: id.to_string(),
                log_content: format!("content {id}"),
                log_hash: format!("hash-{id}"),
                source_org_id: "org-1".to_string(),
                received_timestamp: "1700000000".to_string(),
            },
            received_timestamp: Utc::now(),
        }
    }

    fn test_config(batch_size: usize, batch_timeout: Duration) -> BatcherConfig {
        BatcherConfig {
            batch_size,
            batch_timeout,
            flush_channel_capacity: 8,
            flush_retry_limit: 2,
            flush_retry_backoff: Duration::from_millis(1),
        }
    }

    async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !check() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn full_buffer_flushes_without_waiting_for_the_timer() {
        let cancel = CancellationToken::new();
        let store = Arc::new(MemoryStore::new());
        let broker = Broker::new(4, 100);
        let (batcher, _tasks) = Batcher::start(
            test_config(2, Duration::from_secs(60)),
            store.clone(),
            Arc::new(broker.producer()),
            cancel.clone(),
        );

        batcher.submit(record("r1"));
        batcher.submit(record("r2"));

        wait_for("both rows to land", || store.len() == 2).await;
        assert_eq!(broker.depth(), 2);
        cancel.cancel();
    }

    #[tokio::test]
    async fn partial_buffer_waits_for_the_timer() {
        let cancel = CancellationToken::new();
        let store = Arc::new(MemoryStore::new());
        let broker = Broker::new(4, 100);
        let (batcher, _tasks) = Batcher::start(
            test_config(100, Duration::from_millis(20)),
            store.clone(),
            Arc::new(broker.producer()),
            cancel.clone(),
        );

        batcher.submit(record("r1"));
        wait_for("the timer flush", || store.len() == 1).await;
        assert_eq!(broker.depth(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn shutdown_flushes_the_residual_buffer() {
        let cancel = CancellationToken::new();
        let store = Arc::new(MemoryStore::new());
        let broker = Broker::new(4, 100);
        let (batcher, tasks) = Batcher::start(
            test_config(100, Duration::from_secs(60)),
            store.clone(),
            Arc::new(broker.producer()),
            cancel.clone(),
        );

        for i in 0..30 {
            batcher.submit(record(&format!("r{i}")));
        }
        assert_eq!(batcher.buffered(), 30);

        cancel.cancel();
        tasks.flusher.await.unwrap();
        tasks.timer.await.unwrap();

        assert_eq!(store.len(), 30);
        assert_eq!(broker.depth(), 30);
    }

    struct FailingStore;

    #[async_trait]
    impl StatusStore for FailingStore {
        async fn insert_batch(&self, _rows: &[NewLogStatus]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("insert rejected".to_string()))
        }

        async fn claim_batch(
            &self,
            _request_ids: &[String],
            _max_retries: i32,
        ) -> Result<std::collections::HashMap<String, LogStatusRow>, StoreError> {
            unimplemented!("not used by the batcher")
        }

        async fn mark_completed_batch(
            &self,
            _completions: &[attest_db::models::CompletionRecord],
        ) -> Result<(), StoreError> {
            unimplemented!("not used by the batcher")
        }

        async fn mark_failed_batch(
            &self,
            _failures: &[attest_db::models::FailureRecord],
        ) -> Result<(), StoreError> {
            unimplemented!("not used by the batcher")
        }

        async fn mark_for_retry(
            &self,
            _request_ids: &[String],
            _error_message: &str,
        ) -> Result<(), StoreError> {
            unimplemented!("not used by the batcher")
        }

        async fn find_by_request_id(
            &self,
            _request_id: &str,
        ) -> Result<Option<LogStatusRow>, StoreError> {
            Ok(None)
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn insert_failure_never_publishes_queue_messages() {
        let cancel = CancellationToken::new();
        let broker = Broker::new(4, 100);
        let (batcher, tasks) = Batcher::start(
            test_config(1, Duration::from_secs(60)),
            Arc::new(FailingStore),
            Arc::new(broker.producer()),
            cancel.clone(),
        );

        batcher.submit(record("r1"));
        // Give the flush worker time to exhaust its retries.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(broker.depth(), 0, "no message may reference a missing row");
        cancel.cancel();
        tasks.flusher.await.unwrap();
    }

    #[tokio::test]
    async fn publish_failure_leaves_rows_received() {
        let cancel = CancellationToken::new();
        let store = Arc::new(MemoryStore::new());
        // Zero-capacity partitions: every publish fails as Full.
        let broker = Broker::new(1, 0);
        let (batcher, tasks) = Batcher::start(
            test_config(1, Duration::from_secs(60)),
            store.clone(),
            Arc::new(broker.producer()),
            cancel.clone(),
        );

        batcher.submit(record("r1"));
        wait_for("the row to land", || store.len() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(broker.depth(), 0);
        let row = store.find_by_request_id("r1").await.unwrap().unwrap();
        assert_eq!(row.status, attest_db::models::TaskStatus::Received);
        cancel.cancel();
        tasks.flusher.await.unwrap();
    }

    #[tokio::test]
    async fn slow_flushes_eventually_drain_a_full_channel() {
        struct SlowStore {
            inner: MemoryStore,
            delay: Duration,
        }

        #[async_trait]
        impl StatusStore for SlowStore {
            async fn insert_batch(&self, rows: &[NewLogStatus]) -> Result<(), StoreError> {
                tokio::time::sleep(self.delay).await;
                self.inner.insert_batch(rows).await
            }

            async fn claim_batch(
                &self,
                request_ids: &[String],
                max_retries: i32,
            ) -> Result<std::collections::HashMap<String, LogStatusRow>, StoreError> {
                self.inner.claim_batch(request_ids, max_retries).await
            }

            async fn mark_completed_batch(
                &self,
                completions: &[attest_db::models::CompletionRecord],
            ) -> Result<(), StoreError> {
                self.inner.mark_completed_batch(completions).await
            }

            async fn mark_failed_batch(
                &self,
                failures: &[attest_db::models::FailureRecord],
            ) -> Result<(), StoreError> {
                self.inner.mark_failed_batch(failures).await
            }

            async fn mark_for_retry(
                &self,
                request_ids: &[String],
                error_message: &str,
            ) -> Result<(), StoreError> {
                self.inner.mark_for_retry(request_ids, error_message).await
            }

            async fn find_by_request_id(
                &self,
                request_id: &str,
            ) -> Result<Option<LogStatusRow>, StoreError> {
                self.inner.find_by_request_id(request_id).await
            }

            async fn ping(&self) -> Result<(), StoreError> {
                self.inner.ping().await
            }
        }

        let cancel = CancellationToken::new();
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(10),
        });
        let broker = Broker::new(4, 100);
        let cfg = BatcherConfig {
            batch_size: 1,
            batch_timeout: Duration::from_millis(10),
            flush_channel_capacity: 1,
            flush_retry_limit: 2,
            flush_retry_backoff: Duration::from_millis(1),
        };
        let (batcher, _tasks) = Batcher::start(
            cfg,
            store.clone(),
            Arc::new(broker.producer()),
            cancel.clone(),
        );

        // With batch_size 1 and a capacity-1 channel, some of these drains
        // hit a full channel and merge back; the timer retries them.
        for i in 0..5 {
            batcher.submit(record(&format!("r{i}")));
        }

        wait_for("all five rows to land", || store.inner.len() == 5).await;
        assert_eq!(broker.depth(), 5);
        cancel.cancel();
    }
}
