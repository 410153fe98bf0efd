//! Pipeline supervisor.
//!
//! Owns the lifetimes: builds the queue broker, the ingestion batcher and
//! receipt service, and the worker pool; propagates cancellation; and
//! sequences graceful shutdown (workers first, then the batcher's final
//! flush, then the long-lived clients in reverse dependency order).

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use attest_core::config::{BatcherConfig, QueueConfig, WorkerConfig};
use attest_db::StatusStore;
use attest_ingest::{AppState, Batcher, BatcherTasks, ReceiptService};
use attest_ledger::LedgerClient;
use attest_queue::{Broker, Consumer, Producer};

use crate::worker::Worker;

/// Everything the supervisor needs to wire the two stages together.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub queue: QueueConfig,
    pub batcher: BatcherConfig,
    pub worker: WorkerConfig,
}

pub struct Supervisor {
    cancel: CancellationToken,
    broker: Arc<Broker>,
    producer: Arc<dyn Producer>,
    ledger: Arc<dyn LedgerClient>,
    worker_handles: Vec<JoinHandle<()>>,
    batcher_tasks: BatcherTasks,
}

impl Supervisor {
    /// Construct and start the whole pipeline. Returns the supervisor and
    /// the HTTP application state for the ingestion surface.
    pub fn start(
        cfg: PipelineConfig,
        store: Arc<dyn StatusStore>,
        ledger: Arc<dyn LedgerClient>,
        cancel: CancellationToken,
    ) -> (Self, AppState) {
        let broker = Broker::from_config(&cfg.queue);
        let producer: Arc<dyn Producer> = Arc::new(broker.producer());

        // One consumer per worker; partitions split statically across them.
        let consumers = broker.consumers(cfg.worker.concurrency, cfg.queue.auto_offset_reset);
        tracing::info!(
            workers = cfg.worker.concurrency,
            partitions = broker.partition_count(),
            "Starting worker pool"
        );

        let mut worker_handles = Vec::with_capacity(consumers.len());
        for (i, consumer) in consumers.into_iter().enumerate() {
            let worker = Worker::new(
                i + 1,
                cfg.worker.clone(),
                Arc::clone(&store),
                Arc::clone(&ledger),
                Box::new(consumer) as Box<dyn Consumer>,
            );
            worker_handles.push(tokio::spawn(worker.run(cancel.clone())));
        }

        let (batcher, batcher_tasks) = Batcher::start(
            cfg.batcher,
            Arc::clone(&store),
            Arc::clone(&producer),
            cancel.clone(),
        );

        let state = AppState {
            service: Arc::new(ReceiptService::new(batcher)),
            store,
        };

        (
            Self {
                cancel,
                broker,
                producer,
                ledger,
                worker_handles,
                batcher_tasks,
            },
            state,
        )
    }

    /// The underlying broker. Used by tests and operational inspection.
    pub fn broker(&self) -> Arc<Broker> {
        Arc::clone(&self.broker)
    }

    /// Cancel the root token and wait for an orderly stop: each worker
    /// finishes its current batch, the batcher drains and final-flushes,
    /// then the clients close in reverse dependency order.
    pub async fn shutdown(self) {
        self.cancel.cancel();

        for (i, handle) in self.worker_handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                tracing::error!(worker = i + 1, error = %e, "Worker task failed");
            }
        }
        tracing::info!("Worker pool stopped");

        if let Err(e) = self.batcher_tasks.timer.await {
            tracing::error!(error = %e, "Batch timer task failed");
        }
        if let Err(e) = self.batcher_tasks.flusher.await {
            tracing::error!(error = %e, "Flush worker task failed");
        }
        tracing::info!("Ingestion batcher stopped");

        self.ledger.close().await;
        self.producer.close();
        tracing::info!("Pipeline shut down");
    }
}
