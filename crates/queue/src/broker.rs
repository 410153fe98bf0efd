//! In-process partitioned broker with manual commit and redelivery.
//!
//! Each partition is an append-only segment of retained messages with
//! three positions: `next_offset` (assigned to the next publish),
//! `committed` (everything below it is acknowledged and dropped), and a
//! delivery cursor. Committing is cumulative, like a consumer-group offset
//! commit; abandoning rewinds the delivery cursor so the message and
//! everything delivered after it come around again in order.
//!
//! Partition selection hashes the partition key, so all deliveries of one
//! `request_id` stay on one partition, and static partition assignment
//! gives every consumer a disjoint set. One `request_id` is therefore
//! observed by at most one consumer at a time.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use attest_core::config::{OffsetReset, QueueConfig};
use attest_core::LogMessage;

use crate::consumer::{AckHandle, Acker, Consumer};
use crate::error::QueueError;
use crate::producer::Producer;

struct Stored {
    offset: u64,
    payload: Vec<u8>,
}

#[derive(Default)]
struct Partition {
    /// Retained messages: committed ones are dropped from the front.
    entries: VecDeque<Stored>,
    /// entries[..delivered] are in flight (delivered, not yet committed).
    delivered: usize,
    next_offset: u64,
    committed: u64,
}

struct PartitionSlot {
    state: Mutex<Partition>,
    notify: Notify,
}

/// The shared broker. Cheap to clone via `Arc`.
pub struct Broker {
    partitions: Vec<PartitionSlot>,
    capacity: usize,
}

impl Broker {
    pub fn new(partitions: usize, capacity: usize) -> Arc<Self> {
        assert!(partitions > 0, "broker needs at least one partition");
        Arc::new(Self {
            partitions: (0..partitions)
                .map(|_| PartitionSlot {
                    state: Mutex::new(Partition::default()),
                    notify: Notify::new(),
                })
                .collect(),
            capacity,
        })
    }

    pub fn from_config(cfg: &QueueConfig) -> Arc<Self> {
        Self::new(cfg.partitions, cfg.partition_capacity)
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partition index for a key (FNV-1a).
    pub fn partition_for(&self, key: &str) -> usize {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in key.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % self.partitions.len() as u64) as usize
    }

    /// Append one payload to the partition selected by `key`.
    pub fn publish_bytes(&self, key: &str, payload: Vec<u8>) -> Result<(), QueueError> {
        let idx = self.partition_for(key);
        {
            let mut p = self.partitions[idx].state.lock().unwrap();
            if p.entries.len() >= self.capacity {
                return Err(QueueError::Full { partition: idx });
            }
            let offset = p.next_offset;
            p.next_offset += 1;
            p.entries.push_back(Stored { offset, payload });
        }
        self.partitions[idx].notify.notify_one();
        Ok(())
    }

    /// Append a batch atomically: capacity is reserved on every target
    /// partition (locked in ascending index order) before anything is
    /// appended, so a full partition fails the whole call with no partial
    /// state.
    pub fn publish_bytes_batch(
        &self,
        messages: Vec<(String, Vec<u8>)>,
    ) -> Result<(), QueueError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut grouped: BTreeMap<usize, Vec<Vec<u8>>> = BTreeMap::new();
        for (key, payload) in messages {
            grouped.entry(self.partition_for(&key)).or_default().push(payload);
        }

        let mut guards = Vec::with_capacity(grouped.len());
        for (&idx, batch) in &grouped {
            let guard = self.partitions[idx].state.lock().unwrap();
            if guard.entries.len() + batch.len() > self.capacity {
                return Err(QueueError::Full { partition: idx });
            }
            guards.push((idx, guard));
        }

        for (idx, guard) in &mut guards {
            let batch = grouped.get_mut(idx).unwrap();
            for payload in batch.drain(..) {
                let offset = guard.next_offset;
                guard.next_offset += 1;
                guard.entries.push_back(Stored { offset, payload });
            }
        }
        drop(guards);

        for &idx in grouped.keys() {
            self.partitions[idx].notify.notify_one();
        }
        Ok(())
    }

    /// Create `count` consumers with a static partition split
    /// (partition `i` goes to consumer `i % count`).
    pub fn consumers(
        self: &Arc<Self>,
        count: usize,
        reset: OffsetReset,
    ) -> Vec<BrokerConsumer> {
        assert!(count > 0, "consumer group needs at least one member");

        if reset == OffsetReset::Latest {
            for slot in &self.partitions {
                let mut p = slot.state.lock().unwrap();
                p.committed = p.next_offset;
                p.delivered = 0;
                p.entries.clear();
            }
        }

        (0..count)
            .map(|member| BrokerConsumer {
                broker: Arc::clone(self),
                assigned: (0..self.partitions.len())
                    .filter(|idx| idx % count == member)
                    .collect(),
                next_poll: 0,
            })
            .collect()
    }

    pub fn producer(self: &Arc<Self>) -> BrokerProducer {
        BrokerProducer {
            broker: Arc::clone(self),
        }
    }

    fn try_take(&self, idx: usize) -> Option<(u64, Vec<u8>)> {
        let mut p = self.partitions[idx].state.lock().unwrap();
        if p.delivered < p.entries.len() {
            let stored = &p.entries[p.delivered];
            let taken = (stored.offset, stored.payload.clone());
            p.delivered += 1;
            Some(taken)
        } else {
            None
        }
    }

    /// Cumulative commit: acknowledges every offset up to and including
    /// `offset` and drops the retained prefix.
    fn commit(&self, idx: usize, offset: u64) {
        let mut p = self.partitions[idx].state.lock().unwrap();
        let new_committed = offset + 1;
        if new_committed <= p.committed {
            return;
        }
        p.committed = new_committed;
        while p
            .entries
            .front()
            .is_some_and(|front| front.offset < new_committed)
        {
            p.entries.pop_front();
            p.delivered = p.delivered.saturating_sub(1);
        }
    }

    /// Rewind the delivery cursor to `offset` so it (and everything
    /// delivered after it) is redelivered in order.
    fn abandon(&self, idx: usize, offset: u64) {
        {
            let mut p = self.partitions[idx].state.lock().unwrap();
            if let Some(pos) = p.entries.iter().position(|s| s.offset == offset) {
                if pos < p.delivered {
                    p.delivered = pos;
                }
            }
        }
        self.partitions[idx].notify.notify_one();
    }

    /// Retained (uncommitted) message count across all partitions.
    /// Test and metrics helper.
    pub fn depth(&self) -> usize {
        self.partitions
            .iter()
            .map(|slot| slot.state.lock().unwrap().entries.len())
            .sum()
    }
}

struct PartitionAck {
    broker: Arc<Broker>,
    partition: usize,
    offset: u64,
}

impl Acker for PartitionAck {
    fn commit(self: Box<Self>) {
        self.broker.commit(self.partition, self.offset);
    }

    fn abandon(self: Box<Self>) {
        tracing::debug!(
            partition = self.partition,
            offset = self.offset,
            "Message abandoned, rewinding delivery cursor"
        );
        self.broker.abandon(self.partition, self.offset);
    }
}

/// One member of a consumer group, owning a disjoint set of partitions.
pub struct BrokerConsumer {
    broker: Arc<Broker>,
    assigned: Vec<usize>,
    next_poll: usize,
}

impl BrokerConsumer {
    pub fn assigned_partitions(&self) -> &[usize] {
        &self.assigned
    }
}

#[async_trait]
impl Consumer for BrokerConsumer {
    async fn consume(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(LogMessage, AckHandle), QueueError> {
        // More group members than partitions leaves this one idle.
        if self.assigned.is_empty() {
            cancel.cancelled().await;
            return Err(QueueError::Cancelled);
        }

        loop {
            if cancel.is_cancelled() {
                return Err(QueueError::Cancelled);
            }

            // Round-robin across assigned partitions for fairness.
            for step in 0..self.assigned.len() {
                let idx = self.assigned[(self.next_poll + step) % self.assigned.len()];
                let Some((offset, payload)) = self.broker.try_take(idx) else {
                    continue;
                };
                self.next_poll = (self.next_poll + step + 1) % self.assigned.len();

                match serde_json::from_slice::<LogMessage>(&payload) {
                    Ok(msg) => {
                        let ack = AckHandle::new(Box::new(PartitionAck {
                            broker: Arc::clone(&self.broker),
                            partition: idx,
                            offset,
                        }));
                        return Ok((msg, ack));
                    }
                    Err(e) => {
                        // Commit so the bad payload cannot block the
                        // partition, then surface the error.
                        tracing::warn!(
                            partition = idx,
                            offset,
                            error = %e,
                            "Discarding undecodable queue message"
                        );
                        self.broker.commit(idx, offset);
                        return Err(QueueError::Deserialize(e));
                    }
                }
            }

            // Nothing ready: wait for a publish on any assigned partition.
            let waiters: Vec<_> = self
                .assigned
                .iter()
                .map(|&idx| Box::pin(self.broker.partitions[idx].notify.notified()))
                .collect();
            tokio::select! {
                _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                _ = futures::future::select_all(waiters) => {}
            }
        }
    }

    fn close(&mut self) {
        tracing::debug!(partitions = ?self.assigned, "Queue consumer closed");
    }
}

/// Producer handle shared by the ingestion stage.
pub struct BrokerProducer {
    broker: Arc<Broker>,
}

#[async_trait]
impl Producer for BrokerProducer {
    async fn publish(&self, msg: &LogMessage) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(msg).map_err(QueueError::Serialize)?;
        self.broker.publish_bytes(&msg.request_id, payload)
    }

    async fn publish_batch(&self, msgs: &[LogMessage]) -> Result<(), QueueError> {
        let mut batch = Vec::with_capacity(msgs.len());
        for msg in msgs {
            let payload = serde_json::to_vec(msg).map_err(QueueError::Serialize)?;
            batch.push((msg.request_id.clone(), payload));
        }
        self.broker.publish_bytes_batch(batch)
    }

    fn close(&self) {
        tracing::debug!("Queue producer closed");
    }
}
