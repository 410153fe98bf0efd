//! Partitioned FIFO transport between the ingestion and processing stages.
//!
//! The [`Producer`] and [`Consumer`] traits are the seam the pipeline is
//! written against; [`Broker`](broker::Broker) is the in-process
//! implementation with manual commit and redelivery. Payloads are opaque
//! bytes to the broker — the consumer wrapper owns the JSON codec and the
//! rule that a malformed payload is committed rather than left to wedge
//! its partition.

pub mod broker;
pub mod consumer;
pub mod error;
pub mod producer;

pub use broker::{Broker, BrokerConsumer, BrokerProducer};
pub use consumer::{AckHandle, Acker, Consumer};
pub use error::QueueError;
pub use producer::Producer;
