//! Processing stage: worker pool and supervisor.
//!
//! Workers drain the queue in batches and drive each batch through
//! claim -> ledger -> terminal transition -> acknowledgement. The
//! supervisor wires both pipeline stages together and sequences graceful
//! shutdown.

pub mod supervisor;
pub mod worker;

pub use supervisor::{PipelineConfig, Supervisor};
pub use worker::Worker;
