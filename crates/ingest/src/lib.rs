//! Ingestion stage: receipt service, batcher, and HTTP surface.
//!
//! A submission flows through [`service::ReceiptService`] (validate,
//! fingerprint, assign a request id, return the receipt) into the
//! [`batcher::Batcher`], which commits accepted records in batches to the
//! state store and the queue — rows first, messages second.

pub mod batcher;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod service;
pub mod state;

pub use batcher::{Batcher, BatcherTasks, PendingRecord};
pub use error::{AppError, AppResult};
pub use service::{Receipt, ReceiptService, SubmitInput};
pub use state::AppState;
