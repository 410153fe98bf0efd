//! Receipt service: the synchronous half of ingestion.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use attest_core::fingerprint::sha256_hex;
use attest_core::{CoreError, LogMessage};

use crate::batcher::{Batcher, PendingRecord};

/// A log submission after HTTP/RPC decoding.
#[derive(Debug, Clone, Default)]
pub struct SubmitInput {
    pub log_content: String,
    pub client_log_hash: Option<String>,
    pub client_source_org_id: Option<String>,
    pub client_timestamp: Option<DateTime<Utc>>,
}

/// The synchronous acknowledgement returned to the submitter.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub request_id: String,
    pub server_log_hash: String,
    pub server_received_timestamp: DateTime<Utc>,
}

/// Validates submissions and hands accepted records to the batcher.
///
/// The receipt is a promise that the record is accepted, not that it is
/// already durable: the batcher commits it (row first, queue message
/// second) before any downstream consumer can observe it.
pub struct ReceiptService {
    batcher: Arc<Batcher>,
}

impl ReceiptService {
    pub fn new(batcher: Arc<Batcher>) -> Self {
        Self { batcher }
    }

    /// Accept one submission. Does not wait for the batch flush.
    pub fn submit(&self, input: SubmitInput) -> Result<Receipt, CoreError> {
        if input.log_content.is_empty() {
            return Err(CoreError::EmptyContent);
        }

        let server_log_hash = sha256_hex(input.log_content.as_bytes());
        if let Some(client_hash) = &input.client_log_hash {
            if !client_hash.is_empty() && *client_hash != server_log_hash {
                return Err(CoreError::HashMismatch {
                    client: client_hash.clone(),
                    server: server_log_hash,
                });
            }
        }

        let server_received_timestamp = Utc::now();
        // The record keeps the client's wall clock when one was supplied;
        // the receipt always reports the server's.
        let received_timestamp = input
            .client_timestamp
            .unwrap_or(server_received_timestamp);

        let request_id = uuid::Uuid::new_v4().to_string();
        let message = LogMessage {
            request_id: request_id.clone(),
            log_content: input.log_content,
            log_hash: server_log_hash.clone(),
            source_org_id: input.client_source_org_id.unwrap_or_default(),
            received_timestamp: received_timestamp.timestamp().to_string(),
        };

        self.batcher.submit(PendingRecord {
            message,
            received_timestamp,
        });

        Ok(Receipt {
            request_id,
            server_log_hash,
            server_received_timestamp,
        })
    }
}
