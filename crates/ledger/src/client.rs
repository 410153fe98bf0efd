//! The ledger client seam.

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::types::{AuditData, BatchProof, EntryOutcome, LogEntry};

/// Capability set of a ledger client.
///
/// `submit_batch` carries N entries in a single transaction and returns a
/// per-entry verdict vector of the same length, matched by `log_hash`. Any
/// `Err` is a whole-batch failure: the caller retries everything.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn submit_batch(
        &self,
        entries: &[LogEntry],
    ) -> Result<(BatchProof, Vec<EntryOutcome>), LedgerError>;

    /// Query the notarization record for a content fingerprint.
    async fn find_by_hash(&self, log_hash: &str) -> Result<String, LedgerError>;

    /// On-chain public audit: read the notarization data out of a
    /// transaction by its hash.
    async fn get_by_tx(&self, tx_hash: &str) -> Result<AuditData, LedgerError>;

    /// Release the client's resources.
    async fn close(&self);
}
