//! In-memory ledger with full contract semantics.
//!
//! Used by the end-to-end tests and the mock deployment profile. Behaves
//! like the real contract: entries are validated independently, a
//! fingerprint can be notarized at most once, and the whole batch shares
//! one transaction id and block height. Transport failures are injected
//! per call via [`MockLedgerClient::fail_times`]. All state lives in the
//! instance; seed data is passed to the constructor.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::LedgerClient;
use crate::error::LedgerError;
use crate::types::{AuditData, BatchProof, EntryOutcome, LedgerVerdict, LogEntry};

#[derive(Default)]
struct MockState {
    /// Notarized fingerprints and the audit data recorded for them.
    notarized: HashMap<String, AuditData>,
    /// Transaction id -> audit data of the entries it carried.
    transactions: HashMap<String, Vec<AuditData>>,
    tx_counter: u64,
    block_height: u64,
    fail_remaining: usize,
}

#[derive(Default)]
pub struct MockLedgerClient {
    state: Mutex<MockState>,
}

impl MockLedgerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger that already holds the given fingerprints, as if a prior
    /// submitter had notarized them.
    pub fn with_seed(hashes: impl IntoIterator<Item = String>) -> Self {
        let client = Self::new();
        {
            let mut state = client.state.lock().unwrap();
            for hash in hashes {
                state.notarized.insert(
                    hash.clone(),
                    AuditData {
                        log_hash: hash,
                        submitter_org_id: "seed-org".to_string(),
                        timestamp: "0".to_string(),
                    },
                );
            }
        }
        client
    }

    /// Make the next `n` `submit_batch` calls fail at the transport level.
    pub fn fail_times(&self, n: usize) {
        self.state.lock().unwrap().fail_remaining = n;
    }

    /// Number of fingerprints notarized so far. Test helper.
    pub fn notarized_count(&self) -> usize {
        self.state.lock().unwrap().notarized.len()
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn submit_batch(
        &self,
        entries: &[LogEntry],
    ) -> Result<(BatchProof, Vec<EntryOutcome>), LedgerError> {
        if entries.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(LedgerError::Unavailable(
                "injected transport failure".to_string(),
            ));
        }

        state.tx_counter += 1;
        state.block_height += 1;
        let proof = BatchProof {
            transaction_id: format!("mock-tx-{:016x}", state.tx_counter),
            block_height: state.block_height,
        };

        let mut outcomes = Vec::with_capacity(entries.len());
        let mut carried = Vec::new();
        for entry in entries {
            let outcome = if entry.log_content.is_empty() {
                EntryOutcome {
                    log_hash: entry.log_hash.clone(),
                    status: LedgerVerdict::ErrorValidation,
                    message: "log content is empty".to_string(),
                }
            } else if state.notarized.contains_key(&entry.log_hash) {
                EntryOutcome {
                    log_hash: entry.log_hash.clone(),
                    status: LedgerVerdict::SkippedDuplicate,
                    message: format!("Skipped duplicate log hash: {}", entry.log_hash),
                }
            } else {
                let audit = AuditData {
                    log_hash: entry.log_hash.clone(),
                    submitter_org_id: entry.sender_org_id.clone(),
                    timestamp: entry.timestamp.clone(),
                };
                state.notarized.insert(entry.log_hash.clone(), audit.clone());
                carried.push(audit);
                EntryOutcome {
                    log_hash: entry.log_hash.clone(),
                    status: LedgerVerdict::Success,
                    message: String::new(),
                }
            };
            outcomes.push(outcome);
        }

        state
            .transactions
            .insert(proof.transaction_id.clone(), carried);
        Ok((proof, outcomes))
    }

    async fn find_by_hash(&self, log_hash: &str) -> Result<String, LedgerError> {
        let state = self.state.lock().unwrap();
        match state.notarized.get(log_hash) {
            Some(audit) => Ok(serde_json::to_string(audit)?),
            None => Err(LedgerError::Contract {
                code: 1,
                message: format!("log hash not found: {log_hash}"),
            }),
        }
    }

    async fn get_by_tx(&self, tx_hash: &str) -> Result<AuditData, LedgerError> {
        if tx_hash.is_empty() {
            return Err(LedgerError::EmptyTxHash);
        }
        let state = self.state.lock().unwrap();
        state
            .transactions
            .get(tx_hash)
            .and_then(|entries| entries.first())
            .cloned()
            .ok_or_else(|| LedgerError::Contract {
                code: 1,
                message: format!("transaction not found: {tx_hash}"),
            })
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: &str, content: &str) -> LogEntry {
        LogEntry {
            log_hash: hash.to_string(),
            log_content: content.to_string(),
            sender_org_id: "org-1".to_string(),
            timestamp: "1700000000".to_string(),
        }
    }

    #[tokio::test]
    async fn first_submission_succeeds_second_is_skipped() {
        let ledger = MockLedgerClient::new();

        let (proof1, outcomes1) = ledger.submit_batch(&[entry("h1", "a")]).await.unwrap();
        assert!(outcomes1[0].status.is_success());
        assert!(proof1.block_height > 0);

        let (proof2, outcomes2) = ledger.submit_batch(&[entry("h1", "a")]).await.unwrap();
        assert_eq!(outcomes2[0].status, LedgerVerdict::SkippedDuplicate);
        assert!(outcomes2[0].message.contains("Skipped duplicate log hash"));
        assert_ne!(proof1.transaction_id, proof2.transaction_id);
    }

    #[tokio::test]
    async fn result_vector_matches_entries_in_length_and_order() {
        let ledger = MockLedgerClient::new();
        let entries = vec![entry("h1", "a"), entry("h2", ""), entry("h3", "c")];
        let (_proof, outcomes) = ledger.submit_batch(&entries).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].log_hash, "h1");
        assert!(outcomes[0].status.is_success());
        assert_eq!(outcomes[1].status, LedgerVerdict::ErrorValidation);
        assert!(outcomes[2].status.is_success());
    }

    #[tokio::test]
    async fn injected_failures_burn_down_then_recover() {
        let ledger = MockLedgerClient::new();
        ledger.fail_times(2);

        assert!(ledger.submit_batch(&[entry("h1", "a")]).await.is_err());
        assert!(ledger.submit_batch(&[entry("h1", "a")]).await.is_err());
        let (_, outcomes) = ledger.submit_batch(&[entry("h1", "a")]).await.unwrap();
        assert!(outcomes[0].status.is_success());
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let ledger = MockLedgerClient::new();
        assert!(matches!(
            ledger.submit_batch(&[]).await,
            Err(LedgerError::EmptyBatch)
        ));
    }

    #[tokio::test]
    async fn seeded_hashes_are_duplicates_from_the_start() {
        let ledger = MockLedgerClient::with_seed(["h1".to_string()]);
        let (_, outcomes) = ledger.submit_batch(&[entry("h1", "a")]).await.unwrap();
        assert_eq!(outcomes[0].status, LedgerVerdict::SkippedDuplicate);
    }

    #[tokio::test]
    async fn audit_queries_round_trip() {
        let ledger = MockLedgerClient::new();
        let (proof, _) = ledger.submit_batch(&[entry("h1", "a")]).await.unwrap();

        let record = ledger.find_by_hash("h1").await.unwrap();
        assert!(record.contains("h1"));

        let audit = ledger.get_by_tx(&proof.transaction_id).await.unwrap();
        assert_eq!(audit.log_hash, "h1");
        assert_eq!(audit.submitter_org_id, "org-1");

        assert!(ledger.find_by_hash("missing").await.is_err());
        assert!(matches!(
            ledger.get_by_tx("").await,
            Err(LedgerError::EmptyTxHash)
        ));
    }
}
