//! Wire types shared by every ledger client implementation.

use serde::{Deserialize, Serialize};

/// One log record inside the batch transaction argument.
///
/// The batch is serialized as a JSON array of these into the single
/// `logs_json` argument of the contract method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub log_hash: String,
    pub log_content: String,
    pub sender_org_id: String,
    pub timestamp: String,
}

/// Per-entry verdict returned by the contract.
///
/// The contract processes each entry independently even though the
/// transaction is all-or-nothing at the protocol level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerVerdict {
    Success,
    SkippedDuplicate,
    ErrorValidation,
    ErrorStateCheck,
    ErrorPutState,
}

impl LedgerVerdict {
    pub fn is_success(&self) -> bool {
        matches!(self, LedgerVerdict::Success)
    }
}

impl std::fmt::Display for LedgerVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LedgerVerdict::Success => "Success",
            LedgerVerdict::SkippedDuplicate => "SkippedDuplicate",
            LedgerVerdict::ErrorValidation => "ErrorValidation",
            LedgerVerdict::ErrorStateCheck => "ErrorStateCheck",
            LedgerVerdict::ErrorPutState => "ErrorPutState",
        };
        f.write_str(name)
    }
}

/// One element of the contract's result array. Matched back to state rows
/// by `log_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryOutcome {
    pub log_hash: String,
    pub status: LedgerVerdict,
    #[serde(default)]
    pub message: String,
}

/// Proof common to the whole batch transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProof {
    pub transaction_id: String,
    pub block_height: u64,
}

/// Raw notarization data read back from a transaction (on-chain audit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditData {
    pub log_hash: String,
    pub submitter_org_id: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_serializes_to_the_five_contract_strings() {
        for (verdict, expected) in [
            (LedgerVerdict::Success, "\"Success\""),
            (LedgerVerdict::SkippedDuplicate, "\"SkippedDuplicate\""),
            (LedgerVerdict::ErrorValidation, "\"ErrorValidation\""),
            (LedgerVerdict::ErrorStateCheck, "\"ErrorStateCheck\""),
            (LedgerVerdict::ErrorPutState, "\"ErrorPutState\""),
        ] {
            assert_eq!(serde_json::to_string(&verdict).unwrap(), expected);
        }
    }

    #[test]
    fn outcome_decodes_with_missing_message() {
        let outcome: EntryOutcome =
            serde_json::from_str(r#"{"log_hash": "abc", "status": "Success"}"#).unwrap();
        assert_eq!(outcome.log_hash, "abc");
        assert!(outcome.status.is_success());
        assert_eq!(outcome.message, "");
    }

    #[test]
    fn log_entry_uses_snake_case_keys() {
        let entry = LogEntry {
            log_hash: "h".to_string(),
            log_content: "c".to_string(),
            sender_org_id: "o".to_string(),
            timestamp: "1700000000".to_string(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["log_hash"], "h");
        assert_eq!(json["log_content"], "c");
        assert_eq!(json["sender_org_id"], "o");
        assert_eq!(json["timestamp"], "1700000000");
    }
}
