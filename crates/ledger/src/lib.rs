//! Ledger client: batched notarization of log fingerprints.
//!
//! The [`LedgerClient`](client::LedgerClient) trait is the seam; the
//! [`HttpLedgerClient`](http::HttpLedgerClient) speaks to a JSON gateway in
//! front of a real ledger node, and [`MockLedgerClient`](mock::MockLedgerClient)
//! implements the contract semantics in memory for tests and the mock
//! deployment profile.

pub mod client;
pub mod error;
pub mod http;
pub mod mock;
pub mod types;

pub use client::LedgerClient;
pub use error::LedgerError;
pub use http::HttpLedgerClient;
pub use mock::MockLedgerClient;
pub use types::{AuditData, BatchProof, EntryOutcome, LedgerVerdict, LogEntry};
