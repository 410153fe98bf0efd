#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("log entry batch cannot be empty")]
    EmptyBatch,

    #[error("transaction hash cannot be empty")]
    EmptyTxHash,

    #[error("ledger request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("ledger call timed out")]
    Timeout,

    #[error("contract execution failed: {message} (code: {code})")]
    Contract { code: i64, message: String },

    #[error("failed to decode contract result: {0}")]
    Decode(#[from] serde_json::Error),

    /// Transport-level failure raised by the mock client (or any adapter
    /// without an underlying HTTP error to wrap).
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}
