#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("log_content cannot be empty")]
    EmptyContent,

    #[error("client provided hash '{client}' does not match server calculated hash '{server}'")]
    HashMismatch { client: String, server: String },

    #[error("Internal error: {0}")]
    Internal(String),
}
