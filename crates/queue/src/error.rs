#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A partition hit its retained-message capacity. Batch publishes fail
    /// as a whole on this; nothing is partially appended.
    #[error("queue partition {partition} is full")]
    Full { partition: usize },

    /// The payload did not decode. The offset has already been committed
    /// so the partition is not blocked.
    #[error("message deserialization failed: {0}")]
    Deserialize(serde_json::Error),

    #[error("failed to serialize log message: {0}")]
    Serialize(serde_json::Error),

    /// The consume call was interrupted by cancellation.
    #[error("consume cancelled")]
    Cancelled,
}
