//! Producer seam.

use async_trait::async_trait;

use attest_core::LogMessage;

use crate::error::QueueError;

/// A queue producer. The batch variant is atomic from the caller's
/// perspective: either every message is accepted or the call fails as a
/// whole, because the caller has already persisted the matching state rows.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn publish(&self, msg: &LogMessage) -> Result<(), QueueError>;

    async fn publish_batch(&self, msgs: &[LogMessage]) -> Result<(), QueueError>;

    /// Release the producer's resources.
    fn close(&self);
}
