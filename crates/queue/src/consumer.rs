//! Consumer seam and the acknowledgement handle.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use attest_core::LogMessage;

use crate::error::QueueError;

/// Transport-specific acknowledgement behaviour behind [`AckHandle`].
pub trait Acker: Send {
    fn commit(self: Box<Self>);
    fn abandon(self: Box<Self>);
}

/// Message-scoped acknowledgement handle.
///
/// [`commit`](AckHandle::commit) durably advances the partition offset;
/// [`abandon`](AckHandle::abandon) leaves it uncommitted so the message
/// (and everything after it in the partition) is redelivered. Exactly one
/// of the two must be called per delivery; both consume the handle.
pub struct AckHandle {
    inner: Box<dyn Acker>,
}

impl std::fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckHandle").finish_non_exhaustive()
    }
}

impl AckHandle {
    pub fn new(inner: Box<dyn Acker>) -> Self {
        Self { inner }
    }

    pub fn commit(self) {
        self.inner.commit();
    }

    pub fn abandon(self) {
        self.inner.abandon();
    }
}

/// A queue consumer owning a fixed set of partitions.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Block until a message is available or `cancel` fires.
    ///
    /// A malformed payload returns [`QueueError::Deserialize`] after its
    /// offset has been committed; the caller should count the error and
    /// keep consuming.
    async fn consume(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(LogMessage, AckHandle), QueueError>;

    /// Release the consumer's resources.
    fn close(&mut self);
}
