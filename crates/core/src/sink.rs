//! Append-only persistence seam for decoded readings.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::reading::Reading;

/// Durable destination for readings.
///
/// Implementations must be safe for concurrent use without extra locking
/// (the PostgreSQL implementation is backed by a connection pool).
#[async_trait]
pub trait ReadingSink: Send + Sync {
    /// Append one reading. Failures are reported as
    /// [`CoreError::Persistence`].
    async fn append(&self, reading: &Reading) -> Result<(), CoreError>;
}
