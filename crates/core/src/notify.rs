//! Outbound notification seam used by the alert engine.

use async_trait::async_trait;

use crate::error::CoreError;

/// Delivers a plain-text message to the configured recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `text`. Returns `Ok(())` only once delivery is confirmed;
    /// anything else is a [`CoreError::Notification`].
    async fn send_text(&self, text: &str) -> Result<(), CoreError>;
}
