/// Code delivery collaborator
///
/// Actual transport (SMTP, SMS gateway, messenger bot) lives outside
/// this crate; the services only see a boolean outcome.
use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::models::DeliveryChannel;
use crate::validators::mask_identifier;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeDelivery: Send + Sync {
    /// Deliver `payload` to `destination` over `channel`. Returns whether
    /// the transport accepted the message.
    async fn deliver(
        &self,
        channel: DeliveryChannel,
        destination: &str,
        payload: &str,
    ) -> Result<bool>;
}

/// Development fallback: no transport configured, log the payload
/// instead of sending it.
pub struct LogDelivery;

#[async_trait]
impl CodeDelivery for LogDelivery {
    async fn deliver(
        &self,
        channel: DeliveryChannel,
        destination: &str,
        payload: &str,
    ) -> Result<bool> {
        warn!(
            channel = ?channel,
            destination = %mask_identifier(destination),
            payload = %payload,
            "Delivery transport not configured - payload logged for development"
        );
        Ok(true)
    }
}
