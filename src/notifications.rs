use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Outbound customer/vendor messaging.
///
/// Callers treat notification delivery as fire-and-forget: a failed send is
/// logged by the caller and never rolls back the operation that triggered it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &str, subject: &str, body: &str)
        -> Result<(), NotificationError>;
}

/// Logs messages instead of delivering them. Stands in for SMTP until a real
/// mail integration is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        info!(%recipient, %subject, "sending notification");
        info!("notification body:\n{}", body);
        Ok(())
    }
}

/// Sends through the notifier, logging failures without propagating them.
pub async fn notify_or_log(notifier: &dyn Notifier, recipient: &str, subject: &str, body: &str) {
    if let Err(e) = notifier.notify(recipient, subject, body).await {
        warn!(%recipient, %subject, "notification delivery failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let notifier = LogNotifier;
        let result = notifier
            .notify("shopper@example.com", "Order confirmation", "Thank you!")
            .await;
        assert!(result.is_ok());
    }
}
