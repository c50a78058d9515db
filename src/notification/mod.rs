use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::models::request::Request;

pub mod twilio;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("messaging request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("messaging API returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("messaging call timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound chat channel with a fixed sender and recipient.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Deliver `body` and return the provider's message id.
    async fn send(&self, body: &str) -> Result<String, NotifyError>;
}

/// Text sent to the admin for a new request.
pub fn admin_alert_body(request: &Request) -> String {
    format!(
        "Hi admin,\na new request has been created.\n\nroom no- {}\ndescription- {}",
        request.room_number, request.description
    )
}

/// Formats requests into admin alerts and reports delivery as a plain bool.
#[derive(Clone)]
pub struct AdminNotifier {
    sender: Arc<dyn MessageSender>,
    timeout: Duration,
}

impl AdminNotifier {
    pub fn new(sender: Arc<dyn MessageSender>, timeout: Duration) -> Self {
        Self { sender, timeout }
    }

    /// Returns `true` only when the provider accepted the message.
    /// Failures are logged here and never propagated.
    pub async fn notify(&self, request: &Request) -> bool {
        let body = admin_alert_body(request);

        match tokio::time::timeout(self.timeout, self.sender.send(&body)).await {
            Ok(Ok(message_id)) => {
                info!(
                    request_id = request.id,
                    room = %request.room_number,
                    message_id = %message_id,
                    "sent admin notification"
                );
                true
            }
            Ok(Err(e)) => {
                warn!(request_id = request.id, error = %e, "failed to send admin notification");
                false
            }
            Err(_) => {
                let e = NotifyError::Timeout(self.timeout);
                warn!(request_id = request.id, error = %e, "failed to send admin notification");
                false
            }
        }
    }
}
