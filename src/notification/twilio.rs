use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use super::{MessageSender, NotifyError};
use crate::config::TwilioSettings;

const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Reported as the message id when a 2xx response carries no readable `sid`.
pub const UNKNOWN_SID: &str = "unknown";

/// Sends WhatsApp messages through Twilio's Messages resource.
#[derive(Clone)]
pub struct TwilioSender {
    client: reqwest::Client,
    messages_url: String,
    account_sid: String,
    auth_token: String,
    from: String,
    to: String,
    timeout: Duration,
}

impl TwilioSender {
    pub fn new(settings: &TwilioSettings, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("maintdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build messaging HTTP client")?;

        Ok(Self {
            client,
            messages_url: format!(
                "{}/2010-04-01/Accounts/{}/Messages.json",
                settings.api_base.trim_end_matches('/'),
                settings.account_sid
            ),
            account_sid: settings.account_sid.clone(),
            auth_token: settings.auth_token.clone(),
            from: whatsapp_address(&settings.from),
            to: whatsapp_address(&settings.to),
            timeout,
        })
    }

    pub fn from_address(&self) -> &str {
        &self.from
    }

    pub fn to_address(&self) -> &str {
        &self.to
    }
}

#[async_trait]
impl MessageSender for TwilioSender {
    async fn send(&self, body: &str) -> Result<String, NotifyError> {
        let resp = self
            .client
            .post(&self.messages_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("From", self.from.as_str()),
                ("To", self.to.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message: rejection_message(&text),
            });
        }

        // 2xx: the message is queued, whatever the body says.
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(status = status.as_u16(), error = %e, "could not read messaging API response body");
                return Ok(UNKNOWN_SID.to_string());
            }
        };
        match serde_json::from_str::<MessageResource>(&text) {
            Ok(message) => Ok(message.sid),
            Err(e) => {
                tracing::warn!(status = status.as_u16(), error = %e, "messaging API response had no message sid");
                Ok(UNKNOWN_SID.to_string())
            }
        }
    }
}

impl TwilioSender {
    fn transport_error(&self, e: reqwest::Error) -> NotifyError {
        if e.is_timeout() {
            NotifyError::Timeout(self.timeout)
        } else {
            NotifyError::Transport(e)
        }
    }
}

#[derive(Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Deserialize)]
struct ErrorResource {
    code: Option<i64>,
    message: Option<String>,
}

/// Pull Twilio's `code`/`message` out of an error body, falling back to the raw text.
fn rejection_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResource>(body) {
        Ok(ErrorResource {
            code: Some(code),
            message: Some(message),
        }) => format!("{} (code {})", message, code),
        Ok(ErrorResource {
            message: Some(message),
            ..
        }) => message,
        _ => body.to_string(),
    }
}

fn whatsapp_address(number: &str) -> String {
    let number = number.trim();
    if number.starts_with(WHATSAPP_PREFIX) {
        number.to_string()
    } else {
        format!("{}{}", WHATSAPP_PREFIX, number)
    }
}
