//! HTTP-backed transports: an SMS gateway client and a webhook notifier.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::{EventNotifier, SmsMessage, SmsReceipt, SmsTransport, TransportError};

fn map_reqwest(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout.as_millis() as u64)
    } else {
        TransportError::Unavailable(err.to_string())
    }
}

/// Sends SMS through a JSON gateway: `POST {url}` with `{to, body, reference}`
/// and a bearer token, expecting `{id?, status?}` back.
#[derive(Clone)]
pub struct HttpSmsTransport {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GatewayReply {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl HttpSmsTransport {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
            timeout,
        }
    }
}

#[async_trait]
impl SmsTransport for HttpSmsTransport {
    async fn send_sms(&self, message: &SmsMessage) -> Result<SmsReceipt, TransportError> {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&json!({
                "to": message.to,
                "body": message.body,
                "reference": message.card_id,
            }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| map_reqwest(e, self.timeout))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(card_id = %message.card_id, %status, "sms gateway refused message");
            return Err(TransportError::Rejected(format!("{status}: {text}")));
        }

        let reply: GatewayReply = response
            .json()
            .await
            .map_err(|e| TransportError::Rejected(format!("unreadable gateway reply: {e}")))?;

        Ok(SmsReceipt {
            provider_id: reply.id,
            status: reply.status.unwrap_or_else(|| "sent".into()),
        })
    }
}

/// Posts dispatch summaries to an external automation platform webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl EventNotifier for WebhookNotifier {
    async fn notify(&self, summary: &Value) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(summary)
            .send()
            .await
            .map_err(|e| map_reqwest(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(TransportError::Rejected(response.status().to_string()));
        }
        debug!(url = %self.url, "dispatch summary forwarded");
        Ok(())
    }
}
