//! The outbound transport contracts the automation engine sends through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::TransportError;

/// A fully resolved email, ready to hand to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub from: String,
    pub from_name: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: String,
    /// HTML body.
    pub body: String,
    /// Card the message is sent on behalf of (used for reply threading).
    pub card_id: String,
}

/// A fully resolved SMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
    pub card_id: String,
}

/// What an SMS provider reports back for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsReceipt {
    pub provider_id: Option<String>,
    pub status: String,
}

/// Email delivery capability.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), TransportError>;
}

/// SMS delivery capability.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send_sms(&self, message: &SmsMessage) -> Result<SmsReceipt, TransportError>;
}

/// Optional sink for dispatch summaries (e.g. an external automation platform).
///
/// Callers treat this as fire-and-forget: an error here is logged and never
/// affects the dispatch that produced the summary.
#[async_trait]
pub trait EventNotifier: Send + Sync {
    async fn notify(&self, summary: &Value) -> Result<(), TransportError>;
}

/// Stand-in used when a channel has no provider configured.
///
/// Every send fails with [`TransportError::NotConfigured`], so actions on that
/// channel are recorded as failures instead of silently disappearing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTransport;

#[async_trait]
impl EmailTransport for DisabledTransport {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), TransportError> {
        tracing::warn!(to = %message.to, "email transport disabled, dropping message");
        Err(TransportError::NotConfigured("email"))
    }
}

#[async_trait]
impl SmsTransport for DisabledTransport {
    async fn send_sms(&self, message: &SmsMessage) -> Result<SmsReceipt, TransportError> {
        tracing::warn!(to = %message.to, "sms transport disabled, dropping message");
        Err(TransportError::NotConfigured("sms"))
    }
}
