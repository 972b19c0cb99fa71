//! Recording test doubles for the transport traits.
//!
//! Useful in unit and integration tests where no real provider is reachable.
//! Each mock records every message it receives and answers with a
//! programmer-specified outcome.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::{
    EmailMessage, EmailTransport, EventNotifier, SmsMessage, SmsReceipt, SmsTransport,
    TransportError,
};

/// Behaviour injected into a mock at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Accept every message.
    Accept,
    /// Fail every call with the given error.
    Fail(TransportError),
}

/// A mock email transport.
#[derive(Clone)]
pub struct MockEmailTransport {
    pub behaviour: MockBehaviour,
    /// Every message seen (in call order).
    pub sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl MockEmailTransport {
    /// A transport that accepts everything.
    pub fn accepting() -> Self {
        Self {
            behaviour: MockBehaviour::Accept,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A transport that rejects everything with `msg`.
    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            behaviour: MockBehaviour::Fail(TransportError::Rejected(msg.into())),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of the messages received so far.
    pub fn messages(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl EmailTransport for MockEmailTransport {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(message.clone());
        match &self.behaviour {
            MockBehaviour::Accept => Ok(()),
            MockBehaviour::Fail(err) => Err(err.clone()),
        }
    }
}

/// A mock SMS transport. Accepted messages get sequential provider ids.
#[derive(Clone)]
pub struct MockSmsTransport {
    pub behaviour: MockBehaviour,
    pub sent: Arc<Mutex<Vec<SmsMessage>>>,
}

impl MockSmsTransport {
    pub fn accepting() -> Self {
        Self {
            behaviour: MockBehaviour::Accept,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            behaviour: MockBehaviour::Fail(TransportError::Rejected(msg.into())),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn messages(&self) -> Vec<SmsMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsTransport for MockSmsTransport {
    async fn send_sms(&self, message: &SmsMessage) -> Result<SmsReceipt, TransportError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        match &self.behaviour {
            MockBehaviour::Accept => Ok(SmsReceipt {
                provider_id: Some(format!("mock-{}", sent.len())),
                status: "queued".into(),
            }),
            MockBehaviour::Fail(err) => Err(err.clone()),
        }
    }
}

/// A mock notifier that records every summary it is handed.
#[derive(Clone)]
pub struct MockNotifier {
    pub behaviour: MockBehaviour,
    pub summaries: Arc<Mutex<Vec<Value>>>,
}

impl MockNotifier {
    pub fn accepting() -> Self {
        Self {
            behaviour: MockBehaviour::Accept,
            summaries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            behaviour: MockBehaviour::Fail(TransportError::Unavailable(msg.into())),
            summaries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn summaries(&self) -> Vec<Value> {
        self.summaries.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventNotifier for MockNotifier {
    async fn notify(&self, summary: &Value) -> Result<(), TransportError> {
        self.summaries.lock().unwrap().push(summary.clone());
        match &self.behaviour {
            MockBehaviour::Accept => Ok(()),
            MockBehaviour::Fail(err) => Err(err.clone()),
        }
    }
}
