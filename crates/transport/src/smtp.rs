//! SMTP email delivery over lettre's async pooled transport.

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{error, info};

use crate::{EmailMessage, EmailTransport, TransportError};

/// Connection settings for [`SmtpEmailTransport`].
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct SmtpEmailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| TransportError::Unavailable(e.to_string()))?
            .port(config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(config.timeout))
            .build();

        Ok(Self { transport })
    }
}

fn mailbox(address: &str, name: Option<&str>) -> Result<Mailbox, TransportError> {
    let raw = match name {
        Some(name) if !name.trim().is_empty() => format!("{} <{}>", name, address),
        _ => address.to_string(),
    };
    raw.parse::<Mailbox>()
        .map_err(|e| TransportError::Rejected(format!("invalid address '{address}': {e}")))
}

/// Split a comma/semicolon separated address list.
fn address_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split([',', ';'])
        .map(str::trim)
        .filter(|a| !a.is_empty())
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), TransportError> {
        let mut builder = Message::builder()
            .from(mailbox(&message.from, message.from_name.as_deref())?)
            .to(mailbox(&message.to, None)?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML);

        for cc in address_list(message.cc.as_deref()) {
            builder = builder.cc(mailbox(cc, None)?);
        }
        for bcc in address_list(message.bcc.as_deref()) {
            builder = builder.bcc(mailbox(bcc, None)?);
        }

        let email = builder
            .body(message.body.clone())
            .map_err(|e| TransportError::Rejected(e.to_string()))?;

        match self.transport.send(email).await {
            Ok(_) => {
                info!(card_id = %message.card_id, "email sent to {}", message.to);
                Ok(())
            }
            Err(e) => {
                error!(card_id = %message.card_id, "failed to send email to {}: {}", message.to, e);
                if e.is_permanent() {
                    Err(TransportError::Rejected(e.to_string()))
                } else {
                    Err(TransportError::Unavailable(e.to_string()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_list_splits_and_trims() {
        let all: Vec<&str> = address_list(Some("a@x.com, b@x.com;c@x.com ,")).collect();
        assert_eq!(all, vec!["a@x.com", "b@x.com", "c@x.com"]);
        assert_eq!(address_list(None).count(), 0);
    }

    #[test]
    fn mailbox_includes_display_name() {
        let mb = mailbox("ops@example.com", Some("Ops Team")).unwrap();
        assert_eq!(mb.name.as_deref(), Some("Ops Team"));
        assert!(mailbox("not an address", None).is_err());
    }
}
