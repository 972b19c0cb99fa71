//! `transport` crate: outbound delivery contracts and their implementations.
//!
//! The engine only ever talks to [`EmailTransport`], [`SmsTransport`] and
//! [`EventNotifier`] trait objects. Concrete providers (SMTP, HTTP gateways)
//! and recording mocks live here.

pub mod error;
pub mod traits;
pub mod smtp;
pub mod http;
pub mod mock;

pub use error::TransportError;
pub use traits::{
    DisabledTransport, EmailMessage, EmailTransport, EventNotifier, SmsMessage, SmsReceipt,
    SmsTransport,
};
