//! Transport-level error type.

use thiserror::Error;

/// Errors returned by an outbound transport.
///
/// The engine never retries on these; every variant is recorded as a
/// failure of the action that attempted the send.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The provider accepted the connection but refused the message.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// The provider could not be reached.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured bound.
    #[error("transport timed out after {0} ms")]
    Timeout(u64),

    /// No provider is configured for this channel.
    #[error("{0} transport is not configured")]
    NotConfigured(&'static str),
}
