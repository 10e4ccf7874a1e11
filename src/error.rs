//! Crate-level error types.

use std::error::Error as StdError;
use std::io;

use crate::protocol::ProtocolError;
use crate::rdm::{NackReason, ParameterId};

/// Crate-level error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Socket or other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or unsupported wire data.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An RDM request received no matching reply before its timeout.
    #[error("no RDM response for {pid}")]
    NoResponse { pid: ParameterId },

    /// The responder rejected an RDM request.
    #[error("RDM request for {pid} rejected: {reason}")]
    Nack { pid: ParameterId, reason: NackReason },

    /// The responder answered with a response type this crate does not follow
    /// (ACK_TIMER, ACK_OVERFLOW).
    #[error("unexpected RDM response for {pid}: {detail}")]
    UnexpectedResponse { pid: ParameterId, detail: String },

    /// No UDP socket could be bound, so nothing can be sent or received.
    #[error("no Art-Net socket could be bound")]
    NoSockets,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An error with context describing what operation failed.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A simple error message.
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Create a simple message error.
    pub fn msg(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    /// Create an error with context wrapping another error.
    pub fn context(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Crate-level result type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nack_error_names_pid_and_reason() {
        let err = Error::Nack {
            pid: ParameterId::DmxStartAddress,
            reason: NackReason::DataOutOfRange,
        };
        let text = err.to_string();
        assert!(text.contains("DMX_START_ADDRESS"), "{}", text);
        assert!(text.contains("data out of range"), "{}", text);
    }

    #[test]
    fn test_context_keeps_source() {
        let io = io::Error::new(io::ErrorKind::AddrInUse, "taken");
        let err = Error::context("binding 0.0.0.0:6454", io);
        assert_eq!(err.to_string(), "binding 0.0.0.0:6454: taken");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_protocol_error_converts() {
        let err: Error = ProtocolError::InvalidHeader.into();
        assert!(matches!(err, Error::Protocol(ProtocolError::InvalidHeader)));
    }
}
