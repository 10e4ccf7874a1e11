//! Error types for the Art-Net and RDM wire codec.

use std::error::Error;
use std::fmt;

/// Errors raised while decoding or encoding wire data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The datagram does not start with the `Art-Net\0` identifier.
    InvalidHeader,
    /// The sender speaks an Art-Net protocol revision older than 14.
    UnsupportedVersion(u16),
    /// The buffer is shorter than the fixed part of the message.
    TooShort { expected: usize, actual: usize },
    /// RDM checksum mismatch.
    BadChecksum { expected: u16, actual: u16 },
    /// A field holds a value this codec refuses.
    InvalidField(&'static str),
    /// The output buffer cannot hold the encoded message.
    BufferTooSmall { needed: usize, available: usize },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidHeader => write!(f, "missing Art-Net packet identifier"),
            ProtocolError::UnsupportedVersion(v) => {
                write!(f, "unsupported Art-Net protocol version {}", v)
            }
            ProtocolError::TooShort { expected, actual } => {
                write!(f, "packet too short: need {} bytes, got {}", expected, actual)
            }
            ProtocolError::BadChecksum { expected, actual } => write!(
                f,
                "RDM checksum mismatch: computed {:#06x}, packet carries {:#06x}",
                expected, actual
            ),
            ProtocolError::InvalidField(name) => write!(f, "invalid {}", name),
            ProtocolError::BufferTooSmall { needed, available } => write!(
                f,
                "output buffer too small: need {} bytes, have {}",
                needed, available
            ),
        }
    }
}

impl Error for ProtocolError {}

/// Fails with [`ProtocolError::TooShort`] unless `buf` holds at least `expected` bytes.
pub(crate) fn ensure_len(buf: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if buf.len() < expected {
        return Err(ProtocolError::TooShort {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Fails with [`ProtocolError::BufferTooSmall`] unless `buf` can take `needed` bytes.
pub(crate) fn ensure_capacity(buf: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        return Err(ProtocolError::BufferTooSmall {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}
