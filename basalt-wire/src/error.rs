//! Error types for the wire protocol.

use thiserror::Error;

/// Result type for wire protocol operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Clone, Error)]
pub enum WireError {
    /// A protobuf header failed to decode.
    #[error("header decode error: {0}")]
    HeaderDecode(#[from] prost::DecodeError),

    /// A protobuf header failed to encode.
    #[error("header encode error: {0}")]
    HeaderEncode(#[from] prost::EncodeError),

    /// A frame ended before a length-delimited section did.
    #[error("truncated frame: need {need} bytes, have {have}")]
    Truncated {
        /// Bytes needed.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// A response header carried no call ID.
    #[error("response header has no call ID")]
    MissingCallId,

    /// A request header is too long for its single-byte length prefix.
    #[error("request header too large: {size} bytes (max {max})")]
    HeaderTooLarge {
        /// Encoded header size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// A frame announced a length above the configured maximum.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Announced size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },
}

impl WireError {
    /// Create a truncation error.
    #[must_use]
    pub const fn truncated(need: usize, have: usize) -> Self {
        Self::Truncated { need, have }
    }
}
