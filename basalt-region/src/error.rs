//! Error types for the connection engine.
//!
//! Errors fall into two layers:
//! - [`ConnectionError`]: faults that kill the connection. Recorded once and
//!   delivered (wrapped in [`RegionError::Unrecoverable`]) to every pending
//!   and in-flight call.
//! - [`RegionError`]: what a single call observes. Only `Unrecoverable`
//!   implies the connection is gone; every other variant concerns one call.

use std::io;
use std::sync::Arc;

use basalt_core::CallId;
use basalt_wire::{ExceptionResponse, WireError};
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for connection engine operations.
pub type RegionResult<T> = Result<T, RegionError>;

/// Server exception classes that mean "try again, possibly elsewhere".
const RETRYABLE_EXCEPTIONS: [&str; 3] = [
    "org.apache.hadoop.hbase.NotServingRegionException",
    "org.apache.hadoop.hbase.exceptions.RegionMovedException",
    "org.apache.hadoop.hbase.exceptions.RegionOpeningException",
];

/// A fault that leaves a RegionServer connection unusable.
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// Reading from or writing to the socket failed.
    #[error("I/O error while {context}: {source}")]
    Io {
        /// What the engine was doing.
        context: &'static str,
        /// The underlying error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The socket accepted only part of a frame.
    #[error("short write occurred while writing to socket")]
    ShortWrite,

    /// The socket reached end-of-stream in the middle of a frame.
    #[error("short read while {context}")]
    ShortRead {
        /// What the engine was reading.
        context: &'static str,
    },

    /// A response frame violated the wire protocol.
    #[error("protocol violation: {0}")]
    Protocol(#[from] WireError),

    /// The RegionServer closed the connection between frames.
    #[error("RegionServer closed the connection")]
    PeerClosed,

    /// The server answered a call that is not outstanding.
    #[error("RegionServer responded with unexpected call ID {0}")]
    UnexpectedCallId(CallId),

    /// The connection was closed locally.
    #[error("connection closed")]
    Closed,
}

impl ConnectionError {
    /// Wraps an I/O error, singling out short reads and writes.
    #[must_use]
    pub fn io(context: &'static str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WriteZero => Self::ShortWrite,
            io::ErrorKind::UnexpectedEof => Self::ShortRead { context },
            _ => Self::Io {
                context,
                source: Arc::new(err),
            },
        }
    }
}

/// An exception raised by the RegionServer while executing a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("RegionServer exception {class_name}:\n{stack_trace}")]
pub struct RemoteException {
    /// Fully-qualified exception class name.
    pub class_name: String,
    /// Server-side stack trace.
    pub stack_trace: String,
    /// Host that raised the exception, when reported.
    pub hostname: Option<String>,
    /// Port that raised the exception, when reported.
    pub port: Option<i32>,
    /// Server's advice not to retry.
    pub do_not_retry: bool,
}

impl RemoteException {
    /// Returns true if the exception class is a known transient condition.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        RETRYABLE_EXCEPTIONS.contains(&self.class_name.as_str())
    }
}

impl From<ExceptionResponse> for RemoteException {
    fn from(exc: ExceptionResponse) -> Self {
        Self {
            class_name: exc.exception_class_name.unwrap_or_default(),
            stack_trace: exc.stack_trace.unwrap_or_default(),
            hostname: exc.hostname,
            port: exc.port,
            do_not_retry: exc.do_not_retry.unwrap_or(false),
        }
    }
}

/// Errors observed by callers of the connection engine.
#[derive(Debug, Clone, Error)]
pub enum RegionError {
    /// The TCP connection could not be established.
    #[error("failed to connect to the RegionServer at {addr}: {source}")]
    Connect {
        /// Address we dialed.
        addr: String,
        /// The underlying error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The engine configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The connection is dead; rebuild it and resend.
    #[error("unrecoverable connection error: {0}")]
    Unrecoverable(#[source] ConnectionError),

    /// The server reported a transient condition; resend, possibly elsewhere.
    #[error("retryable: {0}")]
    Retryable(#[source] RemoteException),

    /// The server reported any other exception.
    #[error("{0}")]
    Remote(#[source] RemoteException),

    /// The call's request could not be serialized. The connection is unaffected.
    #[error("failed to serialize {method} request: {message}")]
    Serialize {
        /// Method of the failed call.
        method: String,
        /// Why serialization failed.
        message: String,
    },

    /// The serialized request exceeds the configured limit. The connection
    /// is unaffected.
    #[error("{method} request too large: {size} bytes (max {max})")]
    RequestTooLarge {
        /// Method of the failed call.
        method: String,
        /// Serialized size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// The response body could not be decoded. The connection is unaffected.
    #[error("failed to decode {method} response: {source}")]
    Decode {
        /// Method of the failed call.
        method: String,
        /// The decode error.
        #[source]
        source: prost::DecodeError,
    },

    /// A result held a response of a different type than the call expects.
    #[error("unexpected response type for {method}")]
    UnexpectedResponse {
        /// Method of the call.
        method: String,
    },
}

impl RegionError {
    /// Classifies a server exception as retryable or plain.
    #[must_use]
    pub fn from_exception(exc: ExceptionResponse) -> Self {
        let exc = RemoteException::from(exc);
        if exc.is_retryable() {
            Self::Retryable(exc)
        } else {
            Self::Remote(exc)
        }
    }

    /// Returns true if the caller may resend the call.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Returns true if the connection that produced this error is dead.
    #[must_use]
    pub const fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable(_))
    }
}
