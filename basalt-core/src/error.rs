//! Error types for Basalt core operations.
//!
//! Following `TigerStyle`: all errors must be handled explicitly.
//! No silent failures, no ignored errors.

use std::fmt;

/// The result type for Basalt core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Basalt core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },

    /// A region name could not be parsed.
    InvalidRegionName {
        /// The offending name, lossily decoded.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
            Self::InvalidRegionName { name, reason } => {
                write!(f, "invalid region name {name:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}
