//! Basalt Core - Shared types for the RegionServer client.
//!
//! This crate provides the types every other Basalt crate speaks in: the
//! call identifiers used to correlate requests with responses on a
//! connection, the descriptor of a region (a contiguous row-key range of a
//! table), and the explicit limits that bound frames, queues and caches.
//!
//! # Design Principles (TigerStyle)
//!
//! - **Strongly-typed IDs**: A `CallId` can't be confused with a length
//! - **Explicit limits**: Every buffer and cache has a bounded maximum
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod limits;
mod region;
mod types;

pub use error::{Error, Result};
pub use limits::Limits;
pub use region::RegionInfo;
pub use types::CallId;

/// Maximum size of a single response frame in bytes (64 MB).
pub const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;
