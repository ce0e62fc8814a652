//! System limits and configuration bounds.
//!
//! Following TigerStyle: put limits on everything.
//! Every queue, frame, and cache has an explicit maximum size.

use crate::MAX_FRAME_BYTES;

/// Client-wide limits for Basalt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a response frame accepted from a RegionServer.
    pub max_frame_bytes: u32,
    /// Maximum size of a serialized request payload.
    pub max_request_bytes: u32,
    /// Maximum number of calls that may be queued before a flush is forced.
    pub max_queue_size: u32,
    /// Maximum number of cached region locations.
    pub max_cached_regions: u32,
}

impl Limits {
    /// Creates limits with safe defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // Frames: 64MB responses, 16MB requests.
            max_frame_bytes: MAX_FRAME_BYTES,
            max_request_bytes: 16 * 1024 * 1024,

            // Batching: never hold more than 10k calls between flushes.
            max_queue_size: 10_000,

            // Routing: 1M regions is far beyond any single client's working set.
            max_cached_regions: 1_000_000,
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limits are invalid or inconsistent.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_frame_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_frame_bytes",
                reason: "must be positive",
            });
        }

        // A request must fit in a frame the server is willing to read back.
        if self.max_request_bytes > self.max_frame_bytes {
            return Err(crate::Error::InvalidArgument {
                name: "max_request_bytes",
                reason: "must be <= max_frame_bytes",
            });
        }

        if self.max_queue_size == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_queue_size",
                reason: "must be positive",
            });
        }

        if self.max_cached_regions == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_cached_regions",
                reason: "must be positive",
            });
        }

        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
