//! Basalt Routing - Region location cache.
//!
//! This crate maps a table and row key to the region that serves it and the
//! connection to that region's RegionServer.
//!
//! # Design (`TigerStyle`)
//!
//! - **Floor lookup**: Regions are indexed by start key; the owner of a key
//!   is the region with the greatest start key not above it
//! - **Connection-agnostic**: The cache is generic over the client type it
//!   hands out
//! - **Explicit limits**: The entry count is bounded

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod cache;

pub use cache::{CacheError, RegionCache, RegionCacheConfig, RegionLocation, REGION_CACHE_ENTRIES_MAX};
