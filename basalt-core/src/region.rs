//! Region descriptors.
//!
//! A region is a contiguous row-key range `[start_key, stop_key)` of one
//! table, served by exactly one RegionServer at a time.

use bytes::Bytes;

use crate::{Error, Result};

/// Byte separating the components of a region name.
const REGION_NAME_DELIMITER: u8 = b',';

/// Describes one region of a table.
///
/// An empty `stop_key` means the region extends to the end of the table's
/// key space. The start key is inclusive, the stop key exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionInfo {
    /// Table this region belongs to.
    pub table: Bytes,
    /// Opaque region name, as reported by the metadata table.
    pub name: Bytes,
    /// First row key served by this region (inclusive).
    pub start_key: Bytes,
    /// First row key *not* served by this region (exclusive, empty = unbounded).
    pub stop_key: Bytes,
}

impl RegionInfo {
    /// Creates a region descriptor from its parts.
    #[must_use]
    pub fn new(
        table: impl Into<Bytes>,
        name: impl Into<Bytes>,
        start_key: impl Into<Bytes>,
        stop_key: impl Into<Bytes>,
    ) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            start_key: start_key.into(),
            stop_key: stop_key.into(),
        }
    }

    /// Creates a region descriptor from a region name and a stop key.
    ///
    /// Region names have the form `table,start_key,timestamp.encoded.`. The
    /// start key may itself contain commas, so the table ends at the first
    /// delimiter and the start key ends at the last one.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRegionName` if the name lacks either delimiter.
    pub fn from_region_name(name: impl Into<Bytes>, stop_key: impl Into<Bytes>) -> Result<Self> {
        let name = name.into();
        let (table, start_key) = Self::parse_region_name(&name)?;
        Ok(Self {
            table,
            start_key,
            name,
            stop_key: stop_key.into(),
        })
    }

    /// Splits a region name into `(table, start_key)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRegionName` if the name lacks either delimiter.
    pub fn parse_region_name(name: &Bytes) -> Result<(Bytes, Bytes)> {
        let invalid = |reason| Error::InvalidRegionName {
            name: String::from_utf8_lossy(name).into_owned(),
            reason,
        };

        let first = name
            .iter()
            .position(|&b| b == REGION_NAME_DELIMITER)
            .ok_or_else(|| invalid("missing table delimiter"))?;
        let last = name
            .iter()
            .rposition(|&b| b == REGION_NAME_DELIMITER)
            .ok_or_else(|| invalid("missing timestamp delimiter"))?;
        if last == first {
            return Err(invalid("missing timestamp delimiter"));
        }

        Ok((name.slice(..first), name.slice(first + 1..last)))
    }

    /// Returns true if the stop key is unbounded.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.stop_key.is_empty()
    }

    /// Returns true if `key` falls in `[start_key, stop_key)`.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= &self.start_key[..] && (self.is_last() || key < &self.stop_key[..])
    }
}
