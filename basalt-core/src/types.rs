//! Strongly-typed identifiers for Basalt entities.
//!
//! Following `TigerStyle`: explicit types prevent bugs from mixing up IDs.
//! Call IDs are 32-bit because that is what the RPC request header carries.

use std::fmt;

/// Identifier of one outstanding call on a single RegionServer connection.
///
/// Call IDs are only meaningful within the connection that assigned them.
/// Each connection counts from zero and pre-increments, so the first call
/// written on a fresh connection carries ID 1.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct CallId(u32);

impl CallId {
    /// Creates a new ID from a raw u32 value.
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw u32 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the next ID in sequence.
    ///
    /// Wraps at `u32::MAX`; a connection never lives long enough for two
    /// outstanding calls to collide.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call({})", self.0)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

impl From<u32> for CallId {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<CallId> for u32 {
    fn from(id: CallId) -> Self {
        id.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_id_display() {
        let id = CallId::new(42);
        assert_eq!(format!("{id}"), "call-42");
        assert_eq!(format!("{id:?}"), "call(42)");
    }

    #[test]
    fn test_call_id_next() {
        let id = CallId::default();
        assert_eq!(id.get(), 0);
        assert_eq!(id.next().get(), 1);
        assert_eq!(id.next().next().get(), 2);
    }

    #[test]
    fn test_call_id_wraps() {
        let id = CallId::new(u32::MAX);
        assert_eq!(id.next(), CallId::new(0));
    }

    #[test]
    fn test_call_id_conversions() {
        let id: CallId = 7.into();
        let raw: u32 = id.into();
        assert_eq!(raw, 7);
    }
}
