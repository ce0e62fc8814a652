//! Region cache - tracks which RegionServer serves which key range.
//!
//! Regions of a table tile its key space: each covers `[start_key,
//! stop_key)` and the last one has an unbounded stop key. The cache keeps,
//! per table, a B-tree from start key to region and client, so the owner of
//! a key is found with a single floor search.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use basalt_core::{Limits, RegionInfo};
use bytes::Bytes;
use tracing::debug;

/// Maximum number of cached regions.
pub const REGION_CACHE_ENTRIES_MAX: usize = Limits::new().max_cached_regions as usize;

/// Configuration for the region cache.
#[derive(Debug, Clone, Copy)]
pub struct RegionCacheConfig {
    /// Maximum number of regions in the cache.
    pub max_entries: usize,
}

impl Default for RegionCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: REGION_CACHE_ENTRIES_MAX,
        }
    }
}

/// A cached region and the client serving it.
#[derive(Debug)]
pub struct RegionLocation<C> {
    /// The region.
    pub region: Arc<RegionInfo>,
    /// Connection to the RegionServer hosting the region.
    pub client: Arc<C>,
}

impl<C> Clone for RegionLocation<C> {
    fn clone(&self) -> Self {
        Self {
            region: Arc::clone(&self.region),
            client: Arc::clone(&self.client),
        }
    }
}

type TableRegions<C> = BTreeMap<Bytes, RegionLocation<C>>;

#[derive(Debug)]
struct CacheState<C> {
    /// Regions by table, then by start key.
    tables: BTreeMap<Bytes, TableRegions<C>>,
    /// Total number of cached regions.
    len: usize,
}

/// Cache of region locations, shared between concurrent callers.
///
/// Generic over the client type so it can hold any connection handle.
#[derive(Debug)]
pub struct RegionCache<C> {
    config: RegionCacheConfig,
    state: RwLock<CacheState<C>>,
}

impl<C> RegionCache<C> {
    /// Creates a new region cache with the given configuration.
    #[must_use]
    pub const fn new(config: RegionCacheConfig) -> Self {
        Self {
            config,
            state: RwLock::new(CacheState {
                tables: BTreeMap::new(),
                len: 0,
            }),
        }
    }

    /// Creates a new region cache with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RegionCacheConfig::default())
    }

    /// Returns the region of `table` that contains `key`, with its client.
    ///
    /// Returns `None` if no cached region covers the key.
    #[must_use]
    pub fn lookup(&self, table: &[u8], key: &[u8]) -> Option<RegionLocation<C>> {
        let state = self.state.read().expect("region cache lock poisoned");
        let regions = state.tables.get(table)?;

        // Find the entry with the largest start key <= key.
        regions
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
            .next_back()
            .filter(|(_, location)| location.region.contains(key))
            .map(|(_, location)| location.clone())
    }

    /// Caches `region` as served by `client`.
    ///
    /// Replaces the entry with the same table and start key, if any, and
    /// returns it. Other entries are untouched, so after a split the caller
    /// inserts every daughter region.
    ///
    /// # Errors
    ///
    /// Returns an error if the region's key range is empty or the cache is
    /// full and the region is not a replacement.
    pub fn insert(
        &self,
        region: impl Into<Arc<RegionInfo>>,
        client: Arc<C>,
    ) -> Result<Option<RegionLocation<C>>, CacheError> {
        let region = region.into();
        if !region.is_last() && region.stop_key <= region.start_key {
            return Err(CacheError::EmptyRange {
                region: String::from_utf8_lossy(&region.name).into_owned(),
            });
        }

        let mut state = self.state.write().expect("region cache lock poisoned");
        let is_new = state
            .tables
            .get(&region.table)
            .map_or(true, |regions| !regions.contains_key(&region.start_key));
        if is_new && state.len >= self.config.max_entries {
            return Err(CacheError::CacheFull {
                count: state.len,
                max: self.config.max_entries,
            });
        }

        debug!(
            table = %String::from_utf8_lossy(&region.table),
            region = %String::from_utf8_lossy(&region.name),
            "Caching region"
        );

        let start_key = region.start_key.clone();
        let previous = state
            .tables
            .entry(region.table.clone())
            .or_default()
            .insert(start_key, RegionLocation { region, client });
        if previous.is_none() {
            state.len += 1;
        }
        Ok(previous)
    }

    /// Removes the region of `table` starting at `start_key`.
    pub fn remove(&self, table: &[u8], start_key: &[u8]) -> Option<RegionLocation<C>> {
        let mut state = self.state.write().expect("region cache lock poisoned");
        let regions = state.tables.get_mut(table)?;
        let removed = regions.remove(start_key)?;
        if regions.is_empty() {
            state.tables.remove(table);
        }
        state.len -= 1;
        Some(removed)
    }

    /// Removes every region served by `client`.
    ///
    /// Call this when a connection has failed. Returns the number of
    /// regions removed.
    pub fn invalidate_client(&self, client: &Arc<C>) -> usize {
        let mut state = self.state.write().expect("region cache lock poisoned");
        let before = state.len;

        let mut removed = 0;
        state.tables.retain(|_, regions| {
            let count = regions.len();
            regions.retain(|_, location| !Arc::ptr_eq(&location.client, client));
            removed += count - regions.len();
            !regions.is_empty()
        });
        state.len = before - removed;

        if removed > 0 {
            debug!(removed, "Invalidated regions of failed client");
        }
        removed
    }

    /// Removes every region of `table`. Returns the number removed.
    pub fn invalidate_table(&self, table: &[u8]) -> usize {
        let mut state = self.state.write().expect("region cache lock poisoned");
        let removed = state.tables.remove(table).map_or(0, |regions| regions.len());
        state.len -= removed;
        removed
    }

    /// Returns the cached regions of `table`, ordered by start key.
    #[must_use]
    pub fn regions(&self, table: &[u8]) -> Vec<Arc<RegionInfo>> {
        let state = self.state.read().expect("region cache lock poisoned");
        state.tables.get(table).map_or_else(Vec::new, |regions| {
            regions
                .values()
                .map(|location| Arc::clone(&location.region))
                .collect()
        })
    }

    /// Clears all entries in the cache.
    pub fn clear(&self) {
        let mut state = self.state.write().expect("region cache lock poisoned");
        state.tables.clear();
        state.len = 0;
    }

    /// Returns the number of regions in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().expect("region cache lock poisoned").len
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C> Default for RegionCache<C> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Errors from region cache operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The cache holds its maximum number of regions.
    CacheFull {
        /// Current count.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },
    /// The region's stop key does not lie above its start key.
    EmptyRange {
        /// Name of the rejected region.
        region: String,
    },
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CacheFull { count, max } => {
                write!(f, "region cache full: {count} regions (max {max})")
            }
            Self::EmptyRange { region } => {
                write!(f, "region {region} has an empty key range")
            }
        }
    }
}

impl std::error::Error for CacheError {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stand-in for a RegionServer connection.
    #[derive(Debug)]
    struct Server(&'static str);

    fn region(start: &'static [u8], stop: &'static [u8], name: &'static str) -> RegionInfo {
        RegionInfo::new(
            Bytes::from_static(b"test"),
            Bytes::from_static(name.as_bytes()),
            Bytes::from_static(start),
            Bytes::from_static(stop),
        )
    }

    fn name_of(location: Option<RegionLocation<Server>>) -> Option<Bytes> {
        location.map(|l| l.region.name.clone())
    }

    /// Three regions tiling the key space: ["", "foo"), ["foo", "gohbase"),
    /// ["gohbase", unbounded).
    fn populated() -> (RegionCache<Server>, Arc<Server>) {
        let cache = RegionCache::with_defaults();
        let server = Arc::new(Server("rs1"));
        cache.insert(region(b"", b"foo", "r1"), Arc::clone(&server)).unwrap();
        cache.insert(region(b"foo", b"gohbase", "r2"), Arc::clone(&server)).unwrap();
        cache.insert(region(b"gohbase", b"", "r3"), Arc::clone(&server)).unwrap();
        (cache, server)
    }

    #[test]
    fn test_empty_cache_misses() {
        let cache: RegionCache<Server> = RegionCache::with_defaults();
        assert!(cache.is_empty());
        assert!(cache.lookup(b"test", b"theKey").is_none());
    }

    #[test]
    fn test_insert_then_lookup() {
        let cache = RegionCache::with_defaults();
        let server = Arc::new(Server("rs1"));
        cache.insert(region(b"", b"", "whole"), Arc::clone(&server)).unwrap();

        let location = cache.lookup(b"test", b"theKey").unwrap();
        assert_eq!(location.region.name, Bytes::from_static(b"whole"));
        assert!(Arc::ptr_eq(&location.client, &server));
        assert_eq!(location.client.0, "rs1");
    }

    #[test]
    fn test_floor_lookup() {
        let (cache, _) = populated();

        let cases: [(&[u8], &str); 7] = [
            (b"", "r1"),
            (b"bar", "r1"),
            (b"fon\xFF", "r1"),
            (b"foo", "r2"),
            (b"foo\x00", "r2"),
            (b"gohbase", "r3"),
            (b"theKey", "r3"),
        ];
        for (key, expected) in cases {
            assert_eq!(
                name_of(cache.lookup(b"test", key)),
                Some(Bytes::from_static(expected.as_bytes())),
                "key {key:?}"
            );
        }
    }

    #[test]
    fn test_lookup_is_per_table() {
        let (cache, _) = populated();
        assert!(cache.lookup(b"other", b"foo").is_none());
    }

    #[test]
    fn test_update_on_split() {
        let (cache, server) = populated();

        // r3 split; its left half keeps the start key and now stops at "zab".
        let previous = cache
            .insert(region(b"gohbase", b"zab", "r3"), Arc::clone(&server))
            .unwrap();
        assert!(previous.is_some());
        assert_eq!(cache.len(), 3);

        assert_eq!(
            name_of(cache.lookup(b"test", b"theKey")),
            Some(Bytes::from_static(b"r3"))
        );
        assert!(cache.lookup(b"test", b"zoo").is_none());

        // Siblings are untouched.
        assert_eq!(
            name_of(cache.lookup(b"test", b"bar")),
            Some(Bytes::from_static(b"r1"))
        );
    }

    #[test]
    fn test_remove() {
        let (cache, _) = populated();

        let removed = cache.remove(b"test", b"foo").unwrap();
        assert_eq!(removed.region.name, Bytes::from_static(b"r2"));
        assert_eq!(cache.len(), 2);

        // The hole is a miss, not a fallback to r1.
        assert!(cache.lookup(b"test", b"foo").is_none());
        assert!(cache.remove(b"test", b"foo").is_none());
    }

    #[test]
    fn test_invalidate_client() {
        let cache = RegionCache::with_defaults();
        let rs1 = Arc::new(Server("rs1"));
        let rs2 = Arc::new(Server("rs2"));
        cache.insert(region(b"", b"foo", "r1"), Arc::clone(&rs1)).unwrap();
        cache.insert(region(b"foo", b"gohbase", "r2"), Arc::clone(&rs2)).unwrap();
        cache.insert(region(b"gohbase", b"", "r3"), Arc::clone(&rs1)).unwrap();

        assert_eq!(cache.invalidate_client(&rs1), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(b"test", b"bar").is_none());
        assert_eq!(cache.lookup(b"test", b"foo").unwrap().client.0, "rs2");
        assert_eq!(cache.invalidate_client(&rs1), 0);
    }

    #[test]
    fn test_invalidate_table_and_clear() {
        let (cache, server) = populated();
        let other = RegionInfo::new("other", "o1", "", "");
        cache.insert(other, Arc::clone(&server)).unwrap();

        assert_eq!(cache.invalidate_table(b"test"), 3);
        assert_eq!(cache.len(), 1);
        assert!(cache.regions(b"test").is_empty());

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.lookup(b"other", b"x").is_none());
    }

    #[test]
    fn test_regions_ordered_by_start_key() {
        let cache = RegionCache::with_defaults();
        let server = Arc::new(Server("rs1"));
        cache.insert(region(b"gohbase", b"", "r3"), Arc::clone(&server)).unwrap();
        cache.insert(region(b"", b"foo", "r1"), Arc::clone(&server)).unwrap();
        cache.insert(region(b"foo", b"gohbase", "r2"), Arc::clone(&server)).unwrap();

        let names: Vec<_> = cache.regions(b"test").iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["r1", "r2", "r3"]);
    }

    #[test]
    fn test_capacity_limit() {
        let cache = RegionCache::new(RegionCacheConfig { max_entries: 2 });
        let server = Arc::new(Server("rs1"));
        cache.insert(region(b"", b"foo", "r1"), Arc::clone(&server)).unwrap();
        cache.insert(region(b"foo", b"gohbase", "r2"), Arc::clone(&server)).unwrap();

        let err = cache
            .insert(region(b"gohbase", b"", "r3"), Arc::clone(&server))
            .unwrap_err();
        assert_eq!(err, CacheError::CacheFull { count: 2, max: 2 });

        // Replacing an existing start key is still allowed.
        assert!(cache
            .insert(region(b"foo", b"goat", "r2"), Arc::clone(&server))
            .is_ok());
    }

    #[test]
    fn test_rejects_empty_range() {
        let cache = RegionCache::with_defaults();
        let server = Arc::new(Server("rs1"));
        let err = cache
            .insert(region(b"zzz", b"aaa", "bad"), server)
            .unwrap_err();
        assert!(matches!(err, CacheError::EmptyRange { .. }));
        assert!(cache.is_empty());
    }
}
