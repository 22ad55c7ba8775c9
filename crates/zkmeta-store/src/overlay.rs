//! Local write overlay
//!
//! Records every write this process made until the watch cache shows a
//! version at least as new. An entry wins over the cache while
//! `entry.version >= cache_version`.

use std::collections::HashMap;

/// Version recorded for deletions so they outrank any cached version
pub(crate) const TOMBSTONE_VERSION: i32 = i32::MAX;

/// A local write; `value == None` is a pending deletion
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct OverlayEntry {
    pub(crate) value: Option<String>,
    pub(crate) version: i32,
    /// Last modification of the deleted node; zero for writes
    pub(crate) deleted_mzxid: i64,
}

impl OverlayEntry {
    pub(crate) const fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

#[derive(Debug, Default)]
pub(crate) struct OverlayMap {
    entries: HashMap<String, OverlayEntry>,
}

impl OverlayMap {
    pub(crate) fn record_write(&mut self, key: &str, value: &str, version: i32) {
        self.entries.insert(
            key.to_string(),
            OverlayEntry {
                value: Some(value.to_string()),
                version,
                deleted_mzxid: 0,
            },
        );
    }

    /// Record a deletion of a node last modified at `deleted_mzxid`
    pub(crate) fn record_tombstone(&mut self, key: &str, deleted_mzxid: i64) {
        self.entries.insert(
            key.to_string(),
            OverlayEntry {
                value: None,
                version: TOMBSTONE_VERSION,
                deleted_mzxid,
            },
        );
    }

    /// Entry that takes precedence over the cache's view of `key`.
    ///
    /// With no cached version the entry always wins.
    pub(crate) fn masking(&self, key: &str, cache_version: Option<i32>) -> Option<&OverlayEntry> {
        self.entries
            .get(key)
            .filter(|entry| cache_version.is_none_or(|v| entry.version >= v))
    }

    /// Drop the entry once the cache has caught up; returns whether it was dropped
    pub(crate) fn confirm(&mut self, key: &str, cache_version: i32) -> bool {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| cache_version >= entry.version)
        {
            self.entries.remove(key);
            true
        } else {
            false
        }
    }

    /// Drop a tombstone once a node created after the deletion shows up.
    ///
    /// A node seen with a later `mzxid` than the deleted one cannot be the
    /// deleted node, so the deletion has already happened.
    pub(crate) fn supersede(&mut self, key: &str, mzxid: i64) -> bool {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_tombstone() && mzxid > entry.deleted_mzxid)
        {
            self.entries.remove(key);
            true
        } else {
            false
        }
    }

    /// Drop tombstones the freshly primed cache already reflects.
    ///
    /// `cached_mzxid` looks a key up in the cache. A tombstone goes when its
    /// key is absent or was recreated after the deletion. Returns the number
    /// of tombstones dropped.
    pub(crate) fn settle_tombstones(
        &mut self,
        cached_mzxid: impl Fn(&str) -> Option<i64>,
    ) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            !entry.is_tombstone()
                || cached_mzxid(key).is_some_and(|mzxid| mzxid <= entry.deleted_mzxid)
        });
        before - self.entries.len()
    }

    pub(crate) fn clear(&mut self, key: &str) -> Option<OverlayEntry> {
        self.entries.remove(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
