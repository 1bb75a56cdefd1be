//! Novelty detection between cycles.
//!
//! The orchestrator only reports the current state. Deciding what is new
//! happens here, against the previous snapshot and against the persisted
//! seen-id set, followed by the user's room and WBS preferences.

use std::collections::HashSet;

use crate::models::{ListingRecord, MonitorConfig};
use crate::storage::DedupCache;

/// User preferences applied before a listing is announced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListingFilter {
    /// Listings with fewer rooms are dropped; unknown counts pass
    pub min_rooms: f64,
    /// Drop listings that require a WBS
    pub exclude_wbs: bool,
}

impl Default for ListingFilter {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for ListingFilter {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            min_rooms: config.min_rooms,
            exclude_wbs: config.exclude_wbs,
        }
    }
}

impl ListingFilter {
    pub fn accepts(&self, record: &ListingRecord) -> bool {
        if self.exclude_wbs && record.requires_eligibility_certificate {
            return false;
        }
        match record.room_count() {
            Some(rooms) if rooms > 0.0 => rooms >= self.min_rooms,
            _ => true,
        }
    }

    pub fn apply(&self, records: Vec<ListingRecord>) -> Vec<ListingRecord> {
        records.into_iter().filter(|r| self.accepts(r)).collect()
    }
}

/// Records of `current` whose key did not appear in `previous`.
pub fn new_since(previous: &HashSet<String>, current: &[ListingRecord]) -> Vec<ListingRecord> {
    current
        .iter()
        .filter(|r| !previous.contains(&r.key()))
        .cloned()
        .collect()
}

/// Records the cache has not seen yet.
pub fn unseen(cache: &DedupCache, records: Vec<ListingRecord>) -> Vec<ListingRecord> {
    records
        .into_iter()
        .filter(|r| !cache.is_seen(&r.key()))
        .collect()
}

/// Keys of a snapshot, for the next call to [`new_since`].
pub fn snapshot_keys(records: &[ListingRecord]) -> HashSet<String> {
    records.iter().map(ListingRecord::key).collect()
}
