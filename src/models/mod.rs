// src/models/mod.rs

//! Domain models for the scraping engine.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod listing;
mod status;

// Re-export all public types
pub use config::{
    BackoffConfig, CacheConfig, ClientConfig, Config, ExtractorKind, MonitorConfig, SourceConfig,
};
pub use listing::{Attributes, Field, ListingRecord, NO_TITLE, qualified_key};
pub use status::SourceStatus;

use std::collections::BTreeMap;

/// Result of one fan-out across all sources.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CycleOutput {
    /// Every record from every source that answered
    pub records: Vec<ListingRecord>,
    /// Status text per source name
    pub statuses: BTreeMap<String, SourceStatus>,
}

impl CycleOutput {
    /// Records of a single source.
    pub fn records_of<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a ListingRecord> {
        self.records.iter().filter(move |r| r.source == source)
    }
}
