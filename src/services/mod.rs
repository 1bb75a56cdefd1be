//! Service layer for the scraping engine.
//!
//! This module contains the business logic for:
//! - Per-source retry and cool-down (`BackoffPolicy`)
//! - Polling all sources once per cycle (`Orchestrator`)

mod backoff;
mod orchestrator;

pub use backoff::{BackoffPolicy, BackoffSettings, PolicyState, SourceHealth};
pub use orchestrator::{Orchestrator, SourcePipeline};
