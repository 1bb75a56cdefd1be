//! Caller-side logic on top of the orchestrator.
//!
//! - `diff`: what counts as new, and which new listings the user wants
//! - `monitor`: the polling loop tying orchestrator, cache and notifier together

pub mod diff;
pub mod monitor;

pub use diff::{ListingFilter, new_since, snapshot_keys, unseen};
pub use monitor::{LogNotifier, Monitor, Notifier};
