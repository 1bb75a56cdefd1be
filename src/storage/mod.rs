//! Persistent state kept between runs.
//!
//! Only the seen-id set survives a restart. Losing it is recoverable (old
//! listings get announced once more), so it may live on a RAM-backed path.

mod seen;

pub use seen::DedupCache;
