//! Utility functions and helpers.

pub mod http;
pub mod text;

use sha2::{Digest, Sha256};
use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Resolve an optional link; blank links become `None`.
pub fn absolute_link(base: &Url, href: Option<&str>) -> Option<String> {
    let href = href?.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    Some(resolve_url(base, href))
}

/// Deterministic short identifier derived from upstream content.
///
/// Used when a source exposes no id of its own; the same input always
/// yields the same id across runs and processes.
pub fn stable_id(seed: &str) -> String {
    let digest = Sha256::digest(seed.trim().as_bytes());
    hex::encode(&digest[..8])
}
