// src/extractors/mod.rs

//! Site-specific extractors.
//!
//! Every source has one [`SourceExtractor`] turning a raw response body into
//! normalized [`ListingRecord`]s. Extractors are pure: no I/O, no shared
//! state. A broken candidate element is logged and skipped; only a page that
//! cannot be interpreted at all is an error.

mod degewo;
mod gesobau;
mod gewobag;
mod inberlin;
mod stadtundland;

use std::collections::HashSet;
use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Attributes, ExtractorKind, ListingRecord};
use crate::utils::http::FetchRequest;
use crate::utils::{absolute_link, text};

pub use degewo::DegewoExtractor;
pub use gesobau::GesobauExtractor;
pub use gewobag::GewobagExtractor;
pub use inberlin::InBerlinExtractor;
pub use stadtundland::StadtUndLandExtractor;

/// Maps one source's payload onto listing records.
pub trait SourceExtractor: Send + Sync {
    fn kind(&self) -> ExtractorKind;

    /// Request that fetches the source's listing page or API.
    fn request(&self, url: &str) -> FetchRequest {
        FetchRequest::get(url)
    }

    /// Parse a response body. The result holds each id at most once.
    fn extract(&self, ctx: &ExtractContext, body: &str) -> Result<Vec<ListingRecord>>;
}

/// Build the extractor for a configured kind.
pub fn extractor_for(kind: ExtractorKind) -> Arc<dyn SourceExtractor> {
    match kind {
        ExtractorKind::InBerlin => Arc::new(InBerlinExtractor),
        ExtractorKind::Degewo => Arc::new(DegewoExtractor),
        ExtractorKind::Gesobau => Arc::new(GesobauExtractor),
        ExtractorKind::Gewobag => Arc::new(GewobagExtractor),
        ExtractorKind::StadtUndLand => Arc::new(StadtUndLandExtractor),
    }
}

/// Source identity handed to an extractor.
#[derive(Debug, Clone)]
pub struct ExtractContext {
    /// Source name stamped on every record
    pub source: String,
    /// Base for resolving relative links
    pub base_url: Url,
}

impl ExtractContext {
    pub fn new(source: impl Into<String>, base_url: &str) -> Result<Self> {
        Ok(Self {
            source: source.into(),
            base_url: Url::parse(base_url)?,
        })
    }

    /// Resolve an optional href against the source's base URL.
    pub fn link(&self, href: Option<&str>) -> Option<String> {
        absolute_link(&self.base_url, href)
    }

    pub fn record(
        &self,
        id: impl Into<String>,
        title: impl Into<String>,
        link: Option<String>,
        attributes: Attributes,
    ) -> ListingRecord {
        ListingRecord::new(self.source.as_str(), id, title, link, attributes)
    }

    /// Keep the records that parsed, logging the ones that did not.
    pub fn collect<I>(&self, candidates: I) -> Vec<ListingRecord>
    where
        I: IntoIterator<Item = Result<ListingRecord>>,
    {
        let mut records = Vec::new();
        for candidate in candidates {
            match candidate {
                Ok(record) => records.push(record),
                Err(error) => log::warn!("Skipping listing: {}", error),
            }
        }
        records
    }

    /// Error for a candidate element that lacks something essential.
    pub fn skip(&self, message: impl std::fmt::Display) -> AppError {
        AppError::extraction(self.source.as_str(), message)
    }
}

/// Drop later records that repeat an id, keeping the first.
pub fn dedup_by_id(records: Vec<ListingRecord>) -> Vec<ListingRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let fresh = seen.insert(record.id.clone());
            if !fresh {
                log::debug!(
                    "{}: dropping duplicate within batch: {} - {}",
                    record.source,
                    record.id,
                    record.title
                );
            }
            fresh
        })
        .collect()
}

/// Fail when the page is a "high traffic" error page served with a 200.
pub fn detect_high_traffic(document: &Html) -> Result<()> {
    let banner = parse_selector("div.error-message")?;
    if document.select(&banner).next().is_none() {
        return Ok(());
    }
    let page_text: String = document.root_element().text().collect();
    if page_text.to_lowercase().contains("high traffic") {
        return Err(AppError::high_traffic("Website experiencing high traffic"));
    }
    Ok(())
}

pub(crate) fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Whitespace-normalized text content of an element.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect::<Vec<_>>().join(" ");
    text::normalize_whitespace(&raw)
}

/// Text of the first descendant matching `selector`, if not blank.
pub(crate) fn select_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

/// Texts of all matching descendants joined with `", "`.
pub(crate) fn joined_texts(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let parts: Vec<String> = element
        .select(selector)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

/// Non-blank attribute value.
pub(crate) fn attr<'a>(element: ElementRef<'a>, name: &str) -> Option<&'a str> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Scalar JSON value as trimmed text; null, blank and containers yield `None`.
pub(crate) fn json_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// JSON amount rendered as German currency; unparsable strings are kept.
pub(crate) fn json_euro(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => n.as_f64().map(text::format_euro),
        Value::String(s) => text::euro_from_text(s),
        _ => None,
    }
}
