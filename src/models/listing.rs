//! Normalized listing record shared by every source.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::text;

/// Title used when a source exposes none.
pub const NO_TITLE: &str = "No title";

/// Canonical attribute keys.
///
/// Extractors map their site-specific labels onto this vocabulary so filtering
/// and formatting never see per-site terminology. Declaration order is the
/// display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Address,
    District,
    Rooms,
    Area,
    RentCold,
    RentWarm,
    RentAdditional,
    RentHeating,
    RentTotal,
    AvailableFrom,
    Provider,
    ObjectId,
    Features,
}

impl Field {
    /// All fields in display order.
    pub const ALL: [Field; 13] = [
        Field::Address,
        Field::District,
        Field::Rooms,
        Field::Area,
        Field::RentCold,
        Field::RentWarm,
        Field::RentAdditional,
        Field::RentHeating,
        Field::RentTotal,
        Field::AvailableFrom,
        Field::Provider,
        Field::ObjectId,
        Field::Features,
    ];

    /// Canonical key string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Address => "address",
            Field::District => "district",
            Field::Rooms => "rooms",
            Field::Area => "area",
            Field::RentCold => "rent_cold",
            Field::RentWarm => "rent_warm",
            Field::RentAdditional => "rent_additional",
            Field::RentHeating => "rent_heating",
            Field::RentTotal => "rent_total",
            Field::AvailableFrom => "available_from",
            Field::Provider => "provider",
            Field::ObjectId => "object_id",
            Field::Features => "features",
        }
    }

    /// Map a German or English page label onto a canonical field.
    pub fn from_label(label: &str) -> Option<Field> {
        let label = label.trim().trim_end_matches(':').trim().to_lowercase();
        let field = match label.as_str() {
            "adresse" | "address" | "anschrift" => Field::Address,
            "bezirk" | "district" | "region" | "ortsteil" => Field::District,
            "zimmer" | "zimmeranzahl" | "rooms" | "räume" => Field::Rooms,
            "wohnfläche" | "fläche" | "area" | "größe" => Field::Area,
            "kaltmiete" | "nettokaltmiete" | "cold rent" => Field::RentCold,
            "warmmiete" | "gesamtmiete" | "warm rent" => Field::RentWarm,
            "nebenkosten" | "betriebskosten" => Field::RentAdditional,
            "heizkosten" => Field::RentHeating,
            "miete gesamt" | "total rent" => Field::RentTotal,
            "verfügbar ab" | "frei ab" | "bezugsfertig ab" | "verfügbarkeit" => {
                Field::AvailableFrom
            }
            "anbieter" | "vermieter" | "provider" => Field::Provider,
            "objekt-id" | "objektnummer" | "object id" => Field::ObjectId,
            "besonderheiten" | "features" | "ausstattung" | "merkmale" => Field::Features,
            _ => return None,
        };
        Some(field)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered attribute map that never stores blank values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<Field, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a trimmed value; blank values are ignored.
    ///
    /// Returns `true` when the value was stored.
    pub fn insert(&mut self, field: Field, value: impl AsRef<str>) -> bool {
        let value = text::normalize_whitespace(value.as_ref());
        if value.is_empty() {
            return false;
        }
        self.0.insert(field, value);
        true
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }
}

/// A single flat advertisement, normalized across sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    /// Upstream-derived identifier, unique within a source
    pub id: String,

    /// Headline, `"No title"` when absent
    pub title: String,

    /// Absolute URL of the detail page
    pub link: Option<String>,

    /// Canonical attribute set
    pub attributes: Attributes,

    /// Whether a WBS (eligibility certificate) is required
    pub requires_eligibility_certificate: bool,

    /// Name of the originating source
    pub source: String,
}

impl ListingRecord {
    /// Build a record and derive the WBS flag from title and attributes.
    pub fn new(
        source: impl Into<String>,
        id: impl Into<String>,
        title: impl Into<String>,
        link: Option<String>,
        attributes: Attributes,
    ) -> Self {
        let title = text::normalize_whitespace(&title.into());
        let title = if title.is_empty() {
            NO_TITLE.to_string()
        } else {
            title
        };
        let requires_eligibility_certificate =
            text::requires_eligibility_certificate(&Self::eligibility_text(&title, &attributes));

        Self {
            id: id.into(),
            title,
            link: link.filter(|l| !l.trim().is_empty()),
            attributes,
            requires_eligibility_certificate,
            source: source.into(),
        }
    }

    /// Add free text that only feeds the WBS check (e.g. a raw `wbs` field).
    pub fn with_eligibility_hint(mut self, hint: &str) -> Self {
        let combined = format!(
            "{} {}",
            Self::eligibility_text(&self.title, &self.attributes),
            hint
        );
        self.requires_eligibility_certificate = text::requires_eligibility_certificate(&combined);
        self
    }

    /// Source-qualified identifier used by the seen set.
    pub fn key(&self) -> String {
        qualified_key(&self.source, &self.id)
    }

    /// Room count read from the `rooms` attribute, if any.
    pub fn room_count(&self) -> Option<f64> {
        self.attributes.get(Field::Rooms).and_then(text::first_number)
    }

    fn eligibility_text(title: &str, attributes: &Attributes) -> String {
        std::iter::once(title)
            .chain(attributes.values())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Join a source name and a source-local id into a process-wide key.
pub fn qualified_key(source: &str, id: &str) -> String {
    format!("{source}:{id}")
}
