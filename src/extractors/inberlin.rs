// src/extractors/inberlin.rs

//! InBerlinWohnen apartment finder.
//!
//! The page embeds its listings as Livewire component state in
//! `wire:snapshot` attributes. When that state is missing the page is scanned
//! with progressively looser DOM strategies. Strategies run in order and the
//! first one producing records wins.
//!
//! ## Livewire merge
//!
//! Summary components carry `data.item[0]`; detail components carry
//! `data.itemId` plus address fields. Details are merged into the summary with
//! the same upstream `id`. When several details claim one id the last one in
//! document order wins; no attempt is made to reconcile them.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use super::{
    ExtractContext, SourceExtractor, attr, dedup_by_id, detect_high_traffic, element_text,
    joined_texts, json_euro, json_text, parse_selector,
};
use crate::error::Result;
use crate::models::{Attributes, ExtractorKind, Field, ListingRecord};
use crate::utils::http::FetchRequest;
use crate::utils::{stable_id, text};

/// DOM strategies look at no more candidates than this.
const MAX_CANDIDATES: usize = 20;

const SNAPSHOT_ATTR: &str = "wire:snapshot";

const AVAILABILITY_KEYS: &[&str] = &[
    "occupationDate",
    "availableFrom",
    "available",
    "freeFrom",
    "availabilityDate",
    "moveInDate",
    "vacancy",
];

const PLACEHOLDERS: &[&str] = &["null", "none", "n/a"];

const TITLE_SELECTORS: &[&str] = &["h2", "h3", "h4", ".title", ".headline", ".apartment-title"];

const LINK_SELECTORS: &[&str] = &["a.org-but[href]", "a.btn[href]", "a.button[href]", "a.link[href]", "a[href]"];

const FEATURE_SELECTORS: &[&str] = &["span.hackerl", "li.feature", "div.amenity", "span.tag"];

const DETAIL_CONTAINERS: &str =
    "div.details, div.apartment-details, div.property-details, div.info, dl, div.data-table";

const CARD_CLASS_KEYWORDS: &[&str] = &["apartment", "flat", "card", "item", "listing", "teaser"];

const CARD_TEXT_KEYWORDS: &[&str] = &["zimmer", "miete", "m²", "euro"];

const DETAIL_LINK_KEYWORDS: &[&str] = &["wohnung", "apartment", "detail"];

static ROOMS_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:zimmer|raum|rooms?)").expect("static regex")
});

static AREA_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*m²").expect("static regex"));

static PRICE_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*€").expect("static regex"));

/// One way of locating listings on the page; an empty result means no match.
struct Strategy {
    name: &'static str,
    run: fn(&ExtractContext, &Html) -> Result<Vec<ListingRecord>>,
}

const STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "livewire",
        run: livewire_records,
    },
    Strategy {
        name: "legacy cards",
        run: legacy_cards,
    },
    Strategy {
        name: "text blocks",
        run: text_blocks,
    },
    Strategy {
        name: "class cards",
        run: class_cards,
    },
    Strategy {
        name: "detail links",
        run: detail_links,
    },
];

pub struct InBerlinExtractor;

impl SourceExtractor for InBerlinExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::InBerlin
    }

    fn request(&self, url: &str) -> FetchRequest {
        FetchRequest::get(url)
            .header(
                "User-Agent",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            )
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
            )
            .header("Accept-Language", "de-DE,de;q=0.9,en;q=0.8")
            .header("DNT", "1")
            .header("Upgrade-Insecure-Requests", "1")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-User", "?1")
            .header("Cache-Control", "max-age=0")
    }

    fn extract(&self, ctx: &ExtractContext, body: &str) -> Result<Vec<ListingRecord>> {
        let document = Html::parse_document(body);
        detect_high_traffic(&document)?;

        for strategy in STRATEGIES {
            let records = (strategy.run)(ctx, &document)?;
            if records.is_empty() {
                log::debug!("{}: {} strategy found nothing", ctx.source, strategy.name);
                continue;
            }
            let records = dedup_by_id(records);
            log::info!(
                "{}: extracted {} listings via {}",
                ctx.source,
                records.len(),
                strategy.name
            );
            return Ok(records);
        }

        log::info!("{}: no listings found", ctx.source);
        Ok(Vec::new())
    }
}

// --- Livewire ---

fn livewire_records(ctx: &ExtractContext, document: &Html) -> Result<Vec<ListingRecord>> {
    let any = parse_selector("*")?;
    let mut summaries: Vec<Map<String, Value>> = Vec::new();
    let mut details: HashMap<String, Map<String, Value>> = HashMap::new();

    for element in document.select(&any) {
        let Some(raw) = element.value().attr(SNAPSHOT_ATTR) else {
            continue;
        };
        let snapshot: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                log::debug!("{}: unreadable Livewire snapshot: {}", ctx.source, e);
                continue;
            }
        };
        let Some(data) = snapshot.get("data").and_then(Value::as_object) else {
            continue;
        };

        if let Some(item) = data.get("item") {
            if let Some(Value::Object(summary)) = item.as_array().and_then(|a| a.first()) {
                summaries.push(summary.clone());
            }
        } else if let Some(item_id) = json_text(data.get("itemId")) {
            details.insert(item_id, data.clone());
        }
    }

    let mut ids = HashSet::new();
    let repeated = summaries
        .iter()
        .filter_map(|s| json_text(s.get("id")))
        .filter(|id| !ids.insert(id.clone()))
        .count();
    if repeated > 0 {
        log::warn!(
            "{}: {} repeated apartment id(s) in Livewire data",
            ctx.source,
            repeated
        );
    }

    let apartments = summaries.into_iter().map(|mut apartment| {
        let detail = json_text(apartment.get("id")).and_then(|id| details.get(&id));
        if let Some(detail) = detail {
            apartment.extend(detail.clone());
        }
        apartment
    });

    Ok(ctx.collect(apartments.map(|apartment| parse_apartment(ctx, &apartment))))
}

fn parse_apartment(ctx: &ExtractContext, apartment: &Map<String, Value>) -> Result<ListingRecord> {
    let title = json_text(apartment.get("title")).ok_or_else(|| ctx.skip("apartment without title"))?;
    let object_id =
        json_text(apartment.get("objectId")).ok_or_else(|| ctx.skip("apartment without objectId"))?;
    let link = ctx.link(json_text(apartment.get("deeplink")).as_deref());

    let mut attributes = Attributes::new();
    attributes.insert(Field::Address, address_line(apartment));

    if let Some(rooms) = json_text(apartment.get("rooms")) {
        attributes.insert(Field::Rooms, text::decimal_comma(&rooms));
    }
    if let Some(area) = json_text(apartment.get("area")) {
        attributes.insert(Field::Area, format!("{} m²", text::decimal_comma(&area)));
    }

    // a later key overrides an earlier one, so rentGross beats rentTotal
    for (key, field) in [
        ("rentNet", Field::RentCold),
        ("rentTotal", Field::RentWarm),
        ("rentGross", Field::RentWarm),
        ("additionalCosts", Field::RentAdditional),
    ] {
        if let Some(amount) = json_euro(apartment.get(key)) {
            attributes.insert(field, amount);
        }
    }

    let available = AVAILABILITY_KEYS
        .iter()
        .filter_map(|key| json_text(apartment.get(*key)))
        .find(|value| !PLACEHOLDERS.contains(&value.to_lowercase().as_str()));
    if let Some(available) = available {
        attributes.insert(Field::AvailableFrom, available);
    }

    if let Some(provider) = provider(apartment.get("company")) {
        attributes.insert(Field::Provider, provider);
    }
    attributes.insert(Field::ObjectId, &object_id);

    let record = ctx.record(object_id, title, link, attributes);
    Ok(match apartment.get("wbs") {
        Some(Value::Bool(true)) => record.with_eligibility_hint("WBS"),
        other => match json_text(other) {
            Some(hint) => record.with_eligibility_hint(&hint),
            None => record,
        },
    })
}

/// Street, number, zip code and district, from top-level fields or a nested
/// `address` object.
fn address_line(apartment: &Map<String, Value>) -> String {
    const KEYS: [&str; 4] = ["street", "number", "zipCode", "district"];
    let parts = |source: &Map<String, Value>| -> Vec<String> {
        KEYS.iter().filter_map(|key| json_text(source.get(*key))).collect()
    };

    let mut line = parts(apartment);
    if line.is_empty() {
        if let Some(Value::Object(nested)) = apartment.get("address") {
            line = parts(nested);
        }
    }
    line.join(" ")
}

fn provider(company: Option<&Value>) -> Option<String> {
    match company? {
        Value::Array(entries) => entries
            .first()
            .and_then(|entry| json_text(entry.get("name"))),
        Value::String(name) => Some(name.trim().to_string()),
        _ => None,
    }
}

// --- DOM fallbacks ---

fn legacy_cards(ctx: &ExtractContext, document: &Html) -> Result<Vec<ListingRecord>> {
    let cards = parse_selector("li[id^='flat_']")?;
    let candidates: Vec<_> = document.select(&cards).take(MAX_CANDIDATES).collect();
    dom_records(ctx, candidates)
}

fn text_blocks(ctx: &ExtractContext, document: &Html) -> Result<Vec<ListingRecord>> {
    let body = parse_selector("body *")?;
    let candidates = document
        .select(&body)
        .filter(|el| !matches!(el.value().name(), "script" | "style" | "noscript"))
        .filter(|el| {
            let text = element_text(*el).to_lowercase();
            let zimmer_nodes = el
                .text()
                .filter(|t| t.to_lowercase().contains("zimmer"))
                .count();
            (text.contains("zimmer") || text.contains("raum"))
                && text.contains("m²")
                && zimmer_nodes <= 2
        });
    dom_records(ctx, innermost_titled(candidates)?)
}

fn class_cards(ctx: &ExtractContext, document: &Html) -> Result<Vec<ListingRecord>> {
    let cards = parse_selector("article[class], div[class]")?;
    let candidates = document.select(&cards).filter(|el| {
        let class = el.value().attr("class").unwrap_or_default().to_lowercase();
        let text = element_text(*el).to_lowercase();
        CARD_CLASS_KEYWORDS.iter().any(|k| class.contains(k))
            && CARD_TEXT_KEYWORDS.iter().any(|k| text.contains(k))
    });
    dom_records(ctx, innermost_titled(candidates)?)
}

fn detail_links(ctx: &ExtractContext, document: &Html) -> Result<Vec<ListingRecord>> {
    let links = parse_selector("a[href]")?;
    let mut seen = HashSet::new();
    let candidates = document
        .select(&links)
        .filter(|a| {
            let href = a.value().attr("href").unwrap_or_default();
            DETAIL_LINK_KEYWORDS.iter().any(|k| href.contains(k))
        })
        .filter_map(|a| a.parent().and_then(ElementRef::wrap))
        .filter(|parent| seen.insert(parent.id()));
    dom_records(ctx, innermost_titled(candidates)?)
}

/// Titled candidates that contain no other titled candidate, capped.
///
/// Wrapper elements around a listing match the same heuristics as the
/// listing itself; keeping the innermost one avoids one record per wrapper.
fn innermost_titled<'a>(candidates: impl Iterator<Item = ElementRef<'a>>) -> Result<Vec<ElementRef<'a>>> {
    let titles = DomSelectors::titles()?;
    let titled: Vec<ElementRef<'a>> = candidates
        .filter(|el| first_title(*el, &titles).is_some())
        .collect();

    let innermost = titled
        .iter()
        .filter(|outer| {
            !titled.iter().any(|inner| {
                inner.id() != outer.id() && inner.ancestors().any(|a| a.id() == outer.id())
            })
        })
        .copied()
        .take(MAX_CANDIDATES)
        .collect();
    Ok(innermost)
}

struct DomSelectors {
    titles: Vec<Selector>,
    links: Vec<Selector>,
    features: Vec<Selector>,
    any_link: Selector,
    table_rows: Selector,
    th: Selector,
    td: Selector,
    detail_container: Selector,
    dt: Selector,
    dd: Selector,
}

impl DomSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            titles: Self::titles()?,
            links: parse_all(LINK_SELECTORS)?,
            features: parse_all(FEATURE_SELECTORS)?,
            any_link: parse_selector("a[href]")?,
            table_rows: parse_selector("table.tb-small-data tr")?,
            th: parse_selector("th")?,
            td: parse_selector("td")?,
            detail_container: parse_selector(DETAIL_CONTAINERS)?,
            dt: parse_selector("dt")?,
            dd: parse_selector("dd")?,
        })
    }

    fn titles() -> Result<Vec<Selector>> {
        parse_all(TITLE_SELECTORS)
    }
}

fn parse_all(selectors: &[&str]) -> Result<Vec<Selector>> {
    selectors.iter().map(|s| parse_selector(s)).collect()
}

fn first_title(element: ElementRef<'_>, titles: &[Selector]) -> Option<String> {
    titles.iter().find_map(|sel| {
        element
            .select(sel)
            .map(element_text)
            .find(|t| !t.is_empty())
    })
}

fn dom_records(ctx: &ExtractContext, candidates: Vec<ElementRef<'_>>) -> Result<Vec<ListingRecord>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let sel = DomSelectors::new()?;
    Ok(ctx.collect(
        candidates
            .into_iter()
            .map(|candidate| parse_candidate(ctx, &sel, candidate)),
    ))
}

fn parse_candidate(ctx: &ExtractContext, sel: &DomSelectors, element: ElementRef<'_>) -> Result<ListingRecord> {
    let title = first_title(element, &sel.titles).ok_or_else(|| ctx.skip("candidate without title"))?;
    let full_text = element_text(element);

    let id = match attr(element, "id") {
        Some(id) => id.to_string(),
        None => match element.select(&sel.any_link).next().and_then(|a| attr(a, "href")) {
            Some(href) => stable_id(href),
            None => stable_id(text::truncate_chars(&full_text, 100)),
        },
    };

    let href = sel
        .links
        .iter()
        .find_map(|s| element.select(s).next().and_then(|a| attr(a, "href")));
    let link = ctx.link(href);

    let mut attributes = Attributes::new();
    let mut hints = Vec::new();

    for row in element.select(&sel.table_rows) {
        let (Some(th), Some(td)) = (row.select(&sel.th).next(), row.select(&sel.td).next()) else {
            continue;
        };
        labelled(&mut attributes, &mut hints, &element_text(th), &element_text(td));
    }

    if attributes.is_empty() {
        if let Some(container) = element.select(&sel.detail_container).next() {
            let terms: Vec<_> = container.select(&sel.dt).map(element_text).collect();
            let values: Vec<_> = container.select(&sel.dd).map(element_text).collect();
            if !terms.is_empty() && terms.len() == values.len() {
                for (term, value) in terms.iter().zip(&values) {
                    labelled(&mut attributes, &mut hints, term, value);
                }
            }
        }
    }

    if let Some(features) = sel.features.iter().find_map(|s| joined_texts(element, s)) {
        attributes.insert(Field::Features, features);
    }

    if attributes.is_empty() {
        text_fallback(&mut attributes, &full_text);
    }

    hints.push(full_text);
    Ok(ctx
        .record(id, title, link, attributes)
        .with_eligibility_hint(&hints.join(" ")))
}

/// Store a labelled value under its canonical field; WBS rows become hints.
fn labelled(attributes: &mut Attributes, hints: &mut Vec<String>, label: &str, value: &str) {
    match Field::from_label(label) {
        Some(field) => {
            attributes.insert(field, value);
        }
        None if label.trim_end_matches(':').trim().eq_ignore_ascii_case("wbs") => {
            hints.push(format!("WBS: {value}"));
        }
        None => log::debug!("Ignoring unknown label '{}'", label),
    }
}

fn text_fallback(attributes: &mut Attributes, text: &str) {
    if let Some(m) = ROOMS_TEXT.captures(text).and_then(|c| c.get(1)) {
        attributes.insert(Field::Rooms, m.as_str());
    }
    if let Some(m) = AREA_TEXT.captures(text).and_then(|c| c.get(1)) {
        attributes.insert(Field::Area, format!("{} m²", m.as_str()));
    }
    if let Some(m) = PRICE_TEXT.captures(text).and_then(|c| c.get(1)) {
        attributes.insert(Field::RentWarm, format!("{} €", m.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::AppError;
    use crate::extractors::fixtures::ctx;

    fn extract(body: &str) -> Vec<ListingRecord> {
        InBerlinExtractor
            .extract(
                &ctx("InBerlinWohnen", "https://inberlinwohnen.de/wohnungsfinder/"),
                body,
            )
            .unwrap()
    }

    fn snapshot(value: Value) -> String {
        let escaped = value
            .to_string()
            .replace('&', "&amp;")
            .replace('"', "&quot;");
        format!(r#"<div wire:snapshot="{escaped}"></div>"#)
    }

    fn page(parts: &[String]) -> String {
        format!("<html><body>{}</body></html>", parts.concat())
    }

    fn summary() -> Value {
        json!({ "data": { "item": [{
            "id": 11,
            "objectId": "WBM-0815",
            "title": "Neubau mit Balkon",
            "deeplink": "https://www.wbm.de/wohnungen/0815",
            "rooms": 2.5,
            "area": 67.3,
            "rentNet": "612,40",
            "rentTotal": 845.5,
            "additionalCosts": 120,
            "occupationDate": "null",
            "availableFrom": "01.11.2026",
            "company": [{ "name": " WBM " }, { "s": "arr" }],
            "wbs": false
        }, { "s": "arr" }] } })
    }

    fn detail(street: &str) -> Value {
        json!({ "data": {
            "itemId": 11,
            "street": street,
            "number": "2",
            "zipCode": "10115",
            "district": "Mitte"
        } })
    }

    #[test]
    fn test_livewire_summary_and_detail_merge() {
        let body = page(&[snapshot(summary()), snapshot(detail("Invalidenstr."))]);
        let records = extract(&body);
        assert_eq!(records.len(), 1);

        let flat = &records[0];
        assert_eq!(flat.id, "WBM-0815");
        assert_eq!(flat.title, "Neubau mit Balkon");
        assert_eq!(flat.link.as_deref(), Some("https://www.wbm.de/wohnungen/0815"));
        assert_eq!(
            flat.attributes.get(Field::Address),
            Some("Invalidenstr. 2 10115 Mitte")
        );
        assert_eq!(flat.attributes.get(Field::Rooms), Some("2,5"));
        assert_eq!(flat.attributes.get(Field::Area), Some("67,3 m²"));
        assert_eq!(flat.attributes.get(Field::RentCold), Some("612,40 €"));
        assert_eq!(flat.attributes.get(Field::RentWarm), Some("845,50 €"));
        assert_eq!(flat.attributes.get(Field::RentAdditional), Some("120,00 €"));
        assert_eq!(flat.attributes.get(Field::AvailableFrom), Some("01.11.2026"));
        assert_eq!(flat.attributes.get(Field::Provider), Some("WBM"));
        assert_eq!(flat.attributes.get(Field::ObjectId), Some("WBM-0815"));
        assert!(!flat.requires_eligibility_certificate);
    }

    #[test]
    fn test_livewire_last_detail_wins() {
        let body = page(&[
            snapshot(detail("Alte Str.")),
            snapshot(summary()),
            snapshot(detail("Neue Str.")),
        ]);
        let records = extract(&body);
        assert_eq!(
            records[0].attributes.get(Field::Address),
            Some("Neue Str. 2 10115 Mitte")
        );
    }

    #[test]
    fn test_livewire_gross_rent_overrides_total() {
        let mut item = summary();
        item["data"]["item"][0]["rentTotal"] = json!(800);
        item["data"]["item"][0]["rentGross"] = json!(900);

        let records = extract(&page(&[snapshot(item)]));
        assert_eq!(records[0].attributes.get(Field::RentWarm), Some("900,00 €"));
        assert_eq!(records[0].attributes.get(Field::RentCold), Some("612,40 €"));
    }

    #[test]
    fn test_livewire_nested_address_and_wbs() {
        let item = json!({ "data": { "item": [{
            "id": 12,
            "objectId": "HOWOGE-1",
            "title": "Seniorenwohnung",
            "address": { "street": "Ring", "number": "5" },
            "wbs": "WBS 100 erforderlich"
        }] } });
        let records = extract(&page(&[snapshot(item)]));
        assert_eq!(records[0].attributes.get(Field::Address), Some("Ring 5"));
        assert!(records[0].requires_eligibility_certificate);
        assert!(records[0].link.is_none());
    }

    #[test]
    fn test_livewire_duplicate_summaries_collapse() {
        let body = page(&[snapshot(summary()), snapshot(summary())]);
        assert_eq!(extract(&body).len(), 1);
    }

    #[test]
    fn test_livewire_without_title_is_skipped() {
        let item = json!({ "data": { "item": [{ "id": 1, "objectId": "X-1" }] } });
        let broken = r#"<div wire:snapshot="{not json"></div>"#.to_string();
        let records = extract(&page(&[broken, snapshot(item), snapshot(summary())]));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "WBM-0815");
    }

    const LEGACY_CARD: &str = r#"
        <li id="flat_123456" class="tb-merkflat ipg">
          <h2>2-Zimmer-Wohnung in Lichtenberg</h2>
          <a class="org-but" href="/wohnungsfinder/123456">Alle Details</a>
          <table class="tb-small-data">
            <tr><th>Adresse:</th><td>Frankfurter Allee 200, 10365 Berlin</td></tr>
            <tr><th>Zimmeranzahl:</th><td>2</td></tr>
            <tr><th>Wohnfläche:</th><td>58,20 m²</td></tr>
            <tr><th>Kaltmiete:</th><td>512,00 €</td></tr>
            <tr><th>Etage:</th><td>3</td></tr>
          </table>
          <span class="hackerl">Balkon</span><span class="hackerl">Aufzug</span>
        </li>
    "#;

    #[test]
    fn test_legacy_cards() {
        let records = extract(&format!("<html><body><ul>{LEGACY_CARD}</ul></body></html>"));
        assert_eq!(records.len(), 1);

        let flat = &records[0];
        assert_eq!(flat.id, "flat_123456");
        assert_eq!(flat.title, "2-Zimmer-Wohnung in Lichtenberg");
        assert_eq!(
            flat.link.as_deref(),
            Some("https://inberlinwohnen.de/wohnungsfinder/123456")
        );
        assert_eq!(
            flat.attributes.get(Field::Address),
            Some("Frankfurter Allee 200, 10365 Berlin")
        );
        assert_eq!(flat.attributes.get(Field::Rooms), Some("2"));
        assert_eq!(flat.attributes.get(Field::Area), Some("58,20 m²"));
        assert_eq!(flat.attributes.get(Field::RentCold), Some("512,00 €"));
        assert_eq!(flat.attributes.get(Field::Features), Some("Balkon, Aufzug"));
        assert_eq!(flat.attributes.len(), 5);
        assert!(!flat.requires_eligibility_certificate);
    }

    #[test]
    fn test_legacy_wbs_row() {
        let card = LEGACY_CARD.replace(
            "<tr><th>Etage:</th><td>3</td></tr>",
            "<tr><th>WBS:</th><td>erforderlich</td></tr>",
        );
        let records = extract(&format!("<html><body><ul>{card}</ul></body></html>"));
        assert!(records[0].requires_eligibility_certificate);
    }

    #[test]
    fn test_two_blocks_sharing_an_id_yield_one_record() {
        let records = extract(&format!(
            "<html><body><ul>{LEGACY_CARD}{LEGACY_CARD}</ul></body></html>"
        ));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "flat_123456");
    }

    #[test]
    fn test_text_block_fallback() {
        let body = r#"<html><body><section>
            <div id="apt-1"><h3>Schöne Wohnung</h3><p>2 Zimmer, 54 m², 700 €</p></div>
        </section></body></html>"#;
        let records = extract(body);
        assert_eq!(records.len(), 1);

        let flat = &records[0];
        assert_eq!(flat.id, "apt-1");
        assert_eq!(flat.attributes.get(Field::Rooms), Some("2"));
        assert_eq!(flat.attributes.get(Field::Area), Some("54 m²"));
        assert_eq!(flat.attributes.get(Field::RentWarm), Some("700 €"));
    }

    #[test]
    fn test_class_card_fallback() {
        let body = r#"<html><body>
            <div class="listing-card"><div class="card-body">
              <h4 class="title">Dachgeschoss</h4><span>Miete 900 euro</span>
              <a href="/expose/9">mehr</a>
            </div></div>
        </body></html>"#;
        let records = extract(body);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Dachgeschoss");
        assert_eq!(records[0].id, stable_id("/expose/9"));
        assert_eq!(
            records[0].link.as_deref(),
            Some("https://inberlinwohnen.de/expose/9")
        );
    }

    #[test]
    fn test_detail_link_fallback() {
        let body = r#"<html><body>
            <div><h3>Altbau Friedrichshain</h3><a href="/wohnungsfinder/detail/abc">Details</a></div>
        </body></html>"#;
        let records = extract(body);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, stable_id("/wohnungsfinder/detail/abc"));
    }

    #[test]
    fn test_dom_ids_are_stable_across_fetches() {
        let body = r#"<html><body>
            <div><h3>Altbau Friedrichshain</h3><a href="/wohnungsfinder/detail/abc">Details</a></div>
        </body></html>"#;
        assert_eq!(extract(body)[0].id, extract(body)[0].id);
    }

    #[test]
    fn test_page_without_listings() {
        assert!(extract("<html><body><p>Derzeit keine Angebote.</p></body></html>").is_empty());
    }

    #[test]
    fn test_high_traffic_page() {
        let body = r#"<html><body><div class="error-message">High traffic, please retry</div></body></html>"#;
        let result = InBerlinExtractor.extract(
            &ctx("InBerlinWohnen", "https://inberlinwohnen.de/wohnungsfinder/"),
            body,
        );
        assert!(matches!(result, Err(AppError::HighTraffic { .. })));
    }

    #[test]
    fn test_request_sends_navigation_headers() {
        let request = InBerlinExtractor.request("https://inberlinwohnen.de/wohnungsfinder/");
        assert!(request
            .headers
            .iter()
            .any(|(k, v)| k == "Sec-Fetch-Mode" && v == "navigate"));
    }
}
