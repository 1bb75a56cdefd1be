//! Stadt und Land search API (JSON over POST).

use serde_json::{Value, json};
use url::Url;

use super::{ExtractContext, SourceExtractor, dedup_by_id, json_euro, json_text};
use crate::error::{AppError, Result};
use crate::models::{Attributes, ExtractorKind, Field, ListingRecord};
use crate::utils::http::FetchRequest;
use crate::utils::text;

/// Public detail pages live on the main site, not on the API host.
const LISTING_BASE: &str = "https://stadtundland.de/wohnungssuche/";
const ORIGIN: &str = "https://stadtundland.de";
const REFERER: &str = "https://stadtundland.de/wohnungssuche";

/// Feature flags and their German labels.
const FEATURE_FLAGS: &[(&str, &str)] = &[
    ("wheelchairFriendly", "Rollstuhlgerecht"),
    ("seniorsFriendly", "Seniorengerecht"),
    ("barrierFree", "Barrierefrei"),
];

pub struct StadtUndLandExtractor;

impl SourceExtractor for StadtUndLandExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::StadtUndLand
    }

    fn request(&self, url: &str) -> FetchRequest {
        FetchRequest::post_json(url, json!({ "offset": 0, "cat": "wohnung" }))
            .header("Cache-Control", "max-age=0")
            .header("Origin", ORIGIN)
            .header("Referer", REFERER)
            .header("Sec-Fetch-Dest", "empty")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "cross-site")
    }

    fn extract(&self, ctx: &ExtractContext, body: &str) -> Result<Vec<ListingRecord>> {
        let payload: Value = serde_json::from_str(body)
            .map_err(|e| AppError::extraction(ctx.source.as_str(), format!("invalid JSON: {e}")))?;
        let Some(items) = payload.get("data").and_then(Value::as_array) else {
            log::info!("{}: no listings in response", ctx.source);
            return Ok(Vec::new());
        };

        let records = ctx.collect(items.iter().map(|item| parse_item(ctx, item)));
        log::info!("{}: found {} listings", ctx.source, records.len());
        Ok(dedup_by_id(records))
    }
}

fn parse_item(ctx: &ExtractContext, item: &Value) -> Result<ListingRecord> {
    let details = item.get("details").unwrap_or(&Value::Null);
    let costs = item.get("costs").unwrap_or(&Value::Null);
    let address = item.get("address").unwrap_or(&Value::Null);

    let id = json_text(details.get("immoNumber")).ok_or_else(|| ctx.skip("listing without immoNumber"))?;
    let title = json_text(item.get("headline")).ok_or_else(|| ctx.skip("listing without headline"))?;

    let mut attributes = Attributes::new();
    let address_line: Vec<String> = ["street", "house_number", "precinct", "postal_code", "city"]
        .iter()
        .filter_map(|key| json_text(address.get(*key)))
        .collect();
    attributes.insert(Field::Address, address_line.join(", "));

    if let Some(rooms) = json_text(details.get("rooms")) {
        attributes.insert(Field::Rooms, rooms);
    }
    if let Some(area) = json_text(details.get("livingSpace")) {
        attributes.insert(Field::Area, format!("{} m²", text::decimal_comma(&area)));
    }
    for (key, field) in [
        ("coldRent", Field::RentCold),
        ("additionalCosts", Field::RentAdditional),
        ("heatingCosts", Field::RentHeating),
        ("totalRent", Field::RentTotal),
    ] {
        if let Some(amount) = json_euro(costs.get(key)) {
            attributes.insert(field, amount);
        }
    }

    let features: Vec<&str> = FEATURE_FLAGS
        .iter()
        .filter(|(flag, _)| details.get(*flag).is_some_and(truthy))
        .map(|(_, label)| *label)
        .collect();
    attributes.insert(Field::Features, features.join(", "));

    Ok(ctx.record(id.clone(), title, Some(listing_link(&id)), attributes))
}

/// Detail page URL with the id as one percent-encoded path segment.
fn listing_link(id: &str) -> String {
    match Url::parse(LISTING_BASE) {
        Ok(mut url) => {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push(id);
            }
            url.to_string()
        }
        Err(_) => format!("{LISTING_BASE}{id}"),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::fixtures::ctx;
    use crate::utils::http::Method;

    const API: &str = "https://d2396ha8oiavw0.cloudfront.net/sul-main/immoSearch";

    fn extract(body: &str) -> Result<Vec<ListingRecord>> {
        StadtUndLandExtractor.extract(&ctx("Stadt und Land", API), body)
    }

    #[test]
    fn test_request_is_json_post() {
        let request = StadtUndLandExtractor.request(API);
        assert_eq!(request.method, Method::Post);
        assert_eq!(
            request.json_body,
            Some(json!({ "offset": 0, "cat": "wohnung" }))
        );
        assert!(request.headers.iter().any(|(k, v)| k == "Origin" && v == ORIGIN));
    }

    #[test]
    fn test_extracts_listing_fields() {
        let body = json!({
            "data": [{
                "headline": "Familienwohnung in Neukölln",
                "details": {
                    "immoNumber": "1/2345/67",
                    "rooms": 3,
                    "livingSpace": 82.5,
                    "barrierFree": true,
                    "seniorsFriendly": false
                },
                "costs": {
                    "coldRent": 1234.5,
                    "additionalCosts": "210,00",
                    "heatingCosts": 95,
                    "totalRent": null
                },
                "address": {
                    "street": "Sonnenallee",
                    "house_number": "101",
                    "precinct": "Neukölln",
                    "postal_code": "12045",
                    "city": "Berlin"
                }
            }]
        })
        .to_string();

        let records = extract(&body).unwrap();
        assert_eq!(records.len(), 1);

        let flat = &records[0];
        assert_eq!(flat.id, "1/2345/67");
        assert_eq!(flat.source, "Stadt und Land");
        assert_eq!(
            flat.link.as_deref(),
            Some("https://stadtundland.de/wohnungssuche/1%2F2345%2F67")
        );
        assert_eq!(
            flat.attributes.get(Field::Address),
            Some("Sonnenallee, 101, Neukölln, 12045, Berlin")
        );
        assert_eq!(flat.attributes.get(Field::Rooms), Some("3"));
        assert_eq!(flat.attributes.get(Field::Area), Some("82,5 m²"));
        assert_eq!(flat.attributes.get(Field::RentCold), Some("1.234,50 €"));
        assert_eq!(flat.attributes.get(Field::RentAdditional), Some("210,00 €"));
        assert_eq!(flat.attributes.get(Field::RentHeating), Some("95,00 €"));
        assert!(!flat.attributes.contains(Field::RentTotal));
        assert_eq!(flat.attributes.get(Field::Features), Some("Barrierefrei"));
    }

    #[test]
    fn test_items_without_id_or_headline_are_skipped() {
        let body = json!({
            "data": [
                { "headline": "No id", "details": {} },
                { "details": { "immoNumber": "42" } },
                { "headline": "Ok", "details": { "immoNumber": 43 } }
            ]
        })
        .to_string();

        let records = extract(&body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "43");
        assert!(records[0].attributes.is_empty());
    }

    #[test]
    fn test_duplicate_ids_collapse() {
        let item = json!({ "headline": "Flat", "details": { "immoNumber": "7" } });
        let body = json!({ "data": [item.clone(), item] }).to_string();
        assert_eq!(extract(&body).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_data_is_empty() {
        assert!(extract(r#"{"total": 0}"#).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(matches!(
            extract("<html>maintenance</html>"),
            Err(AppError::Extraction { .. })
        ));
    }
}
