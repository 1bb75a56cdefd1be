//! Gewobag rental offers (`angebot` boxes).

use scraper::{ElementRef, Html, Selector};

use super::{
    ExtractContext, SourceExtractor, attr, dedup_by_id, detect_high_traffic, joined_texts,
    parse_selector, select_text,
};
use crate::error::Result;
use crate::models::{Attributes, ExtractorKind, Field, ListingRecord};
use crate::utils::stable_id;

const ID_PREFIX: &str = "post-";

/// Rows of the info table and the field each one fills.
const INFO_ROWS: &[(&str, Field)] = &[
    ("table.angebot-info tr.angebot-region td", Field::District),
    ("table.angebot-info tr.angebot-address address", Field::Address),
    ("table.angebot-info tr.angebot-area td", Field::Area),
    ("table.angebot-info tr.availability td", Field::AvailableFrom),
    ("table.angebot-info tr.angebot-kosten td", Field::RentWarm),
];

pub struct GewobagExtractor;

impl SourceExtractor for GewobagExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Gewobag
    }

    fn extract(&self, ctx: &ExtractContext, body: &str) -> Result<Vec<ListingRecord>> {
        let document = Html::parse_document(body);
        detect_high_traffic(&document)?;

        let item_sel = parse_selector("article.angebot-big-box")?;
        let title_sel = parse_selector("h3.angebot-title")?;
        let link_sel = parse_selector("a.read-more-link")?;
        let features_sel = parse_selector("table.angebot-info tr.angebot-characteristics li")?;
        let rows = INFO_ROWS
            .iter()
            .map(|(css, field)| Ok((parse_selector(css)?, *field)))
            .collect::<Result<Vec<_>>>()?;

        let items: Vec<_> = document.select(&item_sel).collect();
        log::info!("{}: found {} listing elements", ctx.source, items.len());

        let records = ctx.collect(items.into_iter().map(|item| {
            let title = select_text(item, &title_sel)
                .ok_or_else(|| ctx.skip("offer without title"))?;
            let href = item.select(&link_sel).next().and_then(|a| attr(a, "href"));
            let mut attributes = info_attributes(item, &rows);
            if let Some(features) = joined_texts(item, &features_sel) {
                attributes.insert(Field::Features, features);
            }
            let id = offer_id(item, href).ok_or_else(|| ctx.skip("offer without id"))?;
            Ok(ctx.record(id, title, ctx.link(href), attributes))
        }));
        Ok(dedup_by_id(records))
    }
}

fn offer_id(item: ElementRef<'_>, href: Option<&str>) -> Option<String> {
    attr(item, "id")
        .map(|raw| raw.trim_start_matches(ID_PREFIX).to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| href.map(stable_id))
}

fn info_attributes(item: ElementRef<'_>, rows: &[(Selector, Field)]) -> Attributes {
    let mut attributes = Attributes::new();
    for (selector, field) in rows {
        if let Some(value) = select_text(item, selector) {
            attributes.insert(*field, value);
        }
    }
    attributes
}
