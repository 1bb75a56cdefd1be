//! Degewo search results (server-rendered HTML).

use scraper::{ElementRef, Html};

use super::{
    ExtractContext, SourceExtractor, attr, dedup_by_id, detect_high_traffic, joined_texts,
    parse_selector, select_text,
};
use crate::error::Result;
use crate::models::{Attributes, ExtractorKind, Field, ListingRecord};
use crate::utils::stable_id;

const ID_PREFIX: &str = "immobilie-list-item-";

/// Property icons and the field each one labels.
const PROPERTY_ICONS: &[(&str, Field)] = &[
    ("i-room", Field::Rooms),
    ("i-squares", Field::Area),
    ("i-calendar2", Field::AvailableFrom),
];

pub struct DegewoExtractor;

impl SourceExtractor for DegewoExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Degewo
    }

    fn extract(&self, ctx: &ExtractContext, body: &str) -> Result<Vec<ListingRecord>> {
        let document = Html::parse_document(body);
        detect_high_traffic(&document)?;

        let cards = Selectors::new()?;
        let items: Vec<_> = document.select(&cards.item).collect();
        log::info!("{}: found {} listing elements", ctx.source, items.len());

        let records = ctx.collect(items.into_iter().map(|item| parse_item(ctx, &cards, item)));
        Ok(dedup_by_id(records))
    }
}

struct Selectors {
    item: scraper::Selector,
    title: scraper::Selector,
    link: scraper::Selector,
    address: scraper::Selector,
    tags: scraper::Selector,
    property: scraper::Selector,
    property_text: scraper::Selector,
    icon: scraper::Selector,
    price: scraper::Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            item: parse_selector("article.article-list__item--immosearch")?,
            title: parse_selector("h2.article__title")?,
            link: parse_selector("a[href]")?,
            address: parse_selector("span.article__meta")?,
            tags: parse_selector("li.article__tags-item")?,
            property: parse_selector("li.article__properties-item")?,
            property_text: parse_selector("span.text")?,
            icon: parse_selector("svg, svg *")?,
            price: parse_selector("div.article__price-tag span.price")?,
        })
    }
}

fn parse_item(ctx: &ExtractContext, sel: &Selectors, item: ElementRef<'_>) -> Result<ListingRecord> {
    let href = item.select(&sel.link).next().and_then(|a| attr(a, "href"));
    let link = ctx.link(href);

    let id = attr(item, "id")
        .map(|raw| raw.trim_start_matches(ID_PREFIX).to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| href.map(stable_id))
        .ok_or_else(|| ctx.skip("listing without id or link"))?;

    let title = select_text(item, &sel.title).unwrap_or_default();

    let mut attributes = Attributes::new();
    if let Some(address) = select_text(item, &sel.address) {
        attributes.insert(Field::Address, address);
    }
    if let Some(tags) = joined_texts(item, &sel.tags) {
        attributes.insert(Field::Features, tags);
    }
    for property in item.select(&sel.property) {
        let Some(field) = property_field(property, sel) else {
            continue;
        };
        if let Some(value) = select_text(property, &sel.property_text) {
            attributes.insert(field, value);
        }
    }
    if let Some(price) = select_text(item, &sel.price) {
        attributes.insert(Field::RentWarm, price);
    }

    Ok(ctx.record(id, title, link, attributes))
}

/// Field named by the icon reference inside a property item.
///
/// The icon may be referenced from the `<svg>` itself or a nested `<use>`,
/// as `href` or `xlink:href`.
fn property_field(property: ElementRef<'_>, sel: &Selectors) -> Option<Field> {
    property
        .select(&sel.icon)
        .flat_map(|icon| icon.value().attrs())
        .filter(|(name, _)| name.ends_with("href"))
        .find_map(|(_, value)| {
            PROPERTY_ICONS
                .iter()
                .find(|(marker, _)| value.contains(marker))
                .map(|(_, field)| *field)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::fixtures::ctx;

    const PAGE: &str = r##"
        <html><body>
        <article id="immobilie-list-item-1400-12345" class="article-list__item article-list__item--immosearch">
          <a href="/immosuche/details/wohnung-1400-12345">
            <h2 class="article__title">Helle 2-Zimmer-Wohnung mit Balkon</h2>
          </a>
          <span class="article__meta">Karl-Marx-Allee 1 | 10178 Berlin-Mitte</span>
          <ul class="article__tags">
            <li class="article__tags-item">Balkon/Loggia</li>
            <li class="article__tags-item">Aufzug</li>
          </ul>
          <ul class="article__properties">
            <li class="article__properties-item"><svg><use xlink:href="#i-room"></use></svg><span class="text">2 Zimmer</span></li>
            <li class="article__properties-item"><svg><use xlink:href="#i-squares"></use></svg><span class="text">61,5 m²</span></li>
            <li class="article__properties-item"><svg><use xlink:href="#i-calendar2"></use></svg><span class="text">ab sofort</span></li>
          </ul>
          <div class="article__price-tag"><span class="price">845,20 €</span></div>
        </article>
        <article id="immobilie-list-item-1400-99999" class="article-list__item article-list__item--immosearch">
          <a href="https://www.degewo.de/immosuche/details/wohnung-1400-99999">
            <h2 class="article__title">Seniorenwohnung, WBS erforderlich</h2>
          </a>
        </article>
        </body></html>
    "##;

    fn extract(body: &str) -> Vec<ListingRecord> {
        DegewoExtractor
            .extract(&ctx("Degewo", "https://www.degewo.de/immosuche"), body)
            .unwrap()
    }

    #[test]
    fn test_extracts_listing_fields() {
        let records = extract(PAGE);
        assert_eq!(records.len(), 2);

        let flat = &records[0];
        assert_eq!(flat.id, "1400-12345");
        assert_eq!(flat.source, "Degewo");
        assert_eq!(flat.title, "Helle 2-Zimmer-Wohnung mit Balkon");
        assert_eq!(
            flat.link.as_deref(),
            Some("https://www.degewo.de/immosuche/details/wohnung-1400-12345")
        );
        assert_eq!(
            flat.attributes.get(Field::Address),
            Some("Karl-Marx-Allee 1 | 10178 Berlin-Mitte")
        );
        assert_eq!(flat.attributes.get(Field::Features), Some("Balkon/Loggia, Aufzug"));
        assert_eq!(flat.attributes.get(Field::Rooms), Some("2 Zimmer"));
        assert_eq!(flat.attributes.get(Field::Area), Some("61,5 m²"));
        assert_eq!(flat.attributes.get(Field::AvailableFrom), Some("ab sofort"));
        assert_eq!(flat.attributes.get(Field::RentWarm), Some("845,20 €"));
        assert!(!flat.requires_eligibility_certificate);
    }

    #[test]
    fn test_missing_fields_are_omitted() {
        let records = extract(PAGE);
        let sparse = &records[1];
        assert!(sparse.attributes.is_empty());
        assert!(sparse.requires_eligibility_certificate);
    }

    #[test]
    fn test_duplicate_blocks_collapse() {
        let article = r#"<article id="immobilie-list-item-7" class="article-list__item article-list__item--immosearch"><h2 class="article__title">Flat</h2></article>"#;
        let page = format!("<html><body>{article}{article}</body></html>");
        let records = extract(&page);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "7");
    }

    #[test]
    fn test_id_is_stable_across_fetches() {
        let first = extract(PAGE);
        let second = extract(&PAGE.replace("845,20 €", "850,00 €"));
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn test_empty_page() {
        assert!(extract("<html><body><p>Keine Ergebnisse</p></body></html>").is_empty());
    }
}
