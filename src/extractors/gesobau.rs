//! Gesobau apartment search (teaser list HTML).

use scraper::{ElementRef, Html, Selector};

use super::{
    ExtractContext, SourceExtractor, attr, dedup_by_id, detect_high_traffic, element_text,
    parse_selector, select_text,
};
use crate::error::Result;
use crate::models::{Attributes, ExtractorKind, Field, ListingRecord};
use crate::utils::stable_id;

pub struct GesobauExtractor;

impl SourceExtractor for GesobauExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Gesobau
    }

    fn extract(&self, ctx: &ExtractContext, body: &str) -> Result<Vec<ListingRecord>> {
        let document = Html::parse_document(body);
        detect_high_traffic(&document)?;

        let item_sel = parse_selector("div.teaserList__item")?;
        let title_sel = parse_selector("h3.basicTeaser__title a")?;
        let address_sel = parse_selector("p.basicTeaser__text")?;
        let region_sel = parse_selector("span.meta__region")?;
        let info_sel = parse_selector("div.apartment__info span")?;

        let items: Vec<_> = document.select(&item_sel).collect();
        log::info!("{}: found {} listing elements", ctx.source, items.len());

        let records = ctx.collect(items.into_iter().map(|item| {
            parse_item(ctx, item, &title_sel, &address_sel, &region_sel, &info_sel)
        }));
        Ok(dedup_by_id(records))
    }
}

fn parse_item(
    ctx: &ExtractContext,
    item: ElementRef<'_>,
    title_sel: &Selector,
    address_sel: &Selector,
    region_sel: &Selector,
    info_sel: &Selector,
) -> Result<ListingRecord> {
    let title_link = item
        .select(title_sel)
        .next()
        .ok_or_else(|| ctx.skip("teaser without title link"))?;
    let title = element_text(title_link);
    if title.is_empty() {
        return Err(ctx.skip("teaser with empty title"));
    }
    let link = ctx.link(attr(title_link, "href"));

    // the teaser text carries rent and area, so it only seeds the id without a href
    let id = attr(item, "id")
        .map(str::to_string)
        .or_else(|| attr(title_link, "href").map(stable_id))
        .unwrap_or_else(|| stable_id(&element_text(item)));

    let mut attributes = Attributes::new();
    if let Some(address) = select_text(item, address_sel) {
        attributes.insert(Field::Address, address);
    }
    if let Some(region) = select_text(item, region_sel) {
        attributes.insert(Field::District, region);
    }

    // rooms, area and warm rent, in this order. Fewer than three spans are
    // positionally ambiguous and all stay unset.
    let info: Vec<String> = item.select(info_sel).map(element_text).collect();
    if let [rooms, area, rent, ..] = info.as_slice() {
        attributes.insert(Field::Rooms, rooms);
        attributes.insert(Field::Area, area);
        attributes.insert(Field::RentWarm, rent);
    }

    Ok(ctx.record(id, title, link, attributes))
}
