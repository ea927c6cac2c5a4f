use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::dedupe_by_url;
use crate::context::RunContext;
use crate::ingest::types::{Delivery, Item, SourceAdapter};
use crate::ingest::{absolute_url, accept_title, normalize_text, with_query_param};
use crate::notify::format::render_listing;
use crate::state::SourceMeta;

pub const LABEL: &str = "COFIM";

static LISTING: Lazy<Selector> = Lazy::new(|| Selector::parse("#biens-listing").unwrap());
static BOX: Lazy<Selector> = Lazy::new(|| Selector::parse(".biens-box").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a.propertylink[href]").unwrap());
static FLAG: Lazy<Selector> = Lazy::new(|| Selector::parse("img.flag").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse(".biens-title h3").unwrap());
static PRICE: Lazy<Selector> = Lazy::new(|| Selector::parse(".biens-prix span").unwrap());
static TEASER: Lazy<Selector> = Lazy::new(|| Selector::parse(".uk-overlay-primary p").unwrap());

pub struct CofimAdapter {
    name: String,
    listing_url: Url,
    max_pages: u32,
}

impl CofimAdapter {
    pub fn new(name: &str, listing_url: &str, max_pages: u32) -> Result<Self> {
        let listing_url = Url::parse(listing_url)
            .with_context(|| format!("cofim: invalid listing_url `{listing_url}`"))?;
        Ok(Self {
            name: name.to_string(),
            listing_url,
            max_pages,
        })
    }

    /// Page 1 is the bare listing URL, later pages add `?page=N`.
    pub fn page_url(&self, page: u32) -> Result<String> {
        if page <= 1 {
            return Ok(self.listing_url.to_string());
        }
        with_query_param(self.listing_url.as_str(), "page", &page.to_string())
    }
}

/// Non-empty trimmed text nodes of an element.
fn text_lines(el: ElementRef<'_>) -> Vec<String> {
    el.text()
        .flat_map(|t| t.split('\n'))
        .map(normalize_text)
        .filter(|s| !s.is_empty())
        .collect()
}

fn first_text(el: ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel)
        .next()
        .map(|e| normalize_text(&e.text().collect::<Vec<_>>().join(" ")))
        .filter(|s| !s.is_empty())
}

/// Parse one listing page. Sold boxes (flag banner) are skipped.
pub fn parse_listing(source: &str, html: &str, base: &Url) -> Vec<Item> {
    let doc = Html::parse_document(html);
    let Some(listing) = doc.select(&LISTING).next() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for card in listing.select(&BOX) {
        let Some(href) = card
            .select(&LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        let Some(url) = absolute_url(base, href) else {
            continue;
        };

        let sold = card
            .select(&FLAG)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| src.to_lowercase().contains("banner-sold"))
            .unwrap_or(false);
        if sold {
            continue;
        }

        let lines = card.select(&TITLE).next().map(text_lines).unwrap_or_default();
        let title = lines.first().cloned().unwrap_or_default();
        if !accept_title(&title) {
            continue;
        }

        let mut item = Item::new(source, title, url);
        if let Some(location) = lines.get(1) {
            item.set_attr("location", location.clone());
        }
        if let Some(price) = first_text(card, &PRICE) {
            item.set_attr("price", price);
        }
        if let Some(teaser) = first_text(card, &TEASER) {
            item.set_attr("teaser", teaser);
        }
        out.push(item);
    }
    dedupe_by_url(out)
}

#[async_trait]
impl SourceAdapter for CofimAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_pages(&self) -> u32 {
        self.max_pages
    }

    async fn fetch_page(
        &mut self,
        ctx: &RunContext,
        _meta: &mut SourceMeta,
        page: u32,
    ) -> Result<Vec<Item>> {
        let url = self.page_url(page)?;
        let html = ctx.http.get_text(&url).await?;
        let items = parse_listing(&self.name, &html, &self.listing_url);
        tracing::debug!(source = %self.name, page, items = items.len(), "cofim page parsed");
        Ok(items)
    }

    fn format(&self, item: &Item) -> Delivery {
        Delivery::Deliver(render_listing(
            LABEL,
            item,
            &[("location", "Localisation"), ("price", "Prix"), ("teaser", "Résumé")],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body><div id="biens-listing">
      <div class="biens-box">
        <a class="propertylink" href="/fr/biens/101-boulangerie?utm_source=x"></a>
        <div class="biens-title"><h3>Boulangerie artisanale<br><small>Namur</small></h3></div>
        <div class="biens-prix"><span>250.000 &euro;</span></div>
        <div class="uk-overlay-primary"><p>Belle   affaire</p></div>
      </div>
      <div class="biens-box">
        <img class="flag" src="/img/Banner-Sold.png">
        <a class="propertylink" href="/fr/biens/102"></a>
        <div class="biens-title"><h3>Vendu déjà</h3></div>
      </div>
      <div class="biens-box">
        <a class="propertylink" href="/fr/biens/103"></a>
        <div class="biens-title"><h3>Ab</h3></div>
      </div>
      <div class="biens-box"><div class="biens-title"><h3>Sans lien</h3></div></div>
    </div></body></html>"#;

    #[test]
    fn parses_boxes_and_skips_sold_short_and_linkless() {
        let base = Url::parse("https://www.cofim.be/fr/biens").unwrap();
        let items = parse_listing("cofim", PAGE, &base);
        assert_eq!(items.len(), 1);
        let it = &items[0];
        assert_eq!(it.title, "Boulangerie artisanale");
        assert_eq!(it.url, "https://www.cofim.be/fr/biens/101-boulangerie");
        assert_eq!(it.attr("location"), Some("Namur"));
        assert_eq!(it.attr("price"), Some("250.000 €"));
        assert_eq!(it.attr("teaser"), Some("Belle affaire"));
    }

    #[test]
    fn missing_container_yields_nothing() {
        let base = Url::parse("https://www.cofim.be/").unwrap();
        assert!(parse_listing("cofim", "<html><body></body></html>", &base).is_empty());
    }

    #[test]
    fn page_urls_are_one_based() {
        let a = CofimAdapter::new("cofim", "https://www.cofim.be/fr/biens", 3).unwrap();
        assert_eq!(a.page_url(1).unwrap(), "https://www.cofim.be/fr/biens");
        assert_eq!(a.page_url(2).unwrap(), "https://www.cofim.be/fr/biens?page=2");
    }
}
