use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::dedupe_by_url;
use crate::context::RunContext;
use crate::ingest::types::{Delivery, Item, SourceAdapter};
use crate::ingest::{absolute_url, accept_title, normalize_text, with_query_param};
use crate::notify::format::render_listing;
use crate::state::SourceMeta;

pub const LABEL: &str = "Commerce-à-remettre";

static RESULT: Lazy<Selector> = Lazy::new(|| Selector::parse(".search-result-item").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("h3.result-title a[href]").unwrap());
static META_URL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[itemprop="url"]"#).unwrap());
static META_NAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[itemprop="name"]"#).unwrap());
static META_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[itemprop="price"]"#).unwrap());
static INFO: Lazy<Selector> = Lazy::new(|| Selector::parse("ul.result-info li").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static STRONG: Lazy<Selector> = Lazy::new(|| Selector::parse("strong").unwrap());
static DESC: Lazy<Selector> = Lazy::new(|| Selector::parse(".result-description p").unwrap());
static TYPE_AFTER_COLON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)type\s*:\s*(.+)$").unwrap());

pub struct CommerceARemettreAdapter {
    name: String,
    listing_url: Url,
    max_pages: u32,
}

impl CommerceARemettreAdapter {
    pub fn new(name: &str, listing_url: &str, max_pages: u32) -> Result<Self> {
        let listing_url = Url::parse(listing_url)
            .with_context(|| format!("commerce-a-remettre: invalid listing_url `{listing_url}`"))?;
        Ok(Self {
            name: name.to_string(),
            listing_url,
            max_pages,
        })
    }

    /// `page` overrides the query parameter; the other search filters stay.
    pub fn page_url(&self, page: u32) -> Result<String> {
        with_query_param(self.listing_url.as_str(), "page", &page.to_string())
    }
}

fn joined_text(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn meta_content(el: ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel)
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `meta[itemprop=price]` as whole euros; non-numeric content is kept as text.
fn price_label(raw: &str) -> String {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => format!("{} EUR", v.trunc() as i64),
        _ => normalize_text(raw),
    }
}

pub fn parse_listing(source: &str, html: &str, base: &Url) -> Vec<Item> {
    let doc = Html::parse_document(html);
    let mut out = Vec::new();

    for card in doc.select(&RESULT) {
        let link = card.select(&LINK).next();
        let href = link
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string)
            .filter(|h| !h.trim().is_empty())
            .or_else(|| meta_content(card, &META_URL));
        let Some(url) = href.and_then(|h| absolute_url(base, &h)) else {
            continue;
        };

        let title = link
            .map(joined_text)
            .filter(|t| !t.is_empty())
            .or_else(|| meta_content(card, &META_NAME).map(|n| normalize_text(&n)))
            .unwrap_or_default();
        if !accept_title(&title) {
            continue;
        }

        let mut item = Item::new(source, title, url);
        if let Some(p) = meta_content(card, &META_PRICE) {
            item.set_attr("price", price_label(&p));
        }

        for li in card.select(&INFO) {
            let txt = joined_text(li);
            if li.html().to_lowercase().contains("icon-map-marker") {
                let loc = li.select(&ANCHOR).next().map(joined_text).unwrap_or_default();
                item.set_attr("location", loc);
            }
            if txt.to_lowercase().contains("type") {
                let typ = li
                    .select(&STRONG)
                    .next()
                    .map(joined_text)
                    .filter(|t| !t.is_empty())
                    .or_else(|| {
                        TYPE_AFTER_COLON
                            .captures(&txt)
                            .and_then(|c| c.get(1))
                            .map(|m| normalize_text(m.as_str()))
                    })
                    .unwrap_or_default();
                item.set_attr("type", typ);
            }
        }

        if let Some(d) = card.select(&DESC).next().map(joined_text) {
            item.set_attr("teaser", d);
        }
        out.push(item);
    }
    dedupe_by_url(out)
}

#[async_trait]
impl SourceAdapter for CommerceARemettreAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn first_page(&self) -> u32 {
        0
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
        tracing::debug!(source = %self.name, page, items = items.len(), "commerce-a-remettre page parsed");
        Ok(items)
    }

    fn format(&self, item: &Item) -> Delivery {
        Delivery::Deliver(render_listing(
            LABEL,
            item,
            &[
                ("location", "Région"),
                ("type", "Type"),
                ("price", "Prix"),
                ("teaser", "Résumé"),
            ],
        ))
    }
}
