use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::context::RunContext;
use crate::discovery::{DiscoveryTarget, EndpointResolver};
use crate::filter::fold;
use crate::ingest::normalize_text;
use crate::ingest::types::{Delivery, Enrichment, Item, SourceAdapter};
use crate::notify::format::render_listing;
use crate::state::SourceMeta;

static DESCRIPTION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[name="description"], meta[property="og:description"]"#).unwrap()
});

/// Source rendered client-side: listings come from a discovered JSON endpoint,
/// or from sequential detail-ID probing when no endpoint is found.
pub struct ClientAppAdapter {
    name: String,
    label: String,
    resolver: EndpointResolver,
    inactive_markers: Vec<String>,
    max_pages: u32,
}

impl ClientAppAdapter {
    pub fn new(
        name: &str,
        entry_url: &str,
        detail_url_template: &str,
        keywords: &[String],
        inactive_markers: &[String],
        max_pages: u32,
    ) -> Result<Self> {
        let target = DiscoveryTarget::new(name, entry_url, detail_url_template, keywords)?;
        let label = target.host().to_string();
        Ok(Self {
            name: name.to_string(),
            label,
            resolver: EndpointResolver::new(target),
            inactive_markers: inactive_markers
                .iter()
                .map(|m| fold(m.trim()))
                .filter(|m| !m.is_empty())
                .collect(),
            max_pages,
        })
    }

    /// Inactive when a configured marker appears in the folded page text.
    pub fn is_inactive(&self, html: &str) -> bool {
        if self.inactive_markers.is_empty() {
            return false;
        }
        let text = fold(html);
        self.inactive_markers.iter().any(|m| text.contains(m.as_str()))
    }
}

fn detail_description(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&DESCRIPTION)
        .filter_map(|m| m.value().attr("content"))
        .map(normalize_text)
        .find(|s| !s.is_empty())
}

#[async_trait]
impl SourceAdapter for ClientAppAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_pages(&self) -> u32 {
        self.max_pages
    }

    async fn fetch_page(
        &mut self,
        ctx: &RunContext,
        meta: &mut SourceMeta,
        page: u32,
    ) -> Result<Vec<Item>> {
        self.resolver.fetch_page(ctx, meta, page).await
    }

    async fn enrich(&self, ctx: &RunContext, item: &Item) -> Result<Enrichment> {
        let Some(html) = ctx.http.get_optional(&item.url).await? else {
            return Ok(Enrichment::Inactive);
        };
        if self.is_inactive(&html) {
            return Ok(Enrichment::Inactive);
        }
        Ok(match detail_description(&html) {
            Some(desc) if item.attr("description").is_none() => {
                Enrichment::Attributes(BTreeMap::from([("description".to_string(), desc)]))
            }
            _ => Enrichment::Unchanged,
        })
    }

    fn format(&self, item: &Item) -> Delivery {
        Delivery::Deliver(render_listing(
            &self.label,
            item,
            &[
                ("location", "Localisation"),
                ("type", "Type"),
                ("sector", "Secteur"),
                ("price", "Prix"),
                ("teaser", "Résumé"),
                ("description", "Description"),
            ],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(markers: &[&str]) -> ClientAppAdapter {
        ClientAppAdapter::new(
            "app",
            "https://www.app-example.be/",
            "https://www.app-example.be/annonce/{id}",
            &[],
            &markers.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
            5,
        )
        .unwrap()
    }

    #[test]
    fn inactive_markers_match_folded() {
        let a = adapter(&["Déjà vendu", "  "]);
        assert!(a.is_inactive("<p>Cette affaire est DEJA VENDU.</p>"));
        assert!(!a.is_inactive("<p>Disponible</p>"));
        assert!(!adapter(&[]).is_inactive("vendu"));
    }

    #[test]
    fn description_from_meta() {
        let html = r#"<html><head><meta name="description" content=" Superbe   commerce "></head></html>"#;
        assert_eq!(detail_description(html).as_deref(), Some("Superbe commerce"));
        assert_eq!(detail_description("<html></html>"), None);
    }

    #[test]
    fn label_is_the_host() {
        let a = adapter(&[]);
        let msg = match a.format(&Item::new("app", "Bar du coin", "https://www.app-example.be/annonce/1")) {
            Delivery::Deliver(m) => m,
            other => panic!("unexpected {other:?}"),
        };
        assert!(msg.starts_with("[app-example.be] Bar du coin"));
    }
}
