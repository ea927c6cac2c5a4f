// src/ingest/providers/mod.rs
pub mod client_app;
pub mod cofim;
pub mod commerce_a_remettre;

use anyhow::Result;

use crate::config::SourceSpec;
use crate::ingest::types::{Item, SourceAdapter};

pub use client_app::ClientAppAdapter;
pub use cofim::CofimAdapter;
pub use commerce_a_remettre::CommerceARemettreAdapter;

/// One adapter per configured source, in configuration order.
pub fn build_adapters(specs: &[SourceSpec]) -> Result<Vec<Box<dyn SourceAdapter>>> {
    let mut out: Vec<Box<dyn SourceAdapter>> = Vec::with_capacity(specs.len());
    for spec in specs {
        let adapter: Box<dyn SourceAdapter> = match spec {
            SourceSpec::Cofim {
                name,
                listing_url,
                max_pages,
            } => Box::new(CofimAdapter::new(name, listing_url, *max_pages)?),
            SourceSpec::CommerceARemettre {
                name,
                listing_url,
                max_pages,
            } => Box::new(CommerceARemettreAdapter::new(name, listing_url, *max_pages)?),
            SourceSpec::ClientApp {
                name,
                entry_url,
                detail_url_template,
                keywords,
                inactive_markers,
                max_pages,
            } => Box::new(ClientAppAdapter::new(
                name,
                entry_url,
                detail_url_template,
                keywords,
                inactive_markers,
                *max_pages,
            )?),
        };
        out.push(adapter);
    }
    Ok(out)
}

/// Same URL twice on one page: the later occurrence wins, first position kept.
pub fn dedupe_by_url(items: Vec<Item>) -> Vec<Item> {
    let mut out: Vec<Item> = Vec::with_capacity(items.len());
    for it in items {
        match out.iter_mut().find(|x| x.url == it.url) {
            Some(slot) => *slot = it,
            None => out.push(it),
        }
    }
    out
}
