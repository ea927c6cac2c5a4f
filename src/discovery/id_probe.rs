//! Sequential-ID fallback: guess detail URLs above the last ID we probed.
//!
//! The entry page is scanned for links matching the detail template; the largest
//! ID found is the upper bound. On the very first run we only record it (seeding),
//! so an old catalogue is never replayed. Afterwards every ID in
//! `(last_probed_id, max]` is fetched, capped by the probe budget, and the cursor
//! moves past each probed ID whether or not it existed.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::{DiscoveryTarget, META_LAST_ID};
use crate::context::RunContext;
use crate::ingest::types::Item;
use crate::ingest::{accept_title, normalize_text, normalize_url};
use crate::state::SourceMeta;

static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static DESCRIPTION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[name="description"], meta[property="og:description"]"#).unwrap()
});

/// Regex capturing the numeric ID from links shaped like the detail template.
/// Only the path (and query) part of the template is used, so both absolute and
/// root-relative links match.
pub fn detail_id_pattern(template: &str) -> Result<Regex> {
    let path = match template.find("://") {
        Some(i) => {
            let rest = &template[i + 3..];
            rest.find('/').map(|j| &rest[j..]).unwrap_or("/")
        }
        None => template,
    };
    let escaped = regex::escape(path).replace(r"\{id\}", r"(\d+)");
    Regex::new(&escaped).with_context(|| format!("building id pattern from `{template}`"))
}

/// All numeric IDs referenced in `body` (HTML or inline JSON).
pub fn extract_ids(body: &str, pattern: &Regex) -> BTreeSet<u64> {
    let body = body.replace("\\/", "/");
    pattern
        .captures_iter(&body)
        .filter_map(|c| c.get(1)?.as_str().parse::<u64>().ok())
        .collect()
}

/// Title (og:title, then h1, then `<title>`) and description of a detail page.
pub fn parse_detail(html: &str, url: &str, target: &DiscoveryTarget, id: u64) -> Option<Item> {
    let doc = Html::parse_document(html);
    let meta_content = |sel: &Selector| {
        doc.select(sel)
            .filter_map(|el| el.value().attr("content"))
            .map(normalize_text)
            .find(|s| !s.is_empty())
    };
    let text_of = |sel: &Selector| {
        doc.select(sel)
            .map(|el| normalize_text(&el.text().collect::<String>()))
            .find(|s| !s.is_empty())
    };

    let title = meta_content(&OG_TITLE)
        .or_else(|| text_of(&H1))
        .or_else(|| text_of(&TITLE))?;
    if !accept_title(&title) {
        return None;
    }
    let mut item = Item::new(&target.source, title, normalize_url(url))
        .with_explicit_id(id.to_string());
    if let Some(desc) = meta_content(&DESCRIPTION) {
        item.set_attr("description", desc);
    }
    Some(item)
}

pub async fn run(
    ctx: &RunContext,
    target: &DiscoveryTarget,
    meta: &mut SourceMeta,
) -> Result<Vec<Item>> {
    let pattern = detail_id_pattern(&target.detail_url_template)?;
    let body = ctx
        .http
        .get_text(target.entry_url.as_str())
        .await
        .context("id probe: entry page")?;

    let Some(max_seen) = extract_ids(&body, &pattern).into_iter().max() else {
        tracing::debug!(source = %target.source, "no detail links on entry page");
        return Ok(Vec::new());
    };

    let last = meta
        .get(META_LAST_ID)
        .and_then(|v| v.trim().parse::<u64>().ok());
    let Some(last) = last else {
        meta.insert(META_LAST_ID.to_string(), max_seen.to_string());
        tracing::info!(source = %target.source, max_id = max_seen, "seeded id cursor, nothing emitted this run");
        return Ok(Vec::new());
    };
    if max_seen <= last {
        return Ok(Vec::new());
    }

    let budget = u64::from(ctx.settings.probe_budget.max(1));
    let upper = max_seen.min(last.saturating_add(budget));
    let mut items = Vec::new();
    for id in (last + 1)..=upper {
        if id > last + 1 {
            ctx.pause_between_pages().await;
        }
        let url = target.detail_url(&id.to_string());
        match ctx.http.get_optional(&url).await {
            Ok(Some(html)) => match parse_detail(&html, &url, target, id) {
                Some(item) => items.push(item),
                None => tracing::debug!(source = %target.source, id, "detail page without title"),
            },
            Ok(None) => tracing::debug!(source = %target.source, id, "no listing at id"),
            Err(e) => tracing::warn!(source = %target.source, id, error = %e, "detail probe failed"),
        }
    }
    meta.insert(META_LAST_ID.to_string(), upper.to_string());
    tracing::info!(source = %target.source, from = last + 1, to = upper, found = items.len(), "id probe done");
    Ok(items)
}
