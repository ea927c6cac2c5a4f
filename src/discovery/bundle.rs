//! Candidate endpoint discovery from the entry page and its script bundles.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::{probe, DiscoveryTarget, ResolvedEndpoint};
use crate::context::RunContext;

/// Path fragments that usually mean "this returns listings".
pub const LISTING_KEYWORDS: &[&str] = &[
    "api", "listing", "search", "recherche", "annonce", "offer", "result", "propert", "biens",
    "entreprise", "cession", "catalog", "commerce",
];

/// Fragments that usually mean "this is not the listing feed".
const NOISE_KEYWORDS: &[&str] = &[
    "auth", "login", "logout", "user", "account", "config", "token", "i18n", "translation",
    "locale", "analytics", "track", "static", "assets", "cdn", "font", "cookie", "consent",
];

const ASSET_EXTS: &[&str] = &[
    ".js", ".mjs", ".css", ".map", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico",
    ".woff", ".woff2", ".ttf", ".eot", ".html", ".pdf",
];

const MAX_BUNDLES: usize = 12;
const MAX_CANDIDATES: usize = 12;

static SCRIPT_SRC: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script[src], link[rel=modulepreload][href]").unwrap());

// quoted absolute URLs or root-relative paths; template literals with `${` are skipped
static PATH_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["'`]((?:https?://|/)[A-Za-z0-9_\-.~/%:@?=&+,;]{2,200})["'`]"#).unwrap()
});

/// Absolute URLs of external scripts referenced by the page.
pub fn script_sources(html: &str, base: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);
    let mut out: Vec<Url> = Vec::new();
    for el in doc.select(&SCRIPT_SRC) {
        let Some(href) = el.value().attr("src").or_else(|| el.value().attr("href")) else {
            continue;
        };
        if let Ok(u) = base.join(href.trim()) {
            if !out.contains(&u) {
                out.push(u);
            }
        }
    }
    out
}

/// Quoted URL/path literals in `text` that look like they could serve listings.
/// Query strings are cut; the probe supplies its own pagination params.
pub fn scan_candidates(text: &str, target: &DiscoveryTarget) -> Vec<String> {
    // JSON-escaped slashes show up in inline state blobs
    let text = text.replace("\\/", "/");
    PATH_LITERAL
        .captures_iter(&text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().split('?').next().unwrap_or_default().to_string())
        .filter(|c| c.len() > 1 && !c.starts_with("//"))
        .filter(|c| !is_asset(c))
        .filter(|c| {
            let lc = c.to_lowercase();
            target.keywords.iter().any(|k| lc.contains(k.as_str()))
                || LISTING_KEYWORDS.iter().any(|k| lc.contains(k))
        })
        .collect()
}

fn is_asset(candidate: &str) -> bool {
    let lc = candidate.to_lowercase();
    ASSET_EXTS.iter().any(|ext| lc.ends_with(ext))
}

/// Higher is more promising.
pub fn score(candidate: &str, target: &DiscoveryTarget) -> i32 {
    let lc = candidate.to_lowercase();
    let mut s = 0;
    if !target.host().is_empty() && lc.contains(target.host()) {
        s += 1;
    }
    for k in target.keywords.iter().skip(1) {
        if lc.contains(k.as_str()) {
            s += 2;
        }
    }
    for k in LISTING_KEYWORDS {
        if lc.contains(k) {
            s += if *k == "api" { 3 } else { 2 };
        }
    }
    for k in NOISE_KEYWORDS {
        if lc.contains(k) {
            s -= 4;
        }
    }
    s
}

/// Deduplicate, drop non-positive scores, best first (shorter path on ties).
pub fn rank(candidates: Vec<String>, target: &DiscoveryTarget) -> Vec<String> {
    let mut scored: Vec<(i32, String)> = Vec::new();
    for c in candidates {
        if scored.iter().any(|(_, seen)| *seen == c) {
            continue;
        }
        let s = score(&c, target);
        if s > 0 {
            scored.push((s, c));
        }
    }
    scored.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then(a.1.len().cmp(&b.1.len()))
            .then(a.1.cmp(&b.1))
    });
    scored.truncate(MAX_CANDIDATES);
    scored.into_iter().map(|(_, c)| c).collect()
}

/// Full discovery pass: entry page, bundles, ranking, probing.
/// `None` when nothing answers with listing records.
pub async fn discover(ctx: &RunContext, target: &DiscoveryTarget) -> Option<ResolvedEndpoint> {
    let entry = match ctx.http.get_text(target.entry_url.as_str()).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(source = %target.source, error = %e, "entry page unavailable, discovery skipped");
            return None;
        }
    };

    let mut found = scan_candidates(&entry, target);
    let bundles = script_sources(&entry, &target.entry_url);
    for src in bundles.iter().take(MAX_BUNDLES) {
        match ctx.http.get_text(src.as_str()).await {
            Ok(js) => found.extend(scan_candidates(&js, target)),
            Err(e) => tracing::debug!(bundle = %src, error = %e, "bundle fetch failed, skipped"),
        }
    }

    let ranked = rank(found, target);
    tracing::debug!(source = %target.source, bundles = bundles.len(), candidates = ranked.len(), "probing candidates");
    for cand in ranked {
        let Ok(mut url) = target.entry_url.join(&cand) else {
            continue;
        };
        url.set_query(None);
        url.set_fragment(None);
        if let Some(ep) = probe::probe_endpoint(ctx, url.as_str()).await {
            return Some(ep);
        }
    }
    None
}
