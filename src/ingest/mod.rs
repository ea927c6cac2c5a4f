// src/ingest/mod.rs
pub mod providers;
pub mod types;

use once_cell::sync::OnceCell;
use regex::Regex;
use url::Url;

/// Titles shorter than this (after normalization) are parse noise.
pub const MIN_TITLE_LEN: usize = 3;

/// Normalize scraped text: decode entities, strip tags, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. nbsp)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// True when a normalized title is long enough to be a real listing.
pub fn accept_title(title: &str) -> bool {
    title.chars().count() >= MIN_TITLE_LEN
}

/// Drop `utm_*` tracking params and the fragment; keep functional params.
/// Unparsable input is returned untouched.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut u) = Url::parse(raw.trim()) else {
        return raw.to_string();
    };
    let kept: Vec<(String, String)> = u
        .query_pairs()
        .filter(|(k, _)| !k.to_ascii_lowercase().starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        u.set_query(None);
    } else {
        u.query_pairs_mut().clear().extend_pairs(kept);
    }
    u.set_fragment(None);
    u.to_string()
}

/// Resolve `href` against `base`, then normalize. Empty href yields `None`.
pub fn absolute_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(|u| normalize_url(u.as_str()))
}

/// Set (or override) one query parameter, keeping the others in order.
pub fn with_query_param(raw: &str, key: &str, value: &str) -> anyhow::Result<String> {
    let mut u = Url::parse(raw)?;
    let mut pairs: Vec<(String, String)> = u
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.push((key.to_string(), value.to_string()));
    u.query_pairs_mut().clear().extend_pairs(pairs);
    u.set_fragment(None);
    Ok(u.to_string())
}

/// Cut to `max` chars, appending an ellipsis when something was dropped.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}
