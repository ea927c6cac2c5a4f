//! Identity Resolver: one stable key per listing.
//!
//! Priority chain (order is part of the persisted format, changing it re-keys every
//! stored item and triggers a mass re-notification):
//! 1. `explicit_id` from the source
//! 2. first purely numeric URL path segment
//! 3. last non-empty URL path segment (slug)
//! 4. SHA-256 of `url || title`
//!
//! Keys are always prefixed with the source name: `"<source>:<id>"`.

use sha2::{Digest, Sha256};
use url::Url;

use crate::ingest::types::Item;

pub fn identity_key(item: &Item) -> String {
    let source = item.source.as_str();

    if let Some(id) = item.explicit_id.as_deref().map(str::trim) {
        if !id.is_empty() {
            return format!("{source}:{id}");
        }
    }

    let segments = path_segments(&item.url);
    if let Some(num) = segments.iter().find(|s| is_numeric(s)) {
        return format!("{source}:{num}");
    }
    if let Some(last) = segments.last() {
        return format!("{source}:{last}");
    }

    format!("{source}:{}", content_digest(&item.url, &item.title))
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Non-empty path segments. Falls back to a raw split when the URL does not parse.
fn path_segments(raw: &str) -> Vec<String> {
    let path = match Url::parse(raw) {
        Ok(u) => u.path().to_string(),
        Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn content_digest(url: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"||");
    hasher.update(title.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
