//! # Endpoint Resolver
//!
//! Acquisition for client-rendered sources that expose no server-side listing.
//! Per source, a small state machine persisted through the source's meta map:
//!
//! - `Unresolved`: fetch the entry page, scan it and its script bundles for API
//!   path literals ([`bundle`]), probe the ranked candidates with a matrix of
//!   pagination shapes ([`probe`]). First candidate that answers with
//!   record-shaped JSON is cached in meta and the state becomes `Resolved`.
//! - `Resolved`: page through the cached endpoint directly, no discovery.
//! - `IdProbe`: no endpoint (or the cached one stopped answering with listings).
//!   Fall back to guessing sequential detail IDs ([`id_probe`]).
//!
//! Nothing here is fatal for the run: total failure means zero items, and the
//! source is retried from scratch next time.

pub mod bundle;
pub mod id_probe;
pub mod probe;

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use url::Url;

use crate::context::RunContext;
use crate::http::is_gone;
use crate::ingest::types::Item;
use crate::state::SourceMeta;

pub const META_ENDPOINT: &str = "resolved_endpoint";
pub const META_SHAPE: &str = "resolved_shape";
pub const META_RESOLVED_AT: &str = "resolved_at";
pub const META_LAST_ID: &str = "last_probed_id";

/// Page size requested from discovered endpoints.
pub const PAGE_SIZE: u32 = 20;

/// How a listing endpoint wants to be paginated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamShape {
    PageSize { one_based: bool },
    OffsetLimit,
    PagePerPage,
    PageLimit,
}

/// Shapes tried, in order, against every candidate endpoint.
pub const PROBE_MATRIX: [ParamShape; 5] = [
    ParamShape::PageSize { one_based: true },
    ParamShape::PageSize { one_based: false },
    ParamShape::OffsetLimit,
    ParamShape::PagePerPage,
    ParamShape::PageLimit,
];

impl ParamShape {
    /// Query pairs for the zero-based page `index`.
    pub fn query(&self, index: u32) -> Vec<(String, String)> {
        let (k1, v1, k2) = match self {
            ParamShape::PageSize { one_based: true } => ("page", index + 1, "size"),
            ParamShape::PageSize { one_based: false } => ("page", index, "size"),
            ParamShape::OffsetLimit => ("offset", index * PAGE_SIZE, "limit"),
            ParamShape::PagePerPage => ("page", index + 1, "per_page"),
            ParamShape::PageLimit => ("page", index + 1, "limit"),
        };
        vec![
            (k1.to_string(), v1.to_string()),
            (k2.to_string(), PAGE_SIZE.to_string()),
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamShape::PageSize { one_based: true } => "page_size_1",
            ParamShape::PageSize { one_based: false } => "page_size_0",
            ParamShape::OffsetLimit => "offset_limit",
            ParamShape::PagePerPage => "page_per_page",
            ParamShape::PageLimit => "page_limit",
        }
    }
}

impl fmt::Display for ParamShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamShape {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        PROBE_MATRIX
            .iter()
            .copied()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| anyhow!("unknown param shape `{s}`"))
    }
}

/// A working endpoint + pagination shape, as cached in meta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub url: String,
    pub shape: ParamShape,
}

impl ResolvedEndpoint {
    pub fn from_meta(meta: &SourceMeta) -> Option<Self> {
        let url = meta.get(META_ENDPOINT)?.trim();
        if url.is_empty() {
            return None;
        }
        let shape = meta.get(META_SHAPE)?.parse().ok()?;
        Some(Self {
            url: url.to_string(),
            shape,
        })
    }

    pub fn store(&self, meta: &mut SourceMeta) {
        meta.insert(META_ENDPOINT.to_string(), self.url.clone());
        meta.insert(META_SHAPE.to_string(), self.shape.as_str().to_string());
        meta.insert(
            META_RESOLVED_AT.to_string(),
            chrono::Utc::now().to_rfc3339(),
        );
    }

    pub fn clear(meta: &mut SourceMeta) {
        meta.remove(META_ENDPOINT);
        meta.remove(META_SHAPE);
        meta.remove(META_RESOLVED_AT);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Unresolved,
    Resolved(ResolvedEndpoint),
    IdProbe,
}

/// Everything the resolver needs to know about one client-rendered source.
#[derive(Debug, Clone)]
pub struct DiscoveryTarget {
    pub source: String,
    pub entry_url: Url,
    /// Detail page URL with an `{id}` placeholder.
    pub detail_url_template: String,
    /// Lowercased hostname (without `www.`) plus configured keywords.
    pub keywords: Vec<String>,
}

impl DiscoveryTarget {
    pub fn new(
        source: &str,
        entry_url: &str,
        detail_url_template: &str,
        extra_keywords: &[String],
    ) -> Result<Self> {
        let entry_url =
            Url::parse(entry_url).with_context(|| format!("invalid entry_url `{entry_url}`"))?;
        if !detail_url_template.contains("{id}") {
            bail!("detail_url_template `{detail_url_template}` has no {{id}} placeholder");
        }
        let mut keywords = Vec::new();
        if let Some(host) = entry_url.host_str() {
            keywords.push(host.trim_start_matches("www.").to_ascii_lowercase());
        }
        for k in extra_keywords {
            let k = k.trim().to_lowercase();
            if !k.is_empty() && !keywords.contains(&k) {
                keywords.push(k);
            }
        }
        Ok(Self {
            source: source.to_string(),
            entry_url,
            detail_url_template: detail_url_template.to_string(),
            keywords,
        })
    }

    pub fn host(&self) -> &str {
        self.keywords.first().map(String::as_str).unwrap_or_default()
    }

    pub fn detail_url(&self, id: &str) -> String {
        self.detail_url_template.replace("{id}", id)
    }
}

pub struct EndpointResolver {
    target: DiscoveryTarget,
    state: Resolution,
}

impl EndpointResolver {
    pub fn new(target: DiscoveryTarget) -> Self {
        Self {
            target,
            state: Resolution::Unresolved,
        }
    }

    pub fn target(&self) -> &DiscoveryTarget {
        &self.target
    }

    pub fn state(&self) -> &Resolution {
        &self.state
    }

    /// `page` is 1-based; page 1 starts a new run and re-reads the cached resolution.
    pub async fn fetch_page(
        &mut self,
        ctx: &RunContext,
        meta: &mut SourceMeta,
        page: u32,
    ) -> Result<Vec<Item>> {
        let first = page <= 1;
        if first {
            self.state = match ResolvedEndpoint::from_meta(meta) {
                Some(ep) => Resolution::Resolved(ep),
                None => Resolution::Unresolved,
            };
        }

        if self.state == Resolution::Unresolved {
            self.state = match bundle::discover(ctx, &self.target).await {
                Some(ep) => {
                    tracing::info!(source = %self.target.source, endpoint = %ep.url, shape = %ep.shape, "endpoint resolved");
                    ep.store(meta);
                    Resolution::Resolved(ep)
                }
                None => {
                    tracing::info!(source = %self.target.source, "no endpoint found, falling back to id probing");
                    Resolution::IdProbe
                }
            };
        }

        match self.state.clone() {
            Resolution::Resolved(ep) => {
                let fetched = ctx
                    .http
                    .get(&ep.url, &ep.shape.query(page.saturating_sub(1)))
                    .await?;
                // only 404/410 or a 2xx without records invalidate the cache
                if !fetched.status.is_success() && !is_gone(fetched.status) {
                    bail!("endpoint {} answered HTTP {}", ep.url, fetched.status);
                }
                let records = if fetched.status.is_success() {
                    probe::records_from_body(&fetched.body)
                } else {
                    Vec::new()
                };
                if !records.is_empty() {
                    return Ok(records
                        .iter()
                        .filter_map(|r| probe::record_to_item(&self.target, r))
                        .collect());
                }
                if !first {
                    return Ok(Vec::new());
                }
                tracing::warn!(
                    source = %self.target.source,
                    endpoint = %ep.url,
                    status = %fetched.status,
                    "cached endpoint no longer returns listings, dropping it"
                );
                ResolvedEndpoint::clear(meta);
                self.state = Resolution::IdProbe;
                id_probe::run(ctx, &self.target, meta).await
            }
            Resolution::IdProbe if first => id_probe::run(ctx, &self.target, meta).await,
            // id probing emits everything on the first page
            Resolution::IdProbe | Resolution::Unresolved => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_round_trip_through_meta_strings() {
        for s in PROBE_MATRIX {
            assert_eq!(s.as_str().parse::<ParamShape>().unwrap(), s);
        }
        assert!("page".parse::<ParamShape>().is_err());
    }

    #[test]
    fn query_pairs_per_shape() {
        let q = |s: ParamShape, i| s.query(i);
        assert_eq!(
            q(ParamShape::PageSize { one_based: true }, 0),
            vec![("page".into(), "1".into()), ("size".into(), "20".into())]
        );
        assert_eq!(
            q(ParamShape::PageSize { one_based: false }, 2),
            vec![("page".into(), "2".into()), ("size".into(), "20".into())]
        );
        assert_eq!(
            q(ParamShape::OffsetLimit, 2),
            vec![("offset".into(), "40".into()), ("limit".into(), "20".into())]
        );
    }

    #[test]
    fn resolved_endpoint_meta_cycle() {
        let mut meta = SourceMeta::new();
        assert!(ResolvedEndpoint::from_meta(&meta).is_none());
        let ep = ResolvedEndpoint {
            url: "https://api.example.be/v1/listings".into(),
            shape: ParamShape::OffsetLimit,
        };
        ep.store(&mut meta);
        assert!(meta.contains_key(META_RESOLVED_AT));
        assert_eq!(ResolvedEndpoint::from_meta(&meta), Some(ep));
        meta.insert(META_LAST_ID.into(), "9".into());
        ResolvedEndpoint::clear(&mut meta);
        assert_eq!(meta.len(), 1);
    }

    #[test]
    fn target_keywords_start_with_host() {
        let t = DiscoveryTarget::new(
            "app",
            "https://www.Example.be/fr/",
            "https://www.example.be/annonce/{id}",
            &[" Cession ".to_string(), "example.be".to_string()],
        )
        .unwrap();
        assert_eq!(t.host(), "example.be");
        assert_eq!(t.keywords, vec!["example.be".to_string(), "cession".to_string()]);
        assert_eq!(t.detail_url("42"), "https://www.example.be/annonce/42");
        assert!(DiscoveryTarget::new("app", "https://a.be", "https://a.be/x", &[]).is_err());
    }
}
