// src/ingest/types.rs
use std::collections::BTreeMap;

use anyhow::Result;

use crate::context::RunContext;
use crate::state::SourceMeta;

/// One candidate listing extracted from a source.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Item {
    pub source: String, // e.g., "cofim", "commerce-a-remettre"
    pub title: String,  // whitespace-normalized, >= 3 chars
    pub url: String,    // absolute, tracking params + fragment stripped
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub explicit_id: Option<String>,
}

impl Item {
    pub fn new(source: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            url: url.into(),
            attributes: BTreeMap::new(),
            explicit_id: None,
        }
    }

    /// Builder helper; empty values are not stored.
    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_explicit_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !id.trim().is_empty() {
            self.explicit_id = Some(id.trim().to_string());
        }
        self
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let v = value.into();
        if !v.is_empty() {
            self.attributes.insert(key.to_string(), v);
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Identity key used for dedup across runs.
    pub fn key(&self) -> String {
        crate::identity::identity_key(self)
    }
}

/// Result of the optional detail-page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrichment {
    /// Adapter has nothing to add.
    Unchanged,
    /// Extra fields merged into the item before the post-filter.
    Attributes(BTreeMap<String, String>),
    /// Detail page says the listing is gone (sold, withdrawn, 404).
    Inactive,
}

/// What the formatter decided for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Deliver(String),
    /// Nothing to say; the item is recorded as seen without a message.
    Suppress,
    /// Formatting failed; the item stays unseen and is retried next run.
    Error(String),
}

/// One adapter per source. The runner is written once against this trait.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// First page index the source understands (1-based by default).
    fn first_page(&self) -> u32 {
        1
    }

    /// Upper bound of pages scanned per run.
    fn max_pages(&self) -> u32;

    /// Fetch and parse one page. `meta` is the source's persisted side-channel map;
    /// adapters that need cross-run memory mutate it in place.
    async fn fetch_page(
        &mut self,
        ctx: &RunContext,
        meta: &mut SourceMeta,
        page: u32,
    ) -> Result<Vec<Item>>;

    async fn enrich(&self, _ctx: &RunContext, _item: &Item) -> Result<Enrichment> {
        Ok(Enrichment::Unchanged)
    }

    fn format(&self, item: &Item) -> Delivery;
}
