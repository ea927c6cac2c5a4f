//! Orchestrator: drives each source end-to-end against the shared state.
//!
//! Per source: page through the adapter, dedupe by identity key, keep what the
//! seen-set does not know, then for each new item (sorted by URL) pre-filter,
//! check the send cap, enrich, post-filter, format and notify. Only delivered,
//! filtered or inactive items are marked seen; everything else is retried on
//! the next run.

use std::collections::BTreeMap;

use anyhow::Result;
use metrics::{counter, gauge};

use crate::context::RunContext;
use crate::filter::Denylist;
use crate::ingest::types::{Delivery, Enrichment, Item, SourceAdapter};
use crate::notify::Notifier;
use crate::state::{State, StateStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    /// Raw items returned by the adapter over all pages.
    pub fetched: usize,
    pub new_count: usize,
    pub sent_count: usize,
    pub filtered_count: usize,
    pub page_errors: usize,
    /// A key was added or the source's meta map changed.
    pub changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub sources: Vec<SourceReport>,
    /// State file was rewritten.
    pub saved: bool,
}

impl RunSummary {
    pub fn total_new(&self) -> usize {
        self.sources.iter().map(|r| r.new_count).sum()
    }

    pub fn total_sent(&self) -> usize {
        self.sources.iter().map(|r| r.sent_count).sum()
    }

    pub fn changed(&self) -> bool {
        self.sources.iter().any(|r| r.changed)
    }
}

/// Key every item; the last occurrence of a key wins.
pub fn dedupe_by_key(items: Vec<Item>) -> BTreeMap<String, Item> {
    let mut out = BTreeMap::new();
    for it in items {
        out.insert(it.key(), it);
    }
    out
}

/// Run one source. Never fails: errors are logged and leave items unseen.
pub async fn run_source(
    ctx: &RunContext,
    adapter: &mut dyn SourceAdapter,
    denylist: &Denylist,
    notifier: &mut Notifier,
    state: &mut State,
) -> SourceReport {
    let source = adapter.name().to_string();
    let mut report = SourceReport {
        source: source.clone(),
        ..SourceReport::default()
    };

    let mut meta = state.meta(&source);
    let meta_before = meta.clone();

    let mut raw: Vec<Item> = Vec::new();
    let first = adapter.first_page();
    for i in 0..adapter.max_pages() {
        let page = first + i;
        if i > 0 {
            ctx.pause_between_pages().await;
        }
        match adapter.fetch_page(ctx, &mut meta, page).await {
            Ok(items) => {
                counter!("watch_items_fetched_total", "source" => source.clone())
                    .increment(items.len() as u64);
                if items.is_empty() && i > 0 {
                    tracing::debug!(source = %source, page, "empty page, stopping");
                    break;
                }
                report.fetched += items.len();
                raw.extend(items);
            }
            Err(e) => {
                report.page_errors += 1;
                counter!("watch_page_errors_total", "source" => source.clone()).increment(1);
                tracing::warn!(source = %source, page, error = ?e, "page failed, skipped");
            }
        }
    }

    if meta != meta_before {
        state.set_meta(&source, meta);
        report.changed = true;
    }

    let mut fresh: Vec<(String, Item)> = dedupe_by_key(raw)
        .into_iter()
        .filter(|(key, _)| !state.is_seen(&source, key))
        .collect();
    report.new_count = fresh.len();
    if fresh.is_empty() {
        return report;
    }
    counter!("watch_items_new_total", "source" => source.clone()).increment(fresh.len() as u64);
    fresh.sort_by(|a, b| a.1.url.cmp(&b.1.url));

    let mut attempted = false;
    for (key, mut item) in fresh {
        if let Some(term) = denylist.matches(&item) {
            tracing::debug!(source = %source, %key, term, "denylisted");
            report.filtered_count += 1;
            counter!("watch_items_filtered_total", "source" => source.clone()).increment(1);
            report.changed |= state.mark_seen(&source, &key);
            continue;
        }

        if notifier.cap_reached() {
            tracing::info!(source = %source, sent = notifier.sent(), "send cap reached, remaining items stay unseen");
            break;
        }

        match adapter.enrich(ctx, &item).await {
            Ok(Enrichment::Unchanged) => {}
            Ok(Enrichment::Attributes(extra)) => {
                for (k, v) in extra {
                    item.set_attr(&k, v);
                }
            }
            Ok(Enrichment::Inactive) => {
                tracing::debug!(source = %source, %key, "listing inactive, not notified");
                report.changed |= state.mark_seen(&source, &key);
                continue;
            }
            Err(e) => {
                tracing::warn!(source = %source, %key, error = ?e, "enrichment failed, retried next run");
                continue;
            }
        }

        if let Some(term) = denylist.matches(&item) {
            tracing::debug!(source = %source, %key, term, "denylisted after enrichment");
            report.filtered_count += 1;
            counter!("watch_items_filtered_total", "source" => source.clone()).increment(1);
            report.changed |= state.mark_seen(&source, &key);
            continue;
        }

        let text = match adapter.format(&item) {
            Delivery::Deliver(text) => text,
            Delivery::Suppress => {
                report.changed |= state.mark_seen(&source, &key);
                continue;
            }
            Delivery::Error(reason) => {
                tracing::warn!(source = %source, %key, %reason, "formatting failed, retried next run");
                continue;
            }
        };

        if attempted {
            ctx.pause_between_notifications().await;
        }
        attempted = true;
        match notifier.notify(&text).await {
            Ok(()) => {
                report.sent_count += 1;
                report.changed |= state.mark_seen(&source, &key);
                tracing::debug!(source = %source, %key, "notified");
            }
            Err(e) => {
                tracing::warn!(source = %source, %key, error = %e, "notification failed, left unseen");
            }
        }
    }

    report
}

/// Run every adapter in order against one loaded state; persist once, only on change.
pub async fn run_all(
    ctx: &RunContext,
    adapters: &mut [Box<dyn SourceAdapter>],
    denylist: &Denylist,
    notifier: &mut Notifier,
    store: &StateStore,
) -> Result<RunSummary> {
    let mut state = store.load().await;
    let mut summary = RunSummary::default();

    for adapter in adapters.iter_mut() {
        let report = run_source(ctx, adapter.as_mut(), denylist, notifier, &mut state).await;
        tracing::info!(
            source = %report.source,
            fetched = report.fetched,
            new_detected = report.new_count,
            sent = report.sent_count,
            filtered = report.filtered_count,
            page_errors = report.page_errors,
            "source done"
        );
        summary.sources.push(report);
    }

    if summary.changed() {
        store.save(&state).await?;
        summary.saved = true;
    } else {
        tracing::debug!(path = %store.path().display(), "nothing changed, state not written");
    }
    gauge!("watch_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
    Ok(summary)
}
