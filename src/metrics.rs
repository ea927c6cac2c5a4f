use std::path::Path;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up in the exposition).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "watch_items_fetched_total",
            "Raw items returned by source adapters."
        );
        describe_counter!(
            "watch_items_new_total",
            "Items whose identity key was not in the seen-set."
        );
        describe_counter!(
            "watch_items_filtered_total",
            "New items vetoed by the denylist (pre or post enrichment)."
        );
        describe_counter!(
            "watch_notifications_sent_total",
            "Notifications confirmed by the transport."
        );
        describe_counter!(
            "watch_notifications_failed_total",
            "Notifications given up after retries."
        );
        describe_counter!(
            "watch_page_errors_total",
            "Page fetch/parse failures (page skipped)."
        );
        describe_gauge!("watch_last_run_ts", "Unix ts when the last run finished.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Batch jobs have no scrape endpoint; dump the exposition for a textfile collector.
    pub async fn write_textfile(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.ok();
        }
        tokio::fs::write(path, self.render())
            .await
            .with_context(|| format!("writing metrics to {}", path.display()))
    }
}
