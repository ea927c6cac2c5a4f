// src/config/settings.rs
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::read_config_file;

pub const ENV_CONFIG_PATH: &str = "LISTING_WATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/listing_watch.toml";

pub const COFIM_LISTING_URL: &str =
    "https://www.cofim.be/fr/entreprises/entreprises-fonds-de-commerce";
pub const CAR_LISTING_URL: &str =
    "https://www.commerce-a-remettre.be/recherche?region=&sector=&id=";

/// Run-scoped configuration. Read once at startup, never re-read mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// JSON state file (seen-sets + per-source meta).
    pub state_path: PathBuf,
    /// Global cap on successful notifications per run.
    pub max_new_per_run: usize,
    pub page_delay_ms: u64,
    pub notify_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Transient (429/5xx/network) retries per HTTP GET.
    pub http_max_retries: u8,
    /// First backoff step; doubles per attempt.
    pub retry_base_ms: u64,
    /// Rate-limited retries per notification.
    pub notify_max_retries: u8,
    /// Upper bound on any single retry-after wait.
    pub max_retry_wait_secs: u64,
    /// Sequential-ID probes per source per run.
    pub probe_budget: u32,
    pub user_agent: String,
    pub accept_language: String,
    /// Prometheus textfile written at the end of the run, if set.
    pub metrics_textfile: Option<PathBuf>,
    /// Inline denylist terms (merged with the denylist file).
    pub denylist: Vec<String>,
    pub sources: Vec<SourceSpec>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("seen_announcements_by_site.json"),
            max_new_per_run: 40,
            page_delay_ms: 1_000,
            notify_delay_ms: 500,
            request_timeout_secs: 35,
            http_max_retries: 3,
            retry_base_ms: 500,
            notify_max_retries: 3,
            max_retry_wait_secs: 60,
            probe_budget: 25,
            user_agent: "Mozilla/5.0 (AcquisitionAnnouncementsBot; +https://github.com/)"
                .to_string(),
            accept_language: "fr,en;q=0.8,nl;q=0.6".to_string(),
            metrics_textfile: None,
            denylist: Vec::new(),
            sources: default_sources(),
        }
    }
}

fn default_sources() -> Vec<SourceSpec> {
    vec![
        SourceSpec::Cofim {
            name: default_cofim_name(),
            listing_url: default_cofim_listing(),
            max_pages: default_max_pages(),
        },
        SourceSpec::CommerceARemettre {
            name: default_car_name(),
            listing_url: default_car_listing(),
            max_pages: default_max_pages(),
        },
    ]
}

fn default_cofim_name() -> String {
    "cofim".to_string()
}
fn default_cofim_listing() -> String {
    COFIM_LISTING_URL.to_string()
}
fn default_car_name() -> String {
    "commerce-a-remettre".to_string()
}
fn default_car_listing() -> String {
    CAR_LISTING_URL.to_string()
}
fn default_max_pages() -> u32 {
    3
}
fn default_app_pages() -> u32 {
    5
}

/// One configured source, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceSpec {
    Cofim {
        #[serde(default = "default_cofim_name")]
        name: String,
        #[serde(default = "default_cofim_listing")]
        listing_url: String,
        #[serde(default = "default_max_pages")]
        max_pages: u32,
    },
    CommerceARemettre {
        #[serde(default = "default_car_name")]
        name: String,
        #[serde(default = "default_car_listing")]
        listing_url: String,
        #[serde(default = "default_max_pages")]
        max_pages: u32,
    },
    /// Client-rendered app without a server-side listing.
    ClientApp {
        name: String,
        entry_url: String,
        /// Detail page URL with an `{id}` placeholder.
        detail_url_template: String,
        /// Extra words that mark API paths as interesting (hostname is always used).
        #[serde(default)]
        keywords: Vec<String>,
        /// Detail-page phrases meaning "no longer available".
        #[serde(default)]
        inactive_markers: Vec<String>,
        #[serde(default = "default_app_pages")]
        max_pages: u32,
    },
}

impl SourceSpec {
    pub fn name(&self) -> &str {
        match self {
            SourceSpec::Cofim { name, .. }
            | SourceSpec::CommerceARemettre { name, .. }
            | SourceSpec::ClientApp { name, .. } => name,
        }
    }

    pub fn max_pages(&self) -> u32 {
        match self {
            SourceSpec::Cofim { max_pages, .. }
            | SourceSpec::CommerceARemettre { max_pages, .. }
            | SourceSpec::ClientApp { max_pages, .. } => *max_pages,
        }
    }
}

impl Settings {
    /// Load from an explicit path. `.json` is parsed as JSON, anything else as TOML.
    pub fn load_from(path: &Path) -> Result<Self> {
        let s: Settings = read_config_file(path, "settings")?;
        s.validate()?;
        Ok(s)
    }

    /// Load using env var + fallbacks:
    /// 1) $LISTING_WATCH_CONFIG
    /// 2) config/listing_watch.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            return Self::load_from(&fallback);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for s in &self.sources {
            let name = s.name();
            if name.trim().is_empty() {
                bail!("source name must not be empty");
            }
            if name == crate::state::META_KEY {
                bail!("source name `{name}` is reserved");
            }
            if !names.insert(name.to_string()) {
                bail!("duplicate source name `{name}`");
            }
            if s.max_pages() == 0 {
                bail!("source `{name}`: max_pages must be >= 1");
            }
            if let SourceSpec::ClientApp {
                detail_url_template,
                ..
            } = s
            {
                if !detail_url_template.contains("{id}") {
                    bail!("source `{name}`: detail_url_template needs an {{id}} placeholder");
                }
            }
        }
        Ok(())
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn notify_delay(&self) -> Duration {
        Duration::from_millis(self.notify_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn max_retry_wait(&self) -> Duration {
        Duration::from_secs(self.max_retry_wait_secs)
    }

    /// Zero delays everywhere; handy for tests and dry runs against fixtures.
    pub fn without_delays(mut self) -> Self {
        self.page_delay_ms = 0;
        self.notify_delay_ms = 0;
        self.retry_base_ms = 0;
        self
    }
}
