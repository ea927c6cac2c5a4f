// src/config/mod.rs
pub mod denylist;
pub mod settings;

pub use denylist::load_denylist;
pub use settings::{Settings, SourceSpec};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Read a config file: `.json` is parsed as JSON, anything else as TOML.
pub(crate) fn read_config_file<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {what} from {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&content).with_context(|| format!("parsing {what} json"))
    } else {
        toml::from_str(&content).with_context(|| format!("parsing {what} toml"))
    }
}
