//! Denylist terms: the inline `denylist` from settings plus an optional terms file.

use anyhow::{bail, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::{read_config_file, Settings};
use crate::filter::Denylist;

pub const ENV_DENYLIST_PATH: &str = "DENYLIST_PATH";
pub const DEFAULT_DENYLIST_PATHS: [&str; 2] = ["config/denylist.toml", "config/denylist.json"];

/// `terms = [...]` in either format, or a bare JSON array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TermsFile {
    Table { terms: Vec<String> },
    List(Vec<String>),
}

/// Raw terms from one file; cleanup happens in `Denylist::new`.
pub fn read_terms(path: &Path) -> Result<Vec<String>> {
    let file: TermsFile = read_config_file(path, "denylist")?;
    Ok(match file {
        TermsFile::Table { terms } | TermsFile::List(terms) => terms,
    })
}

/// `$DENYLIST_PATH` (must exist), else the first default path present.
pub fn denylist_path() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_DENYLIST_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            bail!("{ENV_DENYLIST_PATH} points to non-existent path {}", pb.display());
        }
        return Ok(Some(pb));
    }
    Ok(DEFAULT_DENYLIST_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists()))
}

/// Inline terms come first, so their spelling wins over a duplicate in the file.
pub fn load_denylist(settings: &Settings) -> Result<Denylist> {
    let file_terms = match denylist_path()? {
        Some(path) => {
            let terms = read_terms(&path)?;
            tracing::info!(path = %path.display(), terms = terms.len(), "denylist file loaded");
            terms
        }
        None => Vec::new(),
    };
    Ok(Denylist::new(settings.denylist.iter().chain(file_terms.iter())))
}
