//! Persisted run state: per-source seen-sets plus a small per-source meta map.
//!
//! File format (single JSON object):
//! ```json
//! {
//!   "cofim": ["cofim:boulangerie-namur", "cofim:1234"],
//!   "_meta": { "app": { "last_probed_id": "505" } }
//! }
//! ```
//! Loading never fails: a missing, unreadable or hand-mangled file is an empty state,
//! and entries of the wrong shape are skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tokio::fs;

/// Reserved top-level key holding `meta` for every source.
pub const META_KEY: &str = "_meta";

pub type SourceMeta = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    seen: BTreeMap<String, BTreeSet<String>>,
    meta: BTreeMap<String, SourceMeta>,
}

impl State {
    pub fn is_seen(&self, source: &str, key: &str) -> bool {
        self.seen.get(source).is_some_and(|s| s.contains(key))
    }

    /// Returns `true` when the key was not present yet.
    pub fn mark_seen(&mut self, source: &str, key: &str) -> bool {
        self.seen
            .entry(source.to_string())
            .or_default()
            .insert(key.to_string())
    }

    pub fn seen(&self, source: &str) -> Option<&BTreeSet<String>> {
        self.seen.get(source)
    }

    pub fn seen_count(&self, source: &str) -> usize {
        self.seen.get(source).map_or(0, BTreeSet::len)
    }

    pub fn meta(&self, source: &str) -> SourceMeta {
        self.meta.get(source).cloned().unwrap_or_default()
    }

    pub fn set_meta(&mut self, source: &str, meta: SourceMeta) {
        if meta.is_empty() {
            self.meta.remove(source);
        } else {
            self.meta.insert(source.to_string(), meta);
        }
    }

    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for (source, keys) in &self.seen {
            if source == META_KEY {
                continue;
            }
            let arr = keys.iter().cloned().map(Value::String).collect();
            root.insert(source.clone(), Value::Array(arr));
        }
        if !self.meta.is_empty() {
            let mut m = Map::new();
            for (source, fields) in &self.meta {
                let obj = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                m.insert(source.clone(), Value::Object(obj));
            }
            root.insert(META_KEY.to_string(), Value::Object(m));
        }
        Value::Object(root)
    }

    /// Tolerant decode; anything unexpected is ignored rather than rejected.
    pub fn from_json(v: &Value) -> Self {
        let mut out = State::default();
        let Some(root) = v.as_object() else {
            return out;
        };
        for (k, v) in root {
            if k == META_KEY {
                if let Some(sources) = v.as_object() {
                    for (source, fields) in sources {
                        let meta = decode_meta(fields);
                        if !meta.is_empty() {
                            out.meta.insert(source.clone(), meta);
                        }
                    }
                }
                continue;
            }
            if let Some(arr) = v.as_array() {
                let keys: BTreeSet<String> = arr
                    .iter()
                    .filter_map(|x| x.as_str())
                    .map(str::to_string)
                    .collect();
                out.seen.insert(k.clone(), keys);
            }
        }
        out
    }
}

fn decode_meta(v: &Value) -> SourceMeta {
    let mut meta = SourceMeta::new();
    if let Some(obj) = v.as_object() {
        for (k, v) in obj {
            // hand edits sometimes turn "500" into 500
            let s = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            meta.insert(k.clone(), s);
        }
    }
    meta
}

/// JSON-file backed store.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> State {
        match fs::read_to_string(&self.path).await {
            Ok(s) => match serde_json::from_str::<Value>(&s) {
                Ok(v) => State::from_json(&v),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "state file unparsable, starting empty");
                    State::default()
                }
            },
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "no state file, starting empty");
                State::default()
            }
        }
    }

    /// Whole-file overwrite via a sibling temp file + rename.
    pub async fn save(&self, state: &State) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating state dir {}", dir.display()))?;
        }
        let body = serde_json::to_vec_pretty(&state.to_json()).context("encoding state")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mark_seen_is_idempotent() {
        let mut s = State::default();
        assert!(s.mark_seen("cofim", "cofim:1"));
        assert!(!s.mark_seen("cofim", "cofim:1"));
        assert_eq!(s.seen_count("cofim"), 1);
        assert!(s.is_seen("cofim", "cofim:1"));
        assert!(!s.is_seen("car", "cofim:1"));
    }

    #[test]
    fn json_shape_has_sorted_lists_and_meta_block() {
        let mut s = State::default();
        s.mark_seen("a", "a:2");
        s.mark_seen("a", "a:1");
        let mut m = SourceMeta::new();
        m.insert("last_probed_id".into(), "500".into());
        s.set_meta("app", m);
        assert_eq!(
            s.to_json(),
            json!({ "a": ["a:1", "a:2"], "_meta": { "app": { "last_probed_id": "500" } } })
        );
    }

    #[test]
    fn hand_edited_values_are_tolerated() {
        let v = json!({
            "a": ["a:1", 7, null, "a:2"],
            "b": "not a list",
            "_meta": { "app": { "last_probed_id": 500, "junk": [1] }, "x": 3 }
        });
        let s = State::from_json(&v);
        assert_eq!(s.seen_count("a"), 2);
        assert!(s.seen("b").is_none());
        assert_eq!(s.meta("app").get("last_probed_id").map(String::as_str), Some("500"));
        assert!(s.meta("app").get("junk").is_none());
        assert!(s.meta("x").is_empty());
        assert_eq!(State::from_json(&json!([1, 2])), State::default());
    }

    #[test]
    fn empty_meta_removes_the_entry() {
        let mut s = State::default();
        let mut m = SourceMeta::new();
        m.insert("k".into(), "v".into());
        s.set_meta("app", m);
        s.set_meta("app", SourceMeta::new());
        assert_eq!(s.to_json(), json!({}));
    }
}
