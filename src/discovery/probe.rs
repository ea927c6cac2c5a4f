//! Probing candidate endpoints and turning JSON records into items.

use serde_json::{Map, Value};

use super::{DiscoveryTarget, ResolvedEndpoint, PROBE_MATRIX};
use crate::context::RunContext;
use crate::ingest::types::Item;
use crate::ingest::{absolute_url, accept_title, normalize_text, normalize_url};

pub type Record = Map<String, Value>;

/// Keys commonly wrapping the record array in API responses.
const WRAPPER_KEYS: &[&str] = &[
    "data", "items", "results", "records", "content", "listings", "hits", "rows", "annonces",
    "offers",
];
const ID_KEYS: &[&str] = &["id", "_id", "uuid", "reference", "ref", "slug"];
const TITLE_KEYS: &[&str] = &["title", "name", "titre", "label", "nom", "heading"];
const URL_KEYS: &[&str] = &["url", "link", "href", "permalink", "slug"];
const LINK_KEYS: &[&str] = &["url", "link", "href", "permalink"];

const ATTR_KEYS: &[(&str, &[&str])] = &[
    ("location", &["location", "city", "ville", "region", "localite", "locality"]),
    ("price", &["price", "prix", "asking_price", "amount"]),
    ("sector", &["sector", "secteur", "category", "categorie"]),
    ("type", &["type", "kind"]),
    ("teaser", &["teaser", "summary", "excerpt", "resume"]),
    ("description", &["description"]),
    ("turnover", &["turnover", "chiffre_affaires", "revenue"]),
];

/// Records in a JSON body: a top-level array, or an array under a wrapper key
/// (one nested level allowed, e.g. `{"data": {"items": [...]}}`).
/// Anything else, including non-JSON, is no records.
pub fn records_from_body(body: &str) -> Vec<Record> {
    match serde_json::from_str::<Value>(body.trim()) {
        Ok(v) => find_records(&v, 0).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

fn find_records(v: &Value, depth: u8) -> Option<Vec<Record>> {
    match v {
        Value::Array(arr) => {
            let recs: Vec<Record> = arr
                .iter()
                .filter_map(Value::as_object)
                .filter(|o| is_record(o))
                .cloned()
                .collect();
            (!recs.is_empty()).then_some(recs)
        }
        Value::Object(obj) if depth < 2 => {
            let preferred = WRAPPER_KEYS.iter().filter_map(|k| obj.get(*k));
            let others = obj
                .iter()
                .filter(|(k, _)| !WRAPPER_KEYS.contains(&k.as_str()))
                .map(|(_, v)| v);
            preferred
                .chain(others)
                .find_map(|child| find_records(child, depth + 1))
        }
        _ => None,
    }
}

/// Has an id-like field plus a title-like or url-like field.
pub fn is_record(o: &Record) -> bool {
    first_scalar(o, ID_KEYS).is_some()
        && (first_scalar(o, TITLE_KEYS).is_some() || first_scalar(o, URL_KEYS).is_some())
}

fn first_scalar(o: &Record, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| scalar(o.get(*k)?))
}

fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Map one record to an item. Records without a usable title are skipped.
/// When the record carries no link, the detail template is filled with its id.
pub fn record_to_item(target: &DiscoveryTarget, rec: &Record) -> Option<Item> {
    let id = first_scalar(rec, ID_KEYS)?;
    let title = normalize_text(&first_scalar(rec, TITLE_KEYS)?);
    if !accept_title(&title) {
        return None;
    }
    let url = first_scalar(rec, LINK_KEYS)
        .and_then(|href| absolute_url(&target.entry_url, &href))
        .unwrap_or_else(|| normalize_url(&target.detail_url(&id)));

    let mut item = Item::new(&target.source, title, url).with_explicit_id(id);
    for (attr, keys) in ATTR_KEYS {
        if let Some(v) = first_scalar(rec, keys) {
            item.set_attr(attr, normalize_text(&v));
        }
    }
    Some(item)
}

/// Try every pagination shape against `url`; the first one answering with
/// records wins. A network failure or a 404 drops the candidate.
pub async fn probe_endpoint(ctx: &RunContext, url: &str) -> Option<ResolvedEndpoint> {
    for shape in PROBE_MATRIX {
        let fetched = match ctx.http.get(url, &shape.query(0)).await {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(%url, error = %e, "candidate unreachable");
                return None;
            }
        };
        if fetched.status == reqwest::StatusCode::NOT_FOUND {
            return None;
        }
        if fetched.status.is_success() && !records_from_body(&fetched.body).is_empty() {
            return Some(ResolvedEndpoint {
                url: url.to_string(),
                shape,
            });
        }
        tracing::trace!(%url, %shape, status = %fetched.status, "no records for shape");
    }
    None
}
