use crate::ingest::truncate_chars;
use crate::ingest::types::Item;

pub const TEASER_MAX_CHARS: usize = 280;

/// `[Label] title`, one `Caption: value` line per present field, then the URL.
/// Long free-text fields (teaser, description) are truncated.
pub fn render_listing(label: &str, item: &Item, fields: &[(&str, &str)]) -> String {
    let mut lines = vec![format!("[{label}] {}", item.title)];
    for (key, caption) in fields {
        let Some(v) = item.attr(key).filter(|v| !v.is_empty()) else {
            continue;
        };
        let v = match *key {
            "teaser" | "description" => truncate_chars(v, TEASER_MAX_CHARS),
            _ => v.to_string(),
        };
        lines.push(format!("{caption}: {v}"));
    }
    lines.push(item.url.clone());
    lines.join("\n")
}
