//! Rewrite request building and response parsing
//!
//! Generative providers promise nothing about their output: it may be bare
//! JSON, JSON wrapped in prose or markdown fences, a one-element list, or an
//! object keyed by destination name. [`parse_rewrite`] folds all of that into
//! a single tagged result.

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::domain::entities::{ContentItem, RewrittenContent};

/// Keys every rewrite must carry, non-empty
pub const REWRITE_KEYS: [&str; 5] = ["title", "short_description", "description", "meta_title", "slug"];

/// Used when neither the destination nor the global prompt is configured
pub const FALLBACK_PROMPT: &str = "Rewrite the content slightly for clarity and engagement.";

const REWRITE_RULES: &str = "\
Rewrite the following news content for the portal.
Each portal must have a unique variation of the rewritten content.

Rules:
- Preserve all HTML tags, attributes, styles, images, links, lists, and formatting inside the description.
- Rewrite the textual content for: title, short_description, description, and meta_title.
- short_description must be 1-2 sentences (<160 chars) summarizing the rewritten description.
- Generate a slug as a clean, URL-safe version of the rewritten meta_title (lowercase, hyphen separated).
- Ensure wording differs slightly for each portal, but keep meaning intact.
- Do not remove, add, or modify any HTML structure.

Return ONLY valid JSON with keys: title, short_description, description, meta_title, slug.";

lazy_static::lazy_static! {
    /// Outermost `{...}` or `[...]` span, greedy
    static ref JSON_SPAN_REGEX: Regex = Regex::new(r"\{[\s\S]*\}|\[[\s\S]*\]").unwrap();
}

/// User message for a rewrite: the rules followed by the current fields as a JSON object
pub fn build_user_message(item: &ContentItem) -> String {
    let current = json!({
        "title": item.title,
        "short_description": item.short_description,
        "description": item.body,
        "meta_title": item.effective_meta_title(),
        "slug": item.effective_slug(),
    });
    let rendered = serde_json::to_string_pretty(&current).unwrap_or_else(|_| current.to_string());
    format!("{}\n\n{}\n", REWRITE_RULES, rendered)
}

/// The five validated rewrite fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteFields {
    pub title: String,
    pub short_description: String,
    pub description: String,
    pub meta_title: String,
    pub slug: String,
}

/// Outcome of parsing a provider response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteParse {
    Valid(RewriteFields),
    Malformed { raw: String, reason: String },
}

impl RewriteParse {
    fn malformed(raw: &str, reason: impl Into<String>) -> Self {
        RewriteParse::Malformed {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parse a provider response into rewrite fields.
///
/// 1. strict JSON parse of the trimmed text
/// 2. otherwise the first greedy `{...}`/`[...]` span
/// 3. a list yields its first element
/// 4. an object sharing no key with [`REWRITE_KEYS`] is unwrapped one level
/// 5. every key in [`REWRITE_KEYS`] must be a non-empty string
pub fn parse_rewrite(raw: &str) -> RewriteParse {
    let text = raw.trim();

    let mut value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(_) => {
            let Some(span) = JSON_SPAN_REGEX.find(text) else {
                return RewriteParse::malformed(raw, "No valid JSON structure in response");
            };
            match serde_json::from_str::<Value>(span.as_str()) {
                Ok(value) => value,
                Err(e) => return RewriteParse::malformed(raw, format!("Invalid JSON: {}", e)),
            }
        }
    };

    if let Value::Array(items) = value {
        match items.into_iter().next() {
            Some(first) => value = first,
            None => return RewriteParse::malformed(raw, "Empty list in response"),
        }
    }

    let Value::Object(object) = value else {
        return RewriteParse::malformed(raw, "Response is not a JSON object");
    };
    let object = unwrap_nested(object);

    match required_fields(&object) {
        Ok(fields) => RewriteParse::Valid(fields),
        Err(reason) => RewriteParse::malformed(raw, reason),
    }
}

fn required_fields(object: &Map<String, Value>) -> Result<RewriteFields, String> {
    Ok(RewriteFields {
        title: required(object, "title")?,
        short_description: required(object, "short_description")?,
        description: required(object, "description")?,
        meta_title: required(object, "meta_title")?,
        slug: required(object, "slug")?,
    })
}

fn required(object: &Map<String, Value>, key: &str) -> Result<String, String> {
    match object.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            Err(format!("Missing/empty key '{}' in response", key))
        }
        Some(_) => Err(format!("Key '{}' is not a string in response", key)),
    }
}

/// `{"example.com": {...}}` → `{...}` when no known key is present at the top level
fn unwrap_nested(object: Map<String, Value>) -> Map<String, Value> {
    let has_known_key = object.keys().any(|k| REWRITE_KEYS.contains(&k.as_str()));
    if object.is_empty() || has_known_key {
        return object;
    }

    let inner = match object.values().next() {
        Some(Value::Object(inner)) => Some(inner.clone()),
        _ => None,
    };
    inner.unwrap_or(object)
}

impl RewrittenContent {
    /// Final content from validated rewrite fields.
    ///
    /// Meta title and slug fall back to the item's defaults only when the
    /// model's value is empty.
    pub fn from_rewrite(fields: RewriteFields, item: &ContentItem) -> Self {
        let or_default = |value: String, default: &str| {
            if value.is_empty() {
                default.to_string()
            } else {
                value
            }
        };
        Self {
            title: or_default(fields.title, &item.title),
            short_description: or_default(fields.short_description, &item.short_description),
            description: or_default(fields.description, &item.body),
            meta_title: or_default(fields.meta_title, item.effective_meta_title()),
            slug: or_default(fields.slug, &item.effective_slug()),
        }
    }
}
