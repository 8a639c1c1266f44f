//! Query/filter engine: the restricted `q` grammar the Drive client uses and
//! the `fields` projection syntax.
//!
//! Only three query shapes are recognised, matching what the real API is
//! exercised with: empty (everything), `mimeType='X'`, and
//! `'<parent>' in parents`. Anything else is a bad request rather than a
//! best-effort parse.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{DriveError, DriveResult};
use crate::store::ItemStore;

static MIME_TYPE_QUERY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^mimeType='.*'$").unwrap());
static PARENTS_QUERY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^'.*' in parents$").unwrap());

/// Split a comma-joined field list, unwrapping Google's nested projection
/// syntax `files(a,b,c)`: the first part loses the `files(` prefix and any
/// later part ending in `)` loses that suffix.
pub fn parse_fields(source: &str) -> Vec<String> {
    source
        .split(',')
        .map(|field| {
            if let Some(inner) = field.strip_prefix("files(") {
                inner.to_string()
            } else if let Some(inner) = field.strip_suffix(')') {
                inner.to_string()
            } else {
                field.to_string()
            }
        })
        .collect()
}

/// Project an item's metadata down to the requested fields; fields the item
/// does not carry are silently omitted.
pub fn filter_fields(fields: &Map<String, Value>, wanted: &[String]) -> Map<String, Value> {
    let mut out = Map::new();
    for name in wanted {
        if let Some(v) = fields.get(name) {
            out.insert(name.clone(), v.clone());
        }
    }
    out
}

/// Evaluate a `q` filter against the store, returning the matching items
/// projected to `wanted`. The parents form distinguishes an unknown parent
/// (404) from a permission-blocklisted one (403), mirroring the live service.
pub fn run_query(
    store: &ItemStore,
    blocklist: &HashSet<String>,
    q: &str,
    wanted: &[String],
) -> DriveResult<Vec<Map<String, Value>>> {
    if q.is_empty() {
        return Ok(store.iter().map(|item| filter_fields(&item.fields, wanted)).collect());
    }
    if MIME_TYPE_QUERY.is_match(q) {
        let mime = &q["mimeType='".len()..q.len() - 1];
        return Ok(store
            .iter()
            .filter(|item| item.fields.get("mimeType").and_then(Value::as_str) == Some(mime))
            .map(|item| filter_fields(&item.fields, wanted))
            .collect());
    }
    if PARENTS_QUERY.is_match(q) {
        let parent = &q[1..q.len() - "' in parents".len()];
        if !store.contains(parent) {
            return Err(DriveError::NotFound);
        }
        if blocklist.contains(parent) {
            return Err(DriveError::Forbidden);
        }
        return Ok(store
            .iter()
            .filter(|item| item.has_parent(parent))
            .map(|item| filter_fields(&item.fields, wanted))
            .collect());
    }
    Err(DriveError::BadRequest)
}
