//! In-memory item store: one map of file/folder metadata records, plus the
//! merge rules the Drive API applies on create and update.
//!
//! Metadata is caller-supplied and open-ended, so it is kept as a JSON object
//! (`serde_json::Map`) rather than a fixed struct. Raw file content lives
//! beside the metadata, never inside it, so field projection can stay a pure
//! JSON operation.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::util::rfc3339_now;

/// One file or folder record. `content` is populated only when the item was
/// produced by a completed upload.
#[derive(Debug, Clone)]
pub struct Item {
    pub fields: Map<String, Value>,
    pub content: Option<Vec<u8>>,
}

impl Item {
    /// Build an item from caller metadata, stamping the server-owned fields:
    /// `capabilities`, `trashed`, `id` and `modifiedTime`. The id is
    /// immutable from here on.
    pub fn format(mut fields: Map<String, Value>, id: &str) -> Item {
        fields.insert(
            "capabilities".into(),
            json!({"canAddChildren": true, "canListChildren": true, "canDeleteChildren": true}),
        );
        fields.insert("trashed".into(), Value::Bool(false));
        fields.insert("id".into(), Value::String(id.to_string()));
        fields.insert("modifiedTime".into(), Value::String(rfc3339_now()));
        Item { fields, content: None }
    }

    /// Declared size of the item in bytes, 0 when absent or non-numeric.
    pub fn size(&self) -> u64 {
        self.fields.get("size").and_then(Value::as_u64).unwrap_or(0)
    }

    /// Whether `parent_id` appears in this item's `parents` list.
    pub fn has_parent(&self, parent_id: &str) -> bool {
        self.fields
            .get("parents")
            .and_then(Value::as_array)
            .map(|parents| parents.iter().any(|p| p.as_str() == Some(parent_id)))
            .unwrap_or(false)
    }

    /// Apply an update body: shallow merge, except that when both the stored
    /// and incoming value for a key are objects, the objects are merged one
    /// level deep (incoming keys override). `modifiedTime` is refreshed.
    pub fn merge_update(&mut self, update: Map<String, Value>) {
        for (key, value) in update {
            match (self.fields.get_mut(&key), value) {
                (Some(Value::Object(existing)), Value::Object(incoming)) => {
                    for (k, v) in incoming {
                        existing.insert(k, v);
                    }
                }
                (_, value) => {
                    self.fields.insert(key, value);
                }
            }
        }
        self.fields.insert("modifiedTime".into(), Value::String(rfc3339_now()));
    }
}

/// The whole simulated drive: id -> item. Held for the lifetime of one test
/// run; nothing is persisted.
#[derive(Debug, Default)]
pub struct ItemStore {
    items: HashMap<String, Item>,
}

impl ItemStore {
    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn insert(&mut self, id: String, item: Item) {
        self.items.insert(id, item);
    }

    pub fn remove(&mut self, id: &str) -> Option<Item> {
        self.items.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of the declared `size` of every stored item; the quota check adds
    /// a pending upload's declared size on top of this.
    pub fn total_size(&self) -> u64 {
        self.items.values().map(Item::size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn format_stamps_server_fields() {
        let item = Item::format(meta(&[("mimeType", json!("text/plain"))]), "abc123");
        assert_eq!(item.fields["id"], json!("abc123"));
        assert_eq!(item.fields["trashed"], json!(false));
        assert_eq!(item.fields["mimeType"], json!("text/plain"));
        let caps = item.fields["capabilities"].as_object().unwrap();
        assert_eq!(caps["canAddChildren"], json!(true));
        assert_eq!(caps["canListChildren"], json!(true));
        assert_eq!(caps["canDeleteChildren"], json!(true));
        assert!(item.fields["modifiedTime"].is_string());
        assert!(item.content.is_none());
    }

    #[test]
    fn merge_update_replaces_scalars_and_merges_objects() {
        let mut item = Item::format(
            meta(&[
                ("name", json!("old.txt")),
                ("appProperties", json!({"a": 1, "b": 2})),
            ]),
            "id1",
        );
        item.merge_update(meta(&[
            ("name", json!("new.txt")),
            ("appProperties", json!({"b": 3, "c": 4})),
        ]));
        assert_eq!(item.fields["name"], json!("new.txt"));
        // one-level merge: untouched keys survive, later keys override
        assert_eq!(item.fields["appProperties"], json!({"a": 1, "b": 3, "c": 4}));
        // the immutable id survives a merge
        assert_eq!(item.fields["id"], json!("id1"));
    }

    #[test]
    fn merge_update_is_idempotent_for_scalars() {
        let mut item = Item::format(meta(&[("name", json!("a"))]), "id2");
        let update = meta(&[("name", json!("b")), ("starred", json!(true))]);
        item.merge_update(update.clone());
        let first = item.fields.clone();
        item.merge_update(update);
        // identical state apart from the refreshed timestamp
        let mut second = item.fields.clone();
        second.insert("modifiedTime".into(), first["modifiedTime"].clone());
        assert_eq!(first, second);
    }

    #[test]
    fn total_size_sums_declared_sizes() {
        let mut store = ItemStore::default();
        store.insert("a".into(), Item::format(meta(&[("size", json!(100))]), "a"));
        store.insert("b".into(), Item::format(meta(&[("size", json!(250))]), "b"));
        // items without a size count as zero
        store.insert("c".into(), Item::format(meta(&[]), "c"));
        assert_eq!(store.total_size(), 350);
    }

    #[test]
    fn has_parent_checks_membership() {
        let item = Item::format(meta(&[("parents", json!(["p1", "p2"]))]), "kid");
        assert!(item.has_parent("p1"));
        assert!(item.has_parent("p2"));
        assert!(!item.has_parent("p3"));
        let orphan = Item::format(meta(&[]), "lone");
        assert!(!orphan.has_parent("p1"));
    }
}
