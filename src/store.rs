use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{EditorError, Result};
use crate::literal::{field_text, parse_literal};

/// One JSON object of the dataset, with its keys in file order.
pub type Record = Map<String, Value>;

/// The whole dataset, in file order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnnotationSet {
    records: Vec<Record>,
}

impl AnnotationSet {
    #[cfg(test)]
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Reads a JSON array of objects. Nothing is returned unless the whole
    /// file parses.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| EditorError::io(path, e))?;
        let root: Value = serde_json::from_str(&data).map_err(|source| EditorError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let Value::Array(items) = root else {
            return Err(EditorError::Layout {
                path: path.to_path_buf(),
                reason: "top level is not an array".to_string(),
            });
        };

        let mut records = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(record) => records.push(record),
                _ => {
                    return Err(EditorError::Layout {
                        path: path.to_path_buf(),
                        reason: format!("element {i} is not an object"),
                    })
                }
            }
        }
        info!(path = %path.display(), records = records.len(), "loaded annotations");
        Ok(Self { records })
    }

    /// Writes the set as pretty-printed JSON (4-space indent, non-ASCII kept
    /// as is), replacing whatever is at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.records
            .serialize(&mut ser)
            .map_err(|e| EditorError::io(path, e.into()))?;
        std::fs::write(path, buf).map_err(|e| EditorError::io(path, e))?;
        info!(path = %path.display(), records = self.records.len(), "saved annotations");
        Ok(())
    }

    /// Union of the keys of every record, sorted.
    pub fn fields(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .flat_map(|record| record.keys().cloned())
            .collect()
    }

    /// Circular search for the first record after `start` whose `key` value
    /// contains `needle` in its text form. The record at `start` is checked
    /// last.
    pub fn find(&self, start: usize, key: &str, needle: &str) -> Option<usize> {
        let n = self.records.len();
        if n == 0 {
            return None;
        }
        let found = (1..=n)
            .map(|offset| (start + offset) % n)
            .find(|&i| {
                self.records[i]
                    .get(key)
                    .is_some_and(|value| field_text(value).contains(needle))
            });
        if found.is_none() {
            debug!(key, needle, "search exhausted every record");
        }
        found
    }

    /// Writes `text` into `key` of record `index`. String fields take the text
    /// verbatim; anything else is parsed as a literal and falls back to the
    /// raw text when that fails. Returns the stored value.
    pub fn set_field(&mut self, index: usize, key: &str, text: &str) -> Option<&Value> {
        let record = self.records.get_mut(index)?;
        let new_value = coerce(record.get(key), text);
        record.insert(key.to_string(), new_value);
        record.get(key)
    }

    /// Stores `value` as is, bypassing coercion.
    pub fn set_raw(&mut self, index: usize, key: &str, value: Value) {
        if let Some(record) = self.records.get_mut(index) {
            record.insert(key.to_string(), value);
        }
    }
}

/// Converts editor text into the value to store, given what the field held
/// before the edit.
pub fn coerce(previous: Option<&Value>, text: &str) -> Value {
    match previous {
        Some(Value::String(_)) => Value::String(text.to_string()),
        _ => parse_literal(text).unwrap_or_else(|_| Value::String(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    fn set_of(value: Value) -> AnnotationSet {
        let Value::Array(items) = value else {
            panic!("expected array");
        };
        AnnotationSet::new(
            items
                .into_iter()
                .map(|item| item.as_object().cloned().expect("object"))
                .collect(),
        )
    }

    fn sample() -> AnnotationSet {
        set_of(json!([
            {"image": "a.jpg", "caption": "a cat", "bbox": [1, 2, 3, 4]},
            {"image": "b.jpg", "caption": "a dog"},
            {"image": "c.jpg", "caption": "another cat", "extra": 7},
            {"image": "d.jpg", "caption": "a bird"},
        ]))
    }

    #[test]
    fn load_then_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.json");
        let original = json!([
            {"image": ["x.png", "y.png"], "text": "猫がいる", "bbox": [[0.1, 0.2, 0.3, 0.4]]},
            {"z": 1, "a": {"nested": [1, 2]}, "flag": false, "none": null}
        ]);
        std::fs::write(&src, serde_json::to_string(&original).unwrap()).unwrap();

        let set = AnnotationSet::load(&src).unwrap();
        let dst = dir.path().join("out.json");
        set.save(&dst).unwrap();

        let written = std::fs::read_to_string(&dst).unwrap();
        assert!(written.contains("猫がいる"), "non-ASCII must not be escaped");
        assert!(written.contains("\n    {"), "expected 4-space indentation");
        let reread: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(reread, original);
        // Key order inside records survives.
        let keys: Vec<_> = AnnotationSet::load(&dst).unwrap().records()[1]
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, ["z", "a", "flag", "none"]);
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[{\"a\": 1},").unwrap();
        let err = AnnotationSet::load(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn load_rejects_non_array_and_non_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obj.json");
        std::fs::write(&path, "{\"a\": 1}").unwrap();
        assert_eq!(AnnotationSet::load(&path).unwrap_err().kind(), ErrorKind::Parse);

        std::fs::write(&path, "[{\"a\": 1}, 3]").unwrap();
        assert_eq!(AnnotationSet::load(&path).unwrap_err().kind(), ErrorKind::Parse);
    }

    #[test]
    fn load_reports_missing_file_as_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = AnnotationSet::load(&dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn save_into_missing_directory_fails_with_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = sample()
            .save(&dir.path().join("no/such/dir/out.json"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn fields_are_the_union_of_keys() {
        let fields: Vec<_> = sample().fields().into_iter().collect();
        assert_eq!(fields, ["bbox", "caption", "extra", "image"]);
    }

    #[test]
    fn find_starts_after_cursor_and_wraps() {
        let set = sample();
        assert_eq!(set.find(0, "caption", "cat"), Some(2));
        assert_eq!(set.find(2, "caption", "cat"), Some(0));
        assert_eq!(set.find(3, "caption", "a "), Some(0));
        assert_eq!(set.find(1, "caption", "dog"), Some(1));
        assert_eq!(set.find(0, "caption", "fish"), None);
    }

    #[test]
    fn find_checks_every_record_once() {
        let set = sample();
        for start in 0..set.len() {
            assert_eq!(set.find(start, "extra", "7"), Some(2));
            assert_eq!(set.find(start, "missing", ""), None);
        }
    }

    #[test]
    fn find_matches_text_form_of_structured_values() {
        let set = sample();
        assert_eq!(set.find(1, "bbox", "2, 3"), Some(0));
        assert_eq!(AnnotationSet::default().find(0, "bbox", "1"), None);
    }

    #[test]
    fn set_field_keeps_strings_verbatim() {
        let mut set = sample();
        set.set_field(0, "caption", "[1, 2]");
        assert_eq!(set.get(0).unwrap()["caption"], json!("[1, 2]"));
        set.set_field(0, "caption", "42");
        assert_eq!(set.get(0).unwrap()["caption"], json!("42"));
    }

    #[test]
    fn set_field_parses_structured_values() {
        let mut set = sample();
        set.set_field(0, "bbox", "[5, 6, 7, 8]");
        assert_eq!(set.get(0).unwrap()["bbox"], json!([5, 6, 7, 8]));
        set.set_field(2, "extra", "{'k': None}");
        assert_eq!(set.get(2).unwrap()["extra"], json!({"k": null}));
    }

    #[test]
    fn set_field_falls_back_to_raw_text() {
        let mut set = sample();
        set.set_field(2, "extra", "not a literal");
        assert_eq!(set.get(2).unwrap()["extra"], json!("not a literal"));
        set.set_field(1, "bbox", "[1, 2");
        assert_eq!(set.get(1).unwrap()["bbox"], json!("[1, 2"));
    }

    #[test]
    fn set_field_parses_text_for_missing_keys() {
        let mut set = sample();
        set.set_field(1, "new_key", "[1, 2]");
        assert_eq!(set.get(1).unwrap()["new_key"], json!([1, 2]));
        set.set_field(1, "new_key2", "hello");
        assert_eq!(set.get(1).unwrap()["new_key2"], json!("hello"));
        set.set_field(1, "new_key3", "1, 2");
        assert_eq!(set.get(1).unwrap()["new_key3"], json!([1, 2]));
    }

    #[test]
    fn set_field_out_of_range_is_ignored() {
        let mut set = sample();
        assert!(set.set_field(10, "caption", "x").is_none());
        assert_eq!(set, sample());
    }
}
