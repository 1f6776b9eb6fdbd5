//! Compatibility specification documents.
//!
//! A parser produces a [`DockerfileModel`]: a mapping from category name to
//! a JSON value, already passed through [`normalize_model`]. The assembler
//! wraps it in a [`CompatibilitySpec`], which is what gets printed and cached.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Parsed Dockerfile categories (base image, labels, env, expose, ...).
pub type DockerfileModel = Map<String, Value>;

/// Filesystem guts of a built image: path to its ordered link set.
pub type Guts = BTreeMap<String, Vec<String>>;

/// Top-level key holding the resolved image reference.
pub const URI_KEY: &str = "uri";

/// Top-level key of the annotation object (annotated shape only).
pub const ANNOTATIONS_KEY: &str = "annotations";

/// Top-level key of the compatibility records (annotated shape only).
pub const COMPATIBILITIES_KEY: &str = "compatibilities";

/// Output shape produced by a parser variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelShape {
    /// Categories at the top level, `uri` set directly on the document.
    Flat,
    /// `annotations` plus a `compatibilities` list whose first record
    /// receives synthesized binary keys.
    Annotated,
}

/// The assembled compatibility specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompatibilitySpec(Map<String, Value>);

impl CompatibilitySpec {
    /// Build a document from a parsed model, normalizing it first.
    pub fn from_model(model: DockerfileModel) -> Self {
        Self(normalize_model(model))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The resolved image reference, if one was recorded.
    pub fn uri(&self) -> Option<&str> {
        self.0.get(URI_KEY).and_then(Value::as_str)
    }

    pub fn set_uri(&mut self, uri: &str) {
        self.0
            .insert(URI_KEY.to_string(), Value::String(uri.to_string()));
    }

    /// The `annotations` object, if present.
    pub fn annotations_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.0.get_mut(ANNOTATIONS_KEY).and_then(Value::as_object_mut)
    }

    /// The first compatibility record, if present.
    pub fn compatibility(&self) -> Option<&Map<String, Value>> {
        self.0
            .get(COMPATIBILITIES_KEY)
            .and_then(Value::as_array)
            .and_then(|records| records.first())
            .and_then(Value::as_object)
    }

    /// Mutable access to the first compatibility record, if present.
    pub fn compatibility_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.0
            .get_mut(COMPATIBILITIES_KEY)
            .and_then(Value::as_array_mut)
            .and_then(|records| records.first_mut())
            .and_then(Value::as_object_mut)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Single-line JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl From<Map<String, Value>> for CompatibilitySpec {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Whether a value counts as absent: null, false, "", [] or {}.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

/// Normalize a parsed model.
///
/// Empty categories are dropped and string sequences are sorted and
/// stripped of empty entries. Duplicates are kept. Scalars pass through
/// untouched. Keys come out in sorted order.
pub fn normalize_model(model: DockerfileModel) -> DockerfileModel {
    let ordered: BTreeMap<String, Value> = model.into_iter().collect();
    ordered
        .into_iter()
        .map(|(key, value)| match value {
            Value::Array(items) => (key, Value::Array(sort_strings(items))),
            other => (key, other),
        })
        .filter(|(_, value)| !is_empty_value(value))
        .collect()
}

/// Sort a sequence if every element is a string; other sequences are kept
/// in their given order.
fn sort_strings(items: Vec<Value>) -> Vec<Value> {
    if !items.iter().all(Value::is_string) {
        return items;
    }
    let mut strings: Vec<String> = items
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        })
        .collect();
    strings.sort();
    strings.into_iter().map(Value::String).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model(value: Value) -> DockerfileModel {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_model_drops_empty_categories() {
        let spec = CompatibilitySpec::from_model(model(json!({
            "base_image": "ubuntu:22.04",
            "expose": [],
            "labels": {},
            "user": "",
            "workdir": null,
        })));
        assert_eq!(spec.as_map().len(), 1);
        assert!(spec.contains_key("base_image"));
        assert!(!spec.contains_key("expose"));
    }

    #[test]
    fn test_from_model_sorts_sequences() {
        let spec = CompatibilitySpec::from_model(model(json!({
            "expose": ["9090", "80", "", "8080", "80"],
        })));
        assert_eq!(spec.get("expose"), Some(&json!(["80", "80", "8080", "9090"])));
    }

    #[test]
    fn test_normalize_model_is_idempotent() {
        let once = normalize_model(model(json!({
            "packages": ["zlib", "gcc", "gcc"],
            "env": [],
            "user": "",
            "cmd": "make",
        })));
        assert_eq!(Value::Object(once.clone()), json!({"cmd": "make", "packages": ["gcc", "gcc", "zlib"]}));
        assert_eq!(normalize_model(once.clone()), once);
    }

    #[test]
    fn test_from_model_keeps_scalars() {
        let spec = CompatibilitySpec::from_model(model(json!({
            "cmd": "python app.py",
        })));
        assert_eq!(spec.get("cmd"), Some(&json!("python app.py")));
    }

    #[test]
    fn test_from_model_sequence_of_only_empty_strings_is_dropped() {
        let spec = CompatibilitySpec::from_model(model(json!({ "volumes": ["", ""] })));
        assert!(!spec.contains_key("volumes"));
    }

    #[test]
    fn test_from_model_keeps_object_sequences_in_order() {
        let spec = CompatibilitySpec::from_model(model(json!({
            "compatibilities": [{"b": "2"}, {"a": "1"}],
        })));
        assert_eq!(
            spec.get("compatibilities"),
            Some(&json!([{"b": "2"}, {"a": "1"}]))
        );
    }

    #[test]
    fn test_compatibility_mut() {
        let mut spec = CompatibilitySpec::from_model(model(json!({
            "annotations": {"compat.parser": "compspec"},
            "compatibilities": [{"compspec.os.name": "ubuntu"}],
        })));
        spec.compatibility_mut()
            .unwrap()
            .insert("compspec.binary.libmpi.so".into(), json!("/usr/lib/libmpi.so"));
        assert_eq!(
            spec.compatibility().unwrap().get("compspec.binary.libmpi.so"),
            Some(&json!("/usr/lib/libmpi.so"))
        );
    }

    #[test]
    fn test_uri_roundtrip() {
        let mut spec = CompatibilitySpec::default();
        assert_eq!(spec.uri(), None);
        spec.set_uri("ghcr.io/org/app:1.0");
        assert_eq!(spec.uri(), Some("ghcr.io/org/app:1.0"));
    }

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!(false)));
        assert!(is_empty_value(&json!("")));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!("x")));
    }

    #[test]
    fn test_to_json_is_deterministic() {
        let a = CompatibilitySpec::from_model(model(json!({"z": "1", "a": ["b", "a"]})));
        let b = CompatibilitySpec::from_model(model(json!({"a": ["a", "b"], "z": "1"})));
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    }
}
