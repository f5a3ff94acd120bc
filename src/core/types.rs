use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use chrono::{DateTime, SecondsFormat, Utc};
use crate::core::error::{Error, Result};

/// Internal document ordinal. Every write gets a fresh slot; slots are never reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    pub fn new(id: u32) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for DocId {
    fn from(id: u32) -> Self {
        DocId(id)
    }
}

/// A document field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Object(Source),
}

/// Document source: top-level field name to value.
pub type Source = BTreeMap<String, FieldValue>;

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "string",
            FieldValue::Date(_) => "date",
            FieldValue::Array(_) => "array",
            FieldValue::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String form used when a scalar is indexed into a keyword or text field.
    pub fn to_term_string(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Int(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Date(d) => Some(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Int(i) => serde_json::Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
            FieldValue::Date(d) => {
                serde_json::Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(FieldValue::to_json).collect())
            }
            FieldValue::Object(map) => source_to_json(map),
        }
    }
}

/// Integers that do not fit an `i64` are rejected rather than widened to a float.
impl TryFrom<serde_json::Value> for FieldValue {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        Ok(match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => FieldValue::Int(i),
                _ if n.is_u64() => {
                    return Err(Error::invalid_argument(format!(
                        "integer [{}] is out of range for a 64-bit signed integer",
                        n
                    )));
                }
                (None, Some(f)) => FieldValue::Float(f),
                (None, None) => return Err(Error::invalid_argument(format!("unsupported number [{}]", n))),
            },
            serde_json::Value::String(s) => FieldValue::Text(s),
            serde_json::Value::Array(items) => FieldValue::Array(
                items
                    .into_iter()
                    .map(FieldValue::try_from)
                    .collect::<Result<Vec<_>>>()?,
            ),
            serde_json::Value::Object(map) => FieldValue::Object(
                map.into_iter()
                    .map(|(k, v)| Ok((k, FieldValue::try_from(v)?)))
                    .collect::<Result<Source>>()?,
            ),
        })
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Builds a source from a JSON object.
pub fn source_from_json(value: serde_json::Value) -> Result<Source> {
    match FieldValue::try_from(value)? {
        FieldValue::Object(map) => Ok(map),
        other => Err(Error::invalid_argument(format!(
            "document source must be an object, found {}",
            other.kind()
        ))),
    }
}

pub fn source_to_json(source: &Source) -> serde_json::Value {
    serde_json::Value::Object(
        source.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
    )
}

/// Values found at a dotted path. Arrays along the way are flattened.
pub fn values_at_path<'a>(source: &'a Source, path: &str) -> Vec<&'a FieldValue> {
    let mut out = Vec::new();
    if let Some(value) = source.get(path) {
        collect_leaves(value, &mut out);
    }
    if let Some((head, rest)) = path.split_once('.') {
        if let Some(value) = source.get(head) {
            descend(value, rest, &mut out);
        }
    }
    out
}

fn descend<'a>(value: &'a FieldValue, path: &str, out: &mut Vec<&'a FieldValue>) {
    match value {
        FieldValue::Object(map) => out.extend(values_at_path(map, path)),
        FieldValue::Array(items) => {
            for item in items {
                descend(item, path, out);
            }
        }
        _ => {}
    }
}

fn collect_leaves<'a>(value: &'a FieldValue, out: &mut Vec<&'a FieldValue>) {
    match value {
        FieldValue::Array(items) => {
            for item in items {
                collect_leaves(item, out);
            }
        }
        other => out.push(other),
    }
}

/// Deep merge of `patch` into `target`: objects merge key by key, everything else is replaced.
pub fn merge_source(target: &mut Source, patch: Source) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(FieldValue::Object(existing)), FieldValue::Object(incoming)) => {
                merge_source(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Keeps only the given dotted paths (and the objects leading to them).
/// A pattern ending in `*` keeps every path with that prefix.
pub fn project_source(source: &Source, includes: &[String]) -> Source {
    project_object(source, "", includes)
}

fn project_object(source: &Source, prefix: &str, includes: &[String]) -> Source {
    let mut out = Source::new();
    for (key, value) in source {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        if includes.iter().any(|pattern| path_selected(&path, pattern)) {
            out.insert(key.clone(), value.clone());
            continue;
        }

        let child_prefix = format!("{}.", path);
        if !includes.iter().any(|pattern| pattern.starts_with(&child_prefix)) {
            continue;
        }

        match value {
            FieldValue::Object(map) => {
                let projected = project_object(map, &path, includes);
                if !projected.is_empty() {
                    out.insert(key.clone(), FieldValue::Object(projected));
                }
            }
            FieldValue::Array(items) => {
                let projected: Vec<FieldValue> = items
                    .iter()
                    .filter_map(|item| match item {
                        FieldValue::Object(map) => {
                            let p = project_object(map, &path, includes);
                            (!p.is_empty()).then_some(FieldValue::Object(p))
                        }
                        _ => None,
                    })
                    .collect();
                if !projected.is_empty() {
                    out.insert(key.clone(), FieldValue::Array(projected));
                }
            }
            _ => {}
        }
    }
    out
}

fn path_selected(path: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => path == pattern,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub version: u64,
    pub source: Source,
    pub deleted: bool,
}

impl Document {
    pub fn get_field(&self, path: &str) -> Vec<&FieldValue> {
        values_at_path(&self.source, path)
    }
}

/// How a write treats an existing document with the same id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    /// Create or replace.
    #[default]
    Index,
    /// Fail with a version conflict if a live document exists.
    Create,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub op_type: OpType,
    /// Expected current version; the write fails with a version conflict otherwise.
    pub if_version: Option<u64>,
}

impl WriteOptions {
    pub fn create() -> Self {
        WriteOptions {
            op_type: OpType::Create,
            if_version: None,
        }
    }

    pub fn if_version(version: u64) -> Self {
        WriteOptions {
            op_type: OpType::Index,
            if_version: Some(version),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOutcome {
    Created,
    Updated,
    Deleted,
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub index: String,
    pub id: String,
    pub version: u64,
    pub result: WriteOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source(value: serde_json::Value) -> Source {
        source_from_json(value).unwrap()
    }

    #[test]
    fn json_conversion_keeps_integer_and_float_apart() {
        let doc = source(json!({"price": 49, "rating": 5.3, "tags": ["a", null]}));
        assert_eq!(doc["price"], FieldValue::Int(49));
        assert_eq!(doc["rating"], FieldValue::Float(5.3));
        assert_eq!(
            doc["tags"],
            FieldValue::Array(vec![FieldValue::Text("a".into()), FieldValue::Null])
        );
        assert_eq!(source_to_json(&doc), json!({"price": 49, "rating": 5.3, "tags": ["a", null]}));
    }

    #[test]
    fn json_integers_beyond_i64_are_rejected() {
        let err = source_from_json(json!({"n": u64::MAX})).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::InvalidArgument);
        assert!(err.context.contains("18446744073709551615"));

        let nested = source_from_json(json!({"a": [{"n": 9_223_372_036_854_775_808u64}]}));
        assert!(nested.is_err());
        assert_eq!(source(json!({"n": i64::MAX}))["n"], FieldValue::Int(i64::MAX));
        assert!(source_from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn path_lookup_walks_objects_and_arrays() {
        let doc = source(json!({
            "author": {"email": "a@b.c"},
            "products": [{"name": "x"}, {"name": "y"}],
            "flat.key": 1
        }));
        assert_eq!(values_at_path(&doc, "author.email"), vec![&FieldValue::Text("a@b.c".into())]);
        assert_eq!(values_at_path(&doc, "products.name").len(), 2);
        assert_eq!(values_at_path(&doc, "flat.key"), vec![&FieldValue::Int(1)]);
        assert!(values_at_path(&doc, "missing").is_empty());
    }

    #[test]
    fn merge_is_deep_for_objects() {
        let mut doc = source(json!({"name": "Toaster", "stock": {"a": 1, "b": 2}}));
        merge_source(&mut doc, source(json!({"stock": {"b": 3}, "price": 49})));
        assert_eq!(
            source_to_json(&doc),
            json!({"name": "Toaster", "price": 49, "stock": {"a": 1, "b": 3}})
        );
    }

    #[test]
    fn projection_keeps_selected_paths() {
        let doc = source(json!({
            "content": "great",
            "rating": 5,
            "author": {"first": "A", "last": "B"}
        }));
        let projected = project_source(&doc, &["content".into(), "author.first".into()]);
        assert_eq!(source_to_json(&projected), json!({"content": "great", "author": {"first": "A"}}));

        let wildcard = project_source(&doc, &["author.*".into()]);
        assert_eq!(source_to_json(&wildcard), json!({"author": {"first": "A", "last": "B"}}));
    }
}
