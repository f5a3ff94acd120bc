use std::collections::BTreeMap;
use crate::core::error::{Error, Result};
use crate::core::types::{FieldValue, Source};
use crate::schema::field_type::FieldType;
use crate::schema::mapping::{FieldMapping, MappingRegistry};

/// Largest magnitude an `integer` field indexes exactly. Points are `f64`, so
/// larger values would collide with their neighbours.
pub const MAX_EXACT_INTEGER: i64 = 1 << 53;

/// A source value converted to the representation its field type indexes.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    /// Raw text for an analyzed field.
    Text(String),
    Keyword(String),
    Number(f64),
    /// UTC epoch milliseconds.
    Date(i64),
    Bool(bool),
}

impl IndexValue {
    /// Numeric point for numeric and date values.
    pub fn point(&self) -> Option<f64> {
        match self {
            IndexValue::Number(n) => Some(*n),
            IndexValue::Date(millis) => Some(*millis as f64),
            _ => None,
        }
    }

    /// Exact term for non-analyzed values.
    pub fn term(&self) -> String {
        match self {
            IndexValue::Text(s) | IndexValue::Keyword(s) => s.clone(),
            IndexValue::Number(n) => n.to_string(),
            IndexValue::Date(millis) => millis.to_string(),
            IndexValue::Bool(b) => b.to_string(),
        }
    }
}

/// Typed values of one document, grouped by full field path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub fields: BTreeMap<String, Vec<IndexValue>>,
}

impl ParsedDocument {
    pub fn add(&mut self, field: &str, value: IndexValue) {
        self.fields.entry(field.to_string()).or_default().push(value);
    }
}

/// Walks a source against the mapping and produces typed values for indexing.
/// Unmapped fields are skipped: they stay in the source only.
pub struct DocumentMapper<'a> {
    mapping: &'a MappingRegistry,
    coerce: bool,
}

impl<'a> DocumentMapper<'a> {
    pub fn new(mapping: &'a MappingRegistry, coerce: bool) -> Self {
        DocumentMapper { mapping, coerce }
    }

    pub fn parse(&self, source: &Source) -> Result<ParsedDocument> {
        let mut doc = ParsedDocument::default();
        self.walk("", source, &mut doc)?;
        Ok(doc)
    }

    fn walk(&self, prefix: &str, object: &Source, doc: &mut ParsedDocument) -> Result<()> {
        for (key, value) in object {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            let Some(mapping) = self.mapping.get(&path) else {
                continue;
            };
            match mapping.field_type {
                FieldType::Alias => {
                    return Err(Error::invalid_mapping(format!(
                        "cannot write to field alias [{}]",
                        path
                    )));
                }
                FieldType::Object | FieldType::Nested => self.walk_container(&path, value, doc)?,
                _ => self.index_leaf(mapping, value, doc)?,
            }
        }
        Ok(())
    }

    fn walk_container(&self, path: &str, value: &FieldValue, doc: &mut ParsedDocument) -> Result<()> {
        match value {
            FieldValue::Null => Ok(()),
            FieldValue::Object(map) => self.walk(path, map, doc),
            FieldValue::Array(items) => {
                for item in items {
                    self.walk_container(path, item, doc)?;
                }
                Ok(())
            }
            other => Err(Error::type_mismatch(
                path,
                format!("object field received a concrete {} value", other.kind()),
            )),
        }
    }

    fn index_leaf(&self, mapping: &FieldMapping, value: &FieldValue, doc: &mut ParsedDocument) -> Result<()> {
        let mut leaves = Vec::new();
        flatten(value, &mut leaves);

        for leaf in leaves {
            if let FieldValue::Object(_) = leaf {
                return Err(Error::type_mismatch(
                    &mapping.name,
                    "expected a concrete value, found an object",
                ));
            }

            if leaf.is_null() {
                if let Some(null_value) = &mapping.null_value {
                    let substitute = FieldValue::try_from(null_value.clone())?;
                    self.index_with_subfields(mapping, &substitute, doc)?;
                }
                continue;
            }

            self.index_with_subfields(mapping, leaf, doc)?;

            for target in &mapping.copy_to {
                if let Some(target_mapping) = self.mapping.get(target) {
                    self.index_with_subfields(target_mapping, leaf, doc)?;
                }
            }
        }
        Ok(())
    }

    fn index_with_subfields(&self, mapping: &FieldMapping, value: &FieldValue, doc: &mut ParsedDocument) -> Result<()> {
        if let Some(converted) = convert_value(mapping, value, self.coerce)? {
            doc.add(&mapping.name, converted);
        }
        for sub in &mapping.fields {
            if let Some(sub_mapping) = self.mapping.get(sub) {
                if let Some(converted) = convert_value(sub_mapping, value, self.coerce)? {
                    doc.add(sub, converted);
                }
            }
        }
        Ok(())
    }
}

fn flatten<'v>(value: &'v FieldValue, out: &mut Vec<&'v FieldValue>) {
    match value {
        FieldValue::Array(items) => {
            for item in items {
                flatten(item, out);
            }
        }
        other => out.push(other),
    }
}

/// Converts one scalar to the field's indexed form. `Ok(None)` means the value is
/// accepted but not indexed (e.g. a keyword longer than `ignore_above`).
pub fn convert_value(mapping: &FieldMapping, value: &FieldValue, coerce_default: bool) -> Result<Option<IndexValue>> {
    let coerce = mapping.coerce.unwrap_or(coerce_default);
    let mismatch = |detail: String| Err(Error::type_mismatch(&mapping.name, detail));

    match mapping.field_type {
        FieldType::Text => match value.to_term_string() {
            Some(text) => Ok(Some(IndexValue::Text(text))),
            None => mismatch(format!("cannot index {} as text", value.kind())),
        },
        FieldType::Keyword => match value.to_term_string() {
            Some(term) => {
                let too_long = mapping
                    .ignore_above
                    .is_some_and(|limit| term.chars().count() > limit);
                Ok((!too_long).then_some(IndexValue::Keyword(term)))
            }
            None => mismatch(format!("cannot index {} as keyword", value.kind())),
        },
        FieldType::Integer => {
            let exact = |i: i64| (i.unsigned_abs() <= MAX_EXACT_INTEGER as u64).then_some(i as f64);
            let truncated = |f: f64| Some(f.trunc()).filter(|t| t.abs() <= MAX_EXACT_INTEGER as f64);
            let number = match value {
                FieldValue::Int(i) => exact(*i),
                FieldValue::Float(f) if coerce && f.is_finite() => truncated(*f),
                FieldValue::Text(s) if coerce => {
                    let trimmed = s.trim();
                    match trimmed.parse::<i64>() {
                        Ok(i) => exact(i),
                        Err(_) => match trimmed.parse::<f64>() {
                            Ok(f) if f.is_finite() => truncated(f),
                            _ => return mismatch(format!("[{}] is not an integer", s)),
                        },
                    }
                }
                other => return mismatch(format!("{} value is not an integer", other.kind())),
            };
            match number {
                Some(n) => Ok(Some(IndexValue::Number(n))),
                None => mismatch(format!(
                    "[{}] is out of range for an integer, which must lie within [-{max}, {max}]",
                    value.to_term_string().unwrap_or_default(),
                    max = MAX_EXACT_INTEGER
                )),
            }
        }
        FieldType::Float => match value {
            FieldValue::Int(i) => Ok(Some(IndexValue::Number(*i as f64))),
            FieldValue::Float(f) if f.is_finite() => Ok(Some(IndexValue::Number(*f))),
            FieldValue::Text(s) if coerce => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Some(IndexValue::Number(f))),
                _ => mismatch(format!("[{}] is not a number", s)),
            },
            other => mismatch(format!("{} value is not a number", other.kind())),
        },
        FieldType::Boolean => match value {
            FieldValue::Bool(b) => Ok(Some(IndexValue::Bool(*b))),
            FieldValue::Text(s) if coerce && (s == "true" || s == "false") => {
                Ok(Some(IndexValue::Bool(s == "true")))
            }
            other => mismatch(format!("{} value is not a boolean", other.kind())),
        },
        FieldType::Date => match value {
            FieldValue::Date(d) => Ok(Some(IndexValue::Date(d.timestamp_millis()))),
            FieldValue::Text(s) => match mapping.date_format.parse(s, None) {
                Some(parsed) => Ok(Some(IndexValue::Date(parsed.millis()))),
                None => mismatch(format!(
                    "failed to parse date [{}] with format [{}]",
                    s, mapping.date_format.spec
                )),
            },
            FieldValue::Int(millis) if mapping.date_format.accepts_epoch_millis() => {
                Ok(Some(IndexValue::Date(*millis)))
            }
            other => mismatch(format!("{} value is not a date", other.kind())),
        },
        FieldType::Object | FieldType::Nested | FieldType::Alias => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::AnalyzerRegistry;
    use crate::core::error::ErrorKind;
    use crate::schema::mapping::TypeMapping;
    use serde_json::json;

    fn registry(mapping: serde_json::Value) -> MappingRegistry {
        let mapping: TypeMapping = serde_json::from_value(mapping).unwrap();
        MappingRegistry::from_mapping(&mapping, &AnalyzerRegistry::new()).unwrap()
    }

    fn source(value: serde_json::Value) -> Source {
        crate::core::types::source_from_json(value).unwrap()
    }

    #[test]
    fn converts_values_per_type() {
        let mapping = registry(json!({
            "properties": {
                "name": {"type": "text", "fields": {"keyword": {"type": "keyword"}}},
                "price": {"type": "integer"},
                "rating": {"type": "float"},
                "created": {"type": "date"},
                "active": {"type": "boolean"}
            }
        }));
        let doc = DocumentMapper::new(&mapping, true)
            .parse(&source(json!({
                "name": "Toaster",
                "price": "49",
                "rating": 5.3,
                "created": "2024-01-01",
                "active": "true",
                "unmapped": "ignored"
            })))
            .unwrap();

        assert_eq!(doc.fields["name"], vec![IndexValue::Text("Toaster".into())]);
        assert_eq!(doc.fields["name.keyword"], vec![IndexValue::Keyword("Toaster".into())]);
        assert_eq!(doc.fields["price"], vec![IndexValue::Number(49.0)]);
        assert_eq!(doc.fields["rating"], vec![IndexValue::Number(5.3)]);
        assert_eq!(doc.fields["created"], vec![IndexValue::Date(1704067200000)]);
        assert_eq!(doc.fields["active"], vec![IndexValue::Bool(true)]);
        assert!(!doc.fields.contains_key("unmapped"));
    }

    #[test]
    fn coercion_can_be_disabled() {
        let mapping = registry(json!({
            "properties": {"price": {"type": "integer", "coerce": false}}
        }));
        let err = DocumentMapper::new(&mapping, true)
            .parse(&source(json!({"price": "49"})))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);

        let err = DocumentMapper::new(&mapping, true)
            .parse(&source(json!({"price": 4.5})))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn null_value_multi_fields_and_copy_to() {
        let mapping = registry(json!({
            "properties": {
                "status": {"type": "keyword", "null_value": "NULL"},
                "first": {"type": "text", "copy_to": ["full"]},
                "last": {"type": "text", "copy_to": ["full"]},
                "full": {"type": "text"},
                "code": {"type": "keyword", "ignore_above": 3}
            }
        }));
        let doc = DocumentMapper::new(&mapping, true)
            .parse(&source(json!({
                "status": null,
                "first": "John",
                "last": "Smith",
                "code": ["ab", "abcdef"]
            })))
            .unwrap();

        assert_eq!(doc.fields["status"], vec![IndexValue::Keyword("NULL".into())]);
        assert_eq!(
            doc.fields["full"],
            vec![IndexValue::Text("John".into()), IndexValue::Text("Smith".into())]
        );
        assert_eq!(doc.fields["code"], vec![IndexValue::Keyword("ab".into())]);
    }

    #[test]
    fn objects_and_aliases() {
        let mapping = registry(json!({
            "properties": {
                "author": {"properties": {"email": {"type": "keyword"}}},
                "title": {"type": "text"},
                "heading": {"type": "alias", "path": "title"}
            }
        }));
        let mapper = DocumentMapper::new(&mapping, true);

        let doc = mapper
            .parse(&source(json!({"author": [{"email": "a@x"}, {"email": "b@x"}]})))
            .unwrap();
        assert_eq!(doc.fields["author.email"].len(), 2);

        let err = mapper.parse(&source(json!({"author": "plain"}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);

        let err = mapper.parse(&source(json!({"title": {"nested": 1}}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);

        let err = mapper.parse(&source(json!({"heading": "x"}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidMapping);
    }

    #[test]
    fn dates_accept_epoch_and_custom_formats() {
        let mapping = registry(json!({
            "properties": {
                "ts": {"type": "date"},
                "day": {"type": "date", "format": "dd/MM/yyyy"}
            }
        }));
        let mapper = DocumentMapper::new(&mapping, true);
        let doc = mapper.parse(&source(json!({"ts": 1000, "day": "02/01/1970"}))).unwrap();
        assert_eq!(doc.fields["ts"], vec![IndexValue::Date(1000)]);
        assert_eq!(doc.fields["day"], vec![IndexValue::Date(86_400_000)]);

        let err = mapper.parse(&source(json!({"day": "1970-01-02"}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn integers_beyond_exact_range_are_rejected() {
        let mapping = registry(json!({"properties": {"n": {"type": "long"}}}));
        let mapper = DocumentMapper::new(&mapping, true);

        let edge = mapper.parse(&source(json!({"n": MAX_EXACT_INTEGER}))).unwrap();
        assert_eq!(edge.fields["n"], vec![IndexValue::Number(9_007_199_254_740_992.0)]);

        for value in [json!(MAX_EXACT_INTEGER + 1), json!(-MAX_EXACT_INTEGER - 1), json!("9007199254740993"), json!(1.0e17)] {
            let err = mapper.parse(&source(json!({"n": value}))).unwrap_err();
            assert_eq!(err.kind, ErrorKind::TypeMismatch);
            assert!(err.context.contains("out of range"));
        }
    }
}
