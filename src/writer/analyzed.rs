use ordered_float::OrderedFloat;
use std::collections::BTreeMap;
use std::sync::Arc;
use crate::analysis::analyzer::{Analyzer, AnalyzerRegistry};
use crate::index::inverted::{AnalyzedField, DocValue};
use crate::schema::document_mapper::{IndexValue, ParsedDocument};
use crate::schema::field_type::FieldType;
use crate::schema::mapping::{FieldMapping, MappingRegistry};

/// Metadata keyword field holding the external id.
pub const ID_FIELD: &str = "_id";

/// Position gap between the values of a multi-valued text field, so phrases
/// never match across two array elements.
pub const POSITION_INCREMENT_GAP: u32 = 100;

/// A document ready for the inverted index: analyzed fields keyed by full path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyzedDocument {
    pub fields: BTreeMap<String, AnalyzedField>,
}

impl AnalyzedDocument {
    pub fn field(&self, path: &str) -> Option<&AnalyzedField> {
        self.fields.get(path)
    }
}

/// Turns typed values into terms, points and doc values using the field mappings.
pub struct DocumentAnalyzer<'a> {
    mapping: &'a MappingRegistry,
    analyzers: &'a AnalyzerRegistry,
}

impl<'a> DocumentAnalyzer<'a> {
    pub fn new(mapping: &'a MappingRegistry, analyzers: &'a AnalyzerRegistry) -> Self {
        DocumentAnalyzer { mapping, analyzers }
    }

    pub fn analyze(&self, id: &str, parsed: &ParsedDocument) -> AnalyzedDocument {
        let mut doc = AnalyzedDocument::default();

        let mut id_field = AnalyzedField::default();
        id_field.add_term(id.to_string(), 0);
        id_field.doc_values.push(DocValue::Keyword(id.to_string()));
        doc.fields.insert(ID_FIELD.to_string(), id_field);

        for (path, values) in &parsed.fields {
            let Some(mapping) = self.mapping.get(path) else {
                continue;
            };
            doc.fields.insert(path.clone(), self.analyze_field(mapping, values));
        }
        doc
    }

    fn analyze_field(&self, mapping: &FieldMapping, values: &[IndexValue]) -> AnalyzedField {
        let mut field = AnalyzedField::default();
        match mapping.field_type {
            FieldType::Text => {
                let analyzer = self.index_analyzer(mapping);
                let mut base = 0;
                let mut length = 0;
                for value in values {
                    let IndexValue::Text(text) = value else { continue };
                    let tokens = analyzer.analyze(text);
                    let mut last = None;
                    for token in tokens {
                        let position = base + token.position;
                        if mapping.index {
                            field.add_term(token.text, position);
                        }
                        last = Some(position);
                        length += 1;
                    }
                    if let Some(last) = last {
                        base = last + 1 + POSITION_INCREMENT_GAP;
                    }
                }
                if mapping.norms {
                    field.length = Some(length);
                }
            }
            _ => {
                for (position, value) in values.iter().enumerate() {
                    if mapping.index {
                        match value {
                            IndexValue::Number(_) | IndexValue::Date(_) => {
                                field.points.extend(value.point());
                            }
                            _ => field.add_term(value.term(), position as u32),
                        }
                    }
                    if mapping.doc_values {
                        field.doc_values.extend(doc_value(value));
                    }
                }
            }
        }
        field
    }

    fn index_analyzer(&self, mapping: &FieldMapping) -> Arc<Analyzer> {
        mapping
            .analyzer
            .as_deref()
            .and_then(|name| self.analyzers.get(name))
            .unwrap_or_else(|| self.analyzers.default_analyzer())
    }
}

fn doc_value(value: &IndexValue) -> Option<DocValue> {
    match value {
        IndexValue::Text(_) => None,
        IndexValue::Keyword(s) => Some(DocValue::Keyword(s.clone())),
        IndexValue::Number(n) => Some(DocValue::Number(OrderedFloat(*n))),
        IndexValue::Date(millis) => Some(DocValue::Number(OrderedFloat(*millis as f64))),
        IndexValue::Bool(b) => Some(DocValue::Number(OrderedFloat(if *b { 1.0 } else { 0.0 }))),
    }
}
