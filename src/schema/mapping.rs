//! Index mappings.
//!
//! Mappings are declared as a tree of [`FieldDefinition`]s and kept by the
//! [`MappingRegistry`] as flat [`FieldMapping`]s keyed by full dotted path.
//! Multi-fields (`tags.keyword`) get their own entries. Mapped types are
//! immutable: updates may only add fields.

use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use tracing::debug;
use crate::analysis::analyzer::AnalyzerRegistry;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{FieldValue, Source};
use crate::schema::date_format::{DateFormat, DYNAMIC_DATE_FORMATS};
use crate::schema::document_mapper::convert_value;
use crate::schema::field_type::FieldType;

/// Dynamic mapping behavior for unmapped fields
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicMapping {
    /// Infer and add a mapping (default)
    #[default]
    True,
    /// Keep the value in the source but do not index it
    False,
    /// Reject the document
    Strict,
}

/// A field as declared by the caller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_analyzer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_values: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub norms: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub copy_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coerce: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_above: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, FieldDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic: Option<DynamicMapping>,
}

impl FieldDefinition {
    pub fn of(field_type: FieldType) -> Self {
        FieldDefinition {
            field_type: Some(field_type),
            ..Default::default()
        }
    }

    pub fn text() -> Self {
        Self::of(FieldType::Text)
    }

    pub fn keyword() -> Self {
        Self::of(FieldType::Keyword)
    }

    pub fn integer() -> Self {
        Self::of(FieldType::Integer)
    }

    pub fn float() -> Self {
        Self::of(FieldType::Float)
    }

    pub fn date() -> Self {
        Self::of(FieldType::Date)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean)
    }

    pub fn object() -> Self {
        Self::of(FieldType::Object)
    }

    pub fn nested() -> Self {
        Self::of(FieldType::Nested)
    }

    pub fn alias(path: impl Into<String>) -> Self {
        FieldDefinition {
            path: Some(path.into()),
            ..Self::of(FieldType::Alias)
        }
    }

    pub fn with_analyzer(mut self, analyzer: impl Into<String>) -> Self {
        self.analyzer = Some(analyzer.into());
        self
    }

    pub fn with_search_analyzer(mut self, analyzer: impl Into<String>) -> Self {
        self.search_analyzer = Some(analyzer.into());
        self
    }

    pub fn with_index(mut self, index: bool) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_doc_values(mut self, doc_values: bool) -> Self {
        self.doc_values = Some(doc_values);
        self
    }

    pub fn with_norms(mut self, norms: bool) -> Self {
        self.norms = Some(norms);
        self
    }

    pub fn with_null_value(mut self, value: serde_json::Value) -> Self {
        self.null_value = Some(value);
        self
    }

    pub fn copy_to(mut self, field: impl Into<String>) -> Self {
        self.copy_to.push(field.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_coerce(mut self, coerce: bool) -> Self {
        self.coerce = Some(coerce);
        self
    }

    pub fn with_ignore_above(mut self, limit: usize) -> Self {
        self.ignore_above = Some(limit);
        self
    }

    /// Adds a multi-field, e.g. `keyword` under a text field.
    pub fn with_field(mut self, name: impl Into<String>, definition: FieldDefinition) -> Self {
        self.fields.insert(name.into(), definition);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, definition: FieldDefinition) -> Self {
        self.properties.insert(name.into(), definition);
        self
    }

    pub fn with_dynamic(mut self, dynamic: DynamicMapping) -> Self {
        self.dynamic = Some(dynamic);
        self
    }
}

/// Root of a mapping: the body of `create` and `put_mapping`, and the result of `get_mapping`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic: Option<DynamicMapping>,
    /// Map unmapped objects as `nested` instead of `object`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_nested: Option<bool>,
    #[serde(default)]
    pub properties: BTreeMap<String, FieldDefinition>,
}

impl TypeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, definition: FieldDefinition) -> Self {
        self.properties.insert(name.into(), definition);
        self
    }

    pub fn with_dynamic(mut self, dynamic: DynamicMapping) -> Self {
        self.dynamic = Some(dynamic);
        self
    }
}

/// Resolved mapping of one field path.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldMapping {
    pub name: String,
    pub field_type: FieldType,
    pub analyzer: Option<String>,
    pub search_analyzer: Option<String>,
    pub index: bool,
    pub doc_values: bool,
    pub norms: bool,
    pub null_value: Option<serde_json::Value>,
    pub copy_to: Vec<String>,
    pub format: Option<String>,
    pub date_format: DateFormat,
    pub coerce: Option<bool>,
    pub ignore_above: Option<usize>,
    /// Full paths of this field's multi-fields.
    pub fields: Vec<String>,
    /// Set on multi-fields: the field whose values they re-index.
    pub multi_field_of: Option<String>,
    /// Alias target.
    pub path: Option<String>,
    pub dynamic: Option<DynamicMapping>,
}

impl FieldMapping {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldMapping {
            name: name.into(),
            field_type,
            analyzer: None,
            search_analyzer: None,
            index: true,
            doc_values: field_type.default_doc_values(),
            norms: field_type.default_norms(),
            null_value: None,
            copy_to: Vec::new(),
            format: None,
            date_format: DateFormat::default(),
            coerce: None,
            ignore_above: None,
            fields: Vec::new(),
            multi_field_of: None,
            path: None,
            dynamic: None,
        }
    }

    fn from_definition(name: &str, field_type: FieldType, def: &FieldDefinition) -> Result<Self> {
        let mut mapping = FieldMapping::new(name, field_type);
        mapping.analyzer = def.analyzer.clone();
        mapping.search_analyzer = def.search_analyzer.clone();
        mapping.index = def.index.unwrap_or(true);
        mapping.doc_values = def.doc_values.unwrap_or(mapping.doc_values);
        mapping.norms = def.norms.unwrap_or(mapping.norms);
        mapping.null_value = def.null_value.clone().filter(|v| !v.is_null());
        mapping.copy_to = def.copy_to.clone();
        mapping.coerce = def.coerce;
        mapping.ignore_above = def.ignore_above;
        mapping.path = def.path.clone();
        mapping.dynamic = def.dynamic;
        if let Some(format) = &def.format {
            mapping.date_format = DateFormat::parse_spec(format)?;
            mapping.format = Some(format.clone());
        }
        Ok(mapping)
    }

    /// Declaration equivalent to this mapping, without children.
    pub fn to_definition(&self) -> FieldDefinition {
        let defaults = FieldMapping::new(self.name.clone(), self.field_type);
        FieldDefinition {
            field_type: Some(self.field_type),
            analyzer: self.analyzer.clone(),
            search_analyzer: self.search_analyzer.clone(),
            index: (!self.index).then_some(false),
            doc_values: (self.doc_values != defaults.doc_values).then_some(self.doc_values),
            norms: (self.norms != defaults.norms).then_some(self.norms),
            null_value: self.null_value.clone(),
            copy_to: self.copy_to.clone(),
            format: self.format.clone(),
            coerce: self.coerce,
            ignore_above: self.ignore_above,
            path: self.path.clone(),
            dynamic: self.dynamic,
            ..Default::default()
        }
    }

    /// True when both declare the same field, ignoring multi-field lists and
    /// object-level `dynamic`, which may change after creation.
    fn same_definition(&self, other: &FieldMapping) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.fields.clear();
        b.fields.clear();
        if a.field_type.is_container() {
            a.dynamic = None;
            b.dynamic = None;
        }
        a == b
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == text,
        Some((head, tail)) => {
            if !text.starts_with(head) {
                return false;
            }
            let rest = &text[head.len()..];
            if tail.is_empty() {
                return true;
            }
            (0..=rest.len())
                .filter(|i| rest.is_char_boundary(*i))
                .any(|i| wildcard_match(tail, &rest[i..]))
        }
    }
}

/// Per-index field mappings.
#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    pub dynamic: DynamicMapping,
    pub dynamic_nested: bool,
    fields: BTreeMap<String, FieldMapping>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mapping(mapping: &TypeMapping, analyzers: &AnalyzerRegistry) -> Result<Self> {
        let mut registry = MappingRegistry::new();
        registry.put_mapping(mapping, analyzers)?;
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.values()
    }

    pub fn get(&self, path: &str) -> Option<&FieldMapping> {
        self.fields.get(path)
    }

    /// Looks a field up, following an alias to its target.
    pub fn resolve(&self, path: &str) -> Option<&FieldMapping> {
        let mapping = self.fields.get(path)?;
        match (&mapping.field_type, &mapping.path) {
            (FieldType::Alias, Some(target)) => self.fields.get(target),
            _ => Some(mapping),
        }
    }

    /// The concrete path a (possibly aliased) field name refers to.
    pub fn resolve_path<'a>(&'a self, path: &'a str) -> &'a str {
        match self.fields.get(path) {
            Some(FieldMapping { field_type: FieldType::Alias, path: Some(target), .. }) => target,
            _ => path,
        }
    }

    /// Mappings whose path matches `pattern`; `*` matches any run of characters.
    pub fn get_field_mapping(&self, pattern: &str) -> Vec<&FieldMapping> {
        if !pattern.contains('*') {
            return self.fields.get(pattern).into_iter().collect();
        }
        self.fields
            .values()
            .filter(|m| wildcard_match(pattern, &m.name))
            .collect()
    }

    /// Leaf paths under an object path.
    pub fn leaves_under<'a>(&'a self, prefix: &str) -> Vec<&'a FieldMapping> {
        let start = format!("{}.", prefix);
        self.fields
            .range(start.clone()..)
            .take_while(|(name, _)| name.starts_with(&start))
            .map(|(_, m)| m)
            .filter(|m| m.field_type.is_leaf() && m.multi_field_of.is_none())
            .collect()
    }

    pub fn referenced_analyzers(&self) -> Vec<(&str, &str)> {
        self.fields
            .values()
            .flat_map(|m| {
                m.analyzer
                    .iter()
                    .chain(m.search_analyzer.iter())
                    .map(move |a| (m.name.as_str(), a.as_str()))
            })
            .collect()
    }

    /// Adds the fields of `mapping`. Re-declaring an existing field identically is
    /// accepted; any change to it is rejected and nothing is applied.
    pub fn put_mapping(&mut self, mapping: &TypeMapping, analyzers: &AnalyzerRegistry) -> Result<Vec<String>> {
        let mut incoming = Vec::new();
        flatten_definitions("", &mapping.properties, &mut incoming)?;

        let mut staged = self.fields.clone();
        let mut added = Vec::new();

        for field in incoming {
            match staged.get_mut(&field.name) {
                Some(existing) => {
                    if existing.field_type != field.field_type {
                        return Err(Error::invalid_mapping(format!(
                            "mapper [{}] cannot be changed from type [{}] to [{}]",
                            field.name, existing.field_type, field.field_type
                        )));
                    }
                    if !existing.same_definition(&field) {
                        return Err(Error::invalid_mapping(format!(
                            "mapper [{}] cannot change its parameters once mapped",
                            field.name
                        )));
                    }
                    for sub in field.fields {
                        if !existing.fields.contains(&sub) {
                            existing.fields.push(sub);
                        }
                    }
                    if field.dynamic.is_some() {
                        existing.dynamic = field.dynamic;
                    }
                }
                None => {
                    if let Some(parent) = field.name.rsplit_once('.').map(|(p, _)| p) {
                        if let Some(existing_parent) = staged.get(parent) {
                            let parent_ok = existing_parent.field_type.is_container()
                                || field.multi_field_of.as_deref() == Some(parent);
                            if !parent_ok {
                                return Err(Error::invalid_mapping(format!(
                                    "cannot add [{}] under field [{}] of type [{}]",
                                    field.name, parent, existing_parent.field_type
                                )));
                            }
                        }
                    }
                    added.push(field.name.clone());
                    staged.insert(field.name.clone(), field);
                }
            }
        }

        validate_references(&staged, &added, analyzers)?;

        self.fields = staged;
        if let Some(dynamic) = mapping.dynamic {
            self.dynamic = dynamic;
        }
        if let Some(nested) = mapping.dynamic_nested {
            self.dynamic_nested = nested;
        }
        if !added.is_empty() {
            debug!(fields = ?added, "mapping updated");
        }
        Ok(added)
    }

    /// Checks every analyzer referenced by the mapping resolves in `analyzers`.
    pub fn validate_analyzers(&self, analyzers: &AnalyzerRegistry) -> Result<()> {
        for (field, analyzer) in self.referenced_analyzers() {
            if !analyzers.contains(analyzer) {
                return Err(Error::invalid_mapping(format!(
                    "analyzer [{}] referenced by field [{}] is not defined",
                    analyzer, field
                )));
            }
        }
        Ok(())
    }

    /// The mapping as a declaration tree.
    pub fn to_type_mapping(&self) -> TypeMapping {
        let mut root = TypeMapping {
            dynamic: Some(self.dynamic),
            dynamic_nested: self.dynamic_nested.then_some(true),
            properties: BTreeMap::new(),
        };
        for mapping in self.fields.values() {
            let segments: Vec<&str> = match &mapping.multi_field_of {
                Some(parent) => parent.split('.').collect(),
                None => mapping.name.split('.').collect(),
            };
            let mut level = &mut root.properties;
            for (i, segment) in segments.iter().enumerate() {
                let entry = level.entry(segment.to_string()).or_default();
                if i + 1 < segments.len() {
                    level = &mut entry.properties;
                    continue;
                }
                match &mapping.multi_field_of {
                    Some(parent) => {
                        let sub_name = mapping.name[parent.len() + 1..].to_string();
                        entry.fields.insert(sub_name, mapping.to_definition());
                    }
                    None => {
                        let properties = std::mem::take(&mut entry.properties);
                        let fields = std::mem::take(&mut entry.fields);
                        *entry = mapping.to_definition();
                        entry.properties = properties;
                        entry.fields = fields;
                    }
                }
                break;
            }
        }
        root
    }

    fn dynamic_for(&self, path: &str) -> DynamicMapping {
        let mut current = path;
        while let Some((parent, _)) = current.rsplit_once('.') {
            if let Some(dynamic) = self.fields.get(parent).and_then(|m| m.dynamic) {
                return dynamic;
            }
            current = parent;
        }
        self.dynamic
    }

    /// Mappings inferred for `sample`, the field first, then any multi-fields.
    fn infer(&self, path: &str, sample: &FieldValue) -> Vec<FieldMapping> {
        let field_type = match sample {
            FieldValue::Text(s) => {
                if let Some(spec) = detect_date(s) {
                    let mut mapping = FieldMapping::new(path, FieldType::Date);
                    if spec != DYNAMIC_DATE_FORMATS[0] {
                        if let Ok(format) = DateFormat::parse_spec(spec) {
                            mapping.date_format = format;
                            mapping.format = Some(spec.to_string());
                        }
                    }
                    return vec![mapping];
                }
                let keyword_path = format!("{}.keyword", path);
                let mut text = FieldMapping::new(path, FieldType::Text);
                text.fields.push(keyword_path.clone());
                let mut keyword = FieldMapping::new(keyword_path, FieldType::Keyword);
                keyword.ignore_above = Some(256);
                keyword.multi_field_of = Some(path.to_string());
                return vec![text, keyword];
            }
            FieldValue::Int(_) => FieldType::Integer,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Bool(_) => FieldType::Boolean,
            FieldValue::Date(_) => FieldType::Date,
            FieldValue::Object(_) if self.dynamic_nested => FieldType::Nested,
            _ => FieldType::Object,
        };
        vec![FieldMapping::new(path, field_type)]
    }

    /// Mappings a document would add under dynamic mapping. Empty when the document
    /// only uses mapped fields, so writers can skip taking the mapping write lock.
    pub fn plan(&self, source: &Source) -> Result<Vec<FieldMapping>> {
        let mut planned = BTreeMap::new();
        self.plan_object("", source, self.dynamic, &mut planned)?;
        Ok(planned.into_values().collect())
    }

    fn plan_object(
        &self,
        prefix: &str,
        object: &Source,
        dynamic: DynamicMapping,
        planned: &mut BTreeMap<String, FieldMapping>,
    ) -> Result<()> {
        for (key, value) in object {
            let path = join_path(prefix, key);
            let known = self
                .fields
                .get(&path)
                .or_else(|| planned.get(&path))
                .map(|m| (m.field_type, m.dynamic));

            match known {
                Some((field_type, own_dynamic)) if field_type.is_container() => {
                    let child_dynamic = own_dynamic.unwrap_or(dynamic);
                    for child in objects_in(value) {
                        self.plan_object(&path, child, child_dynamic, planned)?;
                    }
                }
                Some(_) => {}
                None => {
                    let Some(sample) = first_non_null(value) else {
                        continue;
                    };
                    match dynamic {
                        DynamicMapping::False => continue,
                        DynamicMapping::Strict => {
                            return Err(Error::invalid_mapping(format!(
                                "mapping set to strict, dynamic introduction of [{}] within [{}] is not allowed",
                                key,
                                if prefix.is_empty() { "_doc" } else { prefix }
                            )));
                        }
                        DynamicMapping::True => {}
                    }
                    let inferred = self.infer(&path, sample);
                    let container = inferred[0].field_type.is_container();
                    for mapping in inferred {
                        planned.insert(mapping.name.clone(), mapping);
                    }
                    if container {
                        for child in objects_in(value) {
                            self.plan_object(&path, child, dynamic, planned)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Adds planned mappings that are still missing. Returns the added paths.
    pub fn apply(&mut self, planned: Vec<FieldMapping>) -> Vec<String> {
        let mut added = Vec::new();
        for mapping in planned {
            if !self.fields.contains_key(&mapping.name) {
                added.push(mapping.name.clone());
                self.fields.insert(mapping.name.clone(), mapping);
            }
        }
        if !added.is_empty() {
            debug!(fields = ?added, "dynamic mapping added fields");
        }
        added
    }

    /// Mapping for `path`, adding one inferred from `sample` when the field is
    /// unmapped and dynamic mapping allows it. A sample incompatible with an
    /// existing mapping is a `TypeMismatch`.
    pub fn resolve_field(&mut self, path: &str, sample: &FieldValue) -> Result<FieldMapping> {
        if let Some(mapping) = self.resolve(path) {
            if mapping.field_type.is_leaf() {
                if let Some(value) = first_non_null(sample) {
                    if matches!(value, FieldValue::Object(_)) {
                        return Err(Error::type_mismatch(path, "expected a concrete value, found an object"));
                    }
                    convert_value(mapping, value, true)?;
                }
            }
            return Ok(mapping.clone());
        }

        match self.dynamic_for(path) {
            DynamicMapping::Strict => {
                return Err(Error::invalid_mapping(format!(
                    "mapping set to strict, dynamic introduction of [{}] is not allowed",
                    path
                )));
            }
            DynamicMapping::False => {
                return Err(Error::new(ErrorKind::NotFound, format!("no mapping for field [{}]", path)));
            }
            DynamicMapping::True => {}
        }
        let Some(value) = first_non_null(sample) else {
            return Err(Error::new(ErrorKind::NotFound, format!("no mapping for field [{}]", path)));
        };

        let mut planned = Vec::new();
        let mut ancestor = path;
        while let Some((parent, _)) = ancestor.rsplit_once('.') {
            if !self.fields.contains_key(parent) {
                planned.push(FieldMapping::new(parent, FieldType::Object));
            }
            ancestor = parent;
        }
        let inferred = self.infer(path, value);
        let resolved = inferred[0].clone();
        planned.extend(inferred);
        self.apply(planned);
        Ok(resolved)
    }
}

fn detect_date(s: &str) -> Option<&'static str> {
    // cheap shape check before running the parsers
    if s.len() < 8 || !s.as_bytes()[..4].iter().all(u8::is_ascii_digit) {
        return None;
    }
    DYNAMIC_DATE_FORMATS.iter().copied().find(|spec| {
        DateFormat::parse_spec(spec)
            .map(|format| format.parse(s, None).is_some())
            .unwrap_or(false)
    })
}

fn first_non_null(value: &FieldValue) -> Option<&FieldValue> {
    match value {
        FieldValue::Null => None,
        FieldValue::Array(items) => items.iter().find_map(first_non_null),
        other => Some(other),
    }
}

fn objects_in(value: &FieldValue) -> Vec<&Source> {
    match value {
        FieldValue::Object(map) => vec![map],
        FieldValue::Array(items) => items.iter().flat_map(objects_in).collect(),
        _ => Vec::new(),
    }
}

fn flatten_definitions(
    prefix: &str,
    properties: &BTreeMap<String, FieldDefinition>,
    out: &mut Vec<FieldMapping>,
) -> Result<()> {
    for (name, def) in properties {
        if name.is_empty() || name.starts_with('.') || name.ends_with('.') {
            return Err(Error::invalid_mapping(format!("invalid field name [{}]", name)));
        }
        let path = join_path(prefix, name);
        let field_type = match def.field_type {
            Some(field_type) => field_type,
            None if !def.properties.is_empty() => FieldType::Object,
            None => {
                return Err(Error::invalid_mapping(format!("no type specified for field [{}]", path)));
            }
        };
        check_parameters(&path, field_type, def)?;

        let mut mapping = FieldMapping::from_definition(&path, field_type, def)?;
        let mut subs = Vec::new();
        for (sub_name, sub_def) in &def.fields {
            let sub_path = join_path(&path, sub_name);
            let sub_type = sub_def.field_type.ok_or_else(|| {
                Error::invalid_mapping(format!("no type specified for multi-field [{}]", sub_path))
            })?;
            if !sub_type.is_leaf() || !sub_def.fields.is_empty() || !sub_def.properties.is_empty() {
                return Err(Error::invalid_mapping(format!(
                    "multi-field [{}] must be a plain leaf field",
                    sub_path
                )));
            }
            check_parameters(&sub_path, sub_type, sub_def)?;
            let mut sub = FieldMapping::from_definition(&sub_path, sub_type, sub_def)?;
            sub.multi_field_of = Some(path.clone());
            mapping.fields.push(sub_path);
            subs.push(sub);
        }

        out.push(mapping);
        out.extend(subs);
        flatten_definitions(&path, &def.properties, out)?;
    }
    Ok(())
}

fn check_parameters(path: &str, field_type: FieldType, def: &FieldDefinition) -> Result<()> {
    let reject = |param: &str| {
        Err(Error::invalid_mapping(format!(
            "unknown parameter [{}] on mapper [{}] of type [{}]",
            param, path, field_type
        )))
    };
    if field_type != FieldType::Text && (def.analyzer.is_some() || def.search_analyzer.is_some()) {
        return reject("analyzer");
    }
    if field_type != FieldType::Keyword && def.ignore_above.is_some() {
        return reject("ignore_above");
    }
    if field_type != FieldType::Date && def.format.is_some() {
        return reject("format");
    }
    if !field_type.is_container() && (!def.properties.is_empty() || def.dynamic.is_some()) {
        return reject("properties");
    }
    if !field_type.is_leaf() && (!def.fields.is_empty() || !def.copy_to.is_empty()) {
        return reject("fields");
    }
    if (field_type == FieldType::Text || !field_type.is_leaf()) && def.null_value.is_some() {
        return reject("null_value");
    }
    if let Some(null_value) = &def.null_value {
        if let Err(err) = FieldValue::try_from(null_value.clone()) {
            return Err(Error::invalid_mapping(format!(
                "invalid [null_value] on mapper [{}]: {}",
                path, err.context
            )));
        }
    }
    match (field_type, &def.path) {
        (FieldType::Alias, None) => Err(Error::invalid_mapping(format!(
            "alias [{}] requires a [path] to its target field",
            path
        ))),
        (FieldType::Alias, Some(_)) => Ok(()),
        (_, Some(_)) => reject("path"),
        _ => Ok(()),
    }
}

fn validate_references(
    staged: &BTreeMap<String, FieldMapping>,
    added: &[String],
    analyzers: &AnalyzerRegistry,
) -> Result<()> {
    for name in added {
        let Some(mapping) = staged.get(name) else { continue };

        for analyzer in mapping.analyzer.iter().chain(mapping.search_analyzer.iter()) {
            if !analyzers.contains(analyzer) {
                return Err(Error::invalid_mapping(format!(
                    "analyzer [{}] for field [{}] is not defined",
                    analyzer, name
                )));
            }
        }

        if let Some(target) = &mapping.path {
            match staged.get(target) {
                Some(t) if t.field_type.is_leaf() => {}
                Some(t) => {
                    return Err(Error::invalid_mapping(format!(
                        "alias [{}] cannot point to [{}] of type [{}]",
                        name, target, t.field_type
                    )));
                }
                None => {
                    return Err(Error::invalid_mapping(format!(
                        "alias [{}] points to missing field [{}]",
                        name, target
                    )));
                }
            }
        }

        for target in &mapping.copy_to {
            match staged.get(target) {
                Some(t) if t.field_type.is_leaf() => {}
                _ => {
                    return Err(Error::invalid_mapping(format!(
                        "copy_to target [{}] of field [{}] must be an existing concrete field",
                        target, name
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry(mapping: serde_json::Value) -> MappingRegistry {
        let mapping: TypeMapping = serde_json::from_value(mapping).unwrap();
        MappingRegistry::from_mapping(&mapping, &AnalyzerRegistry::new()).unwrap()
    }

    fn source(value: serde_json::Value) -> Source {
        crate::core::types::source_from_json(value).unwrap()
    }

    #[test]
    fn flattens_nested_declarations() {
        let registry = registry(json!({
            "properties": {
                "name": {"type": "text", "fields": {"keyword": {"type": "keyword"}}},
                "author": {"properties": {"email": {"type": "keyword"}}},
                "price": {"type": "long"}
            }
        }));
        assert_eq!(registry.get("author").unwrap().field_type, FieldType::Object);
        assert_eq!(registry.get("author.email").unwrap().field_type, FieldType::Keyword);
        assert_eq!(registry.get("price").unwrap().field_type, FieldType::Integer);
        let sub = registry.get("name.keyword").unwrap();
        assert_eq!(sub.multi_field_of.as_deref(), Some("name"));
        assert_eq!(registry.get("name").unwrap().fields, vec!["name.keyword".to_string()]);
    }

    #[test]
    fn put_mapping_is_add_only() {
        let mut registry = registry(json!({"properties": {"rating": {"type": "float"}}}));
        let analyzers = AnalyzerRegistry::new();

        let retype = TypeMapping::new().field("rating", FieldDefinition::integer());
        let err = registry.put_mapping(&retype, &analyzers).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidMapping);
        assert_eq!(registry.get("rating").unwrap().field_type, FieldType::Float);

        let same = TypeMapping::new().field("rating", FieldDefinition::float());
        assert!(registry.put_mapping(&same, &analyzers).unwrap().is_empty());

        let added = TypeMapping::new().field("discount", FieldDefinition::float());
        assert_eq!(registry.put_mapping(&added, &analyzers).unwrap(), vec!["discount"]);

        let changed = TypeMapping::new().field("rating", FieldDefinition::float().with_index(false));
        assert!(registry.put_mapping(&changed, &analyzers).is_err());
    }

    #[test]
    fn failed_update_applies_nothing() {
        let mut registry = registry(json!({"properties": {"title": {"type": "text"}}}));
        let update = TypeMapping::new()
            .field("subtitle", FieldDefinition::text())
            .field("title", FieldDefinition::keyword());
        assert!(registry.put_mapping(&update, &AnalyzerRegistry::new()).is_err());
        assert!(registry.get("subtitle").is_none());
    }

    #[test]
    fn aliases_need_existing_targets() {
        let mut registry = registry(json!({"properties": {"title": {"type": "text"}}}));
        let analyzers = AnalyzerRegistry::new();

        let missing = TypeMapping::new().field("heading", FieldDefinition::alias("nope"));
        assert_eq!(
            registry.put_mapping(&missing, &analyzers).unwrap_err().kind,
            ErrorKind::InvalidMapping
        );

        let alias = TypeMapping::new().field("heading", FieldDefinition::alias("title"));
        registry.put_mapping(&alias, &analyzers).unwrap();
        assert_eq!(registry.resolve("heading").unwrap().name, "title");
        assert_eq!(registry.resolve_path("heading"), "title");
    }

    #[test]
    fn unknown_analyzer_and_copy_to_are_rejected() {
        let analyzers = AnalyzerRegistry::new();
        let mut registry = MappingRegistry::new();

        let bad_analyzer = TypeMapping::new()
            .field("body", FieldDefinition::text().with_analyzer("klingon"));
        assert!(registry.put_mapping(&bad_analyzer, &analyzers).is_err());

        let bad_copy = TypeMapping::new().field("first", FieldDefinition::text().copy_to("full"));
        assert!(registry.put_mapping(&bad_copy, &analyzers).is_err());

        let good_copy = TypeMapping::new()
            .field("first", FieldDefinition::text().copy_to("full"))
            .field("full", FieldDefinition::text());
        registry.put_mapping(&good_copy, &analyzers).unwrap();
        assert_eq!(registry.get("first").unwrap().copy_to, vec!["full".to_string()]);
    }

    #[test]
    fn parameters_must_fit_type() {
        let analyzers = AnalyzerRegistry::new();
        let mut registry = MappingRegistry::new();
        let bad = TypeMapping::new().field("count", FieldDefinition::integer().with_analyzer("standard"));
        assert!(registry.put_mapping(&bad, &analyzers).is_err());
        let bad = TypeMapping::new().field("when", FieldDefinition::date().with_format("EEE"));
        assert!(registry.put_mapping(&bad, &analyzers).is_err());
    }

    #[test]
    fn dynamic_inference() {
        let mut registry = MappingRegistry::new();
        let planned = registry
            .plan(&source(json!({
                "name": "Toaster",
                "price": 49,
                "rating": 4.5,
                "in_stock": true,
                "created": "2024-01-02T03:04:05Z",
                "legacy": "2015/01/01",
                "tags": [null, "kitchen"],
                "author": {"email": "a@b.c"},
                "nothing": null
            })))
            .unwrap();
        registry.apply(planned);

        assert_eq!(registry.get("name").unwrap().field_type, FieldType::Text);
        let keyword = registry.get("name.keyword").unwrap();
        assert_eq!(keyword.field_type, FieldType::Keyword);
        assert_eq!(keyword.ignore_above, Some(256));
        assert_eq!(registry.get("price").unwrap().field_type, FieldType::Integer);
        assert_eq!(registry.get("rating").unwrap().field_type, FieldType::Float);
        assert_eq!(registry.get("in_stock").unwrap().field_type, FieldType::Boolean);
        assert_eq!(registry.get("created").unwrap().field_type, FieldType::Date);
        let legacy = registry.get("legacy").unwrap();
        assert_eq!(legacy.field_type, FieldType::Date);
        assert!(legacy.format.is_some());
        assert_eq!(registry.get("tags").unwrap().field_type, FieldType::Text);
        assert_eq!(registry.get("author").unwrap().field_type, FieldType::Object);
        assert_eq!(registry.get("author.email").unwrap().field_type, FieldType::Text);
        assert!(registry.get("nothing").is_none());

        assert!(registry.plan(&source(json!({"name": "Kettle", "price": 10}))).unwrap().is_empty());
    }

    #[test]
    fn strict_and_false_dynamic() {
        let strict = registry(json!({"dynamic": "strict", "properties": {"name": {"type": "text"}}}));
        let err = strict.plan(&source(json!({"name": "x", "extra": 1}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidMapping);

        let ignore = registry(json!({
            "properties": {
                "meta": {"type": "object", "dynamic": "false", "properties": {}},
                "name": {"type": "text"}
            }
        }));
        let planned = ignore.plan(&source(json!({"meta": {"anything": 1}, "other": 2}))).unwrap();
        let names: Vec<&str> = planned.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["other"]);
    }

    #[test]
    fn resolve_field_checks_and_infers() {
        let mut registry = registry(json!({"properties": {"price": {"type": "integer", "coerce": false}}}));
        let err = registry.resolve_field("price", &FieldValue::Text("cheap".into())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);

        let mapping = registry.resolve_field("stock.count", &FieldValue::Int(3)).unwrap();
        assert_eq!(mapping.field_type, FieldType::Integer);
        assert_eq!(registry.get("stock").unwrap().field_type, FieldType::Object);
    }

    #[test]
    fn round_trips_to_declaration_tree() {
        let declared = json!({
            "properties": {
                "name": {"type": "text", "fields": {"keyword": {"type": "keyword", "ignore_above": 256}}},
                "author": {"type": "object", "properties": {"email": {"type": "keyword"}}},
                "heading": {"type": "alias", "path": "name"}
            }
        });
        let tree = registry(declared).to_type_mapping();
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["properties"]["name"]["fields"]["keyword"]["ignore_above"], json!(256));
        assert_eq!(json["properties"]["author"]["properties"]["email"]["type"], json!("keyword"));
        assert_eq!(json["properties"]["heading"]["path"], json!("name"));
    }

    #[test]
    fn field_mapping_lookup_supports_wildcards() {
        let registry = registry(json!({
            "properties": {
                "author": {"properties": {"first": {"type": "text"}, "last": {"type": "text"}}},
                "title": {"type": "text"}
            }
        }));
        assert_eq!(registry.get_field_mapping("author.*").len(), 2);
        assert_eq!(registry.get_field_mapping("title").len(), 1);
        assert!(registry.get_field_mapping("missing").is_empty());
        assert_eq!(registry.leaves_under("author").len(), 2);
    }
}
