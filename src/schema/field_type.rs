use serde::{Serialize, Deserialize};

/// Field data type. Immutable once a field is mapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Analyzed full-text field.
    Text,
    /// Exact value, indexed as a single term.
    Keyword,
    #[serde(alias = "long", alias = "short", alias = "byte")]
    Integer,
    #[serde(alias = "double", alias = "half_float")]
    Float,
    /// Stored internally as UTC epoch milliseconds.
    Date,
    Boolean,
    Nested,
    Object,
    /// Points at another field; never holds values itself.
    Alias,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Keyword => "keyword",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
            FieldType::Nested => "nested",
            FieldType::Object => "object",
            FieldType::Alias => "alias",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, FieldType::Object | FieldType::Nested)
    }

    /// Numeric and date fields are indexed as points.
    pub fn is_point(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float | FieldType::Date)
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_container() && *self != FieldType::Alias
    }

    pub fn default_doc_values(&self) -> bool {
        matches!(
            self,
            FieldType::Keyword
                | FieldType::Integer
                | FieldType::Float
                | FieldType::Date
                | FieldType::Boolean
        )
    }

    pub fn default_norms(&self) -> bool {
        matches!(self, FieldType::Text)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_deserialize_to_canonical_types() {
        let long: FieldType = serde_json::from_str("\"long\"").unwrap();
        let double: FieldType = serde_json::from_str("\"double\"").unwrap();
        assert_eq!(long, FieldType::Integer);
        assert_eq!(double, FieldType::Float);
        assert_eq!(serde_json::to_string(&FieldType::Keyword).unwrap(), "\"keyword\"");
    }

    #[test]
    fn defaults_follow_type() {
        assert!(FieldType::Text.default_norms());
        assert!(!FieldType::Text.default_doc_values());
        assert!(FieldType::Keyword.default_doc_values());
        assert!(!FieldType::Keyword.default_norms());
        assert!(FieldType::Date.is_point());
        assert!(!FieldType::Alias.is_leaf());
    }
}
