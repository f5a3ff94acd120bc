use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

/// Per-index analysis configuration: named analyzers and the components they are built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default)]
    pub analyzer: BTreeMap<String, AnalyzerDef>,
    #[serde(default)]
    pub tokenizer: BTreeMap<String, TokenizerDef>,
    #[serde(default)]
    pub filter: BTreeMap<String, TokenFilterDef>,
    #[serde(default)]
    pub char_filter: BTreeMap<String, CharFilterDef>,
}

impl AnalysisSettings {
    /// Adds the components of `other`, replacing same-named definitions.
    pub fn merge(&mut self, other: AnalysisSettings) {
        self.analyzer.extend(other.analyzer);
        self.tokenizer.extend(other.tokenizer);
        self.filter.extend(other.filter);
        self.char_filter.extend(other.char_filter);
    }

    pub fn is_empty(&self) -> bool {
        self.analyzer.is_empty()
            && self.tokenizer.is_empty()
            && self.filter.is_empty()
            && self.char_filter.is_empty()
    }
}

/// A stop word set: a named set such as `_english_`, or an explicit list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopWords {
    Named(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalyzerDef {
    Custom {
        tokenizer: String,
        #[serde(default)]
        char_filter: Vec<String>,
        #[serde(default)]
        filter: Vec<String>,
    },
    Standard {
        #[serde(default)]
        stopwords: Option<StopWords>,
        #[serde(default)]
        max_token_length: Option<usize>,
    },
    Simple,
    Whitespace,
    Keyword,
    Stop {
        #[serde(default)]
        stopwords: Option<StopWords>,
    },
    Pattern {
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default = "default_true")]
        lowercase: bool,
        #[serde(default)]
        stopwords: Option<StopWords>,
    },
    English {
        #[serde(default)]
        stopwords: Option<StopWords>,
    },
    Danish {
        #[serde(default)]
        stopwords: Option<StopWords>,
    },
    Dutch {
        #[serde(default)]
        stopwords: Option<StopWords>,
    },
    French {
        #[serde(default)]
        stopwords: Option<StopWords>,
    },
    German {
        #[serde(default)]
        stopwords: Option<StopWords>,
    },
    Spanish {
        #[serde(default)]
        stopwords: Option<StopWords>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenizerDef {
    Standard {
        #[serde(default)]
        max_token_length: Option<usize>,
    },
    Whitespace,
    Letter,
    Keyword,
    Pattern {
        #[serde(default)]
        pattern: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenFilterDef {
    Lowercase,
    Uppercase,
    Trim,
    Stop {
        #[serde(default)]
        stopwords: Option<StopWords>,
        #[serde(default)]
        ignore_case: bool,
    },
    Asciifolding {
        #[serde(default)]
        preserve_original: bool,
    },
    Stemmer {
        #[serde(default = "default_stem_language")]
        language: String,
    },
    Ngram {
        #[serde(default = "default_min_gram")]
        min_gram: usize,
        #[serde(default = "default_max_gram")]
        max_gram: usize,
    },
    EdgeNgram {
        #[serde(default = "default_min_gram")]
        min_gram: usize,
        #[serde(default = "default_max_gram")]
        max_gram: usize,
    },
    Length {
        #[serde(default)]
        min: usize,
        #[serde(default = "default_max_length")]
        max: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CharFilterDef {
    HtmlStrip,
    Mapping {
        mappings: Vec<String>,
    },
    PatternReplace {
        pattern: String,
        #[serde(default)]
        replacement: String,
    },
}

/// A component given either by name or inline, as accepted by the diagnostic analyze call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentRef<T> {
    Named(String),
    Inline(T),
}

impl<T> From<&str> for ComponentRef<T> {
    fn from(name: &str) -> Self {
        ComponentRef::Named(name.to_string())
    }
}

fn default_true() -> bool {
    true
}

fn default_stem_language() -> String {
    "english".to_string()
}

fn default_min_gram() -> usize {
    1
}

fn default_max_gram() -> usize {
    2
}

fn default_max_length() -> usize {
    usize::MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_custom_analysis_block() {
        let settings: AnalysisSettings = serde_json::from_value(json!({
            "analyzer": {
                "my_analyzer": {
                    "type": "custom",
                    "char_filter": ["html_strip"],
                    "tokenizer": "standard",
                    "filter": ["lowercase", "my_stop", "asciifolding"]
                },
                "english_stop": {"type": "standard", "stopwords": "_english_"}
            },
            "filter": {
                "my_stop": {"type": "stop", "stopwords": ["a", "the"], "ignore_case": true},
                "autocomplete": {"type": "edge_ngram", "min_gram": 1, "max_gram": 10}
            },
            "char_filter": {
                "emoticons": {"type": "mapping", "mappings": [":) => _happy_"]}
            }
        }))
        .unwrap();

        assert_eq!(settings.analyzer.len(), 2);
        assert_eq!(
            settings.filter["my_stop"],
            TokenFilterDef::Stop {
                stopwords: Some(StopWords::List(vec!["a".into(), "the".into()])),
                ignore_case: true,
            }
        );
        assert_eq!(
            settings.analyzer["english_stop"],
            AnalyzerDef::Standard {
                stopwords: Some(StopWords::Named("_english_".into())),
                max_token_length: None,
            }
        );
    }

    #[test]
    fn merge_replaces_same_name() {
        let mut base = AnalysisSettings::default();
        base.filter.insert("f".into(), TokenFilterDef::Lowercase);
        let mut update = AnalysisSettings::default();
        update.filter.insert("f".into(), TokenFilterDef::Uppercase);
        update.filter.insert("g".into(), TokenFilterDef::Trim);
        base.merge(update);
        assert_eq!(base.filter["f"], TokenFilterDef::Uppercase);
        assert_eq!(base.filter.len(), 2);
    }
}
