use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use crate::analysis::char_filter::{
    CharFilter, HtmlStripCharFilter, MappingCharFilter, PatternReplaceCharFilter,
};
use crate::analysis::filter::TokenFilter;
use crate::analysis::filters::ascii_folding::AsciiFoldingFilter;
use crate::analysis::filters::length::LengthFilter;
use crate::analysis::filters::lowercase::{LowercaseFilter, TrimFilter, UppercaseFilter};
use crate::analysis::filters::ngram::{EdgeNGramFilter, NGramFilter};
use crate::analysis::filters::stemmer::StemmerFilter;
use crate::analysis::filters::stopword::{named_stop_words, StopWordFilter};
use crate::analysis::settings::{
    AnalysisSettings, AnalyzerDef, CharFilterDef, ComponentRef, StopWords, TokenFilterDef,
    TokenizerDef,
};
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{
    KeywordTokenizer, LetterTokenizer, PatternTokenizer, StandardTokenizer, Tokenizer,
    WhitespaceTokenizer,
};
use crate::core::error::{Error, Result};

/// Text analysis pipeline: char filters, then one tokenizer, then token filters.
#[derive(Clone)]
pub struct Analyzer {
    pub name: String,
    pub char_filters: Vec<Arc<dyn CharFilter>>,
    pub tokenizer: Arc<dyn Tokenizer>,
    pub filters: Vec<Arc<dyn TokenFilter>>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("name", &self.name)
            .field("char_filters", &self.char_filters.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("tokenizer", &self.tokenizer.name())
            .field("filters", &self.filters.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

pub const BUILTIN_ANALYZERS: &[&str] = &[
    "standard", "simple", "whitespace", "keyword", "stop", "pattern", "english", "danish",
    "dutch", "french", "german", "spanish",
];

impl Analyzer {
    pub fn new(name: impl Into<String>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Analyzer {
            name: name.into(),
            char_filters: Vec::new(),
            tokenizer,
            filters: Vec::new(),
        }
    }

    pub fn add_char_filter(mut self, filter: Arc<dyn CharFilter>) -> Self {
        self.char_filters.push(filter);
        self
    }

    pub fn add_filter(mut self, filter: Arc<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut filtered = None;
        for char_filter in &self.char_filters {
            let input = filtered.as_deref().unwrap_or(text);
            filtered = Some(char_filter.filter(input));
        }

        let mut tokens = self.tokenizer.tokenize(filtered.as_deref().unwrap_or(text));

        for filter in &self.filters {
            tokens = filter.filter(tokens);
        }

        tokens
    }

    /// Analyzed terms only, in stream order.
    pub fn terms(&self, text: &str) -> Vec<String> {
        self.analyze(text).into_iter().map(|t| t.text).collect()
    }

    pub fn standard(stop_words: Option<Vec<String>>, max_token_length: Option<usize>) -> Self {
        let tokenizer = StandardTokenizer {
            max_token_length: max_token_length.unwrap_or(255),
        };
        let analyzer = Analyzer::new("standard", Arc::new(tokenizer))
            .add_filter(Arc::new(LowercaseFilter));
        match stop_words {
            Some(words) if !words.is_empty() => {
                analyzer.add_filter(Arc::new(StopWordFilter::new(words, true)))
            }
            _ => analyzer,
        }
    }

    pub fn simple() -> Self {
        Analyzer::new("simple", Arc::new(LetterTokenizer)).add_filter(Arc::new(LowercaseFilter))
    }

    pub fn whitespace() -> Self {
        Analyzer::new("whitespace", Arc::new(WhitespaceTokenizer))
    }

    pub fn keyword() -> Self {
        Analyzer::new("keyword", Arc::new(KeywordTokenizer))
    }

    pub fn stop(stop_words: Vec<String>) -> Self {
        Analyzer::new("stop", Arc::new(LetterTokenizer))
            .add_filter(Arc::new(LowercaseFilter))
            .add_filter(Arc::new(StopWordFilter::new(stop_words, true)))
    }

    pub fn pattern(pattern: &str, lowercase: bool, stop_words: Vec<String>) -> Result<Self> {
        let mut analyzer = Analyzer::new("pattern", Arc::new(PatternTokenizer::new(pattern)?));
        if lowercase {
            analyzer = analyzer.add_filter(Arc::new(LowercaseFilter));
        }
        if !stop_words.is_empty() {
            analyzer = analyzer.add_filter(Arc::new(StopWordFilter::new(stop_words, true)));
        }
        Ok(analyzer)
    }

    /// Language analyzer: standard tokenizer, lowercase, language stop words, snowball stemmer.
    pub fn language(language: &str, stop_words: Option<Vec<String>>) -> Result<Self> {
        let stop_words = match stop_words {
            Some(words) => words,
            None => named_stop_words(&format!("_{}_", language))?,
        };
        Ok(Analyzer::new(language, Arc::new(StandardTokenizer::default()))
            .add_filter(Arc::new(LowercaseFilter))
            .add_filter(Arc::new(StopWordFilter::new(stop_words, true)))
            .add_filter(Arc::new(StemmerFilter::for_language(language)?)))
    }

    /// Built-in analyzer by name, with default parameters.
    pub fn builtin(name: &str) -> Option<Self> {
        let analyzer = match name {
            "standard" => Analyzer::standard(None, None),
            "simple" => Analyzer::simple(),
            "whitespace" => Analyzer::whitespace(),
            "keyword" => Analyzer::keyword(),
            "stop" => Analyzer::stop(named_stop_words("_english_").ok()?),
            "pattern" => Analyzer::pattern(PatternTokenizer::DEFAULT_PATTERN, true, Vec::new()).ok()?,
            "english" | "danish" | "dutch" | "french" | "german" | "spanish" => {
                Analyzer::language(name, None).ok()?
            }
            _ => return None,
        };
        Some(analyzer)
    }

    fn renamed(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

fn resolve_stop_words(stop_words: &Option<StopWords>) -> Result<Option<Vec<String>>> {
    match stop_words {
        None => Ok(None),
        Some(StopWords::Named(name)) => named_stop_words(name).map(Some),
        Some(StopWords::List(words)) => Ok(Some(words.clone())),
    }
}

fn build_tokenizer(def: &TokenizerDef) -> Result<Arc<dyn Tokenizer>> {
    Ok(match def {
        TokenizerDef::Standard { max_token_length } => Arc::new(StandardTokenizer {
            max_token_length: max_token_length.unwrap_or(255),
        }),
        TokenizerDef::Whitespace => Arc::new(WhitespaceTokenizer),
        TokenizerDef::Letter => Arc::new(LetterTokenizer),
        TokenizerDef::Keyword => Arc::new(KeywordTokenizer),
        TokenizerDef::Pattern { pattern } => Arc::new(PatternTokenizer::new(
            pattern.as_deref().unwrap_or(PatternTokenizer::DEFAULT_PATTERN),
        )?),
    })
}

fn build_filter(def: &TokenFilterDef) -> Result<Arc<dyn TokenFilter>> {
    Ok(match def {
        TokenFilterDef::Lowercase => Arc::new(LowercaseFilter),
        TokenFilterDef::Uppercase => Arc::new(UppercaseFilter),
        TokenFilterDef::Trim => Arc::new(TrimFilter),
        TokenFilterDef::Stop { stopwords, ignore_case } => {
            let words = match resolve_stop_words(stopwords)? {
                Some(words) => words,
                None => named_stop_words("_english_")?,
            };
            Arc::new(StopWordFilter::new(words, *ignore_case))
        }
        TokenFilterDef::Asciifolding { preserve_original } => {
            Arc::new(AsciiFoldingFilter::new(*preserve_original))
        }
        TokenFilterDef::Stemmer { language } => Arc::new(StemmerFilter::for_language(language)?),
        TokenFilterDef::Ngram { min_gram, max_gram } => {
            check_grams(*min_gram, *max_gram)?;
            Arc::new(NGramFilter::new(*min_gram, *max_gram))
        }
        TokenFilterDef::EdgeNgram { min_gram, max_gram } => {
            check_grams(*min_gram, *max_gram)?;
            Arc::new(EdgeNGramFilter::new(*min_gram, *max_gram))
        }
        TokenFilterDef::Length { min, max } => {
            if min > max {
                return Err(Error::invalid_mapping(format!(
                    "length filter min [{}] exceeds max [{}]",
                    min, max
                )));
            }
            Arc::new(LengthFilter::new(*min, *max))
        }
    })
}

fn check_grams(min_gram: usize, max_gram: usize) -> Result<()> {
    if min_gram == 0 || min_gram > max_gram {
        return Err(Error::invalid_mapping(format!(
            "invalid gram sizes min_gram [{}] max_gram [{}]",
            min_gram, max_gram
        )));
    }
    Ok(())
}

fn build_char_filter(def: &CharFilterDef) -> Result<Arc<dyn CharFilter>> {
    Ok(match def {
        CharFilterDef::HtmlStrip => Arc::new(HtmlStripCharFilter),
        CharFilterDef::Mapping { mappings } => Arc::new(MappingCharFilter::from_rules(mappings)?),
        CharFilterDef::PatternReplace { pattern, replacement } => {
            Arc::new(PatternReplaceCharFilter::new(pattern, replacement)?)
        }
    })
}

fn named_refs<T>(names: &[String]) -> Vec<ComponentRef<T>> {
    names.iter().map(|n| ComponentRef::Named(n.clone())).collect()
}

fn builtin_tokenizer(name: &str) -> Option<TokenizerDef> {
    Some(match name {
        "standard" => TokenizerDef::Standard { max_token_length: None },
        "whitespace" => TokenizerDef::Whitespace,
        "letter" => TokenizerDef::Letter,
        "keyword" => TokenizerDef::Keyword,
        "pattern" => TokenizerDef::Pattern { pattern: None },
        _ => return None,
    })
}

fn builtin_filter(name: &str) -> Option<TokenFilterDef> {
    Some(match name {
        "lowercase" => TokenFilterDef::Lowercase,
        "uppercase" => TokenFilterDef::Uppercase,
        "trim" => TokenFilterDef::Trim,
        "stop" => TokenFilterDef::Stop { stopwords: None, ignore_case: false },
        "asciifolding" => TokenFilterDef::Asciifolding { preserve_original: false },
        "stemmer" | "porter_stem" => TokenFilterDef::Stemmer { language: "english".to_string() },
        "ngram" => TokenFilterDef::Ngram { min_gram: 1, max_gram: 2 },
        "edge_ngram" => TokenFilterDef::EdgeNgram { min_gram: 1, max_gram: 2 },
        "length" => TokenFilterDef::Length { min: 0, max: usize::MAX },
        _ => return None,
    })
}

fn builtin_char_filter(name: &str) -> Option<CharFilterDef> {
    match name {
        "html_strip" => Some(CharFilterDef::HtmlStrip),
        _ => None,
    }
}

/// Analyzers available to one index: its custom definitions layered over the built-ins.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerRegistry {
    settings: AnalysisSettings,
    analyzers: HashMap<String, Arc<Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every configured analyzer up front so a bad reference fails here
    /// instead of at document-write time.
    pub fn from_settings(settings: &AnalysisSettings) -> Result<Self> {
        let mut registry = AnalyzerRegistry {
            settings: settings.clone(),
            analyzers: HashMap::new(),
        };

        for (name, def) in &registry.settings.tokenizer {
            build_tokenizer(def)
                .map_err(|e| Error::invalid_mapping(format!("tokenizer [{}]: {}", name, e.context)))?;
        }
        for (name, def) in &registry.settings.filter {
            build_filter(def)
                .map_err(|e| Error::invalid_mapping(format!("filter [{}]: {}", name, e.context)))?;
        }
        for (name, def) in &registry.settings.char_filter {
            build_char_filter(def)
                .map_err(|e| Error::invalid_mapping(format!("char_filter [{}]: {}", name, e.context)))?;
        }

        let mut analyzers = HashMap::new();
        for (name, def) in &registry.settings.analyzer {
            let analyzer = registry
                .build_analyzer(name, def)
                .map_err(|e| Error::invalid_mapping(format!("analyzer [{}]: {}", name, e.context)))?;
            analyzers.insert(name.clone(), Arc::new(analyzer));
        }
        registry.analyzers = analyzers;

        Ok(registry)
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    fn build_analyzer(&self, name: &str, def: &AnalyzerDef) -> Result<Analyzer> {
        let analyzer = match def {
            AnalyzerDef::Custom { tokenizer, char_filter, filter } => {
                self.build_chain(
                    &named_refs(char_filter),
                    &ComponentRef::Named(tokenizer.clone()),
                    &named_refs(filter),
                )?
            }
            AnalyzerDef::Standard { stopwords, max_token_length } => {
                Analyzer::standard(resolve_stop_words(stopwords)?, *max_token_length)
            }
            AnalyzerDef::Simple => Analyzer::simple(),
            AnalyzerDef::Whitespace => Analyzer::whitespace(),
            AnalyzerDef::Keyword => Analyzer::keyword(),
            AnalyzerDef::Stop { stopwords } => Analyzer::stop(
                resolve_stop_words(stopwords)?.map_or_else(|| named_stop_words("_english_"), Ok)?,
            ),
            AnalyzerDef::Pattern { pattern, lowercase, stopwords } => Analyzer::pattern(
                pattern.as_deref().unwrap_or(PatternTokenizer::DEFAULT_PATTERN),
                *lowercase,
                resolve_stop_words(stopwords)?.unwrap_or_default(),
            )?,
            AnalyzerDef::English { stopwords } => Analyzer::language("english", resolve_stop_words(stopwords)?)?,
            AnalyzerDef::Danish { stopwords } => Analyzer::language("danish", resolve_stop_words(stopwords)?)?,
            AnalyzerDef::Dutch { stopwords } => Analyzer::language("dutch", resolve_stop_words(stopwords)?)?,
            AnalyzerDef::French { stopwords } => Analyzer::language("french", resolve_stop_words(stopwords)?)?,
            AnalyzerDef::German { stopwords } => Analyzer::language("german", resolve_stop_words(stopwords)?)?,
            AnalyzerDef::Spanish { stopwords } => Analyzer::language("spanish", resolve_stop_words(stopwords)?)?,
        };
        Ok(analyzer.renamed(name))
    }

    /// Assembles an ad-hoc pipeline; named components resolve against this index first.
    pub fn build_chain(
        &self,
        char_filters: &[ComponentRef<CharFilterDef>],
        tokenizer: &ComponentRef<TokenizerDef>,
        filters: &[ComponentRef<TokenFilterDef>],
    ) -> Result<Analyzer> {
        let tokenizer = match tokenizer {
            ComponentRef::Inline(def) => build_tokenizer(def)?,
            ComponentRef::Named(name) => match self.settings.tokenizer.get(name) {
                Some(def) => build_tokenizer(def)?,
                None => build_tokenizer(&builtin_tokenizer(name).ok_or_else(|| {
                    Error::invalid_mapping(format!("unknown tokenizer [{}]", name))
                })?)?,
            },
        };

        let mut analyzer = Analyzer::new("_custom", tokenizer);

        for char_filter in char_filters {
            let built = match char_filter {
                ComponentRef::Inline(def) => build_char_filter(def)?,
                ComponentRef::Named(name) => match self.settings.char_filter.get(name) {
                    Some(def) => build_char_filter(def)?,
                    None => build_char_filter(&builtin_char_filter(name).ok_or_else(|| {
                        Error::invalid_mapping(format!("unknown char_filter [{}]", name))
                    })?)?,
                },
            };
            analyzer = analyzer.add_char_filter(built);
        }

        for filter in filters {
            let built = match filter {
                ComponentRef::Inline(def) => build_filter(def)?,
                ComponentRef::Named(name) => match self.settings.filter.get(name) {
                    Some(def) => build_filter(def)?,
                    None => build_filter(&builtin_filter(name).ok_or_else(|| {
                        Error::invalid_mapping(format!("unknown filter [{}]", name))
                    })?)?,
                },
            };
            analyzer = analyzer.add_filter(built);
        }

        Ok(analyzer)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Analyzer>> {
        if let Some(analyzer) = self.analyzers.get(name) {
            return Some(analyzer.clone());
        }
        Analyzer::builtin(name).map(Arc::new)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.analyzers.contains_key(name) || BUILTIN_ANALYZERS.contains(&name)
    }

    /// The index's `default` analyzer when configured, `standard` otherwise.
    pub fn default_analyzer(&self) -> Arc<Analyzer> {
        match self.analyzers.get("default") {
            Some(analyzer) => analyzer.clone(),
            None => Arc::new(Analyzer::standard(None, None)),
        }
    }

    pub fn analyze(&self, analyzer_name: &str, text: &str) -> Result<Vec<Token>> {
        self.get(analyzer_name)
            .map(|analyzer| analyzer.analyze(text))
            .ok_or_else(|| Error::invalid_mapping(format!("unknown analyzer [{}]", analyzer_name)))
    }

    /// Runs the diagnostic analyze call: a named analyzer, an ad-hoc chain, or the
    /// default analyzer when neither is given.
    pub fn analyze_request(&self, request: &AnalyzeRequest) -> Result<Vec<Token>> {
        if let Some(name) = &request.analyzer {
            if request.tokenizer.is_some() || !request.filter.is_empty() || !request.char_filter.is_empty() {
                return Err(Error::invalid_argument(
                    "[analyzer] cannot be combined with [tokenizer], [filter] or [char_filter]",
                ));
            }
            return self.analyze(name, &request.text);
        }
        match &request.tokenizer {
            Some(tokenizer) => {
                let chain = self.build_chain(&request.char_filter, tokenizer, &request.filter)?;
                Ok(chain.analyze(&request.text))
            }
            None if request.filter.is_empty() && request.char_filter.is_empty() => {
                Ok(self.default_analyzer().analyze(&request.text))
            }
            None => Err(Error::invalid_argument("a [tokenizer] is required for a custom chain")),
        }
    }
}

/// Body of the analyze call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeRequest {
    /// Resolve named components against this index instead of the built-ins.
    pub index: Option<String>,
    pub analyzer: Option<String>,
    pub tokenizer: Option<ComponentRef<TokenizerDef>>,
    pub char_filter: Vec<ComponentRef<CharFilterDef>>,
    pub filter: Vec<ComponentRef<TokenFilterDef>>,
    pub text: String,
}

impl AnalyzeRequest {
    pub fn with_analyzer(analyzer: impl Into<String>, text: impl Into<String>) -> Self {
        AnalyzeRequest {
            analyzer: Some(analyzer.into()),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_tokenizer(tokenizer: impl Into<ComponentRef<TokenizerDef>>, text: impl Into<String>) -> Self {
        AnalyzeRequest {
            tokenizer: Some(tokenizer.into()),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<ComponentRef<TokenFilterDef>>) -> Self {
        self.filter.push(filter.into());
        self
    }

    pub fn char_filter(mut self, char_filter: impl Into<ComponentRef<CharFilterDef>>) -> Self {
        self.char_filter.push(char_filter.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whitespace_plus_lowercase() {
        let registry = AnalyzerRegistry::new();
        let analyzer = registry
            .build_chain(&[], &"whitespace".into(), &["lowercase".into()])
            .unwrap();
        assert_eq!(analyzer.terms("Hello World"), vec!["hello", "world"]);
    }

    #[test]
    fn builtin_presets() {
        let simple = Analyzer::builtin("simple").unwrap();
        assert_eq!(simple.terms("Brown-Foxes 42"), vec!["brown", "foxes"]);

        let keyword = Analyzer::builtin("keyword").unwrap();
        assert_eq!(keyword.terms("New York"), vec!["New York"]);

        let english = Analyzer::builtin("english").unwrap();
        assert_eq!(english.terms("The foxes are running"), vec!["fox", "run"]);

        assert!(Analyzer::builtin("nonexistent").is_none());
    }

    #[test]
    fn standard_with_stop_words_leaves_position_gaps() {
        let analyzer = Analyzer::standard(Some(named_stop_words("_english_").unwrap()), None);
        let tokens = analyzer.analyze("The quick fox");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "quick");
        assert_eq!(tokens[0].position, 1);
    }

    #[test]
    fn custom_analyzer_from_settings() {
        let settings: AnalysisSettings = serde_json::from_value(json!({
            "analyzer": {
                "my_analyzer": {
                    "type": "custom",
                    "char_filter": ["html_strip", "emoticons"],
                    "tokenizer": "standard",
                    "filter": ["lowercase", "asciifolding"]
                }
            },
            "char_filter": {
                "emoticons": {"type": "mapping", "mappings": [":) => happy"]}
            }
        }))
        .unwrap();

        let registry = AnalyzerRegistry::from_settings(&settings).unwrap();
        let analyzer = registry.get("my_analyzer").unwrap();
        assert_eq!(analyzer.name, "my_analyzer");
        assert_eq!(analyzer.terms("<b>Café</b> :)"), vec!["cafe", "happy"]);
    }

    #[test]
    fn unknown_components_fail_validation() {
        let settings: AnalysisSettings = serde_json::from_value(json!({
            "analyzer": {"broken": {"type": "custom", "tokenizer": "nope"}}
        }))
        .unwrap();
        let err = AnalyzerRegistry::from_settings(&settings).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::InvalidMapping);

        let settings: AnalysisSettings = serde_json::from_value(json!({
            "analyzer": {"broken": {"type": "custom", "tokenizer": "standard", "filter": ["bogus"]}}
        }))
        .unwrap();
        assert!(AnalyzerRegistry::from_settings(&settings).is_err());
    }

    #[test]
    fn default_analyzer_override() {
        let registry = AnalyzerRegistry::new();
        assert_eq!(registry.default_analyzer().terms("A B"), vec!["a", "b"]);

        let settings: AnalysisSettings = serde_json::from_value(json!({
            "analyzer": {"default": {"type": "keyword"}}
        }))
        .unwrap();
        let registry = AnalyzerRegistry::from_settings(&settings).unwrap();
        assert_eq!(registry.default_analyzer().terms("A B"), vec!["A B"]);
    }

    #[test]
    fn analyze_request_variants() {
        let registry = AnalyzerRegistry::new();
        let chain = AnalyzeRequest::with_tokenizer("whitespace", "Quick FOX").filter("lowercase");
        let terms: Vec<String> = registry.analyze_request(&chain).unwrap().into_iter().map(|t| t.text).collect();
        assert_eq!(terms, vec!["quick", "fox"]);

        let named = AnalyzeRequest::with_analyzer("keyword", "Quick FOX");
        assert_eq!(registry.analyze_request(&named).unwrap()[0].text, "Quick FOX");

        let mixed = AnalyzeRequest::with_analyzer("standard", "x").filter("lowercase");
        assert!(registry.analyze_request(&mixed).is_err());
        assert!(registry.analyze_request(&AnalyzeRequest::with_analyzer("nope", "x")).is_err());
    }
}
