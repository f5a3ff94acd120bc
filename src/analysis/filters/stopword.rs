use std::collections::HashSet;
use stop_words::{get, LANGUAGE};
use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;
use crate::core::error::{Error, Result};

/// Lucene's English stop set, the default for the `stop` filter and analyzer.
const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
    "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
    "these", "they", "this", "to", "was", "will", "with",
];

/// Removes stop words. Removed tokens keep their slot so positions show the gap.
pub struct StopWordFilter {
    pub stop_words: HashSet<String>,
    pub ignore_case: bool,
}

impl StopWordFilter {
    pub fn new(stop_words: Vec<String>, ignore_case: bool) -> Self {
        let stop_words = stop_words
            .into_iter()
            .map(|w| if ignore_case { w.to_lowercase() } else { w })
            .collect();
        StopWordFilter { stop_words, ignore_case }
    }

    pub fn english() -> Self {
        StopWordFilter::new(ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect(), false)
    }

    /// Resolves a named set such as `_english_` or `_none_`.
    pub fn named(name: &str, ignore_case: bool) -> Result<Self> {
        Ok(StopWordFilter::new(named_stop_words(name)?, ignore_case))
    }
}

pub fn named_stop_words(name: &str) -> Result<Vec<String>> {
    let language = match name {
        "_none_" => return Ok(Vec::new()),
        "_english_" => return Ok(ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect()),
        "_danish_" => LANGUAGE::Danish,
        "_dutch_" => LANGUAGE::Dutch,
        "_french_" => LANGUAGE::French,
        "_german_" => LANGUAGE::German,
        "_spanish_" => LANGUAGE::Spanish,
        other => {
            return Err(Error::invalid_mapping(format!("unknown stop word set [{}]", other)));
        }
    };
    Ok(get(language).into_iter().map(|s| s.to_lowercase()).collect())
}

impl TokenFilter for StopWordFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .filter(|token| {
                if self.ignore_case {
                    !self.stop_words.contains(&token.text.to_lowercase())
                } else {
                    !self.stop_words.contains(&token.text)
                }
            })
            .collect()
    }

    fn name(&self) -> &str {
        "stop"
    }
}
