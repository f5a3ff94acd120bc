use regex::Regex;
use crate::analysis::token::Token;
use crate::core::error::{Error, Result};
use unicode_segmentation::UnicodeSegmentation;

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;

    fn name(&self) -> &str;
}

/// Standard Unicode tokenizer (UAX #29 word boundaries)
#[derive(Clone)]
pub struct StandardTokenizer {
    pub max_token_length: usize,
}

impl Default for StandardTokenizer {
    fn default() -> Self {
        StandardTokenizer {
            max_token_length: 255,
        }
    }
}

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0u32;

        let max = self.max_token_length.max(1);

        // Words longer than the limit are split into consecutive chunks of `max` chars
        for (offset, word) in text.unicode_word_indices() {
            let mut start = 0;
            let mut chars = 0;
            for (i, _) in word.char_indices() {
                if chars == max {
                    tokens.push(Token::new(word[start..i].to_string(), position, offset + start));
                    position += 1;
                    start = i;
                    chars = 0;
                }
                chars += 1;
            }
            tokens.push(Token::new(word[start..].to_string(), position, offset + start));
            position += 1;
        }

        tokens
    }

    fn name(&self) -> &str {
        "standard"
    }
}

/// Splits on whitespace and nothing else.
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        split_on(text, char::is_whitespace)
    }

    fn name(&self) -> &str {
        "whitespace"
    }
}

/// Splits whenever a character is not a letter.
pub struct LetterTokenizer;

impl Tokenizer for LetterTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        split_on(text, |c| !c.is_alphabetic())
    }

    fn name(&self) -> &str {
        "letter"
    }
}

/// Emits the whole input as a single token.
pub struct KeywordTokenizer;

impl Tokenizer for KeywordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        if text.is_empty() {
            return Vec::new();
        }
        vec![Token::new(text.to_string(), 0, 0)]
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// Splits on every match of a separator regex.
pub struct PatternTokenizer {
    pub pattern: Regex,
}

impl PatternTokenizer {
    pub const DEFAULT_PATTERN: &'static str = r"\W+";

    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            Error::invalid_mapping(format!("invalid tokenizer pattern [{}]: {}", pattern, e))
        })?;
        Ok(PatternTokenizer { pattern })
    }
}

impl Tokenizer for PatternTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0u32;
        let mut start = 0;

        for m in self.pattern.find_iter(text) {
            if m.start() > start {
                tokens.push(Token::new(text[start..m.start()].to_string(), position, start));
                position += 1;
            }
            start = m.end();
        }
        if start < text.len() {
            tokens.push(Token::new(text[start..].to_string(), position, start));
        }

        tokens
    }

    fn name(&self) -> &str {
        "pattern"
    }
}

fn split_on(text: &str, is_separator: impl Fn(char) -> bool) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut position = 0u32;
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        match (is_separator(c), start) {
            (true, Some(s)) => {
                tokens.push(Token::new(text[s..i].to_string(), position, s));
                position += 1;
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(Token::new(text[s..].to_string(), position, s));
    }

    tokens
}
