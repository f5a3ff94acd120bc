use crate::analysis::filter::TokenFilter;
use crate::analysis::token::{Token, TokenType};

pub struct NGramFilter {
    pub min_gram: usize,
    pub max_gram: usize,
}

impl NGramFilter {
    pub fn new(min_gram: usize, max_gram: usize) -> Self {
        NGramFilter { min_gram, max_gram }
    }
}

impl TokenFilter for NGramFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        let mut result = Vec::new();

        for token in tokens {
            let chars: Vec<(usize, char)> = token.text.char_indices().collect();

            for i in 0..chars.len() {
                for n in self.min_gram..=self.max_gram {
                    if i + n > chars.len() {
                        break;
                    }
                    result.push(gram(&token, &chars, i, n));
                }
            }
        }

        result
    }

    fn name(&self) -> &str {
        "ngram"
    }
}

/// Grams anchored at the start of each token, for search-as-you-type.
pub struct EdgeNGramFilter {
    pub min_gram: usize,
    pub max_gram: usize,
}

impl EdgeNGramFilter {
    pub fn new(min_gram: usize, max_gram: usize) -> Self {
        EdgeNGramFilter { min_gram, max_gram }
    }
}

impl TokenFilter for EdgeNGramFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        let mut result = Vec::new();

        for token in tokens {
            let chars: Vec<(usize, char)> = token.text.char_indices().collect();
            for n in self.min_gram..=self.max_gram.min(chars.len()) {
                result.push(gram(&token, &chars, 0, n));
            }
        }

        result
    }

    fn name(&self) -> &str {
        "edge_ngram"
    }
}

fn gram(token: &Token, chars: &[(usize, char)], start: usize, n: usize) -> Token {
    let text: String = chars[start..start + n].iter().map(|(_, c)| *c).collect();
    let start_offset = token.start_offset + chars[start].0;
    Token {
        end_offset: start_offset + text.len(),
        text,
        position: token.position,
        start_offset,
        token_type: TokenType::Gram,
    }
}
