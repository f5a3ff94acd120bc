use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;

pub struct LowercaseFilter;

impl TokenFilter for LowercaseFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .map(|mut token| {
                token.text = token.text.to_lowercase();
                token
            })
            .collect()
    }

    fn name(&self) -> &str {
        "lowercase"
    }
}

pub struct UppercaseFilter;

impl TokenFilter for UppercaseFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .map(|mut token| {
                token.text = token.text.to_uppercase();
                token
            })
            .collect()
    }

    fn name(&self) -> &str {
        "uppercase"
    }
}

/// Strips leading and trailing whitespace; tokens that become empty are dropped.
pub struct TrimFilter;

impl TokenFilter for TrimFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .filter_map(|mut token| {
                let trimmed = token.text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                if trimmed.len() != token.text.len() {
                    token.text = trimmed.to_string();
                }
                Some(token)
            })
            .collect()
    }

    fn name(&self) -> &str {
        "trim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<Token> {
        words.iter()
            .enumerate()
            .map(|(i, w)| Token::new(w.to_string(), i as u32, 0))
            .collect()
    }

    #[test]
    fn lowercase_and_uppercase() {
        let lower = LowercaseFilter.filter(tokens(&["Hello", "WORLD"]));
        assert_eq!(lower[0].text, "hello");
        assert_eq!(lower[1].text, "world");

        let upper = UppercaseFilter.filter(tokens(&["straße"]));
        assert_eq!(upper[0].text, "STRASSE");
    }

    #[test]
    fn trim_drops_blank_tokens() {
        let out = TrimFilter.filter(tokens(&[" fox ", "   "]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "fox");
    }
}
