use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;

/// Keeps tokens whose character count lies in `min..=max`.
pub struct LengthFilter {
    pub min: usize,
    pub max: usize,
}

impl LengthFilter {
    pub fn new(min: usize, max: usize) -> Self {
        LengthFilter { min, max }
    }
}

impl TokenFilter for LengthFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .filter(|token| {
                let len = token.text.chars().count();
                len >= self.min && len <= self.max
            })
            .collect()
    }

    fn name(&self) -> &str {
        "length"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_tokens_within_bounds() {
        let tokens = vec![
            Token::new("a".into(), 0, 0),
            Token::new("fox".into(), 1, 2),
            Token::new("extraordinary".into(), 2, 6),
        ];
        let out = LengthFilter::new(2, 5).filter(tokens);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "fox");
    }
}
