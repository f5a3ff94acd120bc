use crate::analysis::token::Token;

/// Ordered transform over a token stream. A filter may rewrite, drop or add tokens.
pub trait TokenFilter: Send + Sync {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token>;

    fn name(&self) -> &str;
}
