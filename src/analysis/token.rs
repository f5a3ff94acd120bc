use serde::{Serialize, Deserialize};

/// Token representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,        // The token text
    pub position: u32,       // Position in the token stream (for phrase queries)
    pub start_offset: usize, // Byte offset in the char-filtered text
    pub end_offset: usize,
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Word,
    Number,
    Gram,
}

impl Token {
    pub fn new(text: String, position: u32, start_offset: usize) -> Self {
        let end_offset = start_offset + text.len();
        let token_type = if !text.is_empty() && text.chars().all(|c| c.is_numeric()) {
            TokenType::Number
        } else {
            TokenType::Word
        };
        Token {
            text,
            position,
            start_offset,
            end_offset,
            token_type,
        }
    }
}
