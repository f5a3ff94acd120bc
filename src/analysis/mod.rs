pub mod token;
pub mod char_filter;
pub mod tokenizer;
pub mod filter;
pub mod filters;
pub mod settings;
pub mod analyzer;
