pub mod lowercase;
pub mod stopword;
pub mod ascii_folding;
pub mod stemmer;
pub mod ngram;
pub mod length;
