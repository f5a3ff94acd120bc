use rust_stemmers::{Algorithm, Stemmer};
use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;
use crate::core::error::{Error, Result};

pub struct StemmerFilter {
    pub language: String,
    stemmer: Stemmer,
}

impl StemmerFilter {
    pub fn new(algorithm: Algorithm, language: &str) -> Self {
        StemmerFilter {
            language: language.to_string(),
            stemmer: Stemmer::create(algorithm),
        }
    }

    pub fn for_language(language: &str) -> Result<Self> {
        let algorithm = match language {
            "english" | "porter" => Algorithm::English,
            "danish" => Algorithm::Danish,
            "dutch" => Algorithm::Dutch,
            "french" => Algorithm::French,
            "german" => Algorithm::German,
            "italian" => Algorithm::Italian,
            "norwegian" => Algorithm::Norwegian,
            "portuguese" => Algorithm::Portuguese,
            "russian" => Algorithm::Russian,
            "spanish" => Algorithm::Spanish,
            "swedish" => Algorithm::Swedish,
            other => {
                return Err(Error::invalid_mapping(format!("unknown stemmer language [{}]", other)));
            }
        };
        Ok(StemmerFilter::new(algorithm, language))
    }
}

impl TokenFilter for StemmerFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens.into_iter()
            .map(|mut token| {
                token.text = self.stemmer.stem(&token.text).to_string();
                token
            })
            .collect()
    }

    fn name(&self) -> &str {
        "stemmer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_stemming() {
        let filter = StemmerFilter::for_language("english").unwrap();
        let out = filter.filter(vec![
            Token::new("running".into(), 0, 0),
            Token::new("foxes".into(), 1, 8),
        ]);
        assert_eq!(out[0].text, "run");
        assert_eq!(out[1].text, "fox");
        assert!(StemmerFilter::for_language("elvish").is_err());
    }
}
