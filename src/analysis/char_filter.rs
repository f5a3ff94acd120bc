use regex::Regex;
use crate::core::error::{Error, Result};

/// String-to-string transform applied before tokenization.
pub trait CharFilter: Send + Sync {
    fn filter(&self, text: &str) -> String;

    fn name(&self) -> &str;
}

/// Removes markup and decodes the common HTML entities.
pub struct HtmlStripCharFilter;

const BLOCK_TAGS: &[&str] = &[
    "p", "br", "div", "li", "ul", "ol", "tr", "td", "th", "table", "h1", "h2", "h3", "h4",
    "h5", "h6", "section", "article", "header", "footer", "blockquote", "pre",
];

const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&nbsp;", " "),
];

impl HtmlStripCharFilter {
    fn tag_name(tag: &str) -> String {
        tag.trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase()
    }

    fn decode_entity(rest: &str) -> Option<(&'static str, usize)> {
        ENTITIES
            .iter()
            .find(|(entity, _)| rest.starts_with(entity))
            .map(|(entity, decoded)| (*decoded, entity.len()))
    }
}

impl CharFilter for HtmlStripCharFilter {
    fn filter(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(c) = rest.chars().next() {
            if c == '<' {
                if let Some(end) = rest.find('>') {
                    let tag = &rest[1..end];
                    if BLOCK_TAGS.contains(&Self::tag_name(tag).as_str()) {
                        out.push('\n');
                    }
                    rest = &rest[end + 1..];
                    continue;
                }
            } else if c == '&' {
                if let Some((decoded, len)) = Self::decode_entity(rest) {
                    out.push_str(decoded);
                    rest = &rest[len..];
                    continue;
                }
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }

        out
    }

    fn name(&self) -> &str {
        "html_strip"
    }
}

/// Replaces configured keys with their values, longest key first.
pub struct MappingCharFilter {
    pub mappings: Vec<(String, String)>,
}

impl MappingCharFilter {
    /// Parses rules written as `"key => value"`.
    pub fn from_rules(rules: &[String]) -> Result<Self> {
        let mut mappings = Vec::with_capacity(rules.len());
        for rule in rules {
            let (key, value) = rule.split_once("=>").ok_or_else(|| {
                Error::invalid_mapping(format!("invalid mapping rule [{}], expected `a => b`", rule))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::invalid_mapping(format!("empty key in mapping rule [{}]", rule)));
            }
            mappings.push((key.to_string(), value.trim().to_string()));
        }
        mappings.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Ok(MappingCharFilter { mappings })
    }
}

impl CharFilter for MappingCharFilter {
    fn filter(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        'outer: while let Some(c) = rest.chars().next() {
            for (key, value) in &self.mappings {
                if rest.starts_with(key.as_str()) {
                    out.push_str(value);
                    rest = &rest[key.len()..];
                    continue 'outer;
                }
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }

        out
    }

    fn name(&self) -> &str {
        "mapping"
    }
}

pub struct PatternReplaceCharFilter {
    pub pattern: Regex,
    pub replacement: String,
}

impl PatternReplaceCharFilter {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            Error::invalid_mapping(format!("invalid pattern_replace pattern [{}]: {}", pattern, e))
        })?;
        Ok(PatternReplaceCharFilter {
            pattern,
            replacement: replacement.to_string(),
        })
    }
}

impl CharFilter for PatternReplaceCharFilter {
    fn filter(&self, text: &str) -> String {
        self.pattern.replace_all(text, self.replacement.as_str()).into_owned()
    }

    fn name(&self) -> &str {
        "pattern_replace"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_strip_removes_tags_and_decodes_entities() {
        let filtered = HtmlStripCharFilter
            .filter("<p>Hello, <strong>World!</strong> Fish &amp; chips</p>");
        assert_eq!(filtered, "\nHello, World! Fish & chips\n");
    }

    #[test]
    fn html_strip_keeps_lone_angle_bracket() {
        assert_eq!(HtmlStripCharFilter.filter("a < b"), "a < b");
    }

    #[test]
    fn mapping_prefers_longest_key() {
        let filter = MappingCharFilter::from_rules(&[":) => happy".into(), ":)) => joyful".into()])
            .unwrap();
        assert_eq!(filter.filter("so :)) and :)"), "so joyful and happy");
        assert!(MappingCharFilter::from_rules(&["broken".into()]).is_err());
    }

    #[test]
    fn pattern_replace_rewrites_matches() {
        let filter = PatternReplaceCharFilter::new(r"(\d+)-(\d+)", "$1$2").unwrap();
        assert_eq!(filter.filter("call 555-1234"), "call 5551234");
    }
}
