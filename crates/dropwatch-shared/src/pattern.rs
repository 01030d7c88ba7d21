//! Drop-number detection.
//!
//! Identifiers are a fixed letter prefix followed by one or more digits
//! (`DR1234567`). Text is uppercased *before* matching, so `dr100` and
//! `DR100` are the same identifier and the output is always uppercase.

use regex::Regex;

use crate::constants::{DEFAULT_COMPLETION_KEYWORDS, DEFAULT_IDENTIFIER_PREFIX};
use crate::error::ConfigError;

/// Stateless classifier for chat text. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DropMatcher {
    pattern: Regex,
    keywords: Vec<String>,
}

impl DropMatcher {
    pub fn new(prefix: &str, keywords: &[String]) -> Result<Self, ConfigError> {
        let prefix = prefix.trim().to_uppercase();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid(format!(
                "identifier prefix must be ASCII letters, got {prefix:?}"
            )));
        }

        let pattern = Regex::new(&format!(r"{}\d+", regex::escape(&prefix)))?;
        let keywords = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        Ok(Self { pattern, keywords })
    }

    /// All identifiers in `text`, uppercase, in order of appearance.
    /// Repeats are kept.
    pub fn extract_identifiers(&self, text: &str) -> Vec<String> {
        let upper = text.to_uppercase();
        self.pattern
            .find_iter(&upper)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    pub fn contains_identifier(&self, text: &str) -> bool {
        self.pattern.is_match(&text.to_uppercase())
    }

    /// True when the text carries at least one identifier *and* one of the
    /// completion keywords.
    pub fn is_completion_message(&self, text: &str) -> bool {
        let normalized = text.trim().to_lowercase();
        if !self.contains_identifier(&normalized) {
            return false;
        }
        self.keywords.iter().any(|k| normalized.contains(k.as_str()))
    }
}

impl Default for DropMatcher {
    fn default() -> Self {
        let keywords: Vec<String> = DEFAULT_COMPLETION_KEYWORDS
            .iter()
            .map(|k| k.to_string())
            .collect();
        Self::new(DEFAULT_IDENTIFIER_PREFIX, &keywords).expect("default pattern is valid")
    }
}
