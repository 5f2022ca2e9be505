//! Tag selection by regular expression

use crate::{CoreError, Result};
use regex::Regex;

/// Selects tags matching at least one of a set of patterns.
///
/// Patterns match at the start of the tag and are unanchored at the end, so
/// `v1` selects `v1`, `v1.2` and `v10`; use `v1$` for an exact match.
#[derive(Debug, Clone)]
pub struct TagFilter {
    patterns: Vec<Regex>,
}

impl TagFilter {
    /// Compile a set of patterns, rejecting any invalid one
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(&format!("^(?:{})", pattern)).map_err(|source| {
                    CoreError::InvalidPattern {
                        pattern: pattern.to_string(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    pub fn is_match(&self, tag: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(tag))
    }

    /// Matching tags, in their original order
    pub fn select(&self, tags: &[String]) -> Vec<String> {
        tags.iter().filter(|t| self.is_match(t)).cloned().collect()
    }
}
