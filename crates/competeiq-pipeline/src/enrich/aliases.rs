//! Alias-matching entity extractor.

use async_trait::async_trait;
use competeiq_core::Competitor;
use regex::{Regex, RegexBuilder};

use super::EntityExtractor;
use crate::error::PipelineError;

/// Finds competitors whose name or alias appears in the text as a whole
/// word, case-insensitively.
#[derive(Debug, Clone)]
pub struct AliasExtractor {
    matchers: Vec<(String, Regex)>,
}

impl AliasExtractor {
    /// Build one pattern per competitor covering its name and aliases.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRequest`] if a pattern cannot be
    /// compiled.
    pub fn new(competitors: &[Competitor]) -> Result<Self, PipelineError> {
        let matchers = competitors
            .iter()
            .map(|c| {
                let alternatives: Vec<String> = c
                    .terms()
                    .filter(|t| !t.trim().is_empty())
                    .map(|t| word_pattern(t.trim()))
                    .collect();
                let re = RegexBuilder::new(&alternatives.join("|"))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        PipelineError::InvalidRequest(format!(
                            "invalid alias pattern for competitor '{}': {e}",
                            c.id
                        ))
                    })?;
                Ok((c.name.clone(), re))
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;
        Ok(Self { matchers })
    }

    fn matches(&self, text: &str) -> Vec<String> {
        self.matchers
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Escape `term` and anchor it on word boundaries where the term itself
/// starts or ends with a word character.
fn word_pattern(term: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let lead = if term.chars().next().is_some_and(is_word) {
        r"\b"
    } else {
        ""
    };
    let trail = if term.chars().last().is_some_and(is_word) {
        r"\b"
    } else {
        ""
    };
    format!("{lead}{}{trail}", regex::escape(term))
}

#[async_trait]
impl EntityExtractor for AliasExtractor {
    async fn extract_entities(&self, text: &str) -> Result<Vec<String>, PipelineError> {
        Ok(self.matches(text))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn competitor(id: &str, name: &str, aliases: &[&str]) -> Competitor {
        Competitor {
            id: id.to_string(),
            name: name.to_string(),
            aliases: aliases.iter().map(ToString::to_string).collect::<BTreeSet<_>>(),
            sector: "tech".to_string(),
            website: None,
        }
    }

    #[tokio::test]
    async fn matches_names_and_aliases_as_whole_words() {
        let extractor = AliasExtractor::new(&[
            competitor("oneplus", "OnePlus", &["One Plus"]),
            competitor("mi", "Xiaomi", &["Mi"]),
        ])
        .unwrap();

        let found = extractor
            .extract_entities("one plus and XIAOMI compete")
            .await
            .unwrap();
        assert_eq!(found, vec!["OnePlus".to_string(), "Xiaomi".to_string()]);

        let found = extractor
            .extract_entities("Microsoft announced Midway")
            .await
            .unwrap();
        assert!(found.is_empty(), "alias 'Mi' must not match inside words");
    }

    #[tokio::test]
    async fn symbols_in_terms_are_matched_literally() {
        let extractor = AliasExtractor::new(&[competitor("cpp", "C++ Corp", &["C++"])]).unwrap();
        let found = extractor
            .extract_entities("A new C++ toolkit")
            .await
            .unwrap();
        assert_eq!(found, vec!["C++ Corp".to_string()]);
    }
}
