use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A tracked competitor. Read-only input to enrichment and rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    pub sector: String,
    #[serde(default)]
    pub website: Option<String>,
}

impl Competitor {
    /// The name followed by every alias.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Case-insensitive match of `candidate` against the id, name or any alias.
    #[must_use]
    pub fn is_named(&self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        self.id.eq_ignore_ascii_case(candidate)
            || self.terms().any(|t| t.eq_ignore_ascii_case(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_named_checks_name_alias_and_id() {
        let c = Competitor {
            id: "oneplus".to_string(),
            name: "OnePlus".to_string(),
            aliases: ["One Plus".to_string(), "OnePlus India".to_string()].into(),
            sector: "smartphones".to_string(),
            website: None,
        };
        assert!(c.is_named("oneplus"));
        assert!(c.is_named("ONE PLUS"));
        assert!(c.is_named(" OnePlus India "));
        assert!(!c.is_named("Xiaomi"));
        assert_eq!(c.terms().count(), 3);
    }
}
