use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::documents::Sentiment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Keyword,
    Sentiment,
    Volume,
    Competitor,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Keyword => write!(f, "keyword"),
            RuleKind::Sentiment => write!(f, "sentiment"),
            RuleKind::Volume => write!(f, "volume"),
            RuleKind::Competitor => write!(f, "competitor"),
        }
    }
}

/// Type-specific rule conditions. Which fields are required depends on the
/// rule kind; see [`AlertRule::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConditions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Average sentiment weight in `[0, 1]`; see [`SentimentBound`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_threshold: Option<u64>,
    /// Competitor ids or names. Required for competitor rules, an optional
    /// filter for sentiment and volume rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub competitors: Vec<String>,
    /// Required document sentiment for competitor rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
}

/// Direction of a sentiment threshold.
///
/// Thresholds below the neutral midpoint (0.5) are lower bounds: the rule
/// fires when sentiment drops under them. Anything at or above 0.5 is an
/// upper bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SentimentBound {
    Below(f64),
    Above(f64),
}

impl SentimentBound {
    #[must_use]
    pub fn from_threshold(threshold: f64) -> Self {
        if threshold < 0.5 {
            SentimentBound::Below(threshold)
        } else {
            SentimentBound::Above(threshold)
        }
    }

    #[must_use]
    pub fn is_crossed_by(self, average: f64) -> bool {
        match self {
            SentimentBound::Below(t) => average < t,
            SentimentBound::Above(t) => average > t,
        }
    }
}

impl fmt::Display for SentimentBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentimentBound::Below(t) => write!(f, "below {t:.2}"),
            SentimentBound::Above(t) => write!(f, "above {t:.2}"),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub kind: RuleKind,
    #[serde(default)]
    pub conditions: RuleConditions,
    /// Symbolic notification targets (`email`, `slack`, `webhook:ops`, ...).
    #[serde(default)]
    pub channels: BTreeSet<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Overrides the engine-wide cooldown for this rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_secs: Option<u64>,
}

impl AlertRule {
    /// Check that the conditions carry what this rule kind needs.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the rule is unusable.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() || self.name.trim().is_empty() {
            return Err("rule id and name must be non-empty".to_string());
        }
        let c = &self.conditions;
        if let Some(t) = c.sentiment_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(format!(
                    "rule '{}' sentiment_threshold {t} must be within [0, 1]",
                    self.id
                ));
            }
        }
        match self.kind {
            RuleKind::Keyword => {
                if c.keywords.iter().all(|k| k.trim().is_empty()) {
                    return Err(format!("keyword rule '{}' has no keywords", self.id));
                }
            }
            RuleKind::Sentiment => {
                if c.sentiment_threshold.is_none() {
                    return Err(format!(
                        "sentiment rule '{}' requires sentiment_threshold",
                        self.id
                    ));
                }
            }
            RuleKind::Volume => {
                if c.volume_threshold.is_none() {
                    return Err(format!(
                        "volume rule '{}' requires volume_threshold",
                        self.id
                    ));
                }
            }
            RuleKind::Competitor => {
                if c.competitors.is_empty() {
                    return Err(format!(
                        "competitor rule '{}' requires at least one competitor",
                        self.id
                    ));
                }
                if c.sentiment.is_none()
                    && c.sentiment_threshold.is_none()
                    && c.volume_threshold.is_none()
                {
                    return Err(format!(
                        "competitor rule '{}' requires a secondary sentiment or volume condition",
                        self.id
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A generated notification record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    /// `None` for ad-hoc activity alerts that no configured rule produced.
    pub rule_id: Option<String>,
    pub competitor_id: Option<String>,
    pub insight: String,
    pub trend_score: f64,
    pub sentiment: Sentiment,
    pub created_at: DateTime<Utc>,
    pub supporting_document_ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(kind: RuleKind, conditions: RuleConditions) -> AlertRule {
        AlertRule {
            id: "r1".to_string(),
            name: "Rule".to_string(),
            kind,
            conditions,
            channels: BTreeSet::new(),
            active: true,
            cooldown_secs: None,
        }
    }

    #[test]
    fn sentiment_bound_direction_follows_threshold() {
        let low = SentimentBound::from_threshold(0.3);
        assert_eq!(low, SentimentBound::Below(0.3));
        assert!(low.is_crossed_by(0.2));
        assert!(!low.is_crossed_by(0.3));

        let high = SentimentBound::from_threshold(0.8);
        assert!(high.is_crossed_by(0.9));
        assert!(!high.is_crossed_by(0.5));
    }

    #[test]
    fn keyword_rule_requires_keywords() {
        let r = rule(RuleKind::Keyword, RuleConditions::default());
        assert!(r.validate().is_err());
        let r = rule(
            RuleKind::Keyword,
            RuleConditions {
                keywords: vec!["launch".to_string()],
                ..RuleConditions::default()
            },
        );
        assert!(r.validate().is_ok());
    }

    #[test]
    fn competitor_rule_requires_secondary_condition() {
        let r = rule(
            RuleKind::Competitor,
            RuleConditions {
                competitors: vec!["oneplus".to_string()],
                ..RuleConditions::default()
            },
        );
        let err = r.validate().unwrap_err();
        assert!(err.contains("secondary"), "unexpected error: {err}");
    }

    #[test]
    fn out_of_range_sentiment_threshold_is_rejected() {
        let r = rule(
            RuleKind::Sentiment,
            RuleConditions {
                sentiment_threshold: Some(1.5),
                ..RuleConditions::default()
            },
        );
        assert!(r.validate().is_err());
    }

    #[test]
    fn rule_deserializes_with_defaults() {
        let r: AlertRule = serde_json::from_value(serde_json::json!({
            "id": "vol",
            "name": "High Volume",
            "kind": "volume",
            "conditions": { "volume_threshold": 100 }
        }))
        .expect("deserialize");
        assert!(r.active);
        assert!(r.channels.is_empty());
        assert_eq!(r.conditions.volume_threshold, Some(100));
    }
}
