//! Lexicon sentiment classifier for competitor coverage.

use async_trait::async_trait;
use competeiq_core::Sentiment;

use super::SentimentClassifier;
use crate::error::PipelineError;

/// Word weights for business and product news.
///
/// Keys are lowercase single words. Positive weights lie in `(0.0, 1.0]`,
/// negative in `[-1.0, 0.0)`. The summed score is clamped to `[-1.0, 1.0]`.
const LEXICON: &[(&str, f32)] = &[
    // Positive signals
    ("launch", 0.3),
    ("launches", 0.3),
    ("launched", 0.3),
    ("growth", 0.4),
    ("record", 0.4),
    ("surge", 0.4),
    ("surges", 0.4),
    ("wins", 0.4),
    ("award", 0.4),
    ("partnership", 0.3),
    ("expands", 0.3),
    ("expansion", 0.3),
    ("innovative", 0.4),
    ("praised", 0.5),
    ("popular", 0.3),
    ("profit", 0.4),
    ("best", 0.5),
    ("strong", 0.3),
    ("excellent", 0.5),
    ("great", 0.4),
    ("love", 0.5),
    ("impressive", 0.5),
    ("beats", 0.4),
    // Negative signals
    ("recall", -0.7),
    ("lawsuit", -0.5),
    ("layoffs", -0.6),
    ("outage", -0.6),
    ("breach", -0.7),
    ("decline", -0.4),
    ("declines", -0.4),
    ("loss", -0.4),
    ("losses", -0.4),
    ("fine", -0.3),
    ("fined", -0.5),
    ("banned", -0.6),
    ("ban", -0.6),
    ("delay", -0.3),
    ("delayed", -0.3),
    ("criticism", -0.4),
    ("criticized", -0.4),
    ("complaints", -0.4),
    ("defect", -0.5),
    ("slump", -0.5),
    ("worst", -0.6),
    ("bad", -0.4),
    ("terrible", -0.6),
    ("misses", -0.4),
];

/// Scores above this are positive, below its negation negative.
const NEUTRAL_BAND: f32 = 0.1;

/// Sum matching lexicon weights over the words of `text`, clamped to
/// `[-1.0, 1.0]`. Empty or unknown text scores `0.0`.
#[must_use]
pub fn lexicon_score(text: &str) -> f32 {
    let mut score = 0.0_f32;
    for word in text.split_whitespace() {
        let w = word
            .trim_matches(|c: char| !c.is_alphabetic())
            .to_lowercase();
        if let Some(&(_, weight)) = LEXICON.iter().find(|(lex, _)| *lex == w) {
            score += weight;
        }
    }
    score.clamp(-1.0, 1.0)
}

/// Offline classifier used when no remote sentiment model is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconClassifier;

impl LexiconClassifier {
    #[must_use]
    pub fn label(score: f32) -> Sentiment {
        if score > NEUTRAL_BAND {
            Sentiment::Positive
        } else if score < -NEUTRAL_BAND {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

#[async_trait]
impl SentimentClassifier for LexiconClassifier {
    async fn classify_sentiment(&self, text: &str) -> Result<Sentiment, PipelineError> {
        Ok(Self::label(lexicon_score(text)))
    }
}
