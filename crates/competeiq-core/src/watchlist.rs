use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::alerts::AlertRule;
use crate::competitors::Competitor;
use crate::sources::{Source, SourceKind, SourceStatus, MAX_POLLING_INTERVAL_SECS};
use crate::ConfigError;

fn default_polling_interval_secs() -> u64 {
    900
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorConfig {
    /// Defaults to the slug of `name`.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    pub sector: String,
    #[serde(default)]
    pub website: Option<String>,
}

impl CompetitorConfig {
    #[must_use]
    pub fn resolved_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| slugify(&self.name))
    }

    fn into_competitor(self) -> Competitor {
        Competitor {
            id: self.resolved_id(),
            name: self.name,
            aliases: self.aliases,
            sector: self.sector,
            website: self.website,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub kind: SourceKind,
    pub endpoint: String,
    #[serde(default = "default_polling_interval_secs")]
    pub polling_interval_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SourceConfig {
    #[must_use]
    pub fn resolved_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| slugify(&self.name))
    }

    fn into_source(self) -> Source {
        Source {
            id: self.resolved_id(),
            name: self.name,
            kind: self.kind,
            endpoint: self.endpoint,
            polling_interval_secs: self.polling_interval_secs,
            last_polled_at: None,
            consecutive_failure_count: 0,
            status: if self.enabled {
                SourceStatus::Active
            } else {
                SourceStatus::Disabled
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct WatchlistFile {
    #[serde(default)]
    competitors: Vec<CompetitorConfig>,
    #[serde(default)]
    sources: Vec<SourceConfig>,
    #[serde(default)]
    rules: Vec<AlertRule>,
}

/// Validated competitor catalog, source registry seed and alert rules.
#[derive(Debug, Clone, Default)]
pub struct Watchlist {
    pub competitors: Vec<Competitor>,
    pub sources: Vec<Source>,
    pub rules: Vec<AlertRule>,
}

/// Load and validate the watchlist from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_watchlist(path: &Path) -> Result<Watchlist, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::WatchlistIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_watchlist(&content)
}

/// Parse and validate watchlist YAML.
///
/// # Errors
///
/// Returns `ConfigError::WatchlistParse` for malformed YAML and
/// `ConfigError::Validation` for semantic problems.
pub fn parse_watchlist(content: &str) -> Result<Watchlist, ConfigError> {
    let file: WatchlistFile = serde_yaml::from_str(content)?;
    validate(&file)?;

    Ok(Watchlist {
        competitors: file
            .competitors
            .into_iter()
            .map(CompetitorConfig::into_competitor)
            .collect(),
        sources: file
            .sources
            .into_iter()
            .map(SourceConfig::into_source)
            .collect(),
        rules: file.rules,
    })
}

fn validate(file: &WatchlistFile) -> Result<(), ConfigError> {
    let mut competitor_ids = HashSet::new();
    let mut competitor_terms: HashSet<String> = HashSet::new();

    for c in &file.competitors {
        if c.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "competitor name must be non-empty".to_string(),
            ));
        }
        let id = c.resolved_id();
        if id.is_empty() {
            return Err(ConfigError::Validation(format!(
                "competitor '{}' produces an empty id",
                c.name
            )));
        }
        if !competitor_ids.insert(id.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate competitor id: '{id}'"
            )));
        }
        competitor_terms.insert(id.to_lowercase());
        competitor_terms.insert(c.name.to_lowercase());
        for alias in &c.aliases {
            if alias.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "competitor '{}' has an empty alias",
                    c.name
                )));
            }
            competitor_terms.insert(alias.to_lowercase());
        }
    }

    let mut source_ids = HashSet::new();
    for s in &file.sources {
        if s.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source name must be non-empty".to_string(),
            ));
        }
        if s.endpoint.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "source '{}' has an empty endpoint",
                s.name
            )));
        }
        if s.polling_interval_secs == 0 {
            return Err(ConfigError::Validation(format!(
                "source '{}' polling_interval_secs must be positive",
                s.name
            )));
        }
        if s.polling_interval_secs > MAX_POLLING_INTERVAL_SECS {
            return Err(ConfigError::Validation(format!(
                "source '{}' polling_interval_secs must be at most {MAX_POLLING_INTERVAL_SECS}",
                s.name
            )));
        }
        let id = s.resolved_id();
        if !source_ids.insert(id.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source id: '{id}'"
            )));
        }
    }

    let mut rule_ids = HashSet::new();
    for rule in &file.rules {
        rule.validate().map_err(ConfigError::Validation)?;
        if !rule_ids.insert(rule.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate rule id: '{}'",
                rule.id
            )));
        }
        for name in &rule.conditions.competitors {
            if !competitor_terms.contains(&name.trim().to_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "rule '{}' references unknown competitor '{name}'",
                    rule.id
                )));
            }
        }
    }

    Ok(())
}

/// Lowercase, URL-safe slug: alphanumerics kept, whitespace and dashes
/// collapsed into single dashes, everything else dropped.
#[must_use]
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                Some(c)
            } else if c.is_whitespace() {
                Some('-')
            } else {
                None
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
