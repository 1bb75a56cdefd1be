//! Application configuration structures.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Shared HTTP client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Per-source retry and cool-down settings
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Seen-id persistence
    #[serde(default)]
    pub cache: CacheConfig,

    /// Polling loop and announcement filter
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Scraped sources
    #[serde(default = "defaults::sources")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Sources with `enabled = true`.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.client.user_agent.trim().is_empty() {
            return Err(AppError::validation("client.user_agent is empty"));
        }
        if self.client.timeout_secs == 0 {
            return Err(AppError::validation("client.timeout_secs must be > 0"));
        }
        if self.client.max_connections == 0 {
            return Err(AppError::validation("client.max_connections must be > 0"));
        }
        if self.client.max_concurrent_sources == 0 {
            return Err(AppError::validation(
                "client.max_concurrent_sources must be > 0",
            ));
        }
        if self.backoff.max_retries == 0 {
            return Err(AppError::validation("backoff.max_retries must be > 0"));
        }
        if self.backoff.initial_secs > self.backoff.max_secs {
            return Err(AppError::validation(
                "backoff.initial_secs must not exceed backoff.max_secs",
            ));
        }
        if self.cache.write_threshold == 0 {
            return Err(AppError::validation("cache.write_threshold must be > 0"));
        }
        if self.monitor.interval_secs == 0 {
            return Err(AppError::validation("monitor.interval_secs must be > 0"));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(AppError::validation("source name is empty"));
            }
            if !names.insert(source.name.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            url::Url::parse(&source.url).map_err(|e| {
                AppError::validation(format!("source '{}' has bad url: {e}", source.name))
            })?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            backoff: BackoffConfig::default(),
            cache: CacheConfig::default(),
            monitor: MonitorConfig::default(),
            sources: defaults::sources(),
        }
    }
}

/// HTTP client settings shared by every source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Accept header
    #[serde(default = "defaults::accept")]
    pub accept: String,

    /// Accept-Language header
    #[serde(default = "defaults::accept_language")]
    pub accept_language: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum simultaneous connections across all sources
    #[serde(default = "defaults::max_connections")]
    pub max_connections: usize,

    /// How long DNS answers are reused
    #[serde(default = "defaults::dns_cache_ttl")]
    pub dns_cache_ttl_secs: u64,

    /// How many sources are polled at the same time
    #[serde(default = "defaults::max_concurrent_sources")]
    pub max_concurrent_sources: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            accept: defaults::accept(),
            accept_language: defaults::accept_language(),
            timeout_secs: defaults::timeout(),
            max_connections: defaults::max_connections(),
            dns_cache_ttl_secs: defaults::dns_cache_ttl(),
            max_concurrent_sources: defaults::max_concurrent_sources(),
        }
    }
}

/// Retry and cool-down settings applied to each source independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Cool-down floor in seconds
    #[serde(default = "defaults::initial_backoff")]
    pub initial_secs: u64,

    /// Cool-down ceiling in seconds
    #[serde(default = "defaults::max_backoff")]
    pub max_secs: u64,

    /// Attempts per invocation on transport failures
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base of the exponential delay between attempts
    #[serde(default = "defaults::retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

impl BackoffConfig {
    pub fn initial(&self) -> Duration {
        Duration::from_secs(self.initial_secs)
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_secs: defaults::initial_backoff(),
            max_secs: defaults::max_backoff(),
            max_retries: defaults::max_retries(),
            retry_base_delay_ms: defaults::retry_base_delay(),
        }
    }
}

/// Seen-id cache persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// File holding the JSON array of seen ids
    #[serde(default = "defaults::cache_path")]
    pub path: PathBuf,

    /// New ids required before an unforced save writes
    #[serde(default = "defaults::write_threshold")]
    pub write_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: defaults::cache_path(),
            write_threshold: defaults::write_threshold(),
        }
    }
}

/// Polling loop and announcement filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between cycles
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Smallest room count worth announcing (unknown counts pass)
    #[serde(default = "defaults::min_rooms")]
    pub min_rooms: f64,

    /// Drop listings that require a WBS
    #[serde(default = "defaults::exclude_wbs")]
    pub exclude_wbs: bool,
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            min_rooms: defaults::min_rooms(),
            exclude_wbs: defaults::exclude_wbs(),
        }
    }
}

/// Which extractor understands a source's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    InBerlin,
    Degewo,
    Gesobau,
    Gewobag,
    StadtUndLand,
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractorKind::InBerlin => "inberlin",
            ExtractorKind::Degewo => "degewo",
            ExtractorKind::Gesobau => "gesobau",
            ExtractorKind::Gewobag => "gewobag",
            ExtractorKind::StadtUndLand => "stadtundland",
        };
        f.write_str(name)
    }
}

/// A single scraped source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Display name, also the `source` of its records
    pub name: String,

    /// Page or API endpoint to fetch
    pub url: String,

    /// Extractor for the payload
    pub kind: ExtractorKind,

    /// Whether the source is polled
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>, kind: ExtractorKind) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind,
            enabled: true,
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::{ExtractorKind, SourceConfig};

    // Client defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.4 Safari/605.1.15".into()
    }
    pub fn accept() -> String {
        "*/*".into()
    }
    pub fn accept_language() -> String {
        "en-GB,en;q=0.9".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_connections() -> usize {
        5
    }
    pub fn dns_cache_ttl() -> u64 {
        300
    }
    pub fn max_concurrent_sources() -> usize {
        5
    }

    // Backoff defaults
    pub fn initial_backoff() -> u64 {
        60
    }
    pub fn max_backoff() -> u64 {
        3600
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn retry_base_delay() -> u64 {
        1000
    }

    // Cache defaults
    pub fn cache_path() -> PathBuf {
        PathBuf::from("/dev/shm/seen_flats_cache.json")
    }
    pub fn write_threshold() -> usize {
        10
    }

    // Monitor defaults
    pub fn interval() -> u64 {
        60
    }
    pub fn min_rooms() -> f64 {
        2.0
    }
    pub fn exclude_wbs() -> bool {
        true
    }

    pub fn enabled() -> bool {
        true
    }

    // Source defaults
    pub fn sources() -> Vec<SourceConfig> {
        vec![
            SourceConfig::new(
                "InBerlinWohnen",
                "https://inberlinwohnen.de/wohnungsfinder/",
                ExtractorKind::InBerlin,
            ),
            SourceConfig {
                enabled: false,
                ..SourceConfig::new(
                    "Degewo",
                    "https://www.degewo.de/immosuche",
                    ExtractorKind::Degewo,
                )
            },
            SourceConfig {
                enabled: false,
                ..SourceConfig::new(
                    "Gesobau",
                    "https://www.gesobau.de/mieten/wohnungssuche/",
                    ExtractorKind::Gesobau,
                )
            },
            SourceConfig {
                enabled: false,
                ..SourceConfig::new(
                    "Gewobag",
                    "https://www.gewobag.de/fuer-mieter-und-mietinteressenten/mietangebote/?objekttyp%5B%5D=wohnung",
                    ExtractorKind::Gewobag,
                )
            },
            SourceConfig {
                enabled: false,
                ..SourceConfig::new(
                    "Stadt und Land",
                    "https://d2396ha8oiavw0.cloudfront.net/sul-main/immoSearch",
                    ExtractorKind::StadtUndLand,
                )
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.client.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_connections() {
        let mut config = Config::default();
        config.client.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = Config::default();
        config.backoff.initial_secs = 7200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_sources() {
        let mut config = Config::default();
        let first = config.sources[0].clone();
        config.sources.push(first);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_enables_only_inberlin() {
        let config = Config::default();
        let enabled: Vec<_> = config.enabled_sources().map(|s| s.name.as_str()).collect();
        assert_eq!(enabled, vec!["InBerlinWohnen"]);
    }

    #[test]
    fn test_parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [backoff]
            initial_secs = 5

            [[sources]]
            name = "Degewo"
            url = "https://www.degewo.de/immosuche"
            kind = "degewo"
            "#,
        )
        .unwrap();

        assert_eq!(config.backoff.initial_secs, 5);
        assert_eq!(config.backoff.max_secs, 3600);
        assert_eq!(config.client.max_connections, 5);
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].kind, ExtractorKind::Degewo);
        assert!(config.sources[0].enabled);
    }
}
