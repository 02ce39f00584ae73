//! Configuration management for RefGraph services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use crate::models::ProviderKind;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Which graph store backend to use
    #[serde(default)]
    pub store: StoreConfig,

    /// Citation parser tuning
    #[serde(default)]
    pub citation: CitationConfig,

    /// Entity resolver tuning
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Expansion run bounds
    #[serde(default)]
    pub expansion: ExpansionConfig,

    /// External content providers
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Seconds to wait for cancelled runs to drain on shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

/// Graph store backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CitationConfig {
    /// How far after a citation marker a title may start, in characters
    #[serde(default = "default_title_window")]
    pub title_window_chars: usize,

    /// Extracted titles shorter than this are rejected
    #[serde(default = "default_min_title_chars")]
    pub min_title_chars: usize,

    /// Extracted authors shorter than this are rejected
    #[serde(default = "default_min_author_chars")]
    pub min_author_chars: usize,

    /// Sentences kept on each side of a match as context
    #[serde(default = "default_context_sentences")]
    pub context_sentences: usize,

    /// Earliest accepted publication year
    #[serde(default = "default_min_year")]
    pub min_year: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Jaccard similarity over title tokens required for a fuzzy match
    #[serde(default = "default_title_similarity")]
    pub title_similarity_threshold: f64,

    /// Titles with fewer normalized tokens fall back to author + year matching
    #[serde(default = "default_min_comparable_tokens")]
    pub min_comparable_title_tokens: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExpansionConfig {
    /// Depth used when a trigger does not specify one
    #[serde(default = "default_max_depth")]
    pub default_max_depth: u32,

    /// Upper bound accepted from triggers
    #[serde(default = "default_max_depth_limit")]
    pub max_depth_limit: u32,

    /// Worker count used when a trigger does not specify one
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,

    /// Upper bound accepted from triggers
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Seconds a finished run stays queryable through the API
    #[serde(default = "default_run_retention_secs")]
    pub run_retention_secs: u64,

    /// Finished runs kept at most; the oldest are evicted first
    #[serde(default = "default_run_retention_max")]
    pub run_retention_max: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    /// Shared HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Providers in priority order
    #[serde(default = "default_sources")]
    pub sources: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// User agent sent to every provider
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Connect timeout in seconds
    #[serde(default = "default_http_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Contact email for Unpaywall lookups (lookups are skipped without it)
    pub unpaywall_email: Option<String>,

    /// Downloads larger than this are discarded
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: usize,
}

/// One entry of the ordered provider list
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Per-call timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Retries for transient transport failures
    #[serde(default = "default_provider_retries")]
    pub max_retries: u32,

    /// Token bucket refill rate (0 disables rate limiting)
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Override the provider's API root (mirrors, proxies)
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Default settings for a provider kind
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            enabled: default_enabled(),
            timeout_secs: default_provider_timeout(),
            max_retries: default_provider_retries(),
            requests_per_second: default_requests_per_second(),
            base_url: None,
        }
    }

    /// Per-call timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Expose Prometheus metrics from the gateway
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,

    /// Service name attached to logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_upload_bytes() -> usize { 10 * 1024 * 1024 }
fn default_shutdown_grace() -> u64 { 30 }
fn default_database_url() -> String { "postgres://localhost/refgraph".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_title_window() -> usize { 200 }
fn default_min_title_chars() -> usize { 10 }
fn default_min_author_chars() -> usize { 3 }
fn default_context_sentences() -> usize { 1 }
fn default_min_year() -> i32 { 1900 }
fn default_title_similarity() -> f64 { 0.8 }
fn default_min_comparable_tokens() -> usize { 3 }
fn default_max_depth() -> u32 { 3 }
fn default_max_depth_limit() -> u32 { 6 }
fn default_concurrency() -> usize { 4 }
fn default_max_concurrency() -> usize { 32 }
fn default_run_retention_secs() -> u64 { 3600 }
fn default_run_retention_max() -> usize { 1000 }
fn default_user_agent() -> String { format!("refgraph/{}", crate::VERSION) }
fn default_http_connect_timeout() -> u64 { 10 }
fn default_max_download_bytes() -> usize { 50 * 1024 * 1024 }
fn default_enabled() -> bool { true }
fn default_provider_timeout() -> u64 { 30 }
fn default_provider_retries() -> u32 { 2 }
fn default_requests_per_second() -> u32 { 1 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_enabled() -> bool { true }
fn default_service_name() -> String { "refgraph".to_string() }

fn default_sources() -> Vec<ProviderConfig> {
    ProviderKind::ALL.iter().copied().map(ProviderConfig::new).collect()
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__EXPANSION__DEFAULT_MAX_DEPTH=2
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }

    /// Enabled providers in priority order
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.sources.iter().filter(|p| p.enabled)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_upload_bytes: default_max_upload_bytes(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            title_window_chars: default_title_window(),
            min_title_chars: default_min_title_chars(),
            min_author_chars: default_min_author_chars(),
            context_sentences: default_context_sentences(),
            min_year: default_min_year(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            title_similarity_threshold: default_title_similarity(),
            min_comparable_title_tokens: default_min_comparable_tokens(),
        }
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            default_max_depth: default_max_depth(),
            max_depth_limit: default_max_depth_limit(),
            default_concurrency: default_concurrency(),
            max_concurrency: default_max_concurrency(),
            run_retention_secs: default_run_retention_secs(),
            run_retention_max: default_run_retention_max(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            sources: default_sources(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: default_http_connect_timeout(),
            unpaywall_email: None,
            max_download_bytes: default_max_download_bytes(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_metrics_enabled(),
            service_name: default_service_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.citation.title_window_chars, 200);
        assert!((config.resolver.title_similarity_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.expansion.run_retention_secs, 3600);
        assert_eq!(config.expansion.run_retention_max, 1000);
    }

    #[test]
    fn test_default_provider_order() {
        let config = AppConfig::default();
        let kinds: Vec<ProviderKind> = config.enabled_providers().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ProviderKind::Arxiv,
                ProviderKind::Doi,
                ProviderKind::SemanticScholar,
                ProviderKind::ResearchGate,
                ProviderKind::GoogleScholar,
            ]
        );
    }

    #[test]
    fn test_disabled_providers_are_skipped() {
        let mut config = AppConfig::default();
        config.providers.sources[0].enabled = false;
        assert_eq!(config.enabled_providers().count(), 4);
        assert_eq!(config.enabled_providers().next().map(|p| p.kind), Some(ProviderKind::Doi));
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/refgraph");
    }
}
