use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::catalog::youtube::DEFAULT_BASE_URL;
use crate::resolver::{ResolverSettings, DEFAULT_GENERIC_QUERIES, DEFAULT_MAX_RELATED};
use crate::session::SessionSettings;

pub const CONFIG_FILE: &str = "tunecast.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
}
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    2480
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port(), password: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_clean_log")]
    pub clean_log_on_start: bool,
}
fn default_clean_log() -> bool {
    true
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self { clean_log_on_start: default_clean_log() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Literal key, or the name of an environment variable holding it.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_catalog_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_search_results")]
    pub search_results: u32,
    #[serde(default = "default_related_results")]
    pub related_results: u32,
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_catalog_timeout() -> u64 {
    8_000
}
fn default_search_results() -> u32 {
    8
}
fn default_related_results() -> u32 {
    10
}
impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            timeout_ms: default_catalog_timeout(),
            search_results: default_search_results(),
            related_results: default_related_results(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_max_related")]
    pub max_related: usize,
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_generic_queries")]
    pub generic_queries: Vec<String>,
}
fn default_max_related() -> usize {
    DEFAULT_MAX_RELATED
}
fn default_settle_delay() -> u64 {
    500
}
fn default_generic_queries() -> Vec<String> {
    DEFAULT_GENERIC_QUERIES.iter().map(|q| q.to_string()).collect()
}
impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_related: default_max_related(),
            settle_delay_ms: default_settle_delay(),
            generic_queries: default_generic_queries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_reload_timeout")]
    pub reload_timeout_ms: u64,
    #[serde(default = "default_tick")]
    pub tick_ms: u64,
}
fn default_origin() -> String {
    "http://localhost:2480".into()
}
fn default_reload_timeout() -> u64 {
    10_000
}
fn default_tick() -> u64 {
    1_000
}
impl Default for PlayerConfig {
    fn default() -> Self {
        Self { origin: default_origin(), reload_timeout_ms: default_reload_timeout(), tick_ms: default_tick() }
    }
}

#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub clean_log_on_start: bool,
    pub api_key: Option<String>,
    pub catalog_url: String,
    pub catalog_timeout_ms: u64,
    pub search_results: u32,
    pub related_results: u32,
    pub max_related: usize,
    pub settle_delay_ms: u64,
    pub generic_queries: Vec<String>,
    pub origin: String,
    pub reload_timeout_ms: u64,
    pub tick_ms: u64,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        from_raw(RawConfig::default(), |_| None)
    }
}

impl EffectiveConfig {
    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            max_related: self.max_related,
            per_query: self.related_results,
            generic_queries: self.generic_queries.clone(),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            reload_timeout: Duration::from_millis(self.reload_timeout_ms),
            tick: Duration::from_millis(self.tick_ms.max(1)),
        }
    }
}

pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Tunecast Node Configuration

[server]
# Host/IP to bind. Default: 0.0.0.0
host = "0.0.0.0"
# Port to bind. Default: 2480
port = 2480
# Optional password required in the Authorization header for all requests. Default: unset (no auth)
# password = "supersecret"

[logging]
# Truncate .logs/latest.log on startup. Default: true
clean_log_on_start = true

[catalog]
# YouTube Data API key, or the name of an environment variable holding it.
# Without a key the node serves the built-in curated tracks only.
api_key = "YOUTUBE_API_KEY"
# Base URL of the catalog API. Default: https://www.googleapis.com/youtube/v3
base_url = "https://www.googleapis.com/youtube/v3"
# Request timeout in milliseconds. Default: 8000
timeout_ms = 8000
# Results per user search. Default: 8
search_results = 8
# Results requested per related-track query. Default: 10
related_results = 10

[resolver]
# Upper bound on related tracks per seed. Default: 15
max_related = 15
# Delay between queue population and the deferred autoplay advance. Default: 500
settle_delay_ms = 500
# Queries tried (one at random) when no related track survives filtering.
generic_queries = ["popular music", "top songs", "music hits", "best songs playlist", "new music releases"]

[player]
# Origin passed to the embedded player. Default: http://localhost:2480
origin = "http://localhost:2480"
# Navigation stays blocked at most this long while a track loads. Default: 10000
reload_timeout_ms = 10000
# Progress tick while playing, in milliseconds. Default: 1000
tick_ms = 1000"#;

pub fn parse(contents: &str) -> Result<RawConfig, ConfigError> {
    Ok(toml::from_str(contents)?)
}

pub fn read_config(path: &Path) -> Result<RawConfig, ConfigError> {
    parse(&std::fs::read_to_string(path)?)
}

/// Flattens the file sections and applies overrides. `env` is consulted for
/// `TUNECAST_*`, `YOUTUBE_API_KEY` and any variable `catalog.api_key` names.
pub fn from_raw(raw: RawConfig, env: impl Fn(&str) -> Option<String>) -> EffectiveConfig {
    let api_key = match &raw.catalog.api_key {
        Some(s) => env(s).or_else(|| env("YOUTUBE_API_KEY")).or_else(|| {
            let looks_like_var = s.chars().all(|c| c.is_ascii_uppercase() || c == '_');
            (!looks_like_var).then(|| s.clone())
        }),
        None => env("YOUTUBE_API_KEY"),
    }
    .filter(|k| !k.trim().is_empty());

    EffectiveConfig {
        host: env("TUNECAST_HOST").unwrap_or(raw.server.host),
        port: env("TUNECAST_PORT").and_then(|p| p.parse().ok()).unwrap_or(raw.server.port),
        password: raw.server.password,
        clean_log_on_start: raw.logging.clean_log_on_start,
        api_key,
        catalog_url: env("TUNECAST_CATALOG_URL").unwrap_or(raw.catalog.base_url),
        catalog_timeout_ms: raw.catalog.timeout_ms,
        search_results: raw.catalog.search_results.max(1),
        related_results: raw.catalog.related_results.max(1),
        max_related: raw.resolver.max_related,
        settle_delay_ms: raw.resolver.settle_delay_ms,
        generic_queries: raw.resolver.generic_queries,
        origin: raw.player.origin,
        reload_timeout_ms: raw.player.reload_timeout_ms,
        tick_ms: raw.player.tick_ms,
    }
}

pub fn load_config() -> EffectiveConfig {
    let _ = dotenvy::dotenv();

    let path = Path::new(CONFIG_FILE);
    if !path.exists() {
        if let Err(e) = std::fs::write(path, DEFAULT_CONFIG_TEMPLATE) {
            tracing::warn!(?e, "Failed to create default config file");
        } else {
            tracing::info!("Created default config file at {CONFIG_FILE}");
        }
    }

    let raw = match read_config(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load tunecast config; using defaults");
            RawConfig::default()
        }
    };
    from_raw(raw, |k| std::env::var(k).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn template_parses_to_defaults() {
        let raw = parse(DEFAULT_CONFIG_TEMPLATE).unwrap();
        let cfg = from_raw(raw, env_of(&[]));
        assert_eq!(cfg.port, 2480);
        assert_eq!(cfg.max_related, 15);
        assert_eq!(cfg.search_results, 8);
        assert_eq!(cfg.generic_queries.len(), 5);
        assert_eq!(cfg.api_key, None);
        assert_eq!(cfg.session_settings().tick, Duration::from_secs(1));
    }

    #[test]
    fn api_key_indirection() {
        let raw = parse(DEFAULT_CONFIG_TEMPLATE).unwrap();
        let cfg = from_raw(raw, env_of(&[("YOUTUBE_API_KEY", "abc123")]));
        assert_eq!(cfg.api_key.as_deref(), Some("abc123"));

        let raw = parse("[catalog]\napi_key = \"MY_KEY\"").unwrap();
        let cfg = from_raw(raw, env_of(&[("MY_KEY", "xyz")]));
        assert_eq!(cfg.api_key.as_deref(), Some("xyz"));

        let raw = parse("[catalog]\napi_key = \"AIzaLiteral-key\"").unwrap();
        let cfg = from_raw(raw, env_of(&[]));
        assert_eq!(cfg.api_key.as_deref(), Some("AIzaLiteral-key"));
    }

    #[test]
    fn env_overrides_server_and_catalog() {
        let raw = parse("[server]\nport = 9000").unwrap();
        let cfg = from_raw(
            raw,
            env_of(&[("TUNECAST_PORT", "9100"), ("TUNECAST_HOST", "127.0.0.1"), ("TUNECAST_CATALOG_URL", "http://x")]),
        );
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.catalog_url, "http://x");
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let raw = parse("[resolver]\nmax_related = 5").unwrap();
        let cfg = from_raw(raw, env_of(&[]));
        assert_eq!(cfg.max_related, 5);
        assert_eq!(cfg.settle_delay_ms, 500);
        assert_eq!(cfg.reload_timeout_ms, 10_000);
    }

    #[test]
    fn reads_from_disk_and_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join(CONFIG_FILE);
        std::fs::write(&good, "[player]\ntick_ms = 250").unwrap();
        assert_eq!(read_config(&good).unwrap().player.tick_ms, 250);

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[player\ntick_ms = ").unwrap();
        assert!(matches!(read_config(&bad), Err(ConfigError::Parse(_))));
        assert!(matches!(read_config(&dir.path().join("missing.toml")), Err(ConfigError::Read(_))));
    }
}
