//! Configuration file parser for pressclip.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
//!
//! API keys may come from the file or from the environment (`SERPER_API_KEY`,
//! `OPENAI_API_KEY`). The environment takes precedence over the file.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All sections use `#[serde(default)]` so any subset of keys can be
/// specified. Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub search: SearchConfig,
    pub crawl: CrawlConfig,
    pub filter: FilterConfig,
    pub dispatch: DispatchConfig,
    pub queue: QueueConfig,
    pub classifier: ClassifierConfig,
    pub retry: RetryConfig,
}

/// SQLite database location and per-operation timeout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. `:memory:` is accepted for tests.
    pub path: String,

    /// Timeout applied to individual storage calls made during message
    /// processing, in seconds.
    pub op_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "pressclip.db".to_string(),
            op_timeout_secs: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.op_timeout_secs)
    }
}

/// News search provider settings.
///
/// Custom Debug impl masks `api_key` to prevent secret leakage in logs,
/// error messages, and debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Serper API key (alternative to SERPER_API_KEY env var).
    /// Env var takes precedence over config file.
    pub api_key: Option<String>,

    /// Base URL of the news search endpoint. Overridable for tests.
    pub base_url: String,

    /// Results requested per page.
    pub page_size: u32,

    /// Timeout for a single HTTP request, in seconds.
    pub timeout_secs: u64,

    /// Two-letter country code passed through to the provider (e.g. "us").
    pub gl: Option<String>,

    /// Free-form location string passed through to the provider.
    pub location: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://google.serper.dev".to_string(),
            page_size: 10,
            timeout_secs: 20,
            gl: None,
            location: None,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("timeout_secs", &self.timeout_secs)
            .field("gl", &self.gl)
            .field("location", &self.location)
            .finish()
    }
}

/// Crawl fan-out and pagination limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Number of publications crawled concurrently.
    pub parallelism: usize,

    /// Default page count per publication when the trigger does not set one.
    pub max_pages: u32,

    /// Safety cap: stop paginating a publication once this many items
    /// have been collected, regardless of the requested page count.
    pub max_results_per_publication: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            parallelism: 10,
            max_pages: 3,
            max_results_per_publication: 100,
        }
    }
}

/// Date window filtering.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Hours of slack added on both sides of the requested date window.
    /// Provider timestamps are imprecise, so a small buffer keeps items
    /// published near the boundary from being dropped.
    pub window_buffer_hours: i64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            window_buffer_hours: 24,
        }
    }
}

/// Queue dispatch throttling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of concurrent publish calls.
    pub concurrency: usize,

    /// After every `stagger_batch` successful sends, the delivery delay
    /// applied to subsequent messages grows by one `stagger_step`.
    pub stagger_batch: usize,

    /// Delay increment per completed batch, in seconds.
    pub stagger_step_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 50,
            stagger_batch: 10,
            stagger_step_secs: 1,
        }
    }
}

impl DispatchConfig {
    pub fn stagger_step(&self) -> Duration {
        Duration::from_secs(self.stagger_step_secs)
    }
}

/// In-process queue behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Delivery attempts per message before it is dropped as a dead letter.
    pub max_delivery_attempts: u32,

    /// Delay before a failed message is handed to a consumer again, in seconds.
    pub redelivery_delay_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_delivery_attempts: 5,
            redelivery_delay_secs: 5,
        }
    }
}

impl QueueConfig {
    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_secs(self.redelivery_delay_secs)
    }
}

/// Headline classifier (OpenAI-compatible chat completion endpoint).
///
/// Custom Debug impl masks `api_key`, same as [`SearchConfig`].
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// OpenAI API key (alternative to OPENAI_API_KEY env var).
    /// Env var takes precedence over config file.
    pub api_key: Option<String>,

    /// Base URL of the chat completion API. Overridable for tests.
    pub base_url: String,

    /// Model name sent with each classification request.
    pub model: String,

    /// Timeout for a single classification request, in seconds.
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl std::fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Retry behavior shared by outbound HTTP calls and storage lookups.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first.
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds. Doubles per attempt.
    pub base_delay_ms: u64,

    /// Upper bound on the backoff delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Config {
    /// Maximum config file size (1 MB). Guards against reading a corrupted
    /// or maliciously large file into memory.
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file and apply environment overrides.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a TOML file without touching the environment.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to bound memory use.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {} // Size is within limits, proceed
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown sections
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "database",
                "search",
                "crawl",
                "filter",
                "dispatch",
                "queue",
                "classifier",
                "retry",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown section in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply environment variable overrides for secrets.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("SERPER_API_KEY") {
            if !key.trim().is_empty() {
                self.search.api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.classifier.api_key = Some(key);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, "pressclip.db");
        assert_eq!(config.search.base_url, "https://google.serper.dev");
        assert_eq!(config.search.page_size, 10);
        assert_eq!(config.crawl.parallelism, 10);
        assert_eq!(config.crawl.max_pages, 3);
        assert_eq!(config.crawl.max_results_per_publication, 100);
        assert_eq!(config.filter.window_buffer_hours, 24);
        assert_eq!(config.dispatch.concurrency, 50);
        assert_eq!(config.dispatch.stagger_batch, 10);
        assert_eq!(config.dispatch.stagger_step_secs, 1);
        assert_eq!(config.queue.max_delivery_attempts, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.search.api_key.is_none());
        assert!(config.classifier.api_key.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/pressclip_test_nonexistent_config.toml");
        let config = Config::load_file(path).unwrap();
        assert_eq!(config.database.path, "pressclip.db");
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = std::env::temp_dir().join("pressclip_config_test_empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pressclip.toml");
        std::fs::write(&path, "").unwrap();

        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.search.page_size, 10);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = std::env::temp_dir().join("pressclip_config_test_partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pressclip.toml");
        std::fs::write(&path, "[crawl]\nparallelism = 4\n").unwrap();

        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.crawl.parallelism, 4);
        assert_eq!(config.crawl.max_pages, 3); // default
        assert_eq!(config.dispatch.concurrency, 50); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("pressclip_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pressclip.toml");

        let content = r#"
[database]
path = "/var/lib/pressclip/news.db"
op_timeout_secs = 10

[search]
api_key = "serper-key-123"
base_url = "https://search.internal:4443"
page_size = 25
timeout_secs = 15
gl = "gb"
location = "London, United Kingdom"

[crawl]
parallelism = 6
max_pages = 5
max_results_per_publication = 200

[filter]
window_buffer_hours = 12

[dispatch]
concurrency = 20
stagger_batch = 5
stagger_step_secs = 2

[queue]
max_delivery_attempts = 3
redelivery_delay_secs = 30

[classifier]
api_key = "openai-key-456"
model = "gpt-4o"
timeout_secs = 45

[retry]
max_attempts = 4
base_delay_ms = 500
max_delay_ms = 10000
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.database.path, "/var/lib/pressclip/news.db");
        assert_eq!(config.database.op_timeout(), Duration::from_secs(10));
        assert_eq!(config.search.api_key.as_deref(), Some("serper-key-123"));
        assert_eq!(config.search.base_url, "https://search.internal:4443");
        assert_eq!(config.search.page_size, 25);
        assert_eq!(config.search.gl.as_deref(), Some("gb"));
        assert_eq!(
            config.search.location.as_deref(),
            Some("London, United Kingdom")
        );
        assert_eq!(config.crawl.parallelism, 6);
        assert_eq!(config.crawl.max_pages, 5);
        assert_eq!(config.crawl.max_results_per_publication, 200);
        assert_eq!(config.filter.window_buffer_hours, 12);
        assert_eq!(config.dispatch.concurrency, 20);
        assert_eq!(config.dispatch.stagger_batch, 5);
        assert_eq!(config.dispatch.stagger_step(), Duration::from_secs(2));
        assert_eq!(config.queue.max_delivery_attempts, 3);
        assert_eq!(config.queue.redelivery_delay(), Duration::from_secs(30));
        assert_eq!(config.classifier.api_key.as_deref(), Some("openai-key-456"));
        assert_eq!(config.classifier.model, "gpt-4o");
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(500));
        assert_eq!(config.retry.max_delay(), Duration::from_millis(10_000));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("pressclip_config_test_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pressclip.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let result = Config::load_file(&path);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        // Verify error message contains useful info
        let msg = err.to_string();
        assert!(msg.contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = std::env::temp_dir().join("pressclip_config_test_unknown");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pressclip.toml");

        let content = r#"
totally_fake_key = "should not fail"

[search]
page_size = 7
"#;
        std::fs::write(&path, content).unwrap();

        // Should succeed (unknown keys ignored)
        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.search.page_size, 7);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let dir = std::env::temp_dir().join("pressclip_config_test_wrongtype");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pressclip.toml");
        // page_size should be an integer, not a string
        std::fs::write(&path, "[search]\npage_size = \"lots\"\n").unwrap();

        let result = Config::load_file(&path);
        assert!(result.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let dir = std::env::temp_dir().join("pressclip_config_test_whitespace");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pressclip.toml");
        std::fs::write(&path, "   \n  \n  ").unwrap();

        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.crawl.parallelism, 10);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("pressclip_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pressclip.toml");

        // Write a file just over 1MB
        let content = "a".repeat(1_048_577);
        std::fs::write(&path, content).unwrap();

        let result = Config::load_file(&path);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_debug_masks_api_keys() {
        let mut config = Config::default();
        config.search.api_key = Some("serper-secret-789".to_string());
        config.classifier.api_key = Some("openai-secret-789".to_string());

        let debug_output = format!("{:?}", config);
        assert!(
            !debug_output.contains("serper-secret-789"),
            "Debug output should not contain the search API key"
        );
        assert!(
            !debug_output.contains("openai-secret-789"),
            "Debug output should not contain the classifier API key"
        );
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should show [REDACTED] for API keys"
        );
    }

    #[test]
    fn test_debug_shows_none_when_no_api_key() {
        let config = Config::default();
        let debug_output = format!("{:?}", config);
        assert!(
            debug_output.contains("None"),
            "Debug output should show None when no API key is set"
        );
        assert!(
            !debug_output.contains("[REDACTED]"),
            "Debug output should not show [REDACTED] when no key"
        );
    }
}
