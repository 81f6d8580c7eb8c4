//! Configuration module for addrsync.
//!
//! Typed configuration structs mapping to the YAML configuration file, with
//! loading, validation, defaults, and a builder for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub retry: RetryConfig,
    pub providers: ProvidersConfig,
    pub autocomplete: AutocompleteConfig,
    pub logging: LoggingConfig,
}

/// SQLite store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the database file.
    pub path: PathBuf,
    /// Milliseconds SQLite waits on a locked database before reporting busy.
    pub busy_timeout_ms: u64,
    /// Maximum pooled connections.
    pub max_connections: u32,
}

/// Shared HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
    /// Redirect hops followed manually during CardDAV discovery.
    pub max_redirects: u32,
}

/// Store-write retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts made for a busy/locked store write.
    pub max_attempts: u32,
    /// First backoff delay in milliseconds; doubles per attempt.
    pub base_delay_ms: u64,
}

/// Remote API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Google People API base URL (including `/v1`).
    pub google_base_url: String,
    /// Microsoft Graph base URL (including `/v1.0`).
    pub microsoft_base_url: String,
    /// `pageSize` for Google connections requests (1..=1000).
    pub google_page_size: u32,
}

/// Autocomplete settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutocompleteConfig {
    /// Directories scanned recursively for `.vcf` files.
    pub vcard_dirs: Vec<PathBuf>,
    /// Seconds a vCard scan stays fresh.
    pub vcard_ttl_secs: u64,
    /// Result count when the caller does not give a limit.
    pub default_limit: usize,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/addrsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("addrsync")
            .join("config.yaml")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("addrsync")
                .join("contacts.db"),
            busy_timeout_ms: 5000,
            max_connections: 5,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("addrsync/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 5,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 100,
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            google_base_url: "https://people.googleapis.com/v1".to_string(),
            microsoft_base_url: "https://graph.microsoft.com/v1.0".to_string(),
            google_page_size: 1000,
        }
    }
}

impl Default for AutocompleteConfig {
    fn default() -> Self {
        Self {
            vcard_dirs: Vec::new(),
            vcard_ttl_secs: 300,
            default_limit: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"retry.max_attempts"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut positive = |field: &str, value: u64| {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        positive("database.busy_timeout_ms", self.database.busy_timeout_ms);
        positive(
            "database.max_connections",
            u64::from(self.database.max_connections),
        );
        positive("http.timeout_secs", self.http.timeout_secs);
        positive("retry.max_attempts", u64::from(self.retry.max_attempts));
        positive("retry.base_delay_ms", self.retry.base_delay_ms);
        positive("autocomplete.vcard_ttl_secs", self.autocomplete.vcard_ttl_secs);
        positive(
            "autocomplete.default_limit",
            self.autocomplete.default_limit as u64,
        );

        // --- providers ---
        for (field, value) in [
            ("providers.google_base_url", &self.providers.google_base_url),
            (
                "providers.microsoft_base_url",
                &self.providers.microsoft_base_url,
            ),
        ] {
            if let Err(e) = url::Url::parse(value) {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("invalid URL '{value}': {e}"),
                });
            }
        }
        if !(1..=1000).contains(&self.providers.google_page_size) {
            errors.push(ValidationError {
                field: "providers.google_page_size".into(),
                message: "must be in range 1..=1000".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use addrsync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .database_path(PathBuf::from("/tmp/contacts.db"))
///     .http_timeout_secs(10)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- database ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    pub fn database_busy_timeout_ms(mut self, ms: u64) -> Self {
        self.config.database.busy_timeout_ms = ms;
        self
    }

    // --- http ---

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http.timeout_secs = secs;
        self
    }

    // --- retry ---

    pub fn retry_max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms;
        self
    }

    // --- providers ---

    pub fn google_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.providers.google_base_url = url.into();
        self
    }

    pub fn microsoft_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.providers.microsoft_base_url = url.into();
        self
    }

    // --- autocomplete ---

    pub fn vcard_dir(mut self, dir: PathBuf) -> Self {
        self.config.autocomplete.vcard_dirs.push(dir);
        self
    }

    pub fn vcard_ttl_secs(mut self, secs: u64) -> Self {
        self.config.autocomplete.vcard_ttl_secs = secs;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
