//! Application configuration for LessonVault.
//!
//! User config lives at `~/.lessonvault/lessonvault.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LessonVaultError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lessonvault.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lessonvault";

// ---------------------------------------------------------------------------
// Config structs (matching lessonvault.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Source client settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Remote storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Local staging directory for downloaded artifacts.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Default cap on items processed per run (0 = unlimited).
    #[serde(default)]
    pub max_items: usize,

    /// Default worker pool size.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Keep local staging files after a verified upload.
    #[serde(default)]
    pub keep_local: bool,

    /// Runs (attempts) before an item is reported permanently failed.
    /// Distinct from `source.max_retries`, which bounds per-request retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            max_items: 0,
            concurrency: default_concurrency(),
            keep_local: false,
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_staging_dir() -> String {
    "~/lessonvault-staging".into()
}
fn default_concurrency() -> usize {
    4
}
fn default_max_attempts() -> u32 {
    3
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Minimum seconds between requests to the source.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_seconds: f64,

    /// Retry bound for transient source failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// Treat HTTP 404/410 from the source as permanent (no retry). The
    /// upstream API has historically flapped between removing endpoints and
    /// serving 404s during maintenance, so this is configurable.
    #[serde(default = "default_true")]
    pub gone_is_permanent: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            rate_limit_seconds: default_rate_limit(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_timeout(),
            gone_is_permanent: true,
        }
    }
}

fn default_rate_limit() -> f64 {
    0.5
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base URL of the remote bucket (empty = no remote default).
    #[serde(default)]
    pub bucket_url: String,

    /// Local directory store root, used when no bucket is configured.
    #[serde(default = "default_local_store")]
    pub local_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket_url: String::new(),
            local_root: default_local_store(),
        }
    }
}

fn default_local_store() -> String {
    "~/lessonvault-store".into()
}

// ---------------------------------------------------------------------------
// Ingest options (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime ingestion options — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Cap on items processed in one run (0 = unlimited).
    pub max_items: usize,
    /// Worker pool size.
    pub concurrency: usize,
    /// Caption-only ingestion: do not fetch or upload media.
    pub skip_media: bool,
    /// Archive raw captions/media without structured processing.
    pub skip_transcript: bool,
    /// Retain local staging files after verified upload.
    pub keep_local: bool,
    /// Local staging directory.
    pub staging_dir: PathBuf,
    /// Bound on attempts before an item is reported permanently failed.
    pub max_attempts: u32,
}

impl From<&AppConfig> for IngestOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_items: config.defaults.max_items,
            concurrency: config.defaults.concurrency,
            skip_media: false,
            skip_transcript: false,
            keep_local: config.defaults.keep_local,
            staging_dir: PathBuf::from(&config.defaults.staging_dir),
            max_attempts: config.defaults.max_attempts.max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lessonvault/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LessonVaultError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lessonvault/lessonvault.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LessonVaultError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LessonVaultError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LessonVaultError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LessonVaultError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LessonVaultError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("staging_dir"));
        assert!(toml_str.contains("rate_limit_seconds"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.concurrency, 4);
        assert_eq!(parsed.source.max_retries, 3);
        assert!(parsed.source.gone_is_permanent);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[source]
rate_limit_seconds = 1.5
gone_is_permanent = false
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.source.rate_limit_seconds, 1.5);
        assert!(!config.source.gone_is_permanent);
        assert_eq!(config.source.max_retries, 3);
        assert_eq!(config.defaults.concurrency, 4);
        assert_eq!(config.defaults.max_attempts, 3);
    }

    #[test]
    fn item_attempts_independent_of_request_retries() {
        let toml_str = r#"
[defaults]
max_attempts = 5

[source]
max_retries = 1
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.max_attempts, 5);
        assert_eq!(config.source.max_retries, 1);
        assert_eq!(IngestOptions::from(&config).max_attempts, 5);
    }

    #[test]
    fn ingest_options_from_app_config() {
        let app = AppConfig::default();
        let opts = IngestOptions::from(&app);
        assert_eq!(opts.concurrency, 4);
        assert_eq!(opts.max_items, 0);
        assert!(!opts.skip_media);
        assert_eq!(opts.max_attempts, 3);
    }
}
