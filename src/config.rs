//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. the path given with `--config`
//! 2. `$MAILINDEXER_CONFIG` (environment variable)
//! 3. `~/.config/mailindexer/config.toml` (Linux)
//!    `~/Library/Application Support/mailindexer/config.toml` (macOS)
//!    `%APPDATA%\mailindexer\config.toml` (Windows)
//! 4. Built-in defaults
//!
//! Command-line flags override whatever the file says.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "MAILINDEXER_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub store: StoreConfig,
    pub index: IndexConfig,
    pub decode: DecodeConfig,
    pub ingest: IngestConfig,
}

/// Logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Also write logs to this file.
    pub log_file: Option<PathBuf>,
}

/// Attachment store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory attachments are published in, relative to the working directory.
    pub attach_dir: PathBuf,
}

/// Elasticsearch connection and bulk tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub url: String,
    pub name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout in seconds (0 = none).
    pub timeout_secs: u64,
    /// Flush the bulk buffer after this many documents.
    pub bulk_actions: usize,
    /// Flush the bulk buffer once it holds this many bytes.
    pub bulk_bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Malformed charset sequences fail the part instead of being replaced.
    pub strict_charset: bool,
}

/// Batch worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Worker threads (0 = available parallelism).
    pub workers: usize,
    /// Tasks buffered between the directory walk and the workers.
    pub queue_capacity: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_file: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            attach_dir: PathBuf::from("files"),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9200".to_string(),
            name: "mail".to_string(),
            username: None,
            password: None,
            timeout_secs: 60,
            bulk_actions: 1000,
            bulk_bytes: 5 * 1024 * 1024, // 5 MiB
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_capacity: 256,
        }
    }
}

impl IngestConfig {
    /// Configured worker count, or the machine's parallelism when 0.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration.
///
/// An explicitly named file must exist and parse. A file found in a standard
/// location that cannot be read or parsed is logged and replaced by defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        let contents =
            std::fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
        let cfg = parse_config(&contents)
            .map_err(|e| IngestError::Config(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "Loaded config");
        return Ok(cfg);
    }

    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match parse_config(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return Ok(cfg);
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Ok(Config::default())
}

pub fn parse_config(contents: &str) -> std::result::Result<Config, toml::de::Error> {
    toml::from_str(contents)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }
    dirs::config_dir().map(|d| d.join("mailindexer").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.store.attach_dir, PathBuf::from("files"));
        assert_eq!(cfg.index.url, "http://127.0.0.1:9200");
        assert_eq!(cfg.index.name, "mail");
        assert_eq!(cfg.index.bulk_actions, 1000);
        assert!(!cfg.decode.strict_charset);
        assert_eq!(cfg.ingest.queue_capacity, 256);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let mut cfg = Config::default();
        cfg.index.username = Some("elastic".into());
        cfg.general.log_file = Some(PathBuf::from("/tmp/mailindexer.log"));
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed = parse_config(&toml_str).expect("deserialize");
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[index]
url = "https://search.internal:9200"

[decode]
strict_charset = true
"#;
        let cfg = parse_config(partial).expect("parse partial");
        assert_eq!(cfg.index.url, "https://search.internal:9200");
        assert!(cfg.decode.strict_charset);
        // Other fields use defaults
        assert_eq!(cfg.index.name, "mail");
        assert_eq!(cfg.ingest.workers, 0);
    }

    #[test]
    fn test_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store]\nattach_dir = \"/srv/attachments\"\n").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.store.attach_dir, PathBuf::from("/srv/attachments"));
    }

    #[test]
    fn test_explicit_config_errors_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            load_config(Some(&missing)),
            Err(IngestError::Io { .. })
        ));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[index\nurl = 1").unwrap();
        assert!(matches!(
            load_config(Some(&broken)),
            Err(IngestError::Config(_))
        ));
    }

    #[test]
    fn test_effective_workers() {
        let fixed = IngestConfig {
            workers: 3,
            ..IngestConfig::default()
        };
        assert_eq!(fixed.effective_workers(), 3);
        assert!(IngestConfig::default().effective_workers() >= 1);
    }
}
