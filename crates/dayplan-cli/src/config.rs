//! Configuration file management for dayplan.
//!
//! Provides a TOML-based config file at `~/.config/dayplan/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use dayplan_core::RetryPolicy;
use dayplan_core::export::DEFAULT_OUTPUT_DIR;
use dayplan_core::generator::GeneratorConfig;
use dayplan_core::generator::openai::{
    DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
};
use dayplan_db::config::DbConfig;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const MODEL_ENV: &str = "DAYPLAN_MODEL";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub planner: PlannerSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: DbConfig::default_url(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GeneratorSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PlannerSection {
    /// Extra generation attempts after the first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Retry while more than this fraction of tasks is unscheduled (0.0-1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unscheduled_threshold: Option<f64>,
    /// Timeout for a single generation call, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Directory receiving markdown exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the dayplan config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/dayplan` or `~/.config/dayplan`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("dayplan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("dayplan")
}

/// Return the path to the dayplan config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct DayplanConfig {
    pub db_config: DbConfig,
    pub generator: GeneratorConfig,
    pub policy: RetryPolicy,
    pub output_dir: PathBuf,
}

impl DayplanConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `DAYPLAN_DATABASE_URL` > `database.url` > [`DbConfig::default_url`]
    /// - Model: `cli_model` > `DAYPLAN_MODEL` > `generator.model` > `gpt-4o`
    /// - API key: `OPENAI_API_KEY` > `generator.api_key` > none (offline)
    ///
    /// A missing config file is fine; one that fails to parse is an error.
    pub fn resolve(cli_db_url: Option<&str>, cli_model: Option<&str>) -> Result<Self> {
        let path = config_path();
        let file_config = if path.exists() {
            load_config()?
        } else {
            ConfigFile::default()
        };

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Some(url) = non_empty_env(DbConfig::ENV_VAR) {
            url
        } else {
            file_config.database.url
        };

        let model = if let Some(model) = cli_model {
            model.to_string()
        } else if let Some(model) = non_empty_env(MODEL_ENV) {
            model
        } else {
            file_config
                .generator
                .model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string())
        };

        let api_key = non_empty_env(API_KEY_ENV).or(file_config.generator.api_key);

        let planner = file_config.planner;
        let defaults = RetryPolicy::default();
        let threshold = planner
            .unscheduled_threshold
            .unwrap_or(defaults.unscheduled_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            bail!(
                "planner.unscheduled_threshold must be between 0.0 and 1.0, got {threshold} (in {})",
                path.display()
            );
        }
        let timeout = planner
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        if timeout.is_zero() {
            bail!(
                "planner.timeout_secs must be greater than zero (in {})",
                path.display()
            );
        }

        let policy = RetryPolicy {
            max_retries: planner.max_retries.unwrap_or(defaults.max_retries),
            unscheduled_threshold: threshold,
            timeout,
        };

        let generator = GeneratorConfig {
            base_url: file_config
                .generator
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
            api_key,
            temperature: file_config
                .generator
                .temperature
                .unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: file_config
                .generator
                .max_tokens
                .unwrap_or(DEFAULT_MAX_TOKENS),
            timeout,
        };

        Ok(Self {
            db_config: DbConfig::new(db_url),
            generator,
            policy,
            output_dir: planner
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
