//! Runtime settings for the CLI.
//!
//! Layered lowest to highest: built-in defaults, `minewell.toml`, then
//! `MINEWELL_*` environment variables. Command-line flags are applied on top
//! by the caller.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_FORMAT: &str = "text";
pub const SETTINGS_FILE: &str = "minewell.toml";
pub const ENV_PREFIX: &str = "MINEWELL";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Log filter (trace, debug, info, warn, error), overridden by `RUST_LOG`.
    pub log_level: String,
    /// "text" or "json".
    pub log_format: String,
    /// Pretty-print JSON output.
    pub output_pretty: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: DEFAULT_LOG_FORMAT.to_string(),
            output_pretty: false,
        }
    }
}

impl Settings {
    /// `minewell.toml` in the working directory if present, else in the
    /// user's config directory.
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from(SETTINGS_FILE);
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("minewell")
            .join(SETTINGS_FILE)
    }

    /// Load settings. A missing file is not an error; a malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        let defaults = Self::default();
        config::Config::builder()
            .set_default("log_level", defaults.log_level)?
            .set_default("log_format", defaults.log_format)?
            .set_default("output_pretty", defaults.output_pretty)?
            .add_source(config::File::from(path.as_path()).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .with_context(|| format!("Failed to read settings from {}", path.display()))?
            .try_deserialize()
            .context("Invalid settings")
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, log_level: Option<String>, log_format: Option<String>, pretty: bool) -> Self {
        if let Some(level) = log_level {
            self.log_level = level;
        }
        if let Some(format) = log_format {
            self.log_format = format;
        }
        self.output_pretty |= pretty;
        self
    }
}
