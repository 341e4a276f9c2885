//! Store configuration module.
//!
//! Handles loading, validating, and merging the `imgstore.toml` file. User
//! values are sparse: anything left out falls back to the stock defaults.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! base_url = "http://localhost:8000/media/"  # Public prefix of derivative URLs
//! originals_dir = "data/originals"            # {originals_dir}/{owner}/{file}
//! resizes_dir = "data/resizes"                # {resizes_dir}/{owner}/{WxH}/{file}
//! database = "data/images.db"                 # Image record store (SQLite)
//!
//! [processing]
//! max_processes = 4         # Max parallel workers for bulk resizes (omit for auto)
//!
//! [auth.tokens]
//! "secret-token" = "alice"  # credential = owner
//! ```
//!
//! Relative paths are resolved against the working directory.
//! Unknown keys are rejected to catch typos early.

use crate::auth::TokenTable;
use crate::layout::Layout;
use crate::records::Owner;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Store configuration loaded from `imgstore.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Public URL prefix under which `resizes_dir` is served.
    pub base_url: String,
    /// Root of the stored originals.
    pub originals_dir: PathBuf,
    /// Root of the generated derivatives.
    pub resizes_dir: PathBuf,
    /// SQLite database holding the image records.
    pub database: PathBuf,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Credential table.
    pub auth: AuthConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/media/".to_string(),
            originals_dir: PathBuf::from("data/originals"),
            resizes_dir: PathBuf::from("data/resizes"),
            database: PathBuf::from("data/images.db"),
            processing: ProcessingConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.originals_dir == self.resizes_dir {
            return Err(ConfigError::Validation(
                "originals_dir and resizes_dir must differ".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        for (token, owner) in &self.auth.tokens {
            if token.is_empty() {
                return Err(ConfigError::Validation(
                    "auth.tokens keys must not be empty".into(),
                ));
            }
            Owner::new(owner.as_str())
                .map_err(|e| ConfigError::Validation(format!("auth.tokens: {e}")))?;
        }
        Ok(())
    }

    /// Storage layout described by this config.
    pub fn layout(&self) -> Layout {
        Layout::new(&self.originals_dir, &self.resizes_dir, &self.base_url)
    }

    /// Token table built from `[auth.tokens]`. Call after [`validate`](Self::validate).
    pub fn token_table(&self) -> Result<TokenTable, ConfigError> {
        let tokens = self
            .auth
            .tokens
            .iter()
            .map(|(token, owner)| {
                Owner::new(owner.as_str())
                    .map(|o| (token.clone(), o))
                    .map_err(|e| ConfigError::Validation(format!("auth.tokens: {e}")))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(TokenTable::new(tokens))
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers for bulk resizes.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Credentials accepted by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// `credential = owner` pairs.
    pub tokens: BTreeMap<String, String>,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(StoreConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<StoreConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: StoreConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to defaults when it is absent.
pub fn load_config(path: &Path) -> Result<StoreConfig, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// Returns a fully-commented stock config file.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgstore configuration
# =====================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Public URL prefix of derivatives. Derivative URLs have the shape
#   {base_url}/{owner}/{WIDTH}x{HEIGHT}/{stored_filename}
# A trailing slash is fine.
base_url = "http://localhost:8000/media/"

# Where uploaded originals are kept: {originals_dir}/{owner}/{stored_filename}
originals_dir = "data/originals"

# Where derivatives are written: {resizes_dir}/{owner}/{WIDTH}x{HEIGHT}/{stored_filename}
# Serve this directory at base_url.
resizes_dir = "data/resizes"

# SQLite database holding image records (owner, stored name, original name,
# upload time). Created on first use; safe to share between concurrent runs.
database = "data/images.db"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for `create-resizes`.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Credentials
# ---------------------------------------------------------------------------
[auth.tokens]
# "long-random-token" = "alice"
"##
}
