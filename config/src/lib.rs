//! Configuration loading for kiln.
//!
//! Configuration is optional: a missing file yields `None` and defaults
//! apply everywhere. The file lives at `~/.kiln/config.toml` unless the
//! `KILN_CONFIG` environment variable points somewhere else.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct KilnConfig {
    pub toolchain: Option<ToolchainConfig>,
    pub console: Option<ConsoleConfig>,
    pub highlight: Option<HighlightConfig>,
}

/// External compiler settings.
#[derive(Debug, Default, Deserialize)]
pub struct ToolchainConfig {
    /// Compiler binary override (name resolved on PATH, or absolute path).
    pub binary: Option<String>,
    /// Extra arguments inserted before the source path.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Directory for the fixed temp source/binary pair.
    /// Defaults to the platform temp directory.
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConsoleConfig {
    /// Prompt marker appended when the console opens an input region.
    pub prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HighlightConfig {
    /// Use the light palette instead of the default dark one.
    #[serde(default)]
    pub light_theme: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config at {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config at {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Resolve the config file path: `KILN_CONFIG` override, else
/// `~/.kiln/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KILN_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".kiln").join("config.toml"))
}

impl KilnConfig {
    /// Load the config file if one exists.
    ///
    /// A missing file (or an undeterminable home directory) is not an
    /// error; read and parse failures are.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let path = match config_path() {
            Some(path) => path,
            None => return Ok(None),
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    /// Load and parse a specific config file.
    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.clone(),
                    source: err,
                })
            }
        }
    }
}
