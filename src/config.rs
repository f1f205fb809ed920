//! Execution options and their TOML loader.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ExecError, Result};

/// File name looked up under the user's config directory.
pub const DEFAULT_CONFIG_FILE: &str = "exec.toml";

/// Knobs that shape plan execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecOptions {
    /// Maximum number of cached query shapes.
    pub plan_cache_capacity: usize,
    /// Whether the optimizer passes run before execution.
    pub enable_optimizer: bool,
    /// Worker threads for the parallel traversal fast path (0 = rayon default).
    pub parallel_traversal_threads: usize,
    /// Enforce edge uniqueness along a matched path.
    pub path_unique: bool,
    /// Text emitted for null entries when a record is stringified.
    pub null_marker: String,
    /// Function name prefix routed to the plugin boundary.
    pub custom_function_prefix: String,
    /// Enables operator profiling counters.
    pub profile: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            plan_cache_capacity: 512,
            enable_optimizer: true,
            parallel_traversal_threads: 0,
            path_unique: true,
            null_marker: "__null__".to_string(),
            custom_function_prefix: "custom.".to_string(),
            profile: false,
        }
    }
}

impl ExecOptions {
    /// Parses options from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| ExecError::Config {
            path: PathBuf::from("<inline>"),
            reason: err.to_string(),
        })
    }

    /// Reads options from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| ExecError::Config {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        toml::from_str(&contents).map_err(|err| ExecError::Config {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    /// Loads `<config dir>/penumbra/exec.toml`, or defaults when it is absent.
    pub fn load_default() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "loading execution options");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Serializes the options back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| ExecError::Config {
            path: PathBuf::from("<inline>"),
            reason: err.to_string(),
        })
    }
}

/// Location of the default options file, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("penumbra").join(DEFAULT_CONFIG_FILE))
}
