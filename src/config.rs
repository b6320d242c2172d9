//! Subject configuration loaded from `~/.archivist/config.json`.
//!
//! The config names the individual whose archive is being mined: their
//! display name, the set of addresses they have mailed from, and any extra
//! sign-off lines their mail habitually ends with. Components receive the
//! config by reference — there is no global.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("home directory not found")]
    HomeDirNotFound,
}

/// Identity of the subject individual.
///
/// `addresses` maps each address the subject (or a tracked correspondent)
/// has used to the display name it belongs to. An address counts as the
/// subject's own when its mapped name equals `subject_name` — the same map
/// doubles as the authoritative mapping for the `fix-names` correction pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectConfig {
    /// Canonical display name of the subject.
    pub subject_name: String,
    /// Lowercased email address → display name.
    #[serde(default)]
    pub addresses: HashMap<String, String>,
    /// Extra sign-off lines to trim from payloads, on top of the built-in
    /// boilerplate markers.
    #[serde(default)]
    pub signoff_markers: Vec<String>,
}

impl SubjectConfig {
    /// Load the config from an explicit path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Resolve the default config path: `~/.archivist/config.json`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
        Ok(home.join(".archivist").join("config.json"))
    }

    /// Whether `email` is one of the configured addresses (case-insensitive).
    pub fn is_known_address(&self, email: &str) -> bool {
        self.addresses.contains_key(&email.to_lowercase())
    }

    /// Whether `email` resolves to the subject's own name.
    pub fn is_subject_address(&self, email: &str) -> bool {
        self.addresses
            .get(&email.to_lowercase())
            .is_some_and(|name| name == &self.subject_name)
    }
}
