// SPDX-License-Identifier: GPL-3.0-only

//! Lookup roots for the host resources the translator reads
//!
//! These are set once when a [`Translator`](crate::Translator) is built and
//! never change during a translation. Tests point them at fixture trees.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ROOT_DIR: &str = "/";
pub const DEFAULT_MOUNTS_PATH: &str = "/proc/self/mountinfo";
pub const DEFAULT_SYSFS_PATH: &str = "/sys";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupRoots {
    /// Directory absolute input paths are resolved under
    pub root_dir: PathBuf,

    /// Mount table in `/proc/mounts` or `/proc/self/mountinfo` format
    pub mounts_path: PathBuf,

    /// Root of the kernel device topology tree
    pub sysfs_path: PathBuf,
}

impl Default for LookupRoots {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            mounts_path: PathBuf::from(DEFAULT_MOUNTS_PATH),
            sysfs_path: PathBuf::from(DEFAULT_SYSFS_PATH),
        }
    }
}

impl LookupRoots {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let roots: Self = toml::from_str(raw).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        roots.validate()?;
        Ok(roots)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("root_dir", &self.root_dir),
            ("mounts_path", &self.mounts_path),
            ("sysfs_path", &self.sysfs_path),
        ] {
            if !value.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be an absolute path, got {}",
                    value.display()
                )));
            }
        }
        Ok(())
    }
}
