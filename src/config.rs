// Stash configuration.
// Resolves the base directory from an explicit path, the environment, or the OS default.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::default_base_dir;
use crate::error::{Result, StashError};

/// Environment variable overriding the default base directory.
pub const STASH_DIR_ENV: &str = "BAMBOO_STASH_DIR";

/// Settings for constructing a `Stash`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StashConfig {
    /// Directory for stored results. `None` picks the user's cache directory.
    pub base_dir: Option<PathBuf>,
}

impl StashConfig {
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    /// Build a config from the BAMBOO_STASH_DIR environment variable.
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var_os(STASH_DIR_ENV).map(PathBuf::from))
    }

    fn from_env_value(value: Option<PathBuf>) -> Self {
        Self {
            base_dir: value.filter(|dir| !dir.as_os_str().is_empty()),
        }
    }

    /// The explicit directory if set, otherwise the OS cache directory.
    pub fn resolve_base_dir(&self) -> Result<PathBuf> {
        match &self.base_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_base_dir().ok_or(StashError::NoCacheDir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_dir_wins() {
        let config = StashConfig::with_base_dir("/data/stash");
        assert_eq!(
            config.resolve_base_dir().unwrap(),
            PathBuf::from("/data/stash")
        );
    }

    #[test]
    fn test_env_value() {
        let config = StashConfig::from_env_value(Some(PathBuf::from("/from/env")));
        assert_eq!(config.base_dir, Some(PathBuf::from("/from/env")));

        let empty = StashConfig::from_env_value(Some(PathBuf::new()));
        assert_eq!(empty, StashConfig::default());

        let unset = StashConfig::from_env_value(None);
        assert_eq!(unset.base_dir, None);
    }

    #[test]
    fn test_default_resolution() {
        let config = StashConfig::default();
        match config.resolve_base_dir() {
            Ok(dir) => assert!(dir.to_string_lossy().contains(crate::cache::APP_NAME)),
            Err(e) => assert!(matches!(e, StashError::NoCacheDir)),
        }
    }

    #[test]
    fn test_deserialize() {
        let config: StashConfig = serde_json::from_str(r#"{"base_dir": "/srv/stash"}"#).unwrap();
        assert_eq!(config.base_dir, Some(PathBuf::from("/srv/stash")));

        let empty: StashConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.base_dir, None);
    }
}
