use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{ProgressError, Result};
use crate::model::DEFAULT_USER_NAME;
use crate::util::{expand_tilde, seclab_home};

pub const ENV_REMOTE_URL: &str = "SECLAB_REMOTE_URL";
pub const ENV_AUTH_TOKEN: &str = "SECLAB_AUTH_TOKEN";
pub const ENV_DATA_DIR: &str = "SECLAB_DATA_DIR";
pub const ENV_LOG: &str = "SECLAB_LOG";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressConfig {
    pub version: u32,
    pub data_dir: String,
    pub storage_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub load_timeout_ms: u64,
    pub request_timeout_secs: u64,
    pub user_name: String,
    pub log_level: String,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            version: 1,
            data_dir: "~/.seclab".into(),
            storage_key: "seclab.progress".into(),
            remote_base_url: None,
            auth_token: None,
            load_timeout_ms: 3000,
            request_timeout_secs: 10,
            user_name: DEFAULT_USER_NAME.into(),
            log_level: "info".into(),
        }
    }
}

impl ProgressConfig {
    /// `data_dir` with `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(expand_tilde(&self.data_dir))
    }

    pub fn is_offline(&self) -> bool {
        self.remote_base_url
            .as_deref()
            .map_or(true, |url| url.trim().is_empty())
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`; empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_REMOTE_URL) {
            self.remote_base_url = Some(url);
        }
        if let Some(token) = get(ENV_AUTH_TOKEN) {
            self.auth_token = Some(token);
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            self.data_dir = dir;
        }
        if let Some(level) = get(ENV_LOG) {
            self.log_level = level;
        }
        self
    }
}

pub fn config_path() -> Option<PathBuf> {
    seclab_home().map(|dir| dir.join("config.json"))
}

/// Reads the config file, falling back to defaults when it is missing or unreadable.
pub fn load_config() -> ProgressConfig {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => ProgressConfig::default(),
    }
}

pub fn load_config_from(path: &Path) -> ProgressConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return ProgressConfig::default(),
    };
    match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unparsable config");
            ProgressConfig::default()
        }
    }
}

pub fn save_config(config: &ProgressConfig) -> Result<PathBuf> {
    let path = config_path()
        .ok_or_else(|| ProgressError::Custom("Cannot find home directory".into()))?;
    save_config_to(config, &path)?;
    Ok(path)
}

pub fn save_config_to(config: &ProgressConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.json"));
        assert_eq!(config, ProgressConfig::default());
        assert!(config.is_offline());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"remoteBaseUrl": "https://lab.example", "loadTimeoutMs": 500}"#)
            .unwrap();

        let config = load_config_from(&path);
        assert_eq!(config.remote_base_url.as_deref(), Some("https://lab.example"));
        assert_eq!(config.load_timeout_ms, 500);
        assert_eq!(config.storage_key, "seclab.progress");
        assert!(!config.is_offline());
    }

    #[test]
    fn test_garbage_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(load_config_from(&path), ProgressConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = ProgressConfig {
            user_name: "Ada".into(),
            auth_token: Some("secret".into()),
            ..Default::default()
        };
        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path), config);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"userName\": \"Ada\""));
        assert!(!raw.contains("remoteBaseUrl"));
    }

    #[test]
    fn test_overrides() {
        let env = HashMap::from([
            (ENV_REMOTE_URL, "http://localhost:5000"),
            (ENV_DATA_DIR, "/tmp/seclab"),
            (ENV_LOG, ""),
        ]);
        let config = ProgressConfig::default()
            .with_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.remote_base_url.as_deref(), Some("http://localhost:5000"));
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/seclab"));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.auth_token, None);
    }
}
