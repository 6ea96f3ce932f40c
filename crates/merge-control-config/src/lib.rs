//! Process-wide settings for the merge control plane.
//!
//! Settings are resolved in three layers: built-in defaults, an optional JSON
//! file, and `MERGE_CONTROL_*` environment overrides. The registry token is
//! never stored here; only the name of the environment variable holding it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use merge_control_types::{ControlError, ControlResult};

/// Default location of the optional settings file.
pub const DEFAULT_SETTINGS_PATH: &str = "assets/merge_control.json";

/// Environment variable that points at an alternative settings file.
pub const SETTINGS_PATH_ENV: &str = "MERGE_CONTROL_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    /// Directory holding uploaded merge configuration files.
    pub upload_dir: PathBuf,
    /// External merge tool launched for every job.
    pub merge_command: String,
    pub hub_endpoint: String,
    /// Namespace used for uploads when the configuration names no `user_name`.
    pub hub_namespace: String,
    /// Name of the environment variable carrying the registry token.
    pub hub_token_env: String,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub publish_queue_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            upload_dir: PathBuf::from("YAML_FILES"),
            merge_command: "mergekit-yaml".to_string(),
            hub_endpoint: "https://huggingface.co".to_string(),
            hub_namespace: "merge-control".to_string(),
            hub_token_env: "HF_TOKEN".to_string(),
            log_dir: PathBuf::from("logs"),
            log_level: "info".to_string(),
            publish_queue_capacity: 16,
        }
    }
}

impl Settings {
    /// Resolve settings from the default file location (or `MERGE_CONTROL_CONFIG`)
    /// and the process environment.
    pub fn load() -> Self {
        let path = std::env::var(SETTINGS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_PATH));
        let mut settings = Self::from_file(&path);
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings
    }

    /// Read settings from a JSON file. A missing file yields defaults; an
    /// unreadable or malformed one is reported on stderr and also yields
    /// defaults. Called before logging is initialised.
    pub fn from_file(path: &Path) -> Self {
        Self::try_from_file(path).unwrap_or_else(|e| {
            eprintln!("{e}, using defaults");
            Settings::default()
        })
    }

    /// Like [`from_file`](Self::from_file) but returns the failure instead of
    /// falling back. A missing file is not a failure.
    pub fn try_from_file(path: &Path) -> ControlResult<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str::<Settings>(&content).map_err(|e| {
            ControlError::invalid_config(format!(
                "failed to parse settings file {}: {e}",
                path.display()
            ))
        })
    }

    /// Apply `MERGE_CONTROL_*` overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("MERGE_CONTROL_BIND") {
            self.bind_addr = v;
        }
        if let Some(v) = non_empty("MERGE_CONTROL_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty("MERGE_CONTROL_MERGE_COMMAND") {
            self.merge_command = v;
        }
        if let Some(v) = non_empty("MERGE_CONTROL_HUB_ENDPOINT") {
            self.hub_endpoint = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = non_empty("MERGE_CONTROL_HUB_NAMESPACE") {
            self.hub_namespace = v;
        }
        if let Some(v) = non_empty("MERGE_CONTROL_LOG_LEVEL") {
            self.log_level = v;
        }
    }

    /// The registry token, read from the configured environment variable.
    pub fn hub_token(&self) -> Option<String> {
        std::env::var(&self.hub_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::from_file(&dir.path().join("absent.json"));
        assert_eq!(settings.merge_command, "mergekit-yaml");
        assert_eq!(settings.upload_dir, PathBuf::from("YAML_FILES"));
        assert_eq!(settings.hub_token_env, "HF_TOKEN");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"merge_command": "/opt/bin/mergekit-yaml", "publish_queue_capacity": 4}"#)
            .unwrap();

        let settings = Settings::from_file(&path);
        assert_eq!(settings.merge_command, "/opt/bin/mergekit-yaml");
        assert_eq!(settings.publish_queue_capacity, 4);
        assert_eq!(settings.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let settings = Settings::from_file(&path);
        assert_eq!(settings.hub_namespace, "merge-control");

        let err = Settings::try_from_file(&path).unwrap_err();
        assert!(matches!(err, ControlError::InvalidConfig(_)));
        assert!(err.to_string().contains("settings.json"));
    }

    #[test]
    fn test_try_from_file_treats_missing_file_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::try_from_file(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MERGE_CONTROL_BIND", "127.0.0.1:9000"),
            ("MERGE_CONTROL_HUB_ENDPOINT", "http://localhost:8080/"),
            ("MERGE_CONTROL_HUB_NAMESPACE", "team"),
            ("MERGE_CONTROL_MERGE_COMMAND", "  "),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.bind_addr, "127.0.0.1:9000");
        assert_eq!(settings.hub_endpoint, "http://localhost:8080");
        assert_eq!(settings.hub_namespace, "team");
        // Blank values are ignored
        assert_eq!(settings.merge_command, "mergekit-yaml");
    }
}
