// Worker configuration
//
// Loaded from `<config_dir>/rtgraph/config.json` when present; every field
// has a default so partial files are fine.

use crate::types::StreamResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Directory receiving one CSV file per exported session
    pub export_dir: PathBuf,

    /// Window size used before the first session and by the CLI default
    pub default_window_size: usize,

    /// Upper bound on how long `stop()` waits for the reader task
    pub stop_timeout_ms: u64,

    /// Queue length above which a backlog warning is logged
    pub backlog_warn_threshold: usize,

    /// Exported records between explicit flushes
    pub export_flush_every: usize,

    /// Fixed seed for the synthetic noise channel
    pub synthetic_seed: Option<u64>,

    /// Worker threads of the runtime hosting the reader task
    pub runtime_threads: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
            default_window_size: 500,
            stop_timeout_ms: 2000,
            backlog_warn_threshold: 10_000,
            export_flush_every: 256,
            synthetic_seed: None,
            runtime_threads: 1,
        }
    }
}

impl WorkerConfig {
    /// Read a configuration file
    pub fn load(path: &Path) -> StreamResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Read the per-user configuration file, falling back to defaults
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => {
                log::info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable configuration {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Write the configuration as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> StreamResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Location of the per-user configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rtgraph").join(CONFIG_FILE_NAME))
}

fn default_export_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rtgraph")
        .join("exports")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.default_window_size, 500);
        assert_eq!(config.stop_timeout(), Duration::from_secs(2));
        assert!(config.export_dir.ends_with("exports"));
        assert_eq!(config.runtime_threads, 1);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "synthetic_seed": 3, "stop_timeout_ms": 100 }"#).unwrap();

        let config = WorkerConfig::load(&path).unwrap();
        assert_eq!(config.synthetic_seed, Some(3));
        assert_eq!(config.stop_timeout_ms, 100);
        assert_eq!(config.default_window_size, 500);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");
        let config = WorkerConfig {
            export_dir: temp_dir.path().join("out"),
            backlog_warn_threshold: 12,
            ..Default::default()
        };

        config.save(&path).unwrap();
        assert_eq!(WorkerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(WorkerConfig::load(&path).is_err());
    }
}
