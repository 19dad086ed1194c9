//! Configuration management for DeFlake
//!
//! Repository-level settings: where the test runner leaves its artifacts,
//! how evidence is bounded, and where the remote brain lives. Values are
//! loaded once by the CLI and passed explicitly into each component.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{DeflakeError, Result};

/// Repository-level DeFlake configuration
///
/// Loaded from `.deflake/config.toml` in the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeflakeConfig {
    /// Remote fix-suggestion endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Environment variable overriding `api_url`
    #[serde(default = "default_api_url_env")]
    pub api_url_env: String,

    /// Artifact discovery settings
    #[serde(default)]
    pub artifacts: ArtifactSettings,

    /// Evidence size limits
    #[serde(default)]
    pub limits: EvidenceLimits,

    /// Path fragments that mark a stack frame as dependency code
    #[serde(default = "default_dependency_markers")]
    pub dependency_markers: Vec<String>,

    /// Record successful fixes in `.deflake/history.json`
    #[serde(default = "default_history")]
    pub history: bool,
}

/// Where the test runner leaves its evidence, relative to the working directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSettings {
    /// Per-test results tree (scanned recursively)
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Aggregate HTML report, preferred over binary traces
    #[serde(default = "default_aggregate_report")]
    pub aggregate_report: PathBuf,

    /// Conventional report paths tried in order when the results tree has nothing
    #[serde(default = "default_fallback_reports")]
    pub fallback_reports: Vec<PathBuf>,

    /// Plain-text error log used in standalone mode when `--log` is absent
    #[serde(default = "default_fallback_log")]
    pub fallback_log: PathBuf,
}

/// Upper bounds on the evidence bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceLimits {
    /// Maximum characters of artifact text forwarded
    #[serde(default = "default_max_snapshot_chars")]
    pub max_snapshot_chars: usize,

    /// Maximum characters of source code forwarded
    #[serde(default = "default_max_source_chars")]
    pub max_source_chars: usize,
}

// Default value providers
fn default_api_url() -> String {
    "http://localhost:8000/api/deflake".to_string()
}

fn default_api_key_env() -> String {
    "DEFLAKE_API_KEY".to_string()
}

fn default_api_url_env() -> String {
    "DEFLAKE_API_URL".to_string()
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("test-results")
}

fn default_aggregate_report() -> PathBuf {
    PathBuf::from("playwright-report/index.html")
}

fn default_fallback_reports() -> Vec<PathBuf> {
    vec![
        PathBuf::from("playwright-report/index.html"),
        PathBuf::from("test-results/index.html"),
        PathBuf::from("report.html"),
    ]
}

fn default_fallback_log() -> PathBuf {
    PathBuf::from("test-results/error.log")
}

fn default_max_snapshot_chars() -> usize {
    8000
}

fn default_max_source_chars() -> usize {
    20000
}

fn default_dependency_markers() -> Vec<String> {
    vec!["node_modules".to_string()]
}

fn default_history() -> bool {
    true
}

impl DeflakeConfig {
    /// Load configuration from `.deflake/config.toml` or use defaults
    pub fn load_or_default(working_dir: &Path) -> Result<Self> {
        let config_path = Self::config_path(working_dir);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config = toml::from_str(&content).map_err(|e| {
                DeflakeError::Config(format!(
                    "Failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?;
            tracing::debug!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Location of the config file for a working directory
    pub fn config_path(working_dir: &Path) -> PathBuf {
        working_dir.join(".deflake/config.toml")
    }

    /// Location of the fix history for a working directory
    pub fn history_path(working_dir: &Path) -> PathBuf {
        working_dir.join(".deflake/history.json")
    }
}

impl Default for DeflakeConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            api_url_env: default_api_url_env(),
            artifacts: ArtifactSettings::default(),
            limits: EvidenceLimits::default(),
            dependency_markers: default_dependency_markers(),
            history: default_history(),
        }
    }
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            aggregate_report: default_aggregate_report(),
            fallback_reports: default_fallback_reports(),
            fallback_log: default_fallback_log(),
        }
    }
}

impl Default for EvidenceLimits {
    fn default() -> Self {
        Self {
            max_snapshot_chars: default_max_snapshot_chars(),
            max_source_chars: default_max_source_chars(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = DeflakeConfig::load_or_default(temp_dir.path()).unwrap();

        assert_eq!(config.api_key_env, "DEFLAKE_API_KEY");
        assert_eq!(config.artifacts.results_dir, PathBuf::from("test-results"));
        assert_eq!(
            config.artifacts.fallback_reports.first(),
            Some(&config.artifacts.aggregate_report)
        );
        assert_eq!(config.limits.max_snapshot_chars, 8000);
        assert!(config.history);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join(".deflake")).unwrap();
        std::fs::write(
            DeflakeConfig::config_path(temp_dir.path()),
            "api_url = \"https://brain.example.com/heal\"\nhistory = false\n\n[artifacts]\nresults_dir = \"out\"\n",
        )
        .unwrap();

        let config = DeflakeConfig::load_or_default(temp_dir.path()).unwrap();
        assert_eq!(config.api_url, "https://brain.example.com/heal");
        assert!(!config.history);
        assert_eq!(config.artifacts.results_dir, PathBuf::from("out"));
        assert_eq!(
            config.artifacts.aggregate_report,
            PathBuf::from("playwright-report/index.html")
        );
        assert_eq!(config.dependency_markers, vec!["node_modules".to_string()]);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join(".deflake")).unwrap();
        std::fs::write(DeflakeConfig::config_path(temp_dir.path()), "history = [").unwrap();

        let err = DeflakeConfig::load_or_default(temp_dir.path()).unwrap_err();
        assert!(matches!(err, DeflakeError::Config(_)));
    }
}
