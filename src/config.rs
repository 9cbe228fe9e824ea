use anyhow::{Context, Result};
use gatewaykit::RetryConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the config directory path (~/.config/idsync)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("idsync"))
}

/// Get the state directory path (~/.local/state/idsync)
pub fn state_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".local").join("state").join("idsync"))
}

// ============================================================================
// Settings
// ============================================================================

/// Tool settings, read from ~/.config/idsync/config.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Reconciliation records (default: ~/.local/state/idsync/state.toml)
    pub state_file: Option<PathBuf>,

    /// Sandbox tenant snapshot (default: ~/.local/state/idsync/sandbox.json)
    pub sandbox: Option<PathBuf>,

    /// Number of resources reconciled in parallel within one stage
    pub jobs: usize,

    /// Re-read managed resources before planning
    pub refresh_before_plan: bool,

    /// Cancel the run after this many seconds; unlimited when unset
    pub timeout_secs: Option<u64>,

    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_file: None,
            sandbox: None,
            jobs: 4,
            refresh_before_plan: true,
            timeout_secs: None,
            retry: RetrySettings::default(),
        }
    }
}

/// Retry policy for transient remote failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let config = RetryConfig::default();
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay.as_millis() as u64,
            backoff_factor: config.backoff_factor,
            max_delay_ms: config.max_delay.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn to_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => config_dir()?.join("config.toml"),
        };

        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read settings file: {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in settings: {}", path.display()))?;

        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            anyhow::bail!("jobs must be at least 1");
        }
        if self.retry.backoff_factor < 1.0 {
            anyhow::bail!("retry.backoff_factor must be at least 1.0");
        }
        Ok(())
    }

    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state_file {
            Some(path) => Ok(path.clone()),
            None => Ok(state_dir()?.join("state.toml")),
        }
    }

    pub fn sandbox_path(&self) -> Result<PathBuf> {
        match &self.sandbox {
            Some(path) => Ok(path.clone()),
            None => Ok(state_dir()?.join("sandbox.json")),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_settings_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join("config.toml"))).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.refresh_before_plan);
    }

    #[test]
    fn test_partial_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
jobs = 8
state_file = "/tmp/idsync/state.toml"

[retry]
max_attempts = 2
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.jobs, 8);
        assert_eq!(
            settings.state_path().unwrap(),
            PathBuf::from("/tmp/idsync/state.toml")
        );
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(
            settings.retry.base_delay_ms,
            RetrySettings::default().base_delay_ms
        );
        assert_eq!(settings.retry.to_config().max_attempts, 2);
    }

    #[test]
    fn test_invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "jobs = 0\n").unwrap();
        assert!(Settings::load(Some(&path)).is_err());

        fs::write(&path, "jobs = \"many\"\n").unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }
}
