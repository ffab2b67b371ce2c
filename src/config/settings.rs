//! Configuration file support for jx

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::retry::{Backoff, Poller};

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub extensions: ExtensionSettings,

    #[serde(default)]
    pub wait: WaitSettings,

    #[serde(default)]
    pub behavior: Behavior,

    #[serde(default)]
    pub colors: Colors,
}

/// Default values for common operations
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Defaults {
    /// Namespace holding the team's Environments, Users and role bindings
    #[serde(default = "default_dev_namespace")]
    pub dev_namespace: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
}

/// Where extensions come from and how they are configured
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExtensionSettings {
    #[serde(default = "default_extensions_repository")]
    pub repository: String,

    #[serde(default = "default_extensions_config_map")]
    pub config_map: String,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

/// Timing for readiness waits and retried API calls
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WaitSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_backoff_initial_millis")]
    pub backoff_initial_millis: u64,

    #[serde(default = "default_backoff_max_elapsed_secs")]
    pub backoff_max_elapsed_secs: u64,

    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
}

/// Behavior settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Behavior {
    #[serde(default = "default_true")]
    pub confirm_destructive: bool,

    #[serde(default = "default_true")]
    pub show_progress: bool,
}

/// Color settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Colors {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions
fn default_dev_namespace() -> String {
    "jx".to_string()
}

fn default_extensions_repository() -> String {
    "github.com/jenkins-x/jenkins-x-extensions".to_string()
}

fn default_extensions_config_map() -> String {
    "jenkins-x-extensions".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_backoff_initial_millis() -> u64 {
    500
}

fn default_backoff_max_elapsed_secs() -> u64 {
    60
}

fn default_resync_interval_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            dev_namespace: default_dev_namespace(),
            kubeconfig: None,
        }
    }
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            repository: default_extensions_repository(),
            config_map: default_extensions_config_map(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            backoff_initial_millis: default_backoff_initial_millis(),
            backoff_max_elapsed_secs: default_backoff_max_elapsed_secs(),
            resync_interval_secs: default_resync_interval_secs(),
        }
    }
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            confirm_destructive: default_true(),
            show_progress: default_true(),
        }
    }
}

impl Default for Colors {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl WaitSettings {
    /// Poller for readiness waits; `timeout` overrides the configured one
    pub fn poller(&self, timeout: Option<Duration>) -> Poller {
        Poller::new(
            Duration::from_secs(self.poll_interval_secs.max(1)),
            timeout.unwrap_or(Duration::from_secs(self.timeout_secs)),
        )
    }

    /// Backoff policy for calls to external APIs
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.backoff_initial_millis),
            Duration::from_secs(self.backoff_max_elapsed_secs),
        )
    }
}

impl Settings {
    /// Load settings from file or return defaults
    pub fn load() -> Self {
        match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path).unwrap_or_else(|e| {
                crate::log_warn!("Ignoring config file: {:#}", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Find config file in standard locations
    /// Priority:
    /// 1. .jx.toml in current directory
    /// 2. ~/.config/jx/config.toml (XDG config directory)
    pub fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from(".jx.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("jx").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        None
    }

    /// Default location for `jx config init`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("jx").join("config.toml"))
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize settings")?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Write the default settings to `path`, leaving an existing file alone
    /// unless `force` is set. Returns whether the file was written.
    pub fn init_file(path: &Path, force: bool) -> Result<bool> {
        if path.exists() && !force {
            return Ok(false);
        }
        Self::default().save(path)?;
        Ok(true)
    }

    /// Generate example config file content
    pub fn example_config() -> Result<String> {
        let header = "# jx configuration file\n\
                      # Place this file at ~/.config/jx/config.toml or .jx.toml in your project\n\n";
        let body = toml::to_string_pretty(&Settings::default())
            .context("Failed to serialize default settings")?;
        Ok(format!("{}{}", header, body))
    }
}
