//! Extension repository lock files and per-team extension configuration

use anyhow::{Context, Result, anyhow};
use k8s_openapi::api::core::v1::ConfigMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::k8s::client::KubeClient;
use crate::k8s::crds::ExtensionSpec;
use crate::utils::errors::JxError;
use crate::utils::retry::{Backoff, retry_with_backoff};

/// Name of the lock file published in an extensions repository
pub const LOCK_FILE_NAME: &str = "jenkins-x-extensions-repository.lock.yaml";

/// ConfigMap data key holding the team's extension configuration
pub const EXTENSION_CONFIG_KEY: &str = "extensionConfig";

/// The published set of extensions at one repository version
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ExtensionRepositoryLockList {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub extensions: Vec<ExtensionSpec>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionParameterValue {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// A team's opt-in to one extension, with its parameter values
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionConfig {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub parameters: Vec<ExtensionParameterValue>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionConfigList {
    #[serde(default)]
    pub extensions: Vec<ExtensionConfig>,
}

impl ExtensionConfigList {
    /// Read the configuration from a ConfigMap. A missing ConfigMap or key
    /// means no extensions are configured.
    pub fn load_from_config_map<C: KubeClient>(client: &C, name: &str, ns: &str) -> Result<Self> {
        let cm: Option<ConfigMap> = client
            .get(ns, name)
            .with_context(|| format!("Failed to read ConfigMap {} in {}", name, ns))?;

        let Some(data) = cm
            .and_then(|cm| cm.data)
            .and_then(|mut data| data.remove(EXTENSION_CONFIG_KEY))
        else {
            crate::log_info!("No extensions configured in ConfigMap {}/{}", ns, name);
            return Ok(Self::default());
        };

        serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {} in ConfigMap {}", EXTENSION_CONFIG_KEY, name))
    }

    pub fn find(&self, name: &str, namespace: &str) -> Option<&ExtensionConfig> {
        self.extensions
            .iter()
            .find(|c| c.name == name && c.namespace == namespace)
    }
}

/// Where to read the lock file from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositorySource {
    File(PathBuf),
    Url(String),
    GitHub { org: String, repo: String },
}

impl RepositorySource {
    /// A file flag wins over a repository flag; with neither the configured
    /// default repository is used.
    pub fn from_flags(
        repository: Option<&str>,
        repository_file: Option<&str>,
        default_repository: &str,
    ) -> Result<Self> {
        if let Some(file) = repository_file.filter(|f| !f.is_empty()) {
            return Ok(Self::File(expand_home(file)));
        }

        let repository = repository
            .filter(|r| !r.is_empty())
            .unwrap_or(default_repository);
        if repository.starts_with("github.com") {
            let (org, repo) = parse_github_repository(repository)?;
            Ok(Self::GitHub { org, repo })
        } else {
            Ok(Self::Url(repository.to_string()))
        }
    }
}

/// Split `github.com/<org>/<repo>` into its parts
pub fn parse_github_repository(repository: &str) -> Result<(String, String)> {
    let path = repository
        .trim_start_matches("github.com")
        .trim_matches('/')
        .trim_end_matches(".git");
    match path.split('/').collect::<Vec<_>>().as_slice() {
        [org, repo] if !org.is_empty() && !repo.is_empty() => {
            Ok((org.to_string(), repo.to_string()))
        }
        _ => Err(anyhow!(
            "Extensions repository '{}' should look like github.com/<org>/<repo>",
            repository
        )),
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~')
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest.trim_start_matches('/'));
    }
    PathBuf::from(path)
}

pub fn raw_lock_file_url(org: &str, repo: &str, tag: &str) -> String {
    format!(
        "https://raw.githubusercontent.com/{}/{}/{}/{}",
        org, repo, tag, LOCK_FILE_NAME
    )
}

pub fn parse_repository(yaml: &str) -> Result<ExtensionRepositoryLockList> {
    serde_yaml::from_str(yaml).context("Failed to parse extensions repository")
}

/// Read a lock file from disk, retrying relative paths against the working
/// directory
pub fn read_repository_file(path: &Path) -> Result<String> {
    if let Ok(contents) = std::fs::read_to_string(path) {
        return Ok(contents);
    }
    if path.is_relative() {
        let cwd = std::env::current_dir().context("Failed to read the working directory")?;
        if let Ok(contents) = std::fs::read_to_string(cwd.join(path)) {
            return Ok(contents);
        }
    }
    Err(JxError::extension_repository_unavailable(&path.display().to_string()).into())
}

#[derive(Deserialize)]
struct GitHubRelease {
    tag_name: String,
}

/// Downloads lock files and resolves published repository versions
pub struct RepositoryFetcher {
    http: reqwest::blocking::Client,
    backoff: Backoff,
}

impl RepositoryFetcher {
    pub fn new(timeout: Duration, backoff: Backoff) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("jx/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, backoff })
    }

    pub fn load(&mut self, source: &RepositorySource) -> Result<ExtensionRepositoryLockList> {
        let yaml = match source {
            RepositorySource::File(path) => {
                crate::log_info!("Updating extensions from {}", path.display());
                read_repository_file(path)?
            }
            RepositorySource::Url(url) => {
                crate::log_info!("Updating extensions from {}", url);
                self.fetch(url)?
            }
            RepositorySource::GitHub { org, repo } => {
                let tag = self.latest_github_tag(org, repo)?;
                let url = raw_lock_file_url(org, repo, &tag);
                crate::log_info!("Updating extensions from {}", url);
                self.fetch(&url)?
            }
        };
        parse_repository(&yaml)
    }

    /// Tag of the latest GitHub release of `org/repo`
    pub fn latest_github_tag(&mut self, org: &str, repo: &str) -> Result<String> {
        let url = format!("https://api.github.com/repos/{}/{}/releases/latest", org, repo);
        let http = &self.http;
        let release: GitHubRelease = retry_with_backoff(&mut self.backoff, &url, || {
            let release = http
                .get(&url)
                .header("Accept", "application/vnd.github+json")
                .send()?
                .error_for_status()?
                .json::<GitHubRelease>()?;
            Ok(release)
        })
        .with_context(|| format!("Failed to find the latest release of {}/{}", org, repo))?;
        Ok(release.tag_name)
    }

    fn fetch(&mut self, url: &str) -> Result<String> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let url = format!("{}?version={}", url, millis);
        let http = &self.http;
        retry_with_backoff(&mut self.backoff, &url, || {
            Ok(http.get(&url).send()?.error_for_status()?.text()?)
        })
    }
}
