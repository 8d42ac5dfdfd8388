//! Deployment settings and per-repository configuration.
//!
//! [`RelaySettings`] holds the deployment-wide defaults. It is built once at
//! start-up and shared immutably with every handler. [`RepoConfig`] holds the
//! settings registered for one repository; any field it leaves unset falls
//! back to the matching deployment default through the `*_for` accessors on
//! [`RelaySettings`].
//!
//! Both types deserialize from the `[github]`, `[jenkins]`, `[preview]`,
//! `[commit_fetch]` and `[[repositories]]` tables of the configuration file.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ports::RepoConfigSource;
use crate::retry::{Backoff, RetryConfig};
use crate::{JobName, RepositoryName};

const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
const DEFAULT_STATUS_CONTEXT: &str = "ci-relay";

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// A credential that must never appear in logs.
///
/// `Debug` prints a placeholder; call [`Secret::expose`] at the point of use.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps a credential value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the credential in clear text.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

// ---------------------------------------------------------------------------
// Deployment settings
// ---------------------------------------------------------------------------

/// Deployment-wide defaults, immutable after start-up.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySettings {
    /// GitHub API access.
    #[serde(default)]
    pub github: GitHubSettings,

    /// Jenkins access and trigger URL selection.
    pub jenkins: JenkinsSettings,

    /// Preview-site URL construction.
    #[serde(default)]
    pub preview: PreviewSettings,

    /// Retry schedule for listing pull request commits.
    #[serde(default)]
    pub commit_fetch: CommitFetchSettings,
}

/// GitHub API defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubSettings {
    /// Base URL of the REST API.
    #[serde(default = "default_github_api_base")]
    pub api_base: String,

    /// Token used for status pushes and commit listing.
    #[serde(default)]
    pub token: Option<Secret>,

    /// The `context` every commit status is published under.
    #[serde(default = "default_status_context")]
    pub status_context: String,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            api_base: default_github_api_base(),
            token: None,
            status_context: default_status_context(),
        }
    }
}

fn default_github_api_base() -> String {
    DEFAULT_GITHUB_API_BASE.to_string()
}

fn default_status_context() -> String {
    DEFAULT_STATUS_CONTEXT.to_string()
}

/// Jenkins defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct JenkinsSettings {
    /// Base URL trigger requests are sent to.
    pub url: String,

    /// Public base URL prefixed to the relative build URLs Jenkins reports.
    /// Falls back to `url` when unset.
    #[serde(default)]
    pub domain: Option<String>,

    /// Shared build token appended to trigger requests as `token=`.
    #[serde(default)]
    pub build_token: Option<Secret>,

    /// Use the `/buildByToken` root instead of the per-job trigger path.
    #[serde(default)]
    pub token_root_build: bool,
}

/// Preview-site defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewSettings {
    /// Suffix appended to `pr<NUMBER>.<site>` to form the preview host.
    #[serde(default)]
    pub domain_suffix: String,
}

/// Retry schedule for the commit listing race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CommitFetchSettings {
    /// Total attempts, including the first.
    #[serde(default = "default_fetch_attempts")]
    pub max_attempts: u32,

    /// One backoff unit in milliseconds; attempt `k` is followed by `k` units.
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
}

impl Default for CommitFetchSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_fetch_attempts(),
            backoff_unit_ms: default_backoff_unit_ms(),
        }
    }
}

fn default_fetch_attempts() -> u32 {
    5
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

impl CommitFetchSettings {
    /// The linear retry schedule described by these settings.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_attempts,
            Backoff::Linear {
                unit: Duration::from_millis(self.backoff_unit_ms),
            },
        )
    }
}

impl RelaySettings {
    /// Creates settings with only the Jenkins URL set; everything else takes
    /// its default.
    pub fn with_jenkins_url(url: impl Into<String>) -> Self {
        Self {
            github: GitHubSettings::default(),
            jenkins: JenkinsSettings {
                url: url.into(),
                domain: None,
                build_token: None,
                token_root_build: false,
            },
            preview: PreviewSettings::default(),
            commit_fetch: CommitFetchSettings::default(),
        }
    }

    /// Jenkins base URL trigger requests go to.
    pub fn jenkins_url_for<'a>(&'a self, repo: &'a RepoConfig) -> &'a str {
        repo.jenkins_url.as_deref().unwrap_or(&self.jenkins.url)
    }

    /// Public Jenkins base URL used to complete relative build URLs.
    pub fn jenkins_domain_for<'a>(&'a self, repo: &'a RepoConfig) -> &'a str {
        repo.jenkins_domain
            .as_deref()
            .or(self.jenkins.domain.as_deref())
            .unwrap_or(&self.jenkins.url)
    }

    /// Build token appended to trigger requests, if any.
    pub fn build_token_for<'a>(&'a self, repo: &'a RepoConfig) -> Option<&'a Secret> {
        repo.jenkins_build_token
            .as_ref()
            .or(self.jenkins.build_token.as_ref())
    }

    /// Suffix of preview-site hosts.
    pub fn domain_suffix_for<'a>(&'a self, repo: &'a RepoConfig) -> &'a str {
        repo.domain_suffix
            .as_deref()
            .unwrap_or(&self.preview.domain_suffix)
    }

    /// GitHub REST API base URL.
    pub fn github_api_base_for<'a>(&'a self, repo: &'a RepoConfig) -> &'a str {
        repo.github_api_base
            .as_deref()
            .unwrap_or(&self.github.api_base)
    }

    /// GitHub token, if any.
    pub fn github_token_for<'a>(&'a self, repo: &'a RepoConfig) -> Option<&'a Secret> {
        repo.github_token.as_ref().or(self.github.token.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Per-repository configuration
// ---------------------------------------------------------------------------

/// Which commits of a pull request get a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildCommits {
    /// Every commit, oldest first.
    #[default]
    All,
    /// Only the newest commit.
    Last,
}

/// Settings registered for one repository.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RepoConfig {
    /// The repository these settings apply to, as `"owner/repo"`.
    pub github_repo: RepositoryName,

    /// The Jenkins job that builds pull requests of this repository.
    pub jenkins_job_name: JobName,

    #[serde(default)]
    pub jenkins_url: Option<String>,

    #[serde(default)]
    pub jenkins_domain: Option<String>,

    #[serde(default)]
    pub jenkins_build_token: Option<Secret>,

    #[serde(default)]
    pub domain_suffix: Option<String>,

    #[serde(default)]
    pub github_api_base: Option<String>,

    #[serde(default)]
    pub github_token: Option<Secret>,

    #[serde(default)]
    pub build_commits: BuildCommits,
}

impl RepoConfig {
    /// Creates a configuration with no overrides.
    pub fn new(github_repo: RepositoryName, jenkins_job_name: JobName) -> Self {
        Self {
            github_repo,
            jenkins_job_name,
            jenkins_url: None,
            jenkins_domain: None,
            jenkins_build_token: None,
            domain_suffix: None,
            github_api_base: None,
            github_token: None,
            build_commits: BuildCommits::All,
        }
    }
}

/// A fixed set of repository configurations keyed by repository name.
#[derive(Debug, Clone, Default)]
pub struct StaticRepoConfigs {
    repos: HashMap<RepositoryName, Arc<RepoConfig>>,
}

impl StaticRepoConfigs {
    /// Indexes `configs` by repository name. A later entry for the same
    /// repository replaces an earlier one.
    pub fn new(configs: impl IntoIterator<Item = RepoConfig>) -> Self {
        let repos = configs
            .into_iter()
            .map(|c| (c.github_repo.clone(), Arc::new(c)))
            .collect();
        Self { repos }
    }

    /// Number of registered repositories.
    pub fn len(&self) -> usize {
        self.repos.len()
    }

    /// Returns `true` if no repository is registered.
    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// Registered repository names, sorted.
    pub fn names(&self) -> Vec<&RepositoryName> {
        let mut names: Vec<_> = self.repos.keys().collect();
        names.sort();
        names
    }
}

impl RepoConfigSource for StaticRepoConfigs {
    fn resolve(&self, repository: &RepositoryName) -> Option<Arc<RepoConfig>> {
        self.repos.get(repository).cloned()
    }
}
