//! Configuration file loading and validation.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use relay::{RelaySettings, RepoConfig, RepositoryName, Secret, StaticRepoConfigs};
use serde::Deserialize;
use thiserror::Error;

pub const ENV_GITHUB_TOKEN: &str = "CI_RELAY_GITHUB_TOKEN";
pub const ENV_JENKINS_BUILD_TOKEN: &str = "CI_RELAY_JENKINS_BUILD_TOKEN";

/// Errors raised while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no repositories configured")]
    NoRepositories,

    #[error("a repository entry has an empty github_repo")]
    EmptyRepositoryName,

    #[error("repository {repository} has an empty jenkins_job_name")]
    EmptyJobName { repository: String },

    #[error("repository {repository} is configured more than once")]
    DuplicateRepository { repository: RepositoryName },

    #[error("jenkins.url must not be empty")]
    EmptyJenkinsUrl,

    #[error("commit_fetch.max_attempts must be at least 1")]
    ZeroAttempts,
}

/// `[server]`
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

/// `[http]`
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(flatten)]
    pub relay: RelaySettings,

    #[serde(default)]
    pub repositories: Vec<RepoConfig>,
}

impl Config {
    /// Reads, parses and validates `path`, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Token environment variables take precedence over the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(ENV_GITHUB_TOKEN).filter(|t| !t.is_empty()) {
            self.relay.github.token = Some(Secret::new(token));
        }
        if let Some(token) = lookup(ENV_JENKINS_BUILD_TOKEN).filter(|t| !t.is_empty()) {
            self.relay.jenkins.build_token = Some(Secret::new(token));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repositories.is_empty() {
            return Err(ConfigError::NoRepositories);
        }
        if self.relay.jenkins.url.trim().is_empty() {
            return Err(ConfigError::EmptyJenkinsUrl);
        }
        if self.relay.commit_fetch.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }

        let mut seen = HashSet::new();
        for repo in &self.repositories {
            if repo.github_repo.as_str().trim().is_empty() {
                return Err(ConfigError::EmptyRepositoryName);
            }
            if repo.jenkins_job_name.as_str().trim().is_empty() {
                return Err(ConfigError::EmptyJobName {
                    repository: repo.github_repo.to_string(),
                });
            }
            if !seen.insert(&repo.github_repo) {
                return Err(ConfigError::DuplicateRepository {
                    repository: repo.github_repo.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn repo_configs(&self) -> StaticRepoConfigs {
        StaticRepoConfigs::new(self.repositories.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay::BuildCommits;
    use std::io::Write;

    const MINIMAL: &str = r#"
[jenkins]
url = "http://jenkins:8080"

[[repositories]]
github_repo = "octo/site"
jenkins_job_name = "site-pr"
"#;

    #[test]
    fn minimal_file_takes_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:5000".parse().unwrap());
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
        assert_eq!(config.relay.github.api_base, "https://api.github.com");
        assert_eq!(config.relay.github.status_context, "ci-relay");
        assert_eq!(config.relay.commit_fetch.max_attempts, 5);
        assert_eq!(config.relay.commit_fetch.backoff_unit_ms, 1000);
        assert_eq!(config.repositories.len(), 1);
        assert_eq!(config.repositories[0].build_commits, BuildCommits::All);
    }

    #[test]
    fn full_file_is_read() {
        let text = r#"
[server]
bind = "127.0.0.1:8000"

[github]
token = "gh"
status_context = "jenkins"

[jenkins]
url = "http://jenkins:8080"
domain = "https://ci.example.com"
build_token = "bt"
token_root_build = true

[preview]
domain_suffix = ".preview.example.com"

[commit_fetch]
max_attempts = 3
backoff_unit_ms = 10

[http]
timeout_secs = 5

[[repositories]]
github_repo = "octo/site"
jenkins_job_name = "site-pr"
jenkins_url = "http://other-jenkins"
build_commits = "last"
"#;
        let config = Config::parse(text).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.bind.port(), 8000);
        assert_eq!(config.relay.github.token.as_ref().unwrap().expose(), "gh");
        assert!(config.relay.jenkins.token_root_build);
        assert_eq!(config.relay.preview.domain_suffix, ".preview.example.com");
        assert_eq!(config.relay.commit_fetch.max_attempts, 3);
        let repo = &config.repositories[0];
        assert_eq!(repo.build_commits, BuildCommits::Last);
        assert_eq!(
            config.relay.jenkins_url_for(repo),
            "http://other-jenkins"
        );
    }

    #[test]
    fn env_tokens_override_file() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.apply_env(|key| match key {
            ENV_GITHUB_TOKEN => Some("from-env".into()),
            ENV_JENKINS_BUILD_TOKEN => Some(String::new()),
            _ => None,
        });
        assert_eq!(
            config.relay.github.token.as_ref().unwrap().expose(),
            "from-env"
        );
        assert!(config.relay.jenkins.build_token.is_none());
    }

    #[test]
    fn no_repositories_is_rejected() {
        let config = Config::parse("[jenkins]\nurl = \"http://j\"\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoRepositories)));
    }

    #[test]
    fn duplicate_repository_is_rejected() {
        let text = format!(
            "{MINIMAL}\n[[repositories]]\ngithub_repo = \"octo/site\"\njenkins_job_name = \"again\"\n"
        );
        let config = Config::parse(&text).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "repository octo/site is configured more than once"
        );
    }

    #[test]
    fn blank_job_name_is_rejected() {
        let text = MINIMAL.replace("\"site-pr\"", "\" \"");
        let config = Config::parse(&text).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyJobName { .. })
        ));
    }

    #[test]
    fn blank_repository_name_is_rejected() {
        let text = MINIMAL.replace("\"octo/site\"", "\"\"");
        let config = Config::parse(&text).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyRepositoryName)
        ));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let text = format!("{MINIMAL}\n[commit_fetch]\nmax_attempts = 0\n");
        let config = Config::parse(&text).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ZeroAttempts)));
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.repo_configs().len(), 1);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_reports_syntax_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[jenkins\n").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
