//! Jenkins build triggering.
//!
//! A trigger is one parameterised POST to Jenkins. Which URL shape is used is
//! a deployment-wide choice ([`crate::JenkinsSettings::token_root_build`]):
//!
//! | Shape | Path | Job selected by |
//! |-------|------|-----------------|
//! | direct job | `/job/<name>/buildWithParameters` | path segment |
//! | token root | `/buildByToken/buildWithParameters` | `job=` parameter |
//!
//! Both carry the same build parameters, followed by `token=` when a build
//! token is configured. A failed trigger is never retried; the caller turns
//! it into an `error` commit status.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::ports::TriggerTransport;
use crate::{
    CommitSha, JobName, PullRequestNumber, RelaySettings, RepoConfig, RepositoryName, Secret,
    TargetSite,
};

/// Everything Jenkins needs to build one commit of a pull request.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildTriggerRequest {
    pub job_name: JobName,
    pub base_repo: RepositoryName,
    pub head_repo: RepositoryName,
    pub target_site: TargetSite,
    pub pr_number: PullRequestNumber,
    pub sha: CommitSha,
    pub pr_url: String,
    pub auth_token: Option<Secret>,
}

/// A fully resolved trigger URL.
///
/// Query values are kept unencoded; the transport encodes them when it
/// builds the actual request. `Display` masks the build token.
#[derive(Clone, PartialEq)]
pub struct TriggerUrl {
    base: String,
    path: String,
    query: Vec<(&'static str, String)>,
    token: Option<Secret>,
}

impl TriggerUrl {
    /// Jenkins base URL and trigger path, without query.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base, self.path)
    }

    /// The trigger path (`/job/<name>/buildWithParameters` or
    /// `/buildByToken/buildWithParameters`).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters in order, including the build token when present.
    pub fn params(&self) -> Vec<(&str, &str)> {
        let mut params: Vec<(&str, &str)> =
            self.query.iter().map(|(k, v)| (*k, v.as_str())).collect();
        if let Some(token) = &self.token {
            params.push(("token", token.expose()));
        }
        params
    }
}

impl std::fmt::Display for TriggerUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.base, self.path)?;
        let mut sep = '?';
        for (key, value) in &self.query {
            write!(f, "{sep}{key}={value}")?;
            sep = '&';
        }
        if self.token.is_some() {
            write!(f, "{sep}token=***")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TriggerUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TriggerUrl").field(&self.to_string()).finish()
    }
}

/// Builds trigger URLs and issues them.
#[derive(Clone)]
pub struct BuildTrigger {
    settings: Arc<RelaySettings>,
    transport: Arc<dyn TriggerTransport>,
}

impl BuildTrigger {
    /// Creates a trigger that resolves defaults from `settings` and POSTs
    /// through `transport`.
    pub fn new(settings: Arc<RelaySettings>, transport: Arc<dyn TriggerTransport>) -> Self {
        Self {
            settings,
            transport,
        }
    }

    /// Assembles the request for one commit.
    pub fn request(
        &self,
        repo_config: &RepoConfig,
        target_site: &TargetSite,
        pr_number: PullRequestNumber,
        head_repo: &RepositoryName,
        sha: &CommitSha,
        pr_url: &str,
    ) -> BuildTriggerRequest {
        BuildTriggerRequest {
            job_name: repo_config.jenkins_job_name.clone(),
            base_repo: repo_config.github_repo.clone(),
            head_repo: head_repo.clone(),
            target_site: target_site.clone(),
            pr_number,
            sha: sha.clone(),
            pr_url: pr_url.to_string(),
            auth_token: self.settings.build_token_for(repo_config).cloned(),
        }
    }

    /// Resolves the URL for `request` against the Jenkins base of `repo_config`.
    pub fn url_for(&self, repo_config: &RepoConfig, request: &BuildTriggerRequest) -> TriggerUrl {
        let base = self
            .settings
            .jenkins_url_for(repo_config)
            .trim_end_matches('/')
            .to_string();

        let mut query = Vec::with_capacity(7);
        let path = if self.settings.jenkins.token_root_build {
            query.push(("job", request.job_name.to_string()));
            "/buildByToken/buildWithParameters".to_string()
        } else {
            format!("/job/{}/buildWithParameters", request.job_name)
        };
        query.extend([
            ("GIT_BASE_REPO", request.base_repo.to_string()),
            ("GIT_HEAD_REPO", request.head_repo.to_string()),
            ("TARGETSITE", request.target_site.to_string()),
            ("NUMBER", request.pr_number.to_string()),
            ("GIT_SHA1", request.sha.to_string()),
            ("GITHUB_URL", request.pr_url.clone()),
        ]);

        TriggerUrl {
            base,
            path,
            query,
            token: request.auth_token.clone(),
        }
    }

    /// Requests a build of `sha` and reports whether Jenkins accepted it.
    ///
    /// Returns `true` iff Jenkins answered with a status below 400.
    pub async fn trigger(
        &self,
        repo_config: &RepoConfig,
        target_site: &TargetSite,
        pr_number: PullRequestNumber,
        head_repo: &RepositoryName,
        sha: &CommitSha,
        pr_url: &str,
    ) -> bool {
        let request = self.request(repo_config, target_site, pr_number, head_repo, sha, pr_url);
        let url = self.url_for(repo_config, &request);

        debug!(url = %url, "Requesting build from Jenkins");
        match self.transport.post(&url).await {
            Ok(status) => {
                debug!(status, "Jenkins responded");
                status < 400
            }
            Err(e) => {
                warn!(error = %e, sha = %sha, "Jenkins trigger request failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingTransport;

    fn repo_config() -> RepoConfig {
        RepoConfig::new(
            RepositoryName::new("octo/site").unwrap(),
            JobName::new("site-pr").unwrap(),
        )
    }

    fn trigger_with(
        settings: RelaySettings,
        transport: Arc<RecordingTransport>,
    ) -> BuildTrigger {
        BuildTrigger::new(Arc::new(settings), transport)
    }

    async fn fire(trigger: &BuildTrigger, config: &RepoConfig) -> bool {
        trigger
            .trigger(
                config,
                &TargetSite::new("staging").unwrap(),
                PullRequestNumber::new(7),
                &RepositoryName::new("fork/site").unwrap(),
                &CommitSha::new("abc123").unwrap(),
                "https://github.com/octo/site/pull/7",
            )
            .await
    }

    #[tokio::test]
    async fn direct_job_url_carries_all_parameters() {
        let transport = Arc::new(RecordingTransport::responding(201));
        let trigger = trigger_with(
            RelaySettings::with_jenkins_url("http://jenkins:8080/"),
            transport.clone(),
        );

        assert!(fire(&trigger, &repo_config()).await);

        let urls = transport.urls();
        assert_eq!(urls.len(), 1);
        assert_eq!(
            urls[0].to_string(),
            "http://jenkins:8080/job/site-pr/buildWithParameters\
             ?GIT_BASE_REPO=octo/site&GIT_HEAD_REPO=fork/site&TARGETSITE=staging\
             &NUMBER=7&GIT_SHA1=abc123&GITHUB_URL=https://github.com/octo/site/pull/7"
        );
    }

    #[tokio::test]
    async fn token_root_url_selects_job_by_parameter_and_appends_token() {
        let mut settings = RelaySettings::with_jenkins_url("http://jenkins:8080");
        settings.jenkins.token_root_build = true;
        settings.jenkins.build_token = Some(Secret::new("s3cret"));
        let transport = Arc::new(RecordingTransport::responding(200));
        let trigger = trigger_with(settings, transport.clone());

        assert!(fire(&trigger, &repo_config()).await);

        let urls = transport.urls();
        let url = &urls[0];
        assert_eq!(url.path(), "/buildByToken/buildWithParameters");
        let params = url.params();
        assert_eq!(params.first(), Some(&("job", "site-pr")));
        assert_eq!(params.last(), Some(&("token", "s3cret")));
        assert!(url.to_string().ends_with("&token=***"));
        assert!(!url.to_string().contains("s3cret"));
    }

    #[tokio::test]
    async fn error_status_class_reports_failure() {
        let transport = Arc::new(RecordingTransport::responding(404));
        let trigger = trigger_with(
            RelaySettings::with_jenkins_url("http://jenkins:8080"),
            transport.clone(),
        );
        assert!(!fire(&trigger, &repo_config()).await);
    }

    #[tokio::test]
    async fn transport_failure_reports_failure_without_retry() {
        let transport = Arc::new(RecordingTransport::unreachable());
        let trigger = trigger_with(
            RelaySettings::with_jenkins_url("http://jenkins:8080"),
            transport.clone(),
        );
        assert!(!fire(&trigger, &repo_config()).await);
        assert_eq!(transport.urls().len(), 1);
    }

    #[test]
    fn repo_token_overrides_deployment_token() {
        let mut settings = RelaySettings::with_jenkins_url("http://jenkins:8080");
        settings.jenkins.build_token = Some(Secret::new("shared"));
        let trigger = trigger_with(settings, Arc::new(RecordingTransport::responding(200)));

        let mut config = repo_config();
        config.jenkins_build_token = Some(Secret::new("own"));
        let request = trigger.request(
            &config,
            &TargetSite::new("docs").unwrap(),
            PullRequestNumber::new(1),
            &RepositoryName::new("octo/site").unwrap(),
            &CommitSha::new("def").unwrap(),
            "https://github.com/octo/site/pull/1",
        );
        assert_eq!(request.auth_token, Some(Secret::new("own")));
    }
}
