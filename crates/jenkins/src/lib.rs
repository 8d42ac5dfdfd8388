//! CI relay Jenkins infrastructure adapter.
//!
//! Implements [`relay::TriggerTransport`] over HTTP using `reqwest`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Query encoding and the HTTP POST live here. Which URL
//! to call, and what counts as a successful trigger, is decided by
//! [`relay::BuildTrigger`].

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use relay::{TriggerTransport, TriggerUrl, UpstreamError};

const OP_TRIGGER: &str = "trigger Jenkins build";

/// Errors raised while constructing a [`JenkinsClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build Jenkins HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Posts trigger URLs to Jenkins.
#[derive(Debug, Clone)]
pub struct JenkinsClient {
    http: reqwest::Client,
}

impl JenkinsClient {
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent("ci-relay")
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl TriggerTransport for JenkinsClient {
    async fn post(&self, url: &TriggerUrl) -> Result<u16, UpstreamError> {
        let target = reqwest::Url::parse_with_params(&url.endpoint(), url.params())
            .map_err(|e| UpstreamError::permanent(OP_TRIGGER, format!("invalid URL: {e}")))?;

        debug!(url = %url, "Posting Jenkins trigger");
        let response = self
            .http
            .post(target)
            .send()
            .await
            .map_err(|e| UpstreamError::transient(OP_TRIGGER, e.without_url().to_string()))?;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use relay::{
        BuildTrigger, CommitSha, JobName, PullRequestNumber, RelaySettings, RepoConfig,
        RepositoryName, Secret, TargetSite,
    };
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>;

    async fn record(
        State(seen): State<Seen>,
        Path(job): Path<String>,
        Query(query): Query<Vec<(String, String)>>,
    ) -> StatusCode {
        let status = if job == "broken" {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::CREATED
        };
        seen.lock().unwrap().push((job, query));
        status
    }

    async fn fake_jenkins() -> (String, Seen) {
        let seen = Seen::default();
        let router = Router::new()
            .route("/job/{job}/buildWithParameters", post(record))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    fn trigger_for(base: &str, job: &str) -> (BuildTrigger, RepoConfig) {
        let mut settings = RelaySettings::with_jenkins_url(base);
        settings.jenkins.build_token = Some(Secret::new("s3cret"));
        let client = JenkinsClient::new(Duration::from_secs(5)).unwrap();
        let trigger = BuildTrigger::new(Arc::new(settings), Arc::new(client));
        let config = RepoConfig::new(
            RepositoryName::new("octo/site").unwrap(),
            JobName::new(job).unwrap(),
        );
        (trigger, config)
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
    async fn parameters_are_encoded_and_token_appended() {
        let (base, seen) = fake_jenkins().await;
        let (trigger, config) = trigger_for(&base, "site-pr");

        assert!(fire(&trigger, &config).await);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        let (job, query) = &seen[0];
        assert_eq!(job, "site-pr");
        let get = |key: &str| {
            query
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("GIT_BASE_REPO"), Some("octo/site"));
        assert_eq!(get("GIT_HEAD_REPO"), Some("fork/site"));
        assert_eq!(get("TARGETSITE"), Some("staging"));
        assert_eq!(get("NUMBER"), Some("7"));
        assert_eq!(get("GIT_SHA1"), Some("abc123"));
        assert_eq!(get("GITHUB_URL"), Some("https://github.com/octo/site/pull/7"));
        assert_eq!(query.last().map(|(k, v)| (k.as_str(), v.as_str())), Some(("token", "s3cret")));
    }

    #[tokio::test]
    async fn client_error_status_is_reported_as_failure() {
        let (base, _seen) = fake_jenkins().await;
        let (trigger, config) = trigger_for(&base, "broken");
        assert!(!fire(&trigger, &config).await);
    }

    #[tokio::test]
    async fn unreachable_jenkins_is_a_transient_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (trigger, config) = trigger_for(&format!("http://{addr}"), "site-pr");
        let url = trigger.url_for(
            &config,
            &trigger.request(
                &config,
                &TargetSite::new("staging").unwrap(),
                PullRequestNumber::new(7),
                &RepositoryName::new("fork/site").unwrap(),
                &CommitSha::new("abc123").unwrap(),
                "https://github.com/octo/site/pull/7",
            ),
        );
        let client = JenkinsClient::new(Duration::from_secs(5)).unwrap();
        let err = client.post(&url).await.unwrap_err();
        assert!(err.retry.is_retryable());
        assert!(!err.message.contains("s3cret"));
    }
}
