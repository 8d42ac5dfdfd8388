//! `reqwest`-backed GitHub REST client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use relay::{
    CommitSha, CommitStatus, CommitStatusPublisher, PullRequestCommitList, PullRequestCommits,
    PullRequestRef, RelaySettings, RepoConfig, RepositoryName, RetryPolicy, UpstreamError,
};

/// GitHub rejects status descriptions longer than this.
pub const MAX_DESCRIPTION_CHARS: usize = 140;

/// GitHub returns at most this many commits per page.
const PAGE_SIZE: usize = 100;

/// GitHub lists at most 250 commits for a pull request.
const MAX_PAGES: usize = 3;

const OP_PUSH_STATUS: &str = "push commit status";
const OP_LIST_COMMITS: &str = "list pull request commits";

/// Errors raised while constructing a [`GitHubClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The underlying HTTP client could not be built.
    #[error("failed to build GitHub HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// GitHub REST client.
///
/// API base URL and token are resolved per call from the repository's
/// configuration, falling back to the deployment defaults.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    settings: Arc<RelaySettings>,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_base", &self.settings.github.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct StatusBody<'a> {
    state: &'static str,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_url: Option<&'a str>,
    context: &'a str,
}

#[derive(Deserialize)]
struct CommitEntry {
    sha: String,
}

impl GitHubClient {
    /// Creates a client with the given per-request timeout.
    pub fn new(settings: Arc<RelaySettings>, timeout: Duration) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            reqwest::header::HeaderValue::from_static("ci-relay"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, settings })
    }

    fn url(&self, repo_config: &RepoConfig, path: &str) -> String {
        format!(
            "{}{}",
            self.settings
                .github_api_base_for(repo_config)
                .trim_end_matches('/'),
            path
        )
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        repo_config: &RepoConfig,
    ) -> reqwest::RequestBuilder {
        match self.settings.github_token_for(repo_config) {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        }
    }

    async fn list_page(
        &self,
        repo_config: &RepoConfig,
        pull_request: &PullRequestRef,
        page: usize,
    ) -> Result<Vec<CommitEntry>, UpstreamError> {
        let url = self.url(
            repo_config,
            &format!(
                "/repos/{}/pulls/{}/commits",
                pull_request.base_repo, pull_request.number
            ),
        );
        let request = self
            .http
            .get(&url)
            .query(&[("per_page", PAGE_SIZE), ("page", page)]);
        let response = self
            .authorize(request, repo_config)
            .send()
            .await
            .map_err(|e| transport_error(OP_LIST_COMMITS, &e))?;
        let response = check_status(OP_LIST_COMMITS, response).await?;
        response
            .json()
            .await
            .map_err(|e| UpstreamError::permanent(OP_LIST_COMMITS, format!("invalid body: {e}")))
    }
}

/// Maps a transport failure (no response) onto an [`UpstreamError`].
fn transport_error(operation: &'static str, error: &reqwest::Error) -> UpstreamError {
    UpstreamError::transient(operation, error.to_string())
}

/// Classifies an HTTP status.
///
/// 404 is retryable because the commit listing endpoint answers 404 for a
/// short while after a pull request is created.
fn retry_policy(status: StatusCode, headers: &HeaderMap) -> RetryPolicy {
    match status {
        StatusCode::NOT_FOUND | StatusCode::TOO_MANY_REQUESTS => RetryPolicy::Retryable {
            after: retry_after(headers),
        },
        s if s.is_server_error() => RetryPolicy::Retryable {
            after: retry_after(headers),
        },
        _ => RetryPolicy::NonRetryable,
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn check_status(
    operation: &'static str,
    response: Response,
) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry = retry_policy(status, response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError {
        operation,
        message: format!("{status}: {}", body.trim()),
        status: Some(status.as_u16()),
        retry,
    })
}

fn truncate_description(description: &str) -> String {
    description.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

#[async_trait]
impl CommitStatusPublisher for GitHubClient {
    async fn push_commit_status(
        &self,
        repo_config: &RepoConfig,
        repository: &RepositoryName,
        sha: &CommitSha,
        status: &CommitStatus,
    ) -> Result<(), UpstreamError> {
        let url = self.url(repo_config, &format!("/repos/{repository}/statuses/{sha}"));
        let body = StatusBody {
            state: status.state.as_str(),
            description: truncate_description(&status.description),
            target_url: status.target_url.as_deref(),
            context: &self.settings.github.status_context,
        };

        debug!(
            repository = %repository,
            sha = %sha,
            state = %status.state,
            "Pushing commit status"
        );
        let request = self.http.post(&url).json(&body);
        let response = self
            .authorize(request, repo_config)
            .send()
            .await
            .map_err(|e| transport_error(OP_PUSH_STATUS, &e))?;
        check_status(OP_PUSH_STATUS, response).await?;
        Ok(())
    }
}

#[async_trait]
impl PullRequestCommits for GitHubClient {
    async fn list_commits(
        &self,
        repo_config: &RepoConfig,
        pull_request: &PullRequestRef,
    ) -> Result<PullRequestCommitList, UpstreamError> {
        let mut shas = Vec::new();
        for page in 1..=MAX_PAGES {
            let entries = self.list_page(repo_config, pull_request, page).await?;
            let last_page = entries.len() < PAGE_SIZE;
            shas.extend(entries.into_iter().filter_map(|c| CommitSha::new(c.sha)));
            if last_page {
                break;
            }
        }

        Ok(PullRequestCommitList {
            head_repo: pull_request.head_repo.clone(),
            shas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::HeaderMap as AxumHeaders;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use relay::{CommitState, JobName, PullRequestNumber, Secret};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Upstream {
        statuses: Arc<Mutex<Vec<(String, String, Value, Option<String>)>>>,
        commit_calls: Arc<AtomicU32>,
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn record_status(
        State(upstream): State<Upstream>,
        Path((owner, repo, sha)): Path<(String, String, String)>,
        headers: AxumHeaders,
        Json(body): Json<Value>,
    ) -> axum::http::StatusCode {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        upstream
            .statuses
            .lock()
            .unwrap()
            .push((format!("{owner}/{repo}"), sha, body, auth));
        axum::http::StatusCode::CREATED
    }

    async fn list_commits_page(
        State(upstream): State<Upstream>,
        Path((_owner, _repo, number)): Path<(String, String, u64)>,
        Query(query): Query<HashMap<String, String>>,
    ) -> (axum::http::StatusCode, Json<Value>) {
        upstream.commit_calls.fetch_add(1, Ordering::SeqCst);
        if number == 404 {
            return (axum::http::StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"})));
        }
        if number == 401 {
            return (
                axum::http::StatusCode::UNAUTHORIZED,
                Json(json!({"message": "Bad credentials"})),
            );
        }
        let page: usize = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
        let commits: Vec<Value> = if number == 2 && page == 1 {
            (0..PAGE_SIZE).map(|i| json!({"sha": format!("p1-{i}")})).collect()
        } else if number == 2 {
            vec![json!({"sha": "p2-0"})]
        } else {
            vec![json!({"sha": "a1"}), json!({"sha": "b2"})]
        };
        (axum::http::StatusCode::OK, Json(Value::Array(commits)))
    }

    async fn client_for(upstream: &Upstream) -> (GitHubClient, RepoConfig) {
        let router = Router::new()
            .route("/repos/{owner}/{repo}/statuses/{sha}", post(record_status))
            .route(
                "/repos/{owner}/{repo}/pulls/{number}/commits",
                get(list_commits_page),
            )
            .with_state(upstream.clone());
        let base = serve(router).await;

        let mut settings = RelaySettings::with_jenkins_url("http://jenkins:8080");
        settings.github.api_base = base;
        settings.github.token = Some(Secret::new("gh-token"));
        let client = GitHubClient::new(Arc::new(settings), Duration::from_secs(5)).unwrap();
        let config = RepoConfig::new(
            RepositoryName::new("octo/site").unwrap(),
            JobName::new("site-pr").unwrap(),
        );
        (client, config)
    }

    fn pr(number: u64) -> PullRequestRef {
        PullRequestRef {
            base_repo: RepositoryName::new("octo/site").unwrap(),
            head_repo: RepositoryName::new("fork/site").unwrap(),
            number: PullRequestNumber::new(number),
        }
    }

    #[tokio::test]
    async fn status_push_sends_state_description_and_context() {
        let upstream = Upstream::default();
        let (client, config) = client_for(&upstream).await;

        let status = CommitStatus::new(CommitState::Success, "Build #3 succeeded.")
            .with_target_url("https://ci.example.com/job/site-pr/3/");
        client
            .push_commit_status(
                &config,
                &RepositoryName::new("octo/site").unwrap(),
                &CommitSha::new("abc123").unwrap(),
                &status,
            )
            .await
            .unwrap();

        let recorded = upstream.statuses.lock().unwrap().clone();
        assert_eq!(recorded.len(), 1);
        let (repo, sha, body, auth) = &recorded[0];
        assert_eq!(repo, "octo/site");
        assert_eq!(sha, "abc123");
        assert_eq!(body["state"], "success");
        assert_eq!(body["description"], "Build #3 succeeded.");
        assert_eq!(body["target_url"], "https://ci.example.com/job/site-pr/3/");
        assert_eq!(body["context"], "ci-relay");
        assert_eq!(auth.as_deref(), Some("Bearer gh-token"));
    }

    #[tokio::test]
    async fn status_push_omits_missing_target_url_and_truncates_description() {
        let upstream = Upstream::default();
        let (client, config) = client_for(&upstream).await;

        let long = "x".repeat(200);
        client
            .push_commit_status(
                &config,
                &RepositoryName::new("octo/site").unwrap(),
                &CommitSha::new("abc123").unwrap(),
                &CommitStatus::new(CommitState::Pending, long),
            )
            .await
            .unwrap();

        let recorded = upstream.statuses.lock().unwrap().clone();
        let body = &recorded[0].2;
        assert!(body.get("target_url").is_none());
        assert_eq!(
            body["description"].as_str().unwrap().len(),
            MAX_DESCRIPTION_CHARS
        );
    }

    #[tokio::test]
    async fn commits_are_listed_in_order_with_head_repo() {
        let upstream = Upstream::default();
        let (client, config) = client_for(&upstream).await;

        let list = client.list_commits(&config, &pr(7)).await.unwrap();
        assert_eq!(list.head_repo.as_str(), "fork/site");
        let shas: Vec<_> = list.shas.iter().map(|s| s.as_str()).collect();
        assert_eq!(shas, vec!["a1", "b2"]);
    }

    #[tokio::test]
    async fn full_pages_are_followed() {
        let upstream = Upstream::default();
        let (client, config) = client_for(&upstream).await;

        let list = client.list_commits(&config, &pr(2)).await.unwrap();
        assert_eq!(list.shas.len(), PAGE_SIZE + 1);
        assert_eq!(list.shas.last().unwrap().as_str(), "p2-0");
        assert_eq!(upstream.commit_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn not_found_is_retryable() {
        let upstream = Upstream::default();
        let (client, config) = client_for(&upstream).await;

        let err = client.list_commits(&config, &pr(404)).await.unwrap_err();
        assert_eq!(err.status, Some(404));
        assert!(err.retry.is_retryable());
    }

    #[tokio::test]
    async fn unauthorized_is_not_retryable() {
        let upstream = Upstream::default();
        let (client, config) = client_for(&upstream).await;

        let err = client.list_commits(&config, &pr(401)).await.unwrap_err();
        assert_eq!(err.status, Some(401));
        assert_eq!(err.retry, RetryPolicy::NonRetryable);
    }

    #[test]
    fn retry_after_header_is_carried_on_retryable_errors() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(
            retry_policy(StatusCode::TOO_MANY_REQUESTS, &headers),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(7))
            }
        );
        assert_eq!(
            retry_policy(StatusCode::UNPROCESSABLE_ENTITY, &headers),
            RetryPolicy::NonRetryable
        );
    }
}
