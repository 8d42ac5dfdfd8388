//! Retrying access to the commits of a pull request.
//!
//! GitHub's "list commits on a pull request" endpoint races with pull request
//! creation: for a short while after a PR is opened it may answer 404. The
//! [`CommitFetcher`] absorbs that race by retrying with a bounded linear
//! backoff (by default 5 attempts, sleeping 1, 2, 3 and 4 seconds between
//! them) before giving up.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::ports::PullRequestCommits;
use crate::retry::{retry_with_backoff, RetryConfig, RetryOutcome, Sleeper};
use crate::{PullRequestCommitList, PullRequestRef, RepoConfig, UpstreamError};

/// Lists pull request commits with bounded retry.
#[derive(Clone)]
pub struct CommitFetcher {
    source: Arc<dyn PullRequestCommits>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryConfig,
}

impl CommitFetcher {
    /// Creates a fetcher calling `source`, sleeping through `sleeper`
    /// according to `retry`.
    pub fn new(
        source: Arc<dyn PullRequestCommits>,
        sleeper: Arc<dyn Sleeper>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            source,
            sleeper,
            retry,
        }
    }

    /// Returns the commits of `pull_request`.
    ///
    /// Retryable errors are retried until the attempt budget is spent; the
    /// last error is then returned. Non-retryable errors are returned at once.
    /// A rate-limit hint on the error can only lengthen a backoff step.
    pub async fn fetch_commits(
        &self,
        repo_config: &RepoConfig,
        pull_request: &PullRequestRef,
    ) -> Result<PullRequestCommitList, UpstreamError> {
        let source = self.source.as_ref();
        let outcome = retry_with_backoff(
            self.retry,
            self.sleeper.as_ref(),
            |e: &UpstreamError| e.retry.clone(),
            || source.list_commits(repo_config, pull_request),
        )
        .await;

        match outcome {
            RetryOutcome::Success(list) => {
                debug!(
                    repository = %pull_request.base_repo,
                    pr_number = %pull_request.number,
                    commits = list.shas.len(),
                    "Fetched pull request commits"
                );
                Ok(list)
            }
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                warn!(
                    repository = %pull_request.base_repo,
                    pr_number = %pull_request.number,
                    attempts,
                    error = %last_error,
                    "Giving up fetching pull request commits"
                );
                Err(last_error)
            }
            RetryOutcome::Aborted(e) => {
                warn!(
                    repository = %pull_request.base_repo,
                    pr_number = %pull_request.number,
                    error = %e,
                    "Fetching pull request commits failed permanently"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{RecordingSleeper, ScriptedCommits};
    use crate::retry::Backoff;
    use crate::RetryPolicy;
    use crate::{CommitSha, JobName, PullRequestNumber, RepositoryName};
    use std::time::Duration;

    fn repo_config() -> RepoConfig {
        RepoConfig::new(
            RepositoryName::new("octo/site").unwrap(),
            JobName::new("site-pr").unwrap(),
        )
    }

    fn pr() -> PullRequestRef {
        PullRequestRef {
            base_repo: RepositoryName::new("octo/site").unwrap(),
            head_repo: RepositoryName::new("fork/site").unwrap(),
            number: PullRequestNumber::new(7),
        }
    }

    fn list() -> PullRequestCommitList {
        PullRequestCommitList {
            head_repo: RepositoryName::new("fork/site").unwrap(),
            shas: vec![CommitSha::new("a1").unwrap(), CommitSha::new("b2").unwrap()],
        }
    }

    fn fetcher(source: Arc<ScriptedCommits>, sleeper: Arc<RecordingSleeper>) -> CommitFetcher {
        let retry = RetryConfig::new(
            5,
            Backoff::Linear {
                unit: Duration::from_secs(1),
            },
        );
        CommitFetcher::new(source, sleeper, retry)
    }

    #[tokio::test]
    async fn four_not_found_races_then_success() {
        let source = Arc::new(ScriptedCommits::failing_then(4, list()));
        let sleeper = Arc::new(RecordingSleeper::default());

        let result = fetcher(source.clone(), sleeper.clone())
            .fetch_commits(&repo_config(), &pr())
            .await
            .unwrap();

        assert_eq!(result, list());
        assert_eq!(source.calls(), 5);
        let secs: Vec<u64> = sleeper.delays().iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn always_failing_source_is_called_five_times() {
        let source = Arc::new(ScriptedCommits::always_failing());
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = fetcher(source.clone(), sleeper.clone())
            .fetch_commits(&repo_config(), &pr())
            .await
            .unwrap_err();

        assert!(err.retry.is_retryable());
        assert_eq!(source.calls(), 5);
        assert_eq!(sleeper.total(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let source = Arc::new(ScriptedCommits::scripted(vec![Err(UpstreamError::permanent(
            "list pull request commits",
            "401 Unauthorized",
        ))]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = fetcher(source.clone(), sleeper.clone())
            .fetch_commits(&repo_config(), &pr())
            .await
            .unwrap_err();

        assert_eq!(err.message, "401 Unauthorized");
        assert_eq!(source.calls(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn rate_limit_hint_lengthens_the_backoff_step() {
        let throttled = UpstreamError {
            operation: "list pull request commits",
            message: "429 Too Many Requests".into(),
            status: Some(429),
            retry: RetryPolicy::Retryable {
                after: Some(Duration::from_secs(30)),
            },
        };
        let source = Arc::new(ScriptedCommits::scripted(vec![Err(throttled), Ok(list())]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let result = fetcher(source.clone(), sleeper.clone())
            .fetch_commits(&repo_config(), &pr())
            .await
            .unwrap();

        assert_eq!(result, list());
        assert_eq!(source.calls(), 2);
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(30)]);
    }
}
