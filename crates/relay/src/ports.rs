//! Port traits implemented by the infrastructure crates.
//!
//! The handlers in this crate talk to GitHub, Jenkins and the repository
//! configuration store only through these traits. Implementations live in
//! the `github` and `jenkins` crates (HTTP) and in [`crate::config`]
//! (in-memory configuration); in-memory fakes live in [`crate::fakes`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::trigger::TriggerUrl;
use crate::{
    CommitSha, CommitStatus, PullRequestCommitList, PullRequestRef, RepoConfig, RepositoryName,
    UpstreamError,
};

/// Looks up the configuration registered for a repository.
pub trait RepoConfigSource: Send + Sync {
    /// Returns the configuration for `repository`, or `None` if the relay does
    /// not serve it.
    fn resolve(&self, repository: &RepositoryName) -> Option<Arc<RepoConfig>>;
}

/// Publishes commit statuses.
#[async_trait]
pub trait CommitStatusPublisher: Send + Sync {
    /// Attaches `status` to commit `sha` of `repository`.
    ///
    /// Callers treat this as fire-and-forget: a failure is logged, never
    /// retried.
    async fn push_commit_status(
        &self,
        repo_config: &RepoConfig,
        repository: &RepositoryName,
        sha: &CommitSha,
        status: &CommitStatus,
    ) -> Result<(), UpstreamError>;
}

/// Lists the commits of a pull request.
#[async_trait]
pub trait PullRequestCommits: Send + Sync {
    /// Returns the commits of `pull_request`, in the order GitHub lists them.
    ///
    /// Right after a pull request is opened GitHub may answer with a
    /// not-found error; implementations report that as retryable.
    async fn list_commits(
        &self,
        repo_config: &RepoConfig,
        pull_request: &PullRequestRef,
    ) -> Result<PullRequestCommitList, UpstreamError>;
}

/// Issues the raw HTTP POST behind a build trigger.
#[async_trait]
pub trait TriggerTransport: Send + Sync {
    /// POSTs to `url` and returns the HTTP status code of the response.
    ///
    /// Returns `Err` only when no response was received at all.
    async fn post(&self, url: &TriggerUrl) -> Result<u16, UpstreamError>;
}
