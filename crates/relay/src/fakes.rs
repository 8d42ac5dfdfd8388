//! In-memory fakes for the port traits (testing only).
//!
//! Every fake records what it was asked to do so tests can assert on the
//! exact sequence of upstream calls a handler made.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::ports::{CommitStatusPublisher, PullRequestCommits, TriggerTransport};
use crate::retry::Sleeper;
use crate::trigger::TriggerUrl;
use crate::{
    CommitSha, CommitStatus, PullRequestCommitList, PullRequestRef, RepoConfig, RepositoryName,
    UpstreamError,
};

// ---------------------------------------------------------------------------
// RecordingSleeper
// ---------------------------------------------------------------------------

/// Sleeper that returns immediately and remembers every requested delay.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Requested delays, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }

    /// Sum of all requested delays.
    pub fn total(&self) -> Duration {
        self.delays().into_iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

// ---------------------------------------------------------------------------
// RecordingStatusPublisher
// ---------------------------------------------------------------------------

/// One status push seen by [`RecordingStatusPublisher`].
#[derive(Debug, Clone, PartialEq)]
pub struct PushedStatus {
    pub repository: RepositoryName,
    pub sha: CommitSha,
    pub status: CommitStatus,
}

/// Status publisher that records pushes and optionally rejects them.
#[derive(Debug, Default)]
pub struct RecordingStatusPublisher {
    pushes: Mutex<Vec<PushedStatus>>,
    reject: bool,
}

impl RecordingStatusPublisher {
    /// A publisher that accepts every push.
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher that records every push and then fails it.
    pub fn rejecting() -> Self {
        Self {
            pushes: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    /// All pushes, in order.
    pub fn pushes(&self) -> Vec<PushedStatus> {
        self.pushes.lock().unwrap().clone()
    }

    /// Pushes made for `sha`, in order.
    pub fn pushes_for(&self, sha: &str) -> Vec<CommitStatus> {
        self.pushes()
            .into_iter()
            .filter(|p| p.sha.as_str() == sha)
            .map(|p| p.status)
            .collect()
    }
}

#[async_trait]
impl CommitStatusPublisher for RecordingStatusPublisher {
    async fn push_commit_status(
        &self,
        _repo_config: &RepoConfig,
        repository: &RepositoryName,
        sha: &CommitSha,
        status: &CommitStatus,
    ) -> Result<(), UpstreamError> {
        self.pushes.lock().unwrap().push(PushedStatus {
            repository: repository.clone(),
            sha: sha.clone(),
            status: status.clone(),
        });
        if self.reject {
            Err(UpstreamError::transient("push commit status", "rejected by fake").with_status(500))
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedCommits
// ---------------------------------------------------------------------------

/// Commit source that replays a script of results.
///
/// Once the script is used up, every further call returns the fallback.
#[derive(Debug)]
pub struct ScriptedCommits {
    script: Mutex<VecDeque<Result<PullRequestCommitList, UpstreamError>>>,
    fallback: Result<PullRequestCommitList, UpstreamError>,
    calls: AtomicU32,
}

fn not_found_race() -> UpstreamError {
    UpstreamError::transient("list pull request commits", "404 Not Found").with_status(404)
}

impl ScriptedCommits {
    /// Always returns `list`.
    pub fn returning(list: PullRequestCommitList) -> Self {
        Self::with(VecDeque::new(), Ok(list))
    }

    /// Fails `failures` times with a retryable not-found, then returns `list`.
    pub fn failing_then(failures: usize, list: PullRequestCommitList) -> Self {
        let script = std::iter::repeat_with(|| Err(not_found_race()))
            .take(failures)
            .collect();
        Self::with(script, Ok(list))
    }

    /// Always fails with a retryable not-found.
    pub fn always_failing() -> Self {
        Self::with(VecDeque::new(), Err(not_found_race()))
    }

    /// Replays `results`, then fails with a retryable not-found.
    pub fn scripted(results: Vec<Result<PullRequestCommitList, UpstreamError>>) -> Self {
        Self::with(results.into(), Err(not_found_race()))
    }

    fn with(
        script: VecDeque<Result<PullRequestCommitList, UpstreamError>>,
        fallback: Result<PullRequestCommitList, UpstreamError>,
    ) -> Self {
        Self {
            script: Mutex::new(script),
            fallback,
            calls: AtomicU32::new(0),
        }
    }

    /// Number of times the source was called.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PullRequestCommits for ScriptedCommits {
    async fn list_commits(
        &self,
        _repo_config: &RepoConfig,
        _pull_request: &PullRequestRef,
    ) -> Result<PullRequestCommitList, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

// ---------------------------------------------------------------------------
// RecordingTransport
// ---------------------------------------------------------------------------

/// Trigger transport that records URLs and answers from a script.
///
/// Once the script is used up, every further call returns the fallback.
#[derive(Debug)]
pub struct RecordingTransport {
    urls: Mutex<Vec<TriggerUrl>>,
    script: Mutex<VecDeque<Result<u16, UpstreamError>>>,
    fallback: Result<u16, UpstreamError>,
}

impl RecordingTransport {
    /// Answers every POST with `status`.
    pub fn responding(status: u16) -> Self {
        Self::scripted(Vec::new(), Ok(status))
    }

    /// Fails every POST as if Jenkins could not be reached.
    pub fn unreachable() -> Self {
        Self::scripted(
            Vec::new(),
            Err(UpstreamError::transient("trigger build", "connection refused")),
        )
    }

    /// Answers with `statuses` in order, then with `fallback`.
    pub fn scripted(
        statuses: Vec<Result<u16, UpstreamError>>,
        fallback: Result<u16, UpstreamError>,
    ) -> Self {
        Self {
            urls: Mutex::new(Vec::new()),
            script: Mutex::new(statuses.into()),
            fallback,
        }
    }

    /// URLs posted to, in order.
    pub fn urls(&self) -> Vec<TriggerUrl> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TriggerTransport for RecordingTransport {
    async fn post(&self, url: &TriggerUrl) -> Result<u16, UpstreamError> {
        self.urls.lock().unwrap().push(url.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}
