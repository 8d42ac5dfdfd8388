//! GitHub pull request notifications.
//!
//! Each delivery walks a small state machine. Every early stop is a named
//! terminal [`GitHubOutcome`] or a [`RelayError`]:
//!
//! ```text
//! Received ──(no/unknown type)──────────────────────────▶ Err(MissingEventType | UnsupportedEventType)
//!    │ ──(ping)─────────────────────────────────────────▶ Acknowledged
//!    ▼
//! Classified ──(no `site:` line)────────────────────────▶ NoTargetSite
//!    │ ──(action not opened/reopened/synchronize)───────▶ ActionIgnored
//!    ▼
//! Validated ──(repository not configured)───────────────▶ Err(RepoNotConfigured)
//!    │ ──(commit listing failed after retries)──────────▶ Err(Upstream)
//!    ▼
//! CommitsFetched ── per commit: Pending ▶ Triggered ▶ Queued | TriggerFailed
//!    ▼
//! Dispatched
//! ```
//!
//! Commits are handled one after the other, in the order GitHub lists them.
//! A failed trigger for one commit is reported on that commit and does not
//! stop the others.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::commits::CommitFetcher;
use crate::events::PullRequestEvent;
use crate::ports::{CommitStatusPublisher, RepoConfigSource};
use crate::target::extract_target;
use crate::trigger::BuildTrigger;
use crate::{
    BuildCommits, CommitSha, CommitState, CommitStatus, PullRequestRef, RelayError, RepoConfig,
    RepositoryName,
};

/// The only event type that triggers builds.
pub const EVENT_PULL_REQUEST: &str = "pull_request";
/// GitHub's webhook liveness probe.
pub const EVENT_PING: &str = "ping";
/// Pull request actions that trigger builds.
pub const ACTIONS_TO_BUILD: &[&str] = &["opened", "reopened", "synchronize"];

const DESC_SCHEDULING: &str = "Jenkins build is being scheduled";
const DESC_QUEUED: &str = "Jenkins build has been queued";
const DESC_SCHEDULING_FAILED: &str = "Scheduling Jenkins job failed";

/// A classified GitHub delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitHubDelivery {
    /// Webhook liveness probe.
    Ping,
    /// A pull request event.
    PullRequest(PullRequestEvent),
}

/// Classifies a delivery by its event-type header and parses its body.
pub fn classify_delivery(
    event_type: Option<&str>,
    body: &[u8],
) -> Result<GitHubDelivery, RelayError> {
    match event_type {
        None => Err(RelayError::MissingEventType),
        Some(EVENT_PING) => Ok(GitHubDelivery::Ping),
        Some(EVENT_PULL_REQUEST) => PullRequestEvent::from_json(body).map(GitHubDelivery::PullRequest),
        Some(other) => Err(RelayError::UnsupportedEventType {
            event_type: other.to_string(),
        }),
    }
}

/// How far one commit got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// Jenkins accepted the build request.
    Queued,
    /// Jenkins could not be asked to build; an `error` status was pushed.
    TriggerFailed,
}

/// Result for one commit of a dispatched pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDispatch {
    pub sha: CommitSha,
    pub result: DispatchResult,
}

/// Terminal state of a GitHub delivery that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitHubOutcome {
    /// A `ping` delivery; nothing else happens.
    Acknowledged,
    /// The pull request body names no target site, so there is nothing to build.
    NoTargetSite,
    /// The pull request action does not call for a build.
    ActionIgnored {
        /// The action GitHub reported.
        action: String,
    },
    /// Builds were requested for the listed commits.
    Dispatched {
        /// One entry per commit, in processing order.
        commits: Vec<CommitDispatch>,
    },
}

/// Pushes the statuses of one event, never letting a commit fall back from a
/// terminal state to `pending`.
///
/// Once a terminal status has been sent for a SHA, later `pending` pushes for
/// that SHA within the same event are dropped. Later terminal pushes still go
/// out, so the last one wins.
pub struct StatusSequence<'a> {
    publisher: &'a dyn CommitStatusPublisher,
    repo_config: &'a RepoConfig,
    repository: &'a RepositoryName,
    finished: HashSet<CommitSha>,
}

impl<'a> StatusSequence<'a> {
    /// Starts an empty sequence for `repository`.
    pub fn new(
        publisher: &'a dyn CommitStatusPublisher,
        repo_config: &'a RepoConfig,
        repository: &'a RepositoryName,
    ) -> Self {
        Self {
            publisher,
            repo_config,
            repository,
            finished: HashSet::new(),
        }
    }

    /// Pushes `status` for `sha` unless it would regress a terminal state.
    ///
    /// Returns `true` if the push was attempted. Push failures are logged and
    /// otherwise ignored.
    pub async fn push(&mut self, sha: &CommitSha, status: CommitStatus) -> bool {
        if !status.state.is_terminal() && self.finished.contains(sha) {
            debug!(sha = %sha, "Not regressing a finished commit to pending");
            return false;
        }
        if status.state.is_terminal() {
            self.finished.insert(sha.clone());
        }

        if let Err(e) = self
            .publisher
            .push_commit_status(self.repo_config, self.repository, sha, &status)
            .await
        {
            warn!(
                repository = %self.repository,
                sha = %sha,
                state = %status.state,
                error = %e,
                "Failed to push commit status"
            );
        }
        true
    }
}

/// Relays GitHub pull request events into Jenkins builds.
#[derive(Clone)]
pub struct GitHubEventHandler {
    repos: Arc<dyn RepoConfigSource>,
    statuses: Arc<dyn CommitStatusPublisher>,
    commits: CommitFetcher,
    trigger: BuildTrigger,
}

impl GitHubEventHandler {
    pub fn new(
        repos: Arc<dyn RepoConfigSource>,
        statuses: Arc<dyn CommitStatusPublisher>,
        commits: CommitFetcher,
        trigger: BuildTrigger,
    ) -> Self {
        Self {
            repos,
            statuses,
            commits,
            trigger,
        }
    }

    /// Handles one delivery given its event-type header and raw body.
    pub async fn handle(
        &self,
        event_type: Option<&str>,
        body: &[u8],
    ) -> Result<GitHubOutcome, RelayError> {
        match classify_delivery(event_type, body)? {
            GitHubDelivery::Ping => Ok(GitHubOutcome::Acknowledged),
            GitHubDelivery::PullRequest(event) => self.handle_pull_request(event).await,
        }
    }

    /// Handles a parsed pull request event.
    pub async fn handle_pull_request(
        &self,
        event: PullRequestEvent,
    ) -> Result<GitHubOutcome, RelayError> {
        debug!(
            repository = %event.base_repo,
            pr_number = %event.number,
            url = %event.html_url,
            action = %event.action,
            "Received GitHub pull request notification"
        );

        let Some(target_site) = extract_target(&event.body) else {
            debug!("No target site given, nothing to build");
            return Ok(GitHubOutcome::NoTargetSite);
        };
        debug!(target_site = %target_site, "Target site");

        if !ACTIONS_TO_BUILD.contains(&event.action.as_str()) {
            debug!(action = %event.action, "Ignored action");
            return Ok(GitHubOutcome::ActionIgnored {
                action: event.action,
            });
        }

        let repo_config =
            self.repos
                .resolve(&event.base_repo)
                .ok_or_else(|| RelayError::RepoNotConfigured {
                    repository: event.base_repo.clone(),
                })?;

        let pull_request = PullRequestRef {
            base_repo: event.base_repo.clone(),
            head_repo: event
                .head_repo
                .clone()
                .unwrap_or_else(|| event.base_repo.clone()),
            number: event.number,
        };
        let list = self
            .commits
            .fetch_commits(&repo_config, &pull_request)
            .await?;

        let shas = select_commits(list.shas, repo_config.build_commits);
        info!(
            repository = %event.base_repo,
            pr_number = %event.number,
            commits = shas.len(),
            "Triggering builds"
        );

        let mut sequence =
            StatusSequence::new(self.statuses.as_ref(), &repo_config, &event.base_repo);
        let mut dispatched = Vec::with_capacity(shas.len());

        for sha in shas {
            sequence
                .push(&sha, CommitStatus::new(CommitState::Pending, DESC_SCHEDULING))
                .await;

            debug!(
                target_site = %target_site,
                head_repo = %list.head_repo,
                sha = %sha,
                "Scheduling build"
            );
            let ok = self
                .trigger
                .trigger(
                    &repo_config,
                    &target_site,
                    event.number,
                    &list.head_repo,
                    &sha,
                    &event.html_url,
                )
                .await;

            let (status, result) = if ok {
                (
                    CommitStatus::new(CommitState::Pending, DESC_QUEUED),
                    DispatchResult::Queued,
                )
            } else {
                (
                    CommitStatus::new(CommitState::Error, DESC_SCHEDULING_FAILED),
                    DispatchResult::TriggerFailed,
                )
            };
            sequence.push(&sha, status).await;
            dispatched.push(CommitDispatch { sha, result });
        }

        Ok(GitHubOutcome::Dispatched {
            commits: dispatched,
        })
    }
}

fn select_commits(mut shas: Vec<CommitSha>, policy: BuildCommits) -> Vec<CommitSha> {
    match policy {
        BuildCommits::All => shas,
        BuildCommits::Last => shas.pop().into_iter().collect(),
    }
}
