//! Shared value types for the relay domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values and participate in domain decisions (e.g. whether a
//! commit state is terminal).

use serde::{Deserialize, Serialize};

use crate::{CommitSha, PullRequestNumber, RepositoryName};

// ---------------------------------------------------------------------------
// Commit status
// ---------------------------------------------------------------------------

/// The state of a commit status as understood by the GitHub statuses API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    /// A build has been scheduled or is running.
    Pending,
    /// The build succeeded.
    Success,
    /// The build ran and failed (or was unstable).
    Failure,
    /// The build could not be scheduled or was aborted.
    Error,
}

impl CommitState {
    /// Returns `true` for every state other than [`CommitState::Pending`].
    pub fn is_terminal(self) -> bool {
        !matches!(self, CommitState::Pending)
    }

    /// Returns the wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Failure => "failure",
            CommitState::Error => "error",
        }
    }
}

impl std::fmt::Display for CommitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state plus description attached to one commit, visible on the pull
/// request that contains it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    /// The state to report.
    pub state: CommitState,

    /// Human-readable description shown next to the state.
    pub description: String,

    /// Link shown with the status, typically the Jenkins build page.
    pub target_url: Option<String>,
}

impl CommitStatus {
    /// Creates a status without a target URL.
    pub fn new(state: CommitState, description: impl Into<String>) -> Self {
        Self {
            state,
            description: description.into(),
            target_url: None,
        }
    }

    /// Sets the target URL.
    #[must_use]
    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Pull request commits
// ---------------------------------------------------------------------------

/// Identifies the pull request whose commits are being listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    /// The repository the pull request targets.
    pub base_repo: RepositoryName,

    /// The repository the pull request's commits come from.
    pub head_repo: RepositoryName,

    /// The pull request number within `base_repo`.
    pub number: PullRequestNumber,
}

/// The commits of a pull request, oldest first, as GitHub lists them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestCommitList {
    /// The repository the commits live in.
    pub head_repo: RepositoryName,

    /// Commit SHAs in the order GitHub returned them.
    pub shas: Vec<CommitSha>,
}
