//! Core of the CI relay.
//!
//! The relay sits between GitHub and Jenkins. Pull request events from GitHub
//! become parameterised Jenkins builds; build notifications from Jenkins
//! become commit statuses on GitHub. This crate holds every rule involved in
//! that translation; infrastructure crates implement the port traits defined
//! here and never add rules of their own.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RepositoryName`, `CommitSha`, etc.) |
//! | [`types`] | Commit status and pull request commit types |
//! | [`errors`] | `RelayError`, `UpstreamError`, `RetryPolicy` |
//! | [`config`] | Deployment settings and per-repository configuration |
//! | [`events`] | Inbound GitHub and Jenkins payloads |
//! | [`ports`] | Traits implemented by infrastructure crates |
//! | [`retry`] | Bounded retry-with-backoff combinator |
//! | [`status_map`] | Jenkins phase/status to commit status table |
//! | [`target`] | `site:` directive extraction |
//! | [`commits`] | Retrying pull request commit listing |
//! | [`trigger`] | Jenkins trigger URL construction and dispatch |
//! | [`github_flow`] | GitHub event state machine |
//! | [`jenkins_flow`] | Jenkins event state machine |
//! | [`fakes`] | In-memory port implementations for tests |

pub mod commits;
pub mod config;
pub mod errors;
pub mod events;
pub mod fakes;
pub mod github_flow;
pub mod identifiers;
pub mod jenkins_flow;
pub mod ports;
pub mod retry;
pub mod status_map;
pub mod target;
pub mod trigger;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use commits::CommitFetcher;
pub use config::{
    BuildCommits, CommitFetchSettings, GitHubSettings, JenkinsSettings, PreviewSettings,
    RelaySettings, RepoConfig, Secret, StaticRepoConfigs,
};
pub use errors::{RelayError, RetryPolicy, UpstreamError};
pub use events::{JenkinsBody, JenkinsBuild, JenkinsNotification, PullRequestEvent};
pub use github_flow::{CommitDispatch, DispatchResult, GitHubEventHandler, GitHubOutcome};
pub use identifiers::{
    BuildNumber, CommitSha, EventId, JobName, PullRequestNumber, RepositoryName, TargetSite,
};
pub use jenkins_flow::{JenkinsEventHandler, JenkinsOutcome};
pub use ports::{CommitStatusPublisher, PullRequestCommits, RepoConfigSource, TriggerTransport};
pub use retry::{Backoff, RetryConfig, RetryOutcome, Sleeper};
pub use status_map::{map_status, BuildPhase, StatusMapping};
pub use target::extract_target;
pub use trigger::{BuildTrigger, BuildTriggerRequest, TriggerUrl};
pub use types::{CommitState, CommitStatus, PullRequestCommitList, PullRequestRef};
