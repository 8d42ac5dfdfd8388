//! Jenkins build notifications.
//!
//! ```text
//! Received ──(payload unreadable)──────────────▶ Err(InvalidPayload)
//!    ▼
//! Normalized ──(repository not configured)─────▶ Err(RepoNotConfigured)
//!    ▼
//! Classified ──(phase not STARTED/FINALIZED)───▶ Skipped
//!    ▼
//! Mapped ──(unknown final build status)────────▶ Err(UnrecognizedBuildStatus)
//!    ▼
//! StatusSent
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use crate::events::{
    normalize_jenkins_body, JenkinsBody, JenkinsNotification, PARAM_BASE_REPO, PARAM_PR_NUMBER,
    PARAM_SHA, PARAM_TARGET_SITE,
};
use crate::ports::{CommitStatusPublisher, RepoConfigSource};
use crate::status_map::{map_status, BuildPhase, StatusMapping};
use crate::{CommitSha, CommitStatus, RelayError, RelaySettings, RepositoryName};

/// Terminal state of a Jenkins notification that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JenkinsOutcome {
    /// The phase is not relayed; nothing was sent.
    Skipped {
        /// The phase Jenkins reported.
        phase: String,
    },
    /// A commit status was pushed.
    StatusSent {
        /// The status that was pushed.
        status: CommitStatus,
        /// Whether GitHub accepted the push.
        delivered: bool,
    },
}

/// Builds the URL of the preview site a successful build deploys to.
pub fn preview_url(pr_number: &str, target_site: &str, domain_suffix: &str) -> String {
    format!("http://pr{pr_number}.{target_site}{domain_suffix}")
}

fn join_url(domain: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        domain.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

/// Relays Jenkins build notifications into commit statuses.
#[derive(Clone)]
pub struct JenkinsEventHandler {
    settings: Arc<RelaySettings>,
    repos: Arc<dyn RepoConfigSource>,
    statuses: Arc<dyn CommitStatusPublisher>,
}

impl JenkinsEventHandler {
    pub fn new(
        settings: Arc<RelaySettings>,
        repos: Arc<dyn RepoConfigSource>,
        statuses: Arc<dyn CommitStatusPublisher>,
    ) -> Self {
        Self {
            settings,
            repos,
            statuses,
        }
    }

    /// Handles one notification body as delivered by the transport.
    pub async fn handle(&self, body: JenkinsBody) -> Result<JenkinsOutcome, RelayError> {
        let notification = normalize_jenkins_body(body)?;
        self.handle_notification(notification).await
    }

    /// Handles a parsed notification.
    pub async fn handle_notification(
        &self,
        notification: JenkinsNotification,
    ) -> Result<JenkinsOutcome, RelayError> {
        let build = &notification.build;

        let base_repo = build
            .parameter(PARAM_BASE_REPO)
            .and_then(RepositoryName::new)
            .ok_or_else(|| {
                RelayError::invalid_payload(format!("build parameter {PARAM_BASE_REPO} missing"))
            })?;
        let repo_config =
            self.repos
                .resolve(&base_repo)
                .ok_or_else(|| RelayError::RepoNotConfigured {
                    repository: base_repo.clone(),
                })?;

        let build_url = join_url(self.settings.jenkins_domain_for(&repo_config), &build.url);
        debug!(
            job = %notification.name,
            build_number = %build.number,
            url = %build_url,
            phase = %build.phase,
            "Received Jenkins notification"
        );

        if BuildPhase::parse(&build.phase) == BuildPhase::Other {
            return Ok(JenkinsOutcome::Skipped {
                phase: build.phase.clone(),
            });
        }

        let sha = build
            .parameter(PARAM_SHA)
            .and_then(CommitSha::new)
            .ok_or_else(|| {
                RelayError::invalid_payload(format!("build parameter {PARAM_SHA} missing"))
            })?;

        let preview = match (
            build.parameter(PARAM_PR_NUMBER),
            build.parameter(PARAM_TARGET_SITE),
        ) {
            (Some(number), Some(site)) => Some(preview_url(
                &number,
                &site,
                self.settings.domain_suffix_for(&repo_config),
            )),
            _ => None,
        };
        if let Some(url) = &preview {
            debug!(preview_url = %url, "Pull request site URL");
        }

        let status = match map_status(
            &build.phase,
            build.status.as_deref(),
            build.number,
            preview.as_deref(),
        )? {
            StatusMapping::Publish(status) => status.with_target_url(build_url),
            StatusMapping::Skip => {
                return Ok(JenkinsOutcome::Skipped {
                    phase: build.phase.clone(),
                })
            }
        };

        debug!(
            repository = %base_repo,
            sha = %sha,
            state = %status.state,
            description = %status.description,
            "Pushing build status"
        );
        let delivered = match self
            .statuses
            .push_commit_status(&repo_config, &base_repo, &sha, &status)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    repository = %base_repo,
                    sha = %sha,
                    error = %e,
                    "Failed to push build status"
                );
                false
            }
        };

        Ok(JenkinsOutcome::StatusSent { status, delivered })
    }
}
