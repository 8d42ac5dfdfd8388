//! Inbound notification payloads.
//!
//! Two event shapes are understood:
//!
//! - [`PullRequestEvent`]: a GitHub `pull_request` webhook delivery.
//! - [`JenkinsNotification`]: a build lifecycle notification from the
//!   Jenkins notification plugin.
//!
//! Which of the two a payload is follows from the endpoint it arrived on.
//! Both are immutable once parsed and live for one request.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::{BuildNumber, CommitSha, PullRequestNumber, RelayError, RepositoryName};

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// A GitHub pull request event, reduced to the fields the relay uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    /// What happened to the pull request (`opened`, `closed`, ...).
    pub action: String,
    pub number: PullRequestNumber,
    /// The pull request description; empty when GitHub sends `null`.
    pub body: String,
    /// Browser URL of the pull request.
    pub html_url: String,
    /// The repository the pull request targets.
    pub base_repo: RepositoryName,
    /// The repository the changes come from; `None` if the fork was deleted.
    pub head_repo: Option<RepositoryName>,
    /// Tip of the head branch at the time of the event.
    pub head_sha: Option<CommitSha>,
}

#[derive(Deserialize)]
struct PullRequestPayload {
    action: String,
    pull_request: PullRequestBody,
}

#[derive(Deserialize)]
struct PullRequestBody {
    number: u64,
    #[serde(default)]
    body: Option<String>,
    html_url: String,
    head: BranchRef,
    base: BranchRef,
}

#[derive(Deserialize)]
struct BranchRef {
    #[serde(default)]
    sha: Option<String>,
    #[serde(default)]
    repo: Option<RepoRef>,
}

#[derive(Deserialize)]
struct RepoRef {
    full_name: String,
}

impl PullRequestEvent {
    /// Parses a `pull_request` webhook body.
    pub fn from_json(body: &[u8]) -> Result<Self, RelayError> {
        let payload: PullRequestPayload = serde_json::from_slice(body)
            .map_err(|e| RelayError::invalid_payload(format!("pull request event: {e}")))?;
        let pr = payload.pull_request;

        let base_repo = pr
            .base
            .repo
            .and_then(|r| RepositoryName::new(r.full_name))
            .ok_or_else(|| RelayError::invalid_payload("pull request has no base repository"))?;

        Ok(Self {
            action: payload.action,
            number: PullRequestNumber::new(pr.number),
            body: pr.body.unwrap_or_default(),
            html_url: pr.html_url,
            base_repo,
            head_repo: pr.head.repo.and_then(|r| RepositoryName::new(r.full_name)),
            head_sha: pr.head.sha.and_then(CommitSha::new),
        })
    }
}

// ---------------------------------------------------------------------------
// Jenkins
// ---------------------------------------------------------------------------

/// Build parameter naming the base repository.
pub const PARAM_BASE_REPO: &str = "GIT_BASE_REPO";
/// Build parameter naming the commit that was built.
pub const PARAM_SHA: &str = "GIT_SHA1";
/// Build parameter naming the target site.
pub const PARAM_TARGET_SITE: &str = "TARGETSITE";
/// Build parameter carrying the pull request number.
pub const PARAM_PR_NUMBER: &str = "NUMBER";

/// A Jenkins notification-plugin payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JenkinsNotification {
    /// The job name.
    pub name: String,
    pub build: JenkinsBuild,
}

/// The `build` object of a [`JenkinsNotification`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JenkinsBuild {
    pub number: BuildNumber,
    /// Build page path relative to the Jenkins root, e.g. `job/site-pr/12/`.
    pub url: String,
    /// Lifecycle phase (`QUEUED`, `STARTED`, `COMPLETED`, `FINALIZED`).
    pub phase: String,
    /// Build result; only present once the build has finished.
    #[serde(default)]
    pub status: Option<String>,
    /// Build parameters, as passed by the trigger.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl JenkinsBuild {
    /// Returns a build parameter rendered as a string.
    ///
    /// Strings are returned as is and numbers in their decimal form; any other
    /// JSON type, an empty string, or a missing parameter yields `None`.
    pub fn parameter(&self, name: &str) -> Option<String> {
        match self.parameters.get(name)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A Jenkins request body as the transport delivered it.
#[derive(Debug, Clone, PartialEq)]
pub enum JenkinsBody {
    /// A body declared and parsed as JSON.
    Json(Value),
    /// A body declared as `application/x-www-form-urlencoded`, decoded into
    /// its key/value pairs.
    Form(Vec<(String, String)>),
}

/// Recovers the notification from whatever the transport delivered.
///
/// Some versions of the notification plugin send JSON with a form content
/// type, so the whole document ends up as the key of a single form field.
/// A single-field form is therefore parsed as JSON first (the key alone, then
/// `key=value` in case the document itself contained a `=`). If neither
/// parses, the form fields themselves are taken as the payload.
pub fn normalize_jenkins_body(body: JenkinsBody) -> Result<JenkinsNotification, RelayError> {
    let value = match body {
        JenkinsBody::Json(value) => value,
        JenkinsBody::Form(fields) => recover_form(fields),
    };
    serde_json::from_value(value)
        .map_err(|e| RelayError::invalid_payload(format!("jenkins notification: {e}")))
}

fn recover_form(fields: Vec<(String, String)>) -> Value {
    if let [(key, value)] = fields.as_slice() {
        if let Ok(v) = serde_json::from_str::<Value>(key) {
            return v;
        }
        if !value.is_empty() {
            if let Ok(v) = serde_json::from_str::<Value>(&format!("{key}={value}")) {
                return v;
            }
        }
    }
    Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
    )
}
