//! Maps Jenkins build lifecycle notifications onto commit statuses.

use crate::{BuildNumber, CommitState, CommitStatus, RelayError};

/// Jenkins build lifecycle phase, as far as the relay cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    /// The build started running.
    Started,
    /// The build finished and its result is known.
    Finalized,
    /// Any other phase (`QUEUED`, `COMPLETED`, ...). Never relayed.
    Other,
}

impl BuildPhase {
    /// Classifies a phase name as sent by the Jenkins notification plugin.
    pub fn parse(phase: &str) -> Self {
        match phase {
            "STARTED" => BuildPhase::Started,
            "FINALIZED" => BuildPhase::Finalized,
            _ => BuildPhase::Other,
        }
    }
}

/// What to do with a build notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMapping {
    /// Publish this status.
    Publish(CommitStatus),
    /// Publish nothing.
    Skip,
}

/// Build results of a finalized build and the commit state each one maps to.
const FINALIZED_STATES: &[(&str, CommitState)] = &[
    ("SUCCESS", CommitState::Success),
    ("FAILURE", CommitState::Failure),
    ("UNSTABLE", CommitState::Failure),
    ("ABORTED", CommitState::Error),
];

fn describe(state: CommitState, build: BuildNumber, preview_url: Option<&str>) -> String {
    match state {
        CommitState::Pending => format!("Build #{build} is running"),
        CommitState::Success => match preview_url {
            Some(url) => format!("Build #{build} succeeded. {url}"),
            None => format!("Build #{build} succeeded."),
        },
        CommitState::Failure => format!("Build #{build} has failed"),
        CommitState::Error => format!("Build #{build} has encountered an error"),
    }
}

/// Derives the commit status for a Jenkins notification.
///
/// `STARTED` is always `pending`, whatever `status` says. `FINALIZED` is
/// looked up in the result table; a result outside the table is a
/// [`RelayError::UnrecognizedBuildStatus`]. Every other phase is
/// [`StatusMapping::Skip`].
pub fn map_status(
    phase: &str,
    status: Option<&str>,
    build: BuildNumber,
    preview_url: Option<&str>,
) -> Result<StatusMapping, RelayError> {
    let state = match BuildPhase::parse(phase) {
        BuildPhase::Other => return Ok(StatusMapping::Skip),
        BuildPhase::Started => CommitState::Pending,
        BuildPhase::Finalized => {
            let status = status.unwrap_or_default();
            FINALIZED_STATES
                .iter()
                .find(|(name, _)| *name == status)
                .map(|(_, state)| *state)
                .ok_or_else(|| RelayError::UnrecognizedBuildStatus {
                    status: status.to_string(),
                })?
        }
    };

    Ok(StatusMapping::Publish(CommitStatus::new(
        state,
        describe(state, build, preview_url),
    )))
}
