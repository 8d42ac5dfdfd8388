//! Endpoint handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use relay::{EventId, GitHubOutcome, JenkinsBody, JenkinsOutcome, RelayError};
use tracing::{debug, info_span, warn, Instrument};

use crate::{ApiError, AppState};

/// Header carrying the GitHub event type.
pub const HEADER_EVENT: &str = "x-github-event";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Liveness probe.
pub async fn ping_handler() -> &'static str {
    "pong"
}

/// `POST /notification/github`
///
/// - 200: GitHub `ping` delivery
/// - 204: pull request event handled (including ignored ones)
/// - 400 / 404 / 502: see [`ApiError`]
pub async fn github_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let event_id = EventId::new_random();
    let event_type = headers.get(HEADER_EVENT).and_then(|v| v.to_str().ok());
    let span = info_span!("github_notification", event_id = %event_id, event_type);

    async move {
        let outcome = app_state.github().handle(event_type, &body).await;
        match outcome {
            Ok(GitHubOutcome::Acknowledged) => Ok(StatusCode::OK),
            Ok(outcome) => {
                debug!(?outcome, "GitHub notification handled");
                Ok(StatusCode::NO_CONTENT)
            }
            Err(e) => {
                warn!(error = %e, "GitHub notification rejected");
                Err(ApiError(e))
            }
        }
    }
    .instrument(span)
    .await
}

/// `POST /notification/jenkins`
///
/// Accepts either a JSON body or a form-encoded one; Jenkins' notification
/// plugin is known to send the JSON document as a form key.
pub async fn jenkins_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let event_id = EventId::new_random();
    let span = info_span!("jenkins_notification", event_id = %event_id);

    async move {
        let outcome = match decode_jenkins_body(&headers, &body) {
            Ok(body) => app_state.jenkins().handle(body).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(JenkinsOutcome::Skipped { phase }) => {
                debug!(phase = %phase, "Jenkins phase not relayed");
                Ok(StatusCode::NO_CONTENT)
            }
            Ok(JenkinsOutcome::StatusSent { status, delivered }) => {
                debug!(state = %status.state, delivered, "Jenkins notification handled");
                Ok(StatusCode::NO_CONTENT)
            }
            Err(e) => {
                warn!(error = %e, "Jenkins notification rejected");
                Err(ApiError(e))
            }
        }
    }
    .instrument(span)
    .await
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().starts_with(FORM_CONTENT_TYPE))
}

fn decode_jenkins_body(headers: &HeaderMap, body: &[u8]) -> Result<JenkinsBody, RelayError> {
    if is_form(headers) {
        let fields: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| RelayError::invalid_payload(format!("malformed form body: {e}")))?;
        Ok(JenkinsBody::Form(fields))
    } else {
        serde_json::from_slice(body)
            .map(JenkinsBody::Json)
            .map_err(|e| RelayError::invalid_payload(format!("malformed JSON body: {e}")))
    }
}
