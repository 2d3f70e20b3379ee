//! Maps raw GitHub webhook payloads onto [`NormalizedEvent`] records.
//!
//! Field access goes through small serde structs with optional fields, so a
//! missing field is an explicit [`NormalizeError::MalformedPayload`] for the
//! record that needs it instead of a null leaking into storage. A field with
//! the wrong JSON type reads as missing; it never fails the whole payload.

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

use crate::base::types::{EventKind, NormalizedEvent};

// Types.

/// A record could not be built from the payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("malformed `{kind}` payload: {reason}")]
    MalformedPayload { kind: EventKind, reason: String },
}

impl NormalizeError {
    fn malformed(kind: EventKind, reason: impl Into<String>) -> Self {
        Self::MalformedPayload { kind, reason: reason.into() }
    }
}

/// Why a delivery produced nothing without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    MissingEventType,
    Ping,
    EmptyPayload,
}

/// Result of normalizing one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalization {
    /// Ping, missing header, or empty payload.
    Ignored(IgnoreReason),
    /// A header value other than `push` or `pull_request`.
    Unrecognized(String),
    /// A recognized event; each record either built or rejected on its own.
    Accepted { events: Vec<NormalizedEvent>, rejected: Vec<NormalizeError> },
}

impl Normalization {
    /// Records to persist; empty unless accepted.
    pub fn events(&self) -> &[NormalizedEvent] {
        match self {
            Normalization::Accepted { events, .. } => events,
            _ => &[],
        }
    }

    /// Records that failed to build.
    pub fn rejected(&self) -> &[NormalizeError] {
        match self {
            Normalization::Accepted { rejected, .. } => rejected,
            _ => &[],
        }
    }
}

// Payload shapes.

/// Reads a field as `None` when it is null or has an unexpected type.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    #[serde(default, deserialize_with = "lenient")]
    pusher: Option<Pusher>,
    #[serde(rename = "ref", default, deserialize_with = "lenient")]
    git_ref: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    head_commit: Option<HeadCommit>,
}

#[derive(Debug, Deserialize)]
struct Pusher {
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HeadCommit {
    #[serde(default, deserialize_with = "lenient")]
    timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PullRequestPayload {
    #[serde(default, deserialize_with = "lenient")]
    action: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pull_request: Option<PullRequest>,
}

#[derive(Debug, Default, Deserialize)]
struct PullRequest {
    #[serde(default, deserialize_with = "lenient")]
    user: Option<Account>,
    #[serde(default, deserialize_with = "lenient")]
    head: Option<Branch>,
    #[serde(default, deserialize_with = "lenient")]
    base: Option<Branch>,
    #[serde(default, deserialize_with = "lenient")]
    merged: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    merged_by: Option<Account>,
    #[serde(default, deserialize_with = "lenient")]
    merged_at: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    updated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(default, deserialize_with = "lenient")]
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Branch {
    #[serde(rename = "ref", default, deserialize_with = "lenient")]
    name: Option<String>,
}

impl PullRequest {
    fn author(&self) -> Option<String> {
        self.user.as_ref().and_then(|u| u.login.clone())
    }

    fn head_ref(&self) -> Option<String> {
        self.head.as_ref().and_then(|b| b.name.clone())
    }

    fn base_ref(&self) -> Option<String> {
        self.base.as_ref().and_then(|b| b.name.clone())
    }

    fn merger(&self) -> Option<String> {
        self.merged_by.as_ref().and_then(|u| u.login.clone())
    }
}

// Functions.

/// Normalizes one webhook delivery.
///
/// Yields zero records for ignored and unrecognized deliveries, one for a push
/// or pull request, and two for a pull request that was closed by merging.
pub fn normalize(event_type: Option<&str>, payload: Option<&Value>) -> Normalization {
    let Some(event_type) = event_type else {
        return Normalization::Ignored(IgnoreReason::MissingEventType);
    };

    if event_type == "ping" {
        return Normalization::Ignored(IgnoreReason::Ping);
    }

    let payload = match payload {
        Some(p) if p.as_object().is_some_and(|map| !map.is_empty()) => p,
        _ => return Normalization::Ignored(IgnoreReason::EmptyPayload),
    };

    let mut events = Vec::new();
    let mut rejected = Vec::new();

    match event_type {
        "push" => match push_event(payload) {
            Ok(event) => events.push(event),
            Err(err) => rejected.push(err),
        },
        "pull_request" => {
            for result in pull_request_events(payload) {
                match result {
                    Ok(event) => events.push(event),
                    Err(err) => rejected.push(err),
                }
            }
        }
        other => return Normalization::Unrecognized(other.to_string()),
    }

    Normalization::Accepted { events, rejected }
}

fn push_event(payload: &Value) -> Result<NormalizedEvent, NormalizeError> {
    let malformed = |reason: &str| NormalizeError::malformed(EventKind::Push, reason);

    let push = PushPayload::deserialize(payload).unwrap_or_default();

    let author = push.pusher.and_then(|p| p.name).ok_or_else(|| malformed("missing `pusher.name`"))?;
    let git_ref = push.git_ref.ok_or_else(|| malformed("missing `ref`"))?;
    let timestamp = push.head_commit.and_then(|c| c.timestamp).ok_or_else(|| malformed("missing `head_commit.timestamp`"))?;

    let to_branch = git_ref.rsplit('/').next().unwrap_or_default().to_string();

    Ok(NormalizedEvent {
        event_type: EventKind::Push,
        author: Some(author),
        from_branch: None,
        to_branch: Some(to_branch),
        action: None,
        merged: None,
        timestamp,
    })
}

/// The pull request record, followed by the merge record when the PR was closed by merging.
fn pull_request_events(payload: &Value) -> Vec<Result<NormalizedEvent, NormalizeError>> {
    let payload = PullRequestPayload::deserialize(payload).unwrap_or_default();

    let pr = payload.pull_request.unwrap_or_default();
    let merged = pr.merged.unwrap_or(false);
    let closed_by_merge = payload.action.as_deref() == Some("closed") && merged;

    let mut results = vec![pull_request_event(payload.action, &pr, merged)];

    if closed_by_merge {
        results.push(merge_event(&pr));
    }

    results
}

fn pull_request_event(action: Option<String>, pr: &PullRequest, merged: bool) -> Result<NormalizedEvent, NormalizeError> {
    let malformed = |reason: &str| NormalizeError::malformed(EventKind::PullRequest, reason);

    let timestamp = pr
        .updated_at
        .clone()
        .or_else(|| pr.created_at.clone())
        .ok_or_else(|| malformed("missing `pull_request.updated_at` and `pull_request.created_at`"))?;

    Ok(NormalizedEvent {
        event_type: EventKind::PullRequest,
        author: pr.author(),
        from_branch: pr.head_ref(),
        to_branch: pr.base_ref(),
        action,
        merged: Some(merged),
        timestamp,
    })
}

fn merge_event(pr: &PullRequest) -> Result<NormalizedEvent, NormalizeError> {
    let malformed = |reason: &str| NormalizeError::malformed(EventKind::Merge, reason);

    let author = pr.merger().ok_or_else(|| malformed("missing `pull_request.merged_by.login`"))?;
    let from_branch = pr.head_ref().ok_or_else(|| malformed("missing `pull_request.head.ref`"))?;
    let to_branch = pr.base_ref().ok_or_else(|| malformed("missing `pull_request.base.ref`"))?;
    let timestamp = pr.merged_at.clone().ok_or_else(|| malformed("missing `pull_request.merged_at`"))?;

    Ok(NormalizedEvent {
        event_type: EventKind::Merge,
        author: Some(author),
        from_branch: Some(from_branch),
        to_branch: Some(to_branch),
        action: None,
        merged: None,
        timestamp,
    })
}
