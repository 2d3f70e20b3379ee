//! Read side: turns stored events into display messages for polling clients.

use tracing::instrument;

use crate::{
    base::types::{ActivityMessage, EventKind, NormalizedEvent, Res},
    service::db::EventStore,
};

/// Maximum number of messages a single poll returns.
pub const POLL_LIMIT: usize = 10;

/// Stand-in for an absent author or branch.
const UNKNOWN: &str = "unknown";

/// Renders one event with its display template.
pub fn render(event: &NormalizedEvent) -> ActivityMessage {
    let author = event.author.as_deref().unwrap_or(UNKNOWN);
    let from_branch = event.from_branch.as_deref().unwrap_or(UNKNOWN);
    let to_branch = event.to_branch.as_deref().unwrap_or(UNKNOWN);
    let timestamp = &event.timestamp;

    let message = match event.event_type {
        EventKind::Push => format!("{author} pushed to {to_branch} on {timestamp}"),
        EventKind::PullRequest => format!("{author} submitted a pull request from {from_branch} to {to_branch} on {timestamp}"),
        EventKind::Merge => format!("{author} merged branch {from_branch} to {to_branch} on {timestamp}"),
    };

    ActivityMessage {
        message,
        timestamp: event.timestamp.clone(),
    }
}

/// The latest [`POLL_LIMIT`] events, oldest first.
///
/// Stateless: repeated calls return the same window until new events arrive.
#[instrument(skip_all)]
pub async fn latest_messages(store: &EventStore) -> Res<Vec<ActivityMessage>> {
    let events = store.recent(POLL_LIMIT).await?;
    Ok(events.iter().map(render).collect())
}

/// Up to [`POLL_LIMIT`] events newer than the caller's own cursor, oldest first.
#[instrument(skip(store))]
pub async fn messages_after(store: &EventStore, after: &str) -> Res<Vec<ActivityMessage>> {
    let events = store.since(after, POLL_LIMIT).await?;
    Ok(events.iter().map(render).collect())
}
