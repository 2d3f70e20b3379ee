//! This module handles storing webhook deliveries as normalized events.

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::{
    base::types::Res,
    interaction::normalize::{Normalization, normalize},
    service::db::EventStore,
};

/// Acknowledgement returned to the webhook sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Received,
    Ignored,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Received => "event received",
            IngestStatus::Ignored => "ignored",
        }
    }
}

/// Outcome of ingesting one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReceipt {
    pub status: IngestStatus,
    /// Records written to the store.
    pub stored: usize,
    /// Records dropped because the payload was malformed.
    pub rejected: usize,
}

/// Normalizes a delivery and persists every record it yields.
///
/// Malformed records are logged and skipped. Only store failures are returned as errors.
#[instrument(skip(store, payload))]
pub async fn ingest(store: &EventStore, event_type: Option<&str>, payload: Option<&Value>) -> Res<IngestReceipt> {
    let normalization = normalize(event_type, payload);

    let status = match &normalization {
        Normalization::Ignored(reason) => {
            debug!("Ignoring delivery ({:?}).", reason);
            IngestStatus::Ignored
        }
        Normalization::Unrecognized(event_type) => {
            info!("Dropping unrecognized event type `{}`.", event_type);
            IngestStatus::Received
        }
        Normalization::Accepted { .. } => IngestStatus::Received,
    };

    for err in normalization.rejected() {
        warn!("Skipping record: {}", err);
    }

    for event in normalization.events() {
        store.insert(event).await?;
    }

    let receipt = IngestReceipt {
        status,
        stored: normalization.events().len(),
        rejected: normalization.rejected().len(),
    };

    if receipt.stored > 0 {
        info!("Stored {} event(s).", receipt.stored);
    }

    Ok(receipt)
}
