use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{NormalizedEvent, Res, Void};

pub mod surreal;

// Types.

/// Direction in which records are sorted by `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A time-ordered read against the event store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    /// Sort direction on `timestamp`.
    pub order: SortOrder,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Only records with `timestamp` strictly greater than this.
    pub after: Option<String>,
}

impl EventQuery {
    /// Every record newer than `after`, oldest first.
    pub fn since(after: impl Into<String>) -> Self {
        Self {
            order: SortOrder::Ascending,
            limit: None,
            after: Some(after.into()),
        }
    }

    /// The `limit` newest records, newest first.
    pub fn newest(limit: usize) -> Self {
        Self {
            order: SortOrder::Descending,
            limit: Some(limit),
            after: None,
        }
    }

    /// Caps the number of returned records.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// Traits.

/// Generic event store trait that backends must implement.
///
/// The store is append-only: no uniqueness constraint, no upsert, no delete.
/// Implementations must tolerate concurrent inserts and reads.
#[async_trait]
pub trait GenericEventStore: Send + Sync + 'static {
    /// Appends a record.
    async fn insert(&self, event: &NormalizedEvent) -> Void;

    /// Returns records sorted by `timestamp` according to the query.
    async fn query(&self, query: &EventQuery) -> Res<Vec<NormalizedEvent>>;
}

// Structs.

/// Event store for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct EventStore {
    inner: Arc<dyn GenericEventStore>,
}

impl Deref for EventStore {
    type Target = dyn GenericEventStore;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl EventStore {
    pub fn new(inner: Arc<dyn GenericEventStore>) -> Self {
        Self { inner }
    }

    /// The `limit` most recent records, returned oldest first.
    pub async fn recent(&self, limit: usize) -> Res<Vec<NormalizedEvent>> {
        let mut events = self.query(&EventQuery::newest(limit)).await?;
        events.reverse();

        Ok(events)
    }

    /// Up to `limit` records strictly newer than `after`, oldest first.
    pub async fn since(&self, after: &str, limit: usize) -> Res<Vec<NormalizedEvent>> {
        self.query(&EventQuery::since(after).with_limit(limit)).await
    }
}
