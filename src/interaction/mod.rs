//! Webhook ingestion and activity polling.
//!
//! This module holds the logic behind the HTTP surface:
//! - Normalizing raw webhook payloads into event records
//! - Persisting those records
//! - Rendering recent records into display messages

pub mod ingest;
pub mod normalize;
pub mod poll;
