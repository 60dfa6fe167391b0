//! Index store trait for persistence abstraction
//!
//! Decouples the indexer from database implementation details.

use anyhow::Result;

use crate::model::{EventLog, MappingCache};

use super::types::IndexDelta;

/// Persistence layer for the mapping cache and event log
///
/// The indexer reads both documents before a refresh and publishes the
/// rows it derived afterwards.
#[allow(async_fn_in_trait)]
pub trait IndexStore {
    /// Load the mapping cache as last published
    async fn load_mapping_cache(&self) -> Result<MappingCache>;

    /// Load the event log as last published
    async fn load_event_log(&self) -> Result<EventLog>;

    /// Append a refresh result to both documents.
    ///
    /// Readers must observe either none or all of the delta.
    async fn publish(&self, delta: &IndexDelta) -> Result<()>;
}
