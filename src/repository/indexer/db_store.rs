//! Database implementation of IndexStore

use anyhow::Result;

use crate::model::{EventLog, MappingCache};
use crate::repository::{Database, RevisionRow};

use super::store::IndexStore;
use super::types::IndexDelta;

impl IndexStore for Database {
    async fn load_mapping_cache(&self) -> Result<MappingCache> {
        Database::load_mapping_cache(self).await
    }

    async fn load_event_log(&self) -> Result<EventLog> {
        Database::load_event_log(self).await
    }

    async fn publish(&self, delta: &IndexDelta) -> Result<()> {
        if delta.is_empty() {
            return Ok(());
        }

        let rows: Vec<RevisionRow<'_>> = delta
            .mapping
            .branches
            .iter()
            .flat_map(|branch| {
                branch
                    .records
                    .iter()
                    .map(move |record| RevisionRow::new(&branch.repo, &branch.branch, record))
            })
            .collect();

        self.apply_refresh(&rows, &delta.events).await
    }
}
