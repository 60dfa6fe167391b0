use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::model::MappingCache;
use crate::repository::{Database, Document};

use super::Cached;

/// Lazily loaded mapping cache
pub struct MappingCacheStore {
    db: Arc<Database>,
    state: Mutex<Option<Cached<MappingCache>>>,
}

impl MappingCacheStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db, state: Mutex::new(None) }
    }

    /// Current snapshot, reloaded if a refresh published a newer one
    pub async fn get(&self) -> Result<Arc<MappingCache>> {
        let mut state = self.state.lock().await;
        let generation = self.db.generation(Document::MappingCache).await?;
        if let Some(snapshot) = Cached::current(&*state, generation) {
            return Ok(snapshot);
        }

        let snapshot = Arc::new(self.db.load_mapping_cache().await?);
        if state.is_some() {
            info!(generation, revisions = snapshot.revision_count(), "mapping cache was updated, reloaded");
        }
        *state = Some(Cached { generation, snapshot: Arc::clone(&snapshot) });
        Ok(snapshot)
    }

    /// Drop the held snapshot and load the published one
    pub async fn refresh(&self) -> Result<Arc<MappingCache>> {
        self.state.lock().await.take();
        self.get().await
    }
}
