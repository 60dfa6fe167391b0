use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::model::EventLog;
use crate::repository::{Database, Document};

use super::Cached;

/// Lazily loaded event log
pub struct EventLogStore {
    db: Arc<Database>,
    state: Mutex<Option<Cached<EventLog>>>,
}

impl EventLogStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db, state: Mutex::new(None) }
    }

    /// Current snapshot, reloaded if a refresh published a newer one
    pub async fn get(&self) -> Result<Arc<EventLog>> {
        let mut state = self.state.lock().await;
        let generation = self.db.generation(Document::EventLog).await?;
        if let Some(snapshot) = Cached::current(&*state, generation) {
            return Ok(snapshot);
        }

        let snapshot = Arc::new(self.db.load_event_log().await?);
        if state.is_some() {
            info!(generation, events = snapshot.len(), "event log was updated, reloaded");
        }
        *state = Some(Cached { generation, snapshot: Arc::clone(&snapshot) });
        Ok(snapshot)
    }

    pub async fn next_event(&self) -> Result<u64> {
        Ok(self.get().await?.next_event())
    }

    /// Drop the held snapshot and load the published one
    pub async fn refresh(&self) -> Result<Arc<EventLog>> {
        self.state.lock().await.take();
        self.get().await
    }
}
