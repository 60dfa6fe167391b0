//! Service wiring: database, documents, indexer and request handler

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::Api;
use crate::archive::{Archiver, CpioArchiver};
use crate::cache::{EventLogStore, MappingCacheStore};
use crate::config::{ProjectMappings, Settings};
use crate::query::EventQuery;
use crate::repository::indexer::{ProgressReporter, RefreshSummary};
use crate::repository::{Database, Indexer};

pub struct App {
    settings: Settings,
    db: Arc<Database>,
    mappings: Arc<ProjectMappings>,
    mapping_cache: Arc<MappingCacheStore>,
    event_log: Arc<EventLogStore>,
    indexer: Indexer,
    shutdown: CancellationToken,
}

impl App {
    /// Open (or recreate) the index described by `settings`
    pub async fn open(settings: Settings, progress: Arc<dyn ProgressReporter>) -> Result<Self> {
        info!(index = %settings.index_path.display(), "using index");
        let db = Arc::new(Database::open(&settings.index_path).await?);
        let mappings = Arc::new(ProjectMappings::new(&settings.mappings_file));
        let indexer = Indexer::new(&settings.packages_root, Arc::clone(&mappings)).with_progress(progress);

        Ok(Self {
            mapping_cache: Arc::new(MappingCacheStore::new(Arc::clone(&db))),
            event_log: Arc::new(EventLogStore::new(Arc::clone(&db))),
            settings,
            db,
            mappings,
            indexer,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Index new commits and swap in the published documents
    pub async fn refresh(&self) -> Result<RefreshSummary> {
        let summary = self.indexer.refresh(self.db.as_ref()).await?;
        self.mapping_cache.refresh().await?;
        self.event_log.refresh().await?;
        Ok(summary)
    }

    /// Load every document once so the first requests do not pay for it
    pub async fn warm(&self) -> Result<()> {
        let mappings = self.mappings.get()?;
        let cache = self.mapping_cache.get().await?;
        let log = self.event_log.get().await?;
        info!(
            projects = mappings.mappings.len(),
            revisions = cache.revision_count(),
            events = log.len(),
            "cache primed"
        );
        Ok(())
    }

    pub fn api(&self) -> Api {
        self.api_with_archiver(Arc::new(CpioArchiver::default()))
    }

    pub fn api_with_archiver(&self, archiver: Arc<dyn Archiver>) -> Api {
        let events = EventQuery::new(
            Arc::clone(&self.event_log),
            self.settings.poll_interval,
            self.shutdown.clone(),
        );
        Api::new(Arc::clone(&self.mappings), Arc::clone(&self.mapping_cache), events, archiver)
    }
}
