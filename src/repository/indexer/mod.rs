//! Repository indexer
//!
//! Extends the mapping cache and the event log from new commits.
//!
//! # Architecture
//!
//! - **types**: Data contract between builders and the store (deltas, sources)
//! - **mapping**: Per-revision content fingerprints of every branch
//! - **events**: Project/package events of project repositories
//! - **progress**: Progress reporting abstraction
//! - **store**: Persistence layer trait
//! - **db_store**: Database implementation of IndexStore
//! - **Indexer**: Refresh orchestrator (discover, build, publish)

mod db_store;
mod events;
mod mapping;
mod progress;
mod store;
mod types;

pub use events::EventLogBuilder;
pub use mapping::MappingCacheBuilder;
pub use progress::{IndicatifProgress, NoopProgress, ProgressHandle, ProgressReporter, ThresholdProgress};
pub use store::IndexStore;
pub use types::{BranchDelta, IndexDelta, MappingDelta, RefreshSummary, RepositorySource};

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ProjectMappings;
use crate::model::{EventLog, MappingCache};

use super::GitReader;

/// Discovers repositories and refreshes the index, one refresh at a time
pub struct Indexer {
    packages_root: PathBuf,
    mappings: Arc<ProjectMappings>,
    progress: Arc<dyn ProgressReporter>,
    lock: Mutex<()>,
}

impl Indexer {
    pub fn new(packages_root: impl Into<PathBuf>, mappings: Arc<ProjectMappings>) -> Self {
        Self {
            packages_root: packages_root.into(),
            mappings,
            progress: Arc::new(NoopProgress),
            lock: Mutex::new(()),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Package repositories (`<root>/*/*`) followed by mapped project repositories
    pub fn discover(&self) -> Result<Vec<RepositorySource>> {
        let mut sources = Vec::new();

        if self.packages_root.is_dir() {
            let mut paths = Vec::new();
            for group in read_dirs(&self.packages_root)? {
                paths.extend(read_dirs(&group)?);
            }
            paths.sort();
            sources.extend(
                paths
                    .into_iter()
                    .map(|p| RepositorySource::package(p.to_string_lossy().into_owned())),
            );
        } else {
            debug!(root = %self.packages_root.display(), "no packages root");
        }

        let mappings = self.mappings.get()?;
        for mapping in &mappings.mappings {
            match sources.iter_mut().find(|s| s.path == mapping.path) {
                Some(source) => source.project = Some(mapping.project.clone()),
                None => sources.push(RepositorySource::project(&mapping.path, &mapping.project)),
            }
        }

        let mut seen = FxHashSet::default();
        sources.retain(|s| seen.insert(s.path.clone()));
        Ok(sources)
    }

    /// Index new commits and publish them to the store
    pub async fn refresh(&self, store: &impl IndexStore) -> Result<RefreshSummary> {
        let _guard = self.lock.lock().await;
        let total_start = Instant::now();

        let phase_start = Instant::now();
        let sources = self.discover()?;
        let prior_cache = store.load_mapping_cache().await?;
        let prior_log = store.load_event_log().await?;
        debug!(
            repositories = sources.len(),
            revisions = prior_cache.revision_count(),
            events = prior_log.len(),
            elapsed = ?phase_start.elapsed(),
            "loaded prior index"
        );

        let phase_start = Instant::now();
        let progress = Arc::clone(&self.progress);
        let repositories = sources.len();
        let delta = tokio::task::spawn_blocking(move || {
            build(&sources, &prior_cache, &prior_log, progress.as_ref())
        })
        .await
        .context("Indexing task failed")?;
        debug!(elapsed = ?phase_start.elapsed(), "built index delta");

        let phase_start = Instant::now();
        store.publish(&delta).await?;
        debug!(elapsed = ?phase_start.elapsed(), "published index delta");

        let summary = RefreshSummary {
            repositories,
            revisions: delta.mapping.revision_count(),
            events: delta.events.len(),
        };
        info!(
            repositories = summary.repositories,
            revisions = summary.revisions,
            events = summary.events,
            elapsed = ?total_start.elapsed(),
            "refresh complete"
        );
        Ok(summary)
    }
}

/// Run both builders against the prior documents.
///
/// Project repositories are seeded from their branch tips while the prior
/// log is empty; afterwards only the commits the mapping builder just
/// indexed are scanned for events.
pub fn build(
    sources: &[RepositorySource],
    prior_cache: &MappingCache,
    prior_log: &EventLog,
    progress: &dyn ProgressReporter,
) -> IndexDelta {
    let mapping = MappingCacheBuilder::new(prior_cache, progress).rebuild(sources);

    let seed = prior_log.is_empty();
    let mut events = EventLogBuilder::new(prior_log);
    for source in sources {
        let Some(project) = source.project.as_deref() else { continue };
        let reader = match GitReader::open(&source.path) {
            Ok(reader) => reader,
            Err(e) => {
                warn!(project, repo = %source.path, error = %e, "skipping project repository");
                continue;
            }
        };

        let result = if seed {
            events.seed_repository(project, &reader)
        } else {
            mapping
                .for_repository(&source.path)
                .try_for_each(|branch| events.scan_commits(project, &branch.branch, &reader, &branch.commits()))
        };
        if let Err(e) = result {
            warn!(project, repo = %source.path, error = %e, "failed to derive events");
        }
    }

    IndexDelta { mapping, events: events.finish() }
}

fn read_dirs(dir: &std::path::Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let entries = std::fs::read_dir(dir).with_context(|| format!("Could not list {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}
