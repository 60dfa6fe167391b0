//! Domain types for indexing
//!
//! These types form the data contract between the builders and the store.

use crate::model::{Event, RevisionRecord};

/// A repository to index, keyed by its path exactly as discovered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySource {
    pub path: String,
    /// Logical project name when the repository is a project source
    pub project: Option<String>,
}

impl RepositorySource {
    pub fn package(path: impl Into<String>) -> Self {
        Self { path: path.into(), project: None }
    }

    pub fn project(path: impl Into<String>, project: impl Into<String>) -> Self {
        Self { path: path.into(), project: Some(project.into()) }
    }
}

/// Revisions newly indexed for one branch, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchDelta {
    pub repo: String,
    pub branch: String,
    pub records: Vec<RevisionRecord>,
}

impl BranchDelta {
    /// Commit ids of the new revisions, oldest to newest
    pub fn commits(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.commit.as_str()).collect()
    }
}

/// Everything a mapping cache rebuild adds to the prior cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingDelta {
    pub branches: Vec<BranchDelta>,
}

impl MappingDelta {
    pub fn revision_count(&self) -> usize {
        self.branches.iter().map(|b| b.records.len()).sum()
    }

    pub fn for_repository<'a>(&'a self, repo: &'a str) -> impl Iterator<Item = &'a BranchDelta> {
        self.branches.iter().filter(move |b| b.repo == repo)
    }
}

/// The result of one refresh: rows to append to both documents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDelta {
    pub mapping: MappingDelta,
    pub events: Vec<Event>,
}

impl IndexDelta {
    pub fn is_empty(&self) -> bool {
        self.mapping.branches.is_empty() && self.events.is_empty()
    }
}

/// Counters reported after a refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub repositories: usize,
    pub revisions: usize,
    pub events: usize,
}
