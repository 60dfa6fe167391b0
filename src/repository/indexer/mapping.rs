//! Incremental mapping cache builder
//!
//! Revision `n` of a branch is the `n`-th commit counted from the root of a
//! topological walk, so the tip of a branch with `N` commits is revision `N`.
//! Only commits above the already-cached count are hashed.

use anyhow::Result;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::model::{content_hash, is_reserved, FileEntry, MappingCache, RevisionRecord};
use crate::repository::{GitReader, RepositoryReader};

use super::progress::ProgressReporter;
use super::types::{BranchDelta, MappingDelta, RepositorySource};

pub struct MappingCacheBuilder<'a> {
    prior: &'a MappingCache,
    progress: &'a dyn ProgressReporter,
}

impl<'a> MappingCacheBuilder<'a> {
    pub fn new(prior: &'a MappingCache, progress: &'a dyn ProgressReporter) -> Self {
        Self { prior, progress }
    }

    /// New revisions of every branch of every repository
    pub fn rebuild(&self, sources: &[RepositorySource]) -> MappingDelta {
        let mut delta = MappingDelta::default();
        for source in sources {
            let reader = match GitReader::open(&source.path) {
                Ok(reader) => reader,
                Err(e) => {
                    warn!(repo = %source.path, error = %e, "skipping repository");
                    continue;
                }
            };
            match self.index_repository(&source.path, &reader) {
                Ok(branches) => delta.branches.extend(branches),
                Err(e) => warn!(repo = %source.path, error = %e, "failed to index repository"),
            }
        }
        delta
    }

    pub fn index_repository(
        &self,
        repo: &str,
        reader: &impl RepositoryReader,
    ) -> Result<Vec<BranchDelta>> {
        let mut hashes = BlobHashes::default();
        let mut branches = Vec::new();
        for branch in reader.branches()? {
            if let Some(delta) = self.index_branch(repo, &branch, reader, &mut hashes)? {
                branches.push(delta);
            }
        }
        Ok(branches)
    }

    fn index_branch(
        &self,
        repo: &str,
        branch: &str,
        reader: &impl RepositoryReader,
        hashes: &mut BlobHashes,
    ) -> Result<Option<BranchDelta>> {
        let history = reader.history(branch)?;
        let total = history.len();
        let seen = self.prior.seen(repo, branch);

        if seen == total {
            debug!(repo, branch, revisions = total, "no new revisions");
            return Ok(None);
        }
        if seen > total {
            warn!(repo, branch, cached = seen, commits = total, "branch history shrank, leaving cache untouched");
            return Ok(None);
        }

        debug!(repo, branch, cached = seen, commits = total, "indexing new revisions");
        let pb = self.progress.start(&format!("{} {}", repo, branch), (total - seen) as u64);

        // Tip first: position 0 is revision `total`
        let mut records = Vec::with_capacity(total - seen);
        for (position, commit) in history.iter().take(total - seen).enumerate() {
            let rev = (total - position) as u32;
            records.push(snapshot_revision(reader, commit, rev, hashes)?);
            pb.inc(1);
        }
        pb.finish();

        records.reverse();
        Ok(Some(BranchDelta {
            repo: repo.to_string(),
            branch: branch.to_string(),
            records,
        }))
    }
}

/// Blob id -> content hash, shared by all branches of one repository
#[derive(Default)]
struct BlobHashes(FxHashMap<String, String>);

impl BlobHashes {
    fn get_or_hash(&mut self, reader: &impl RepositoryReader, oid: &str) -> Result<String> {
        if let Some(md5) = self.0.get(oid) {
            return Ok(md5.clone());
        }
        let md5 = content_hash(&reader.read_blob(oid)?);
        self.0.insert(oid.to_string(), md5.clone());
        Ok(md5)
    }
}

/// Fingerprint of one commit's top-level files.
///
/// Subdirectories and reserved names are left out; `list_entries` applies
/// the same rule, so listings and fingerprints always agree.
fn snapshot_revision(
    reader: &impl RepositoryReader,
    commit: &str,
    rev: u32,
    hashes: &mut BlobHashes,
) -> Result<RevisionRecord> {
    let mut entries = Vec::new();
    for entry in reader.tree_entries(commit)? {
        if !entry.is_blob || is_reserved(&entry.name) {
            continue;
        }
        let md5 = hashes.get_or_hash(reader, &entry.oid)?;
        entries.push(FileEntry::new(entry.name, md5));
    }
    Ok(RevisionRecord::new(commit, rev, entries))
}
