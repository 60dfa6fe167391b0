//! Change event derivation for project repositories

use anyhow::Result;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::model::{
    parse_fragment, project_id, Event, EventLog, PackageManifest, BUILD_CONFIG_NAME,
    MANIFEST_NAME, META_NAME,
};
use crate::repository::{BlobPath, RepositoryReader};
use crate::util::split_path;

/// Appends events after a prior log, numbering from its `next_event`
pub struct EventLogBuilder {
    next: u64,
    events: Vec<Event>,
}

impl EventLogBuilder {
    pub fn new(prior: &EventLog) -> Self {
        Self { next: prior.next_event(), events: Vec::new() }
    }

    pub fn finish(self) -> Vec<Event> {
        self.events
    }

    fn push_project(&mut self, project: String) {
        self.events.push(Event::project(self.next, project));
        self.next += 1;
    }

    fn push_package(&mut self, project: String, package: impl Into<String>) {
        self.events.push(Event::package(self.next, project, package));
        self.next += 1;
    }

    /// Announce everything at the tip of every branch
    pub fn seed_repository(&mut self, name: &str, reader: &impl RepositoryReader) -> Result<()> {
        for branch in reader.branches()? {
            self.seed_branch(name, &branch, reader)?;
        }
        Ok(())
    }

    fn seed_branch(&mut self, name: &str, branch: &str, reader: &impl RepositoryReader) -> Result<()> {
        let blobs = reader.walk_blobs(branch)?;

        for (dir, level) in group_by_dir(&blobs) {
            let project = project_id(name, branch, dir);
            if level.iter().any(|b| b.name == BUILD_CONFIG_NAME || b.name == META_NAME) {
                self.push_project(project.clone());
            }
            let Some(manifest) = level.iter().find(|b| b.name == MANIFEST_NAME) else {
                continue;
            };
            let bytes = reader.read_blob(&manifest.oid)?;
            match PackageManifest::parse(&String::from_utf8_lossy(&bytes)) {
                Ok(manifest) => {
                    for package in manifest.names() {
                        self.push_package(project.clone(), package);
                    }
                }
                Err(e) => warn!(project = %project, error = %e, "unreadable package manifest"),
            }
        }
        Ok(())
    }

    /// Derive events from commits of one branch, given oldest first
    pub fn scan_commits(
        &mut self,
        name: &str,
        branch: &str,
        reader: &impl RepositoryReader,
        commits: &[&str],
    ) -> Result<()> {
        for commit in commits {
            for path in reader.changed_paths(commit)? {
                let (dir, file) = split_path(&path);
                match file {
                    BUILD_CONFIG_NAME | META_NAME => self.push_project(project_id(name, branch, dir)),
                    MANIFEST_NAME => self.scan_manifest_change(name, branch, reader, commit, &path),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn scan_manifest_change(
        &mut self,
        name: &str,
        branch: &str,
        reader: &impl RepositoryReader,
        commit: &str,
        path: &str,
    ) {
        let lines = match reader.removed_lines(commit, path) {
            Ok(lines) => lines,
            Err(e) => {
                debug!(commit, path, error = %e, "manifest diff unavailable, skipped");
                return;
            }
        };
        let project = project_id(name, branch, split_path(path).0);
        for package in lines.iter().filter_map(|line| parse_fragment(line)) {
            self.push_package(project.clone(), package);
        }
    }
}

/// Blobs grouped by directory, directories in first-seen order
fn group_by_dir(blobs: &[BlobPath]) -> Vec<(&str, Vec<&BlobPath>)> {
    let mut levels: Vec<(&str, Vec<&BlobPath>)> = Vec::new();
    let mut index: FxHashMap<&str, usize> = FxHashMap::default();
    for blob in blobs {
        let slot = *index.entry(blob.dir.as_str()).or_insert_with(|| {
            levels.push((blob.dir.as_str(), Vec::new()));
            levels.len() - 1
        });
        levels[slot].1.push(blob);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(dir: &str, name: &str) -> BlobPath {
        BlobPath { dir: dir.to_string(), name: name.to_string(), oid: String::new() }
    }

    #[test]
    fn test_group_by_dir_keeps_walk_order() {
        let blobs = vec![blob("", "_meta"), blob("i586", "_config"), blob("", "README"), blob("i586", "_meta")];
        let groups = group_by_dir(&blobs);
        let dirs: Vec<&str> = groups.iter().map(|(d, _)| *d).collect();
        assert_eq!(dirs, vec!["", "i586"]);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].1.len(), 2);
    }

    #[test]
    fn test_numbering_continues_prior_log() {
        let prior = EventLog::from_events(vec![Event::project(1, "Core:master:"), Event::project(2, "Core:master:")]);
        let mut builder = EventLogBuilder::new(&prior);
        builder.push_package("Core:master:".to_string(), "foo");
        assert_eq!(builder.finish(), vec![Event::package(3, "Core:master:", "foo")]);
    }
}
