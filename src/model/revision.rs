use anyhow::{ensure, Result};
use md5::{Digest, Md5};
use std::collections::BTreeMap;

/// Tree entries that never take part in listings or fingerprints
pub const RESERVED_NAMES: [&str; 2] = ["_meta", "_attribute"];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// MD5 hex digest of a blob's bytes
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Content fingerprint (`srcmd5`) over entries already sorted by name.
///
/// Hashes the `"<md5>  <name>\n"` lines, so the value only depends on file
/// names and contents, never on the commit that carries them.
pub fn fingerprint(entries: &[FileEntry]) -> String {
    let mut hasher = Md5::new();
    for entry in entries {
        hasher.update(entry.md5.as_bytes());
        hasher.update(b"  ");
        hasher.update(entry.name.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// One file of a revision with its content hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub md5: String,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, md5: impl Into<String>) -> Self {
        Self { name: name.into(), md5: md5.into() }
    }
}

/// A cached revision of one branch: commit, revision number and fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRecord {
    pub commit: String,
    pub rev: u32,
    pub srcmd5: String,
    pub entries: Vec<FileEntry>,
}

impl RevisionRecord {
    /// Build a record, sorting entries by name and computing the fingerprint
    pub fn new(commit: impl Into<String>, rev: u32, mut entries: Vec<FileEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let srcmd5 = fingerprint(&entries);
        Self { commit: commit.into(), rev, srcmd5, entries }
    }

    /// Whether a selector names this revision by commit id, fingerprint or number
    pub fn matches(&self, selector: &str) -> bool {
        self.commit == selector || self.srcmd5 == selector || self.rev.to_string() == selector
    }

    pub fn entry_md5(&self, name: &str) -> Option<&str> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| self.entries[i].md5.as_str())
    }
}

/// In-memory snapshot of the mapping cache: repository -> branch -> revisions.
///
/// Revisions of a branch are stored in ascending order, so the record for
/// revision `n` sits at index `n - 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingCache {
    repos: BTreeMap<String, BTreeMap<String, Vec<RevisionRecord>>>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of revisions already cached for a branch
    pub fn seen(&self, repo: &str, branch: &str) -> usize {
        self.branch(repo, branch).len()
    }

    pub fn branch(&self, repo: &str, branch: &str) -> &[RevisionRecord] {
        self.repos
            .get(repo)
            .and_then(|branches| branches.get(branch))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Find a revision of a branch by selector, newest revision first
    pub fn find(&self, repo: &str, branch: &str, selector: &str) -> Option<&RevisionRecord> {
        self.branch(repo, branch)
            .iter()
            .rev()
            .find(|record| record.matches(selector))
    }

    /// Append revisions to the tip of a branch.
    ///
    /// Records must continue the branch numbering without gaps.
    pub fn extend_branch(
        &mut self,
        repo: &str,
        branch: &str,
        records: impl IntoIterator<Item = RevisionRecord>,
    ) -> Result<()> {
        let revisions = self
            .repos
            .entry(repo.to_string())
            .or_default()
            .entry(branch.to_string())
            .or_default();
        for record in records {
            ensure!(
                record.rev as usize == revisions.len() + 1,
                "revision {} of {}:{} does not follow revision {}",
                record.rev,
                repo,
                branch,
                revisions.len()
            );
            revisions.push(record);
        }
        Ok(())
    }

    /// Total number of cached revisions across all repositories
    pub fn revision_count(&self) -> usize {
        self.repos
            .values()
            .flat_map(|branches| branches.values())
            .map(Vec::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(commit: &str, rev: u32, files: &[(&str, &[u8])]) -> RevisionRecord {
        let entries = files
            .iter()
            .map(|(name, bytes)| FileEntry::new(*name, content_hash(bytes)))
            .collect();
        RevisionRecord::new(commit, rev, entries)
    }

    #[test]
    fn test_content_hash_is_md5() {
        assert_eq!(content_hash(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_fingerprint_ignores_commit_and_order() {
        let a = record("aaaa", 1, &[("foo.spec", b"spec"), ("foo.tar.gz", b"tar")]);
        let b = record("bbbb", 7, &[("foo.tar.gz", b"tar"), ("foo.spec", b"spec")]);
        assert_eq!(a.srcmd5, b.srcmd5);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = record("aaaa", 1, &[("foo.spec", b"spec")]);
        let b = record("aaaa", 1, &[("foo.spec", b"spec2")]);
        assert_ne!(a.srcmd5, b.srcmd5);
    }

    #[test]
    fn test_fingerprint_format() {
        let entries = vec![FileEntry::new("a", "0123")];
        assert_eq!(fingerprint(&entries), content_hash(b"0123  a\n"));
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved("_meta"));
        assert!(is_reserved("_attribute"));
        assert!(!is_reserved("_service"));
    }

    #[test]
    fn test_find_by_any_selector() {
        let mut cache = MappingCache::new();
        let r1 = record("c1", 1, &[("a", b"1")]);
        let r2 = record("c2", 2, &[("a", b"2")]);
        let srcmd5 = r1.srcmd5.clone();
        cache.extend_branch("repo", "master", vec![r1, r2]).unwrap();

        assert_eq!(cache.find("repo", "master", "c2").unwrap().rev, 2);
        assert_eq!(cache.find("repo", "master", "1").unwrap().commit, "c1");
        assert_eq!(cache.find("repo", "master", &srcmd5).unwrap().commit, "c1");
        assert!(cache.find("repo", "other", "c1").is_none());
    }

    #[test]
    fn test_find_prefers_newest_duplicate_content() {
        let mut cache = MappingCache::new();
        let r1 = record("c1", 1, &[("a", b"same")]);
        let r2 = record("c2", 2, &[("a", b"other")]);
        let r3 = record("c3", 3, &[("a", b"same")]);
        let srcmd5 = r1.srcmd5.clone();
        cache.extend_branch("repo", "master", vec![r1, r2, r3]).unwrap();

        assert_eq!(cache.find("repo", "master", &srcmd5).unwrap().commit, "c3");
    }

    #[test]
    fn test_extend_branch_rejects_gaps() {
        let mut cache = MappingCache::new();
        let result = cache.extend_branch("repo", "master", vec![record("c2", 2, &[])]);
        assert!(result.is_err());
        assert_eq!(cache.seen("repo", "master"), 0);
    }
}
