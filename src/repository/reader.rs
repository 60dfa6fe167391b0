//! Read-only access to git repositories
//!
//! The indexer and resolvers only see the `RepositoryReader` trait; `GitReader`
//! implements it on top of libgit2.

use anyhow::{bail, Context, Result};
use git2::{
    BranchType, Commit, DiffFormat, DiffOptions, ErrorCode, ObjectType, Oid, Repository, Sort,
    TreeWalkMode, TreeWalkResult,
};
use std::path::Path;

/// A top-level entry of a commit's tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub oid: String,
    pub size: u64,
    pub is_blob: bool,
}

/// A blob found anywhere in a tree; `dir` is empty at the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPath {
    pub dir: String,
    pub name: String,
    pub oid: String,
}

/// Version-control primitives needed to index and serve a repository.
///
/// Revisions (`rev`) may be a full commit id or a local branch name.
pub trait RepositoryReader {
    /// Local branch names, sorted
    fn branches(&self) -> Result<Vec<String>>;

    /// Commit ids reachable from a branch tip, tip first
    fn history(&self, branch: &str) -> Result<Vec<String>>;

    /// Committer timestamp of a revision
    fn commit_time(&self, rev: &str) -> Result<i64>;

    /// Entries directly under the root tree of a revision
    fn tree_entries(&self, rev: &str) -> Result<Vec<TreeEntry>>;

    /// Every blob of a revision's tree, in pre-order
    fn walk_blobs(&self, rev: &str) -> Result<Vec<BlobPath>>;

    fn read_blob(&self, oid: &str) -> Result<Vec<u8>>;

    /// Bytes of the blob at `path`, or `None` if there is no blob there
    fn read_path(&self, rev: &str, path: &str) -> Result<Option<Vec<u8>>>;

    /// Paths added, modified or deleted by a commit relative to its first parent
    fn changed_paths(&self, commit: &str) -> Result<Vec<String>>;

    /// Lines a commit removed from one file, relative to its first parent.
    ///
    /// Fails for commits without a parent.
    fn removed_lines(&self, commit: &str, path: &str) -> Result<Vec<String>>;
}

/// libgit2-backed reader
pub struct GitReader {
    repo: Repository,
}

impl GitReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path)
            .with_context(|| format!("Failed to open git repository {}", path.display()))?;
        Ok(Self { repo })
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        self.repo.find_branch(branch, BranchType::Local).is_ok()
    }

    fn commit(&self, rev: &str) -> Result<Commit<'_>> {
        if let Ok(oid) = Oid::from_str(rev) {
            if let Ok(commit) = self.repo.find_commit(oid) {
                return Ok(commit);
            }
        }
        if let Ok(branch) = self.repo.find_branch(rev, BranchType::Local) {
            return Ok(branch.get().peel_to_commit()?);
        }
        let object = self
            .repo
            .revparse_single(rev)
            .with_context(|| format!("Unknown revision {}", rev))?;
        Ok(object.peel_to_commit()?)
    }
}

impl RepositoryReader for GitReader {
    fn branches(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for branch in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn history(&self, branch: &str) -> Result<Vec<String>> {
        let tip = self.commit(branch)?.id();
        let mut walk = self.repo.revwalk()?;
        // Sorting resets the walker, so it must precede push
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(tip)?;
        walk.map(|oid| Ok(oid?.to_string())).collect()
    }

    fn commit_time(&self, rev: &str) -> Result<i64> {
        Ok(self.commit(rev)?.time().seconds())
    }

    fn tree_entries(&self, rev: &str) -> Result<Vec<TreeEntry>> {
        let tree = self.commit(rev)?.tree()?;
        let odb = self.repo.odb()?;
        let mut entries = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            let Some(name) = entry.name() else { continue };
            let is_blob = entry.kind() == Some(ObjectType::Blob);
            let size = if is_blob { odb.read_header(entry.id())?.0 as u64 } else { 0 };
            entries.push(TreeEntry {
                name: name.to_string(),
                oid: entry.id().to_string(),
                size,
                is_blob,
            });
        }
        Ok(entries)
    }

    fn walk_blobs(&self, rev: &str) -> Result<Vec<BlobPath>> {
        let tree = self.commit(rev)?.tree()?;
        let mut blobs = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    blobs.push(BlobPath {
                        dir: dir.trim_end_matches('/').to_string(),
                        name: name.to_string(),
                        oid: entry.id().to_string(),
                    });
                }
            }
            TreeWalkResult::Ok
        })?;
        Ok(blobs)
    }

    fn read_blob(&self, oid: &str) -> Result<Vec<u8>> {
        let oid = Oid::from_str(oid)?;
        Ok(self.repo.find_blob(oid)?.content().to_vec())
    }

    fn read_path(&self, rev: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let tree = self.commit(rev)?.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }
        Ok(Some(self.repo.find_blob(entry.id())?.content().to_vec()))
    }

    fn changed_paths(&self, commit: &str) -> Result<Vec<String>> {
        let commit = self.commit(commit)?;
        let tree = commit.tree()?;
        let parent_tree = if commit.parent_count() > 0 {
            Some(commit.parent(0)?.tree()?)
        } else {
            None
        };
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
        Ok(diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().into_owned())
            })
            .collect())
    }

    fn removed_lines(&self, commit: &str, path: &str) -> Result<Vec<String>> {
        let commit = self.commit(commit)?;
        if commit.parent_count() == 0 {
            bail!("commit {} has no parent to diff against", commit.id());
        }
        let parent_tree = commit.parent(0)?.tree()?;
        let tree = commit.tree()?;

        let mut opts = DiffOptions::new();
        opts.pathspec(path).disable_pathspec_match(true);
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&parent_tree), Some(&tree), Some(&mut opts))?;

        let mut lines = Vec::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if line.origin() == '-' {
                let text = String::from_utf8_lossy(line.content());
                lines.push(text.trim_end_matches(['\r', '\n']).to_string());
            }
            true
        })?;
        Ok(lines)
    }
}
