// Shared test fixtures for integration tests
// Functions here are used across different test files
#![allow(dead_code)]

use git2::{Repository, RepositoryInitOptions, Signature};
use mds::config::{MappingsFile, ProjectMapping, ProjectMappings};
use mds::repository::Database;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Create an in-memory test database with the schema in place
pub async fn create_test_db() -> Database {
    let db = Database::new(":memory:").await.unwrap();
    db.init_schema().await.unwrap();
    db
}

/// Create a temporary git repository whose first branch is `master`
pub fn create_test_repo() -> (TempDir, PathBuf, Repository) {
    let dir = TempDir::new().unwrap();
    let repo_path = dir.path().to_path_buf();
    let repo = init_repo(&repo_path);
    (dir, repo_path, repo)
}

/// Initialise a repository at a given path (e.g. under a packages root)
pub fn init_repo(path: &Path) -> Repository {
    std::fs::create_dir_all(path).unwrap();
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("master");
    let repo = Repository::init_opts(path, &opts).unwrap();

    // Configure git user for commits
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test User").unwrap();
    config.set_str("user.email", "test@example.com").unwrap();
    repo
}

/// Write files, stage them and commit on HEAD
pub fn add_commit(repo: &Repository, files: &[(&str, &[u8])], message: &str) -> git2::Oid {
    let mut index = repo.index().unwrap();

    for (path, content) in files {
        let full_path = repo.workdir().unwrap().join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full_path, content).unwrap();
        index.add_path(Path::new(path)).unwrap();
    }

    commit_index(repo, &mut index, message)
}

/// Remove a file and commit on HEAD
pub fn remove_file_commit(repo: &Repository, path: &str, message: &str) -> git2::Oid {
    let full_path = repo.workdir().unwrap().join(path);
    if full_path.exists() {
        std::fs::remove_file(&full_path).unwrap();
    }

    let mut index = repo.index().unwrap();
    index.remove_path(Path::new(path)).unwrap();
    commit_index(repo, &mut index, message)
}

fn commit_index(repo: &Repository, index: &mut git2::Index, message: &str) -> git2::Oid {
    let sig = Signature::now("Test User", "test@example.com").unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents).unwrap()
}

/// Create a branch at HEAD and switch HEAD to it
pub fn checkout_new_branch(repo: &Repository, name: &str) {
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    repo.branch(name, &head, false).unwrap();
    repo.set_head(&format!("refs/heads/{}", name)).unwrap();
    repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force())).unwrap();
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// One `<package>` line of a manifest
pub fn package_line(name: &str, git: &str, commit: &str) -> String {
    format!(
        r#"  <package name="{}" git="{}" commit="{}" followbranch="master" vrev="1"/>"#,
        name, git, commit
    )
}

/// One `<link>` line of a manifest
pub fn link_line(target: &str, alias: &str) -> String {
    format!(r#"  <link from="{}" to="{}"/>"#, target, alias)
}

/// A manifest with one element per line and optional root attributes
pub fn manifest(root_attrs: &str, lines: &[String]) -> String {
    let mut out = if root_attrs.is_empty() {
        "<packages>\n".to_string()
    } else {
        format!("<packages {}>\n", root_attrs)
    };
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("</packages>\n");
    out
}

pub const PROJECT_META: &str = r#"<project name="Core">
  <title>Core</title>
  <description>Core packages</description>
</project>
"#;

/// Mapping of one project name to a repository, never reloaded
pub fn fixed_mappings(entries: &[(&str, &str, Option<&str>)]) -> Arc<ProjectMappings> {
    let mappings = entries
        .iter()
        .map(|(project, path, binaries)| ProjectMapping {
            project: project.to_string(),
            path: path.to_string(),
            binaries: binaries.map(str::to_string),
        })
        .collect();
    Arc::new(ProjectMappings::fixed(MappingsFile { mappings }))
}

/// Index every branch of the given repositories into a fresh cache
pub fn build_cache(paths: &[&str]) -> mds::model::MappingCache {
    use mds::repository::indexer::{MappingCacheBuilder, NoopProgress};
    use mds::repository::GitReader;

    let empty = mds::model::MappingCache::new();
    let builder = MappingCacheBuilder::new(&empty, &NoopProgress);
    let mut cache = mds::model::MappingCache::new();
    for path in paths {
        let reader = GitReader::open(path).unwrap();
        for branch in builder.index_repository(path, &reader).unwrap() {
            cache.extend_branch(&branch.repo, &branch.branch, branch.records).unwrap();
        }
    }
    cache
}

pub const PROJECT: &str = "Core:master:i586";

/// A working directory with one package repository, one project repository,
/// a mappings file and a binaries root:
///
/// ```text
/// packages-git/core/foo     two commits: foo.spec v1 then v2
/// obs-projects/Core         i586/{_config,_meta,packages.xml}
/// obs-repos/standard/i586   published build results
/// mappings.toml
/// ```
pub struct Fixture {
    pub dir: TempDir,
    pub packages_root: PathBuf,
    pub package_repo: Repository,
    pub package_path: String,
    pub package_commits: Vec<git2::Oid>,
    pub project_repo: Repository,
    pub project_path: String,
    pub binaries_root: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let packages_root = dir.path().join("packages-git");
        let package_dir = packages_root.join("core").join("foo");
        let package_repo = init_repo(&package_dir);
        let first = add_commit(
            &package_repo,
            &[("foo.spec", b"Name: foo\nVersion: 1\n"), ("foo.tar.gz", b"tarball"), ("_meta", b"<package/>")],
            "Initial import",
        );
        let second = add_commit(&package_repo, &[("foo.spec", b"Name: foo\nVersion: 2\n")], "Bump version");

        let project_dir = dir.path().join("obs-projects").join("Core");
        let project_repo = init_repo(&project_dir);
        let binaries_root = dir.path().join("obs-repos");
        std::fs::create_dir_all(binaries_root.join("standard").join("i586")).unwrap();

        let fixture = Self {
            packages_root,
            package_path: path_str(&package_dir),
            package_repo,
            package_commits: vec![first, second],
            project_path: path_str(&project_dir),
            project_repo,
            binaries_root,
            dir,
        };

        let manifest = fixture.manifest_with(&[
            fixture.foo_line(&second.to_string()),
            link_line("foo", "foo-alias"),
        ]);
        add_commit(
            &fixture.project_repo,
            &[
                ("i586/_config", b"Repotype: rpm-md\n"),
                ("i586/_meta", PROJECT_META.as_bytes()),
                ("i586/packages.xml", manifest.as_bytes()),
            ],
            "Add Core",
        );
        std::fs::write(fixture.mappings_path(), fixture.mappings_toml()).unwrap();
        fixture
    }

    pub fn foo_line(&self, commit: &str) -> String {
        package_line("foo", &self.package_path, commit)
    }

    pub fn manifest_with(&self, lines: &[String]) -> String {
        manifest(r#"disablei586="1""#, lines)
    }

    /// Commit a new `i586/packages.xml` to the project
    pub fn commit_manifest(&self, lines: &[String], message: &str) -> git2::Oid {
        let manifest = self.manifest_with(lines);
        add_commit(&self.project_repo, &[("i586/packages.xml", manifest.as_bytes())], message)
    }

    pub fn mappings_path(&self) -> PathBuf {
        self.dir.path().join("mappings.toml")
    }

    fn mappings_toml(&self) -> String {
        format!(
            "[[mapping]]\nproject = 'Core'\npath = '{}'\nbinaries = '{}'\n",
            self.project_path,
            self.binaries_root.display()
        )
    }

    pub fn mappings(&self) -> Arc<ProjectMappings> {
        let binaries = path_str(&self.binaries_root);
        fixed_mappings(&[("Core", &self.project_path, Some(&binaries))])
    }

    pub fn settings(&self) -> mds::config::Settings {
        mds::config::Settings::new(
            self.mappings_path(),
            self.packages_root.clone(),
            self.dir.path().join("cache").join("index.db"),
        )
        .with_poll_interval(std::time::Duration::from_millis(20))
    }

    /// Directory of one published repository/arch
    pub fn repository_dir(&self) -> PathBuf {
        self.binaries_root.join("standard").join("i586")
    }
}
