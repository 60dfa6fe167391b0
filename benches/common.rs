// Shared benchmark helpers
// Functions here are used across different benchmark files
#![allow(dead_code)]

use git2::{Repository, RepositoryInitOptions, Signature};
use mds::config::{MappingsFile, ProjectMapping, ProjectMappings};
use mds::model::{content_hash, Event, EventLog, FileEntry, MappingCache, RevisionRecord};
use mds::repository::Database;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Create in-memory database for benchmarks
pub async fn setup_bench_db() -> Database {
    let db = Database::new(":memory:").await.unwrap();
    db.init_schema().await.unwrap();
    db
}

/// Create a git repository for benchmarks at `path`
pub fn create_bench_repo(path: &Path) -> Repository {
    std::fs::create_dir_all(path).unwrap();
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("master");
    let repo = Repository::init_opts(path, &opts).unwrap();

    // Configure git user for commits
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Bench User").unwrap();
    config.set_str("user.email", "bench@example.com").unwrap();
    repo
}

/// Add files and create a commit
pub fn add_commit(repo: &Repository, files: &[(&str, &[u8])], message: &str) -> git2::Oid {
    let sig = Signature::now("Bench User", "bench@example.com").unwrap();
    let mut index = repo.index().unwrap();

    for (path, content) in files {
        let full_path = repo.workdir().unwrap().join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full_path, content).unwrap();
        index.add_path(Path::new(path)).unwrap();
    }

    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());

    if let Some(parent) = parent {
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent]).unwrap()
    } else {
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[]).unwrap()
    }
}

/// A packages root of `<group>/<package>` repositories plus one project
/// repository listing every package
pub struct BenchTree {
    pub dir: TempDir,
    pub mappings: Arc<ProjectMappings>,
    pub packages: Vec<(String, Repository)>,
}

impl BenchTree {
    pub fn packages_root(&self) -> std::path::PathBuf {
        self.dir.path().join("packages-git")
    }
}

/// Generate `num_packages` package repositories with `commits` commits each
pub fn generate_tree(num_packages: usize, commits: usize) -> BenchTree {
    let dir = TempDir::new().unwrap();
    let mut packages = Vec::with_capacity(num_packages);
    let mut lines = Vec::with_capacity(num_packages);

    for i in 0..num_packages {
        let name = format!("pkg{}", i);
        let path = dir.path().join("packages-git").join(format!("group{}", i % 4)).join(&name);
        let repo = create_bench_repo(&path);

        let spec = format!("Name: {}\nVersion: 0\n", name);
        let mut tip = add_commit(
            &repo,
            &[
                (&format!("{}.spec", name), spec.as_bytes()),
                (&format!("{}.tar.gz", name), &vec![i as u8; 4096]),
                ("_meta", b"<package/>"),
            ],
            "Initial import",
        );
        for version in 1..commits {
            let spec = format!("Name: {}\nVersion: {}\n", name, version);
            tip = add_commit(&repo, &[(&format!("{}.spec", name), spec.as_bytes())], &format!("Version {}", version));
        }

        let git = path.to_string_lossy().into_owned();
        lines.push(format!(
            r#"  <package name="{}" git="{}" commit="{}" followbranch="master"/>"#,
            name, git, tip
        ));
        packages.push((git, repo));
    }

    let project_path = dir.path().join("obs-projects").join("Bench");
    let project = create_bench_repo(&project_path);
    let manifest = format!("<packages>\n{}\n</packages>\n", lines.join("\n"));
    add_commit(
        &project,
        &[
            ("_config", b"Repotype: rpm-md\n"),
            ("_meta", b"<project name=\"Bench\"/>\n"),
            ("packages.xml", manifest.as_bytes()),
        ],
        "Add project",
    );

    let mappings = Arc::new(ProjectMappings::fixed(MappingsFile {
        mappings: vec![ProjectMapping {
            project: "Bench".to_string(),
            path: project_path.to_string_lossy().into_owned(),
            binaries: None,
        }],
    }));

    BenchTree { dir, mappings, packages }
}

/// Generate a mapping cache of `num_repos` repositories with `revisions` each
pub fn generate_cache(num_repos: usize, revisions: u32) -> MappingCache {
    let mut cache = MappingCache::new();
    for repo in 0..num_repos {
        let records: Vec<RevisionRecord> = (1..=revisions)
            .map(|rev| {
                let spec = format!("repo {} rev {}", repo, rev);
                RevisionRecord::new(
                    format!("{:040x}", repo as u64 * 100_000 + rev as u64),
                    rev,
                    vec![
                        FileEntry::new("pkg.spec", content_hash(spec.as_bytes())),
                        FileEntry::new("pkg.tar.gz", content_hash(b"tarball")),
                    ],
                )
            })
            .collect();
        cache.extend_branch(&format!("packages-git/group/pkg{}", repo), "master", records).unwrap();
    }
    cache
}

/// Generate an event log of `num_events` events over 50 packages of 5 projects
pub fn generate_events(num_events: usize) -> EventLog {
    EventLog::from_events(
        (0..num_events)
            .map(|i| {
                let seq = i as u64 + 1;
                let project = format!("Project{}:master:", i % 5);
                if i % 10 == 0 {
                    Event::project(seq, project)
                } else {
                    Event::package(seq, project, format!("pkg{}", i % 50))
                }
            })
            .collect(),
    )
}
