use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::archive::empty_archive;
use crate::util::{basename, unix_seconds};

use super::{xml, Api, Reply, Request};

/// `/build/{project}/{repo}/{arch}[/_repository|/{binary}]`
pub(super) async fn handle(api: &Api, parts: &[String], request: &Request) -> Result<Reply> {
    let [project, repo, arch, rest @ ..] = parts else {
        return Ok(Reply::not_found("Repository not found"));
    };

    if [repo, arch].iter().any(|s| s.contains('/') || *s == ".." || *s == ".") {
        return Ok(Reply::not_found("Repository not found"));
    }

    let mappings = api.mappings.get()?;
    let Some(root) = mappings.binaries_for(project) else {
        info!(project = %project, "404: no binaries for project");
        return Ok(Reply::not_found("Project not found"));
    };
    let target = Path::new(root).join(repo).join(arch);
    if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
        info!(target = %target.display(), "404: repository not found");
        return Ok(Reply::not_found("Repository not found"));
    }

    let mut binaries: Vec<String> = request.params("binary").map(str::to_string).collect();
    match rest {
        [] => {}
        [name] if name == "_repository" => {}
        [binary] => binaries.push(binary.clone()),
        _ => return Ok(Reply::not_found("File not found")),
    }

    match request.param("view").unwrap_or("names") {
        view @ ("cache" | "solvstate") => cached_view(&target, view).await,
        "cpio" => {
            let names: Vec<String> = binaries
                .iter()
                .map(|binary| format!("{}.rpm", basename(binary)))
                .collect();
            for name in &names {
                if !tokio::fs::try_exists(target.join(name)).await.unwrap_or(false) {
                    info!(target = %target.display(), binary = %name, "binary not found");
                }
            }
            let body = api.archiver.archive(&target, &names)?;
            Ok(Reply::body("application/x-cpio", body))
        }
        "names" => filtered_view(&target, "names", "binarylist", "filename", &binaries).await,
        "binaryversions" => {
            filtered_view(&target, "binaryversions", "binaryversionlist", "name", &binaries).await
        }
        other => Ok(Reply::not_found(&format!("Unknown view {}", other))),
    }
}

fn view_file(target: &Path, view: &str) -> PathBuf {
    target.join(format!("_repository?view={}", view))
}

/// The stored repository file for a view, or an empty archive
async fn cached_view(target: &Path, view: &str) -> Result<Reply> {
    let path = view_file(target, view);
    match tokio::fs::File::open(&path).await {
        Ok(file) => {
            let metadata = file.metadata().await?;
            let mtime = metadata.modified().map(unix_seconds).unwrap_or(0);
            Ok(Reply::file("application/octet-stream", file, metadata.len()).with_mtime(mtime))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(Reply::bytes("application/octet-stream", empty_archive()))
        }
        Err(e) => Err(e.into()),
    }
}

/// A stored listing narrowed to the requested binaries
async fn filtered_view(
    target: &Path,
    view: &str,
    root: &str,
    attr: &str,
    binaries: &[String],
) -> Result<Reply> {
    match tokio::fs::read_to_string(view_file(target, view)).await {
        Ok(listing) => Ok(Reply::xml(xml::filter_binaries(&listing, attr, binaries)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Reply::xml(xml::empty_listing(root)?)),
        Err(e) => Err(e.into()),
    }
}
