use anyhow::Result;
use std::sync::Arc;
use tokio::task::spawn_blocking;

use crate::model::{PackageSelector, BUILD_CONFIG_NAME, META_NAME};
use crate::resolve::PackageResolver;

use super::{not_found_or_err, xml, Api, Reply, Request};

/// `/source/{project}[/{package}[/{file}]]`
pub(super) async fn handle(api: &Api, parts: &[String], request: &Request) -> Result<Reply> {
    let Some((project_id, rest)) = parts.split_first() else {
        return Ok(Reply::not_found("Project not found"));
    };

    // Git reads run on the blocking pool
    let projects = api.projects.clone();
    let identifier = project_id.clone();
    let project = match spawn_blocking(move || projects.resolve(&identifier)).await? {
        Ok(project) => Arc::new(project),
        Err(e) => return not_found_or_err(e),
    };

    // `expand` is accepted and ignored: links are served under their own names
    let selector = PackageSelector::parse(request.param("rev"));

    match rest {
        [] => Ok(Reply::xml(xml::project_directory(&project.manifest)?)),
        [file] if file == BUILD_CONFIG_NAME => {
            Ok(Reply::bytes("text/plain", project.build_config.clone()))
        }
        [file] if file == META_NAME => Ok(Reply::xml(project.meta.clone())),
        [file] if file == "_pubkey" || file == "_pattern" => {
            Ok(Reply::not_found(&format!("{} not found", file)))
        }
        [package] => {
            let cache = api.mapping_cache.get().await?;
            let package = package.clone();
            let index = spawn_blocking(move || {
                PackageResolver::new(&project, &cache).package_index(&package, &selector)
            })
            .await?;
            match index {
                Ok(index) => Ok(Reply::xml(xml::package_directory(&index)?)),
                Err(e) => not_found_or_err(e),
            }
        }
        [package, file] => {
            let cache = api.mapping_cache.get().await?;
            let (package, file) = (package.clone(), file.clone());
            let bytes = spawn_blocking(move || {
                PackageResolver::new(&project, &cache).read_file(&package, &file, &selector)
            })
            .await?;
            match bytes {
                Ok(bytes) => Ok(Reply::bytes("application/octet-stream", bytes)),
                Err(e) => not_found_or_err(e),
            }
        }
        _ => Ok(Reply::not_found("File not found")),
    }
}
