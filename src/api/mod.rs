//! Wire protocol: request routing and replies
//!
//! Routes (optionally under `/public`):
//!
//! - `/source/{project}[/{package}[/{file}]]`
//! - `/build/{project}/{repo}/{arch}[/_repository|/{binary}]`
//! - `/lastevents`

mod build;
mod events;
mod reply;
mod source;
pub mod xml;

pub use reply::{Body, Reply};

use anyhow::Result;
use futures::FutureExt;
use percent_encoding::percent_decode_str;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info};

use crate::archive::Archiver;
use crate::cache::MappingCacheStore;
use crate::config::ProjectMappings;
use crate::query::EventQuery;
use crate::resolve::{ProjectResolver, ResolveError};

/// A parsed request: method, decoded path and form-decoded parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Request {
    /// Split a request target into path and query.
    ///
    /// A request body, when present, replaces the query string.
    pub fn new(method: &str, target: &str, body: Option<&[u8]>) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query.as_bytes()),
            None => (target, &[][..]),
        };
        let query = body.unwrap_or(query);
        Self {
            method: method.to_string(),
            path: path.to_string(),
            query: form_urlencoded::parse(query).into_owned().collect(),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new("GET", path, None)
    }

    /// First value of a parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn params<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Decoded path segments with the `/public` prefix removed
    pub fn segments(&self) -> Vec<String> {
        let path = match self.path.strip_prefix("/public") {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => self.path.as_str(),
        };
        path.split('/')
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
            .collect()
    }
}

/// Request handler shared by all connections
pub struct Api {
    mappings: Arc<ProjectMappings>,
    projects: ProjectResolver,
    mapping_cache: Arc<MappingCacheStore>,
    events: EventQuery,
    archiver: Arc<dyn Archiver>,
}

impl Api {
    pub fn new(
        mappings: Arc<ProjectMappings>,
        mapping_cache: Arc<MappingCacheStore>,
        events: EventQuery,
        archiver: Arc<dyn Archiver>,
    ) -> Self {
        Self {
            projects: ProjectResolver::new(Arc::clone(&mappings)),
            mappings,
            mapping_cache,
            events,
            archiver,
        }
    }

    /// Answer one request; faults and panics become a 500 for this request only
    pub async fn handle(&self, request: &Request) -> Reply {
        match AssertUnwindSafe(self.route(request)).catch_unwind().await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                error!(path = %request.path, error = %e, "request failed");
                Reply::error(500, "Internal Server Error")
            }
            Err(_) => {
                error!(path = %request.path, "request handler panicked");
                Reply::error(500, "Internal Server Error")
            }
        }
    }

    async fn route(&self, request: &Request) -> Result<Reply> {
        if request.method != "GET" && request.method != "HEAD" && request.method != "POST" {
            return Ok(Reply::error(405, "Method not allowed"));
        }

        let segments = request.segments();
        let Some((head, rest)) = segments.split_first() else {
            return Ok(Reply::not_found("Unsupported API"));
        };
        match head.as_str() {
            "source" => source::handle(self, rest, request).await,
            "build" => build::handle(self, rest, request).await,
            "lastevents" => events::handle(self, request).await,
            _ => {
                info!(path = %request.path, "unsupported API");
                Ok(Reply::not_found("Unsupported API"))
            }
        }
    }
}

/// 404 for resolution misses, errors for everything else
fn not_found_or_err(e: ResolveError) -> Result<Reply> {
    match e {
        ResolveError::NotFound(what) => {
            info!(%what, "404");
            Ok(Reply::not_found(&format!("{} not found", what)))
        }
        ResolveError::BrokenAliasChain(name) => {
            info!(package = %name, "404: link alias cycle");
            Ok(Reply::not_found(&format!("Broken link chain for {}", name)))
        }
        ResolveError::Internal(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_query() {
        let request = Request::get("/lastevents?start=3&filter=package%2FCore%3Amaster%3A%2Ffoo&filter=project/X");
        assert_eq!(request.path, "/lastevents");
        assert_eq!(request.param("start"), Some("3"));
        let filters: Vec<&str> = request.params("filter").collect();
        assert_eq!(filters, vec!["package/Core:master:/foo", "project/X"]);
    }

    #[test]
    fn test_body_replaces_query() {
        let request = Request::new("POST", "/lastevents?start=1", Some(b"start=5"));
        assert_eq!(request.param("start"), Some("5"));
    }

    #[test]
    fn test_segments_strip_public_and_decode() {
        let request = Request::get("/public/source/Core%3Amaster%3Ai586/foo");
        assert_eq!(request.segments(), vec!["source", "Core:master:i586", "foo"]);
        let request = Request::get("/publicity/x");
        assert_eq!(request.segments(), vec!["publicity", "x"]);
    }
}
