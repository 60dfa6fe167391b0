//! Project and package resolution on top of the mapping cache

mod package;
mod project;

pub use package::{list_entries, ListedEntry, PackageIndex, PackageResolver, ResolvedRevision};
pub use project::{rewrite_project_name, ProjectResolver};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("link aliases of {0} form a cycle")]
    BrokenAliasChain(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ResolveResult<T> = Result<T, ResolveError>;
