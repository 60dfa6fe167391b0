mod database;
pub mod indexer;
mod reader;

pub use database::{Database, Document, RevisionRow};
pub use indexer::{IndexStore, Indexer};
pub use reader::{BlobPath, GitReader, RepositoryReader, TreeEntry};

// Bump to discard and rebuild every persisted index
pub const SCHEMA_VERSION: &str = "1";
