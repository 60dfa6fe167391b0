mod event;
mod manifest;
mod project;
mod revision;

pub use event::{Event, EventFilter, EventKind, EventLog};
pub use manifest::{parse_fragment, LinkEntry, PackageEntry, PackageManifest, MANIFEST_NAME};
pub use project::{project_id, PackageSelector, Project, BUILD_CONFIG_NAME, META_NAME};
pub use revision::{
    content_hash, fingerprint, is_reserved, FileEntry, MappingCache, RevisionRecord, RESERVED_NAMES,
};
