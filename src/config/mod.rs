mod mappings;

pub use mappings::{MappingsFile, ProjectMapping, ProjectMappings};

use std::path::PathBuf;
use std::time::Duration;

use crate::query::DEFAULT_POLL_INTERVAL;

/// Runtime settings of the service, relative to the working directory
#[derive(Debug, Clone)]
pub struct Settings {
    pub mappings_file: PathBuf,
    /// Directory whose `*/*` subdirectories are package repositories
    pub packages_root: PathBuf,
    pub index_path: PathBuf,
    pub poll_interval: Duration,
}

impl Settings {
    pub fn new(mappings_file: PathBuf, packages_root: PathBuf, index_path: PathBuf) -> Self {
        Self {
            mappings_file,
            packages_root,
            index_path,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
