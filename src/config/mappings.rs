//! Project mapping file
//!
//! ```toml
//! [[mapping]]
//! project = "Core"
//! path = "obs-projects/Core"
//! binaries = "obs-repos"
//! ```

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::info;

/// One logical project backed by a git repository
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectMapping {
    pub project: String,
    /// Path of the project git repository
    pub path: String,
    /// Root directory of published build results
    #[serde(default)]
    pub binaries: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MappingsFile {
    #[serde(default, rename = "mapping")]
    pub mappings: Vec<ProjectMapping>,
}

impl MappingsFile {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid project mappings")
    }

    pub fn project(&self, name: &str) -> Option<&ProjectMapping> {
        self.mappings.iter().find(|m| m.project == name)
    }

    /// Binaries root for a project identifier, tried in full and then by its
    /// first `:` component
    pub fn binaries_for(&self, identifier: &str) -> Option<&str> {
        let lookup = |name: &str| self.project(name).and_then(|m| m.binaries.as_deref());
        lookup(identifier).or_else(|| {
            let first = identifier.split(':').next()?;
            lookup(first)
        })
    }
}

/// The mapping file, reparsed whenever its modification time changes
pub struct ProjectMappings {
    path: PathBuf,
    state: Mutex<Option<(Option<SystemTime>, Arc<MappingsFile>)>>,
}

impl ProjectMappings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), state: Mutex::new(None) }
    }

    /// Mappings fixed at construction, never reloaded
    pub fn fixed(file: MappingsFile) -> Self {
        Self {
            path: PathBuf::new(),
            state: Mutex::new(Some((None, Arc::new(file)))),
        }
    }

    /// Current snapshot; a missing file reads as no mappings
    pub fn get(&self) -> Result<Arc<MappingsFile>> {
        let mut state = self.state.lock();
        if self.path.as_os_str().is_empty() {
            if let Some((_, file)) = state.as_ref() {
                return Ok(Arc::clone(file));
            }
        }

        let mtime = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        if let Some((seen, file)) = state.as_ref() {
            if *seen == mtime {
                return Ok(Arc::clone(file));
            }
        }

        let file = match mtime {
            Some(_) => {
                let text = std::fs::read_to_string(&self.path)
                    .with_context(|| format!("Could not read {}", self.path.display()))?;
                MappingsFile::parse(&text)
                    .with_context(|| format!("Could not parse {}", self.path.display()))?
            }
            None => MappingsFile::default(),
        };
        if state.is_some() {
            info!(path = %self.path.display(), "project mappings changed, reloaded");
        }
        let file = Arc::new(file);
        *state = Some((mtime, Arc::clone(&file)));
        Ok(file)
    }
}
