use anyhow::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::sync::Arc;
use tracing::debug;

use crate::config::ProjectMappings;
use crate::model::{PackageManifest, Project, BUILD_CONFIG_NAME, MANIFEST_NAME, META_NAME};
use crate::repository::{GitReader, RepositoryReader};
use crate::util::join_subdir;

use super::{ResolveError, ResolveResult};

/// Maps `name:branch:subdir` identifiers to project trees
#[derive(Clone)]
pub struct ProjectResolver {
    mappings: Arc<ProjectMappings>,
}

impl ProjectResolver {
    pub fn new(mappings: Arc<ProjectMappings>) -> Self {
        Self { mappings }
    }

    pub fn resolve(&self, identifier: &str) -> ResolveResult<Project> {
        let not_found = || ResolveError::NotFound(format!("project {}", identifier));

        let parts: Vec<&str> = identifier.split(':').collect();
        let [name, branch, subdir] = parts.as_slice() else {
            debug!(identifier, "malformed project identifier");
            return Err(not_found());
        };

        let mappings = self.mappings.get()?;
        let mapping = mappings.project(name).ok_or_else(not_found)?;
        let reader = GitReader::open(&mapping.path)?;
        if !reader.has_branch(branch) {
            return Err(not_found());
        }

        let read = |file: &str| -> ResolveResult<Vec<u8>> {
            let path = join_subdir(subdir, file);
            reader.read_path(branch, &path)?.ok_or_else(|| {
                ResolveError::NotFound(format!("{} in project {}", path, identifier))
            })
        };

        let manifest = PackageManifest::parse(&String::from_utf8_lossy(&read(MANIFEST_NAME)?))?;
        let build_config = read(BUILD_CONFIG_NAME)?;
        let meta = rewrite_project_name(&String::from_utf8_lossy(&read(META_NAME)?), identifier)?;

        Ok(Project {
            name: identifier.to_string(),
            repo_path: mapping.path.clone(),
            branch: branch.to_string(),
            subdir: subdir.to_string(),
            manifest,
            build_config,
            meta,
        })
    }
}

/// Set the `name` attribute of every `<project>` element, leaving the rest
/// of the document as written
pub fn rewrite_project_name(meta: &str, name: &str) -> Result<String> {
    let mut reader = Reader::from_str(meta);
    let mut writer = Writer::new(Vec::new());

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"project" => {
                writer.write_event(Event::Start(renamed(&e, name)?))?;
            }
            Event::Empty(e) if e.name().as_ref() == b"project" => {
                writer.write_event(Event::Empty(renamed(&e, name)?))?;
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

fn renamed(element: &BytesStart<'_>, name: &str) -> Result<BytesStart<'static>> {
    let mut out = BytesStart::new("project");
    let mut named = false;
    for attr in element.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"name" {
            out.push_attribute(("name", name));
            named = true;
        } else {
            out.push_attribute(attr);
        }
    }
    if !named {
        out.push_attribute(("name", name));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_project_name() {
        let meta = r#"<project name="Core">
  <title>Core &amp; base</title>
  <repository name="standard"/>
</project>"#;
        let out = rewrite_project_name(meta, "Core:master:i586").unwrap();
        assert!(out.starts_with(r#"<project name="Core:master:i586">"#));
        assert!(out.contains("<title>Core &amp; base</title>"));
        assert!(out.contains(r#"<repository name="standard"/>"#));
    }

    #[test]
    fn test_rewrite_adds_missing_name() {
        let out = rewrite_project_name("<project/>", "A:b:").unwrap();
        assert_eq!(out, r#"<project name="A:b:"/>"#);
    }
}
