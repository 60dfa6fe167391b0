use anyhow::Result;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use rustc_hash::FxHashSet;

use crate::model::{
    is_reserved, MappingCache, PackageEntry, PackageSelector, Project, RevisionRecord, META_NAME,
};
use crate::repository::{GitReader, RepositoryReader, TreeEntry};

use super::{ResolveError, ResolveResult};

const META_URL: &str = "http://www.merproject.org";

/// A package revision found in the mapping cache
#[derive(Debug, Clone, Copy)]
pub struct ResolvedRevision<'a> {
    /// The package entry the name resolved to, after following links
    pub package: &'a PackageEntry,
    pub record: &'a RevisionRecord,
}

/// One file of a package listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub name: String,
    pub size: u64,
    pub mtime: i64,
    pub md5: String,
}

/// File listing of a package at one revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIndex {
    pub name: String,
    pub srcmd5: String,
    pub rev: u32,
    pub vrev: Option<String>,
    pub entries: Vec<ListedEntry>,
}

/// Resolves package names of one project against a mapping cache snapshot
pub struct PackageResolver<'a> {
    project: &'a Project,
    cache: &'a MappingCache,
}

impl<'a> PackageResolver<'a> {
    pub fn new(project: &'a Project, cache: &'a MappingCache) -> Self {
        Self { project, cache }
    }

    /// The package entry for a name, following link aliases
    pub fn package_entry(&self, name: &str) -> ResolveResult<&'a PackageEntry> {
        let manifest = &self.project.manifest;
        let mut visited = FxHashSet::default();
        let mut current = name;

        loop {
            if let Some(package) = manifest.package(current) {
                return Ok(package);
            }
            let Some(link) = manifest.link_for_alias(current) else {
                return Err(ResolveError::NotFound(format!(
                    "package {} in {}",
                    name, self.project.name
                )));
            };
            if !visited.insert(current) {
                return Err(ResolveError::BrokenAliasChain(name.to_string()));
            }
            current = link.target.as_str();
        }
    }

    /// Find the cached revision a selector names.
    ///
    /// `latest` means the commit the manifest declares for the package.
    pub fn resolve_revision(
        &self,
        name: &str,
        selector: &PackageSelector,
    ) -> ResolveResult<ResolvedRevision<'a>> {
        let package = self.package_entry(name)?;
        let wanted = match selector {
            PackageSelector::Latest => package.commit.as_str(),
            PackageSelector::Explicit(s) => s.as_str(),
        };
        let record = self
            .cache
            .find(&package.git, &package.follow_branch, wanted)
            .ok_or_else(|| ResolveError::NotFound(format!("revision {} of {}", wanted, name)))?;
        Ok(ResolvedRevision { package, record })
    }

    pub fn package_index(&self, name: &str, selector: &PackageSelector) -> ResolveResult<PackageIndex> {
        let resolved = self.resolve_revision(name, selector)?;
        let reader = GitReader::open(&resolved.package.git)?;
        let tree = reader.tree_entries(&resolved.record.commit)?;
        let mtime = reader.commit_time(&resolved.record.commit)?;

        Ok(PackageIndex {
            name: name.to_string(),
            srcmd5: resolved.record.srcmd5.clone(),
            rev: resolved.record.rev,
            vrev: resolved.package.vrev.clone(),
            entries: list_entries(&tree, mtime, resolved.record),
        })
    }

    /// Bytes of one file; `_meta` is synthesized
    pub fn read_file(
        &self,
        name: &str,
        file: &str,
        selector: &PackageSelector,
    ) -> ResolveResult<Vec<u8>> {
        if file == META_NAME {
            self.package_entry(name)?;
            return Ok(self.synthesize_meta(name)?.into_bytes());
        }

        let resolved = self.resolve_revision(name, selector)?;
        let reader = GitReader::open(&resolved.package.git)?;
        reader
            .read_path(&resolved.record.commit, file)?
            .ok_or_else(|| ResolveError::NotFound(format!("{}/{}", name, file)))
    }

    /// Architectures disabled project-wide and not re-enabled for this name
    /// by its package entry or by a link aliasing it
    pub fn disabled_arches(&self, name: &str) -> Vec<&'a str> {
        let manifest = &self.project.manifest;
        let enabled = |arch: &str| {
            manifest
                .packages
                .iter()
                .filter(|p| p.name == name)
                .any(|p| p.enabled_arches.iter().any(|a| a == arch))
                || manifest
                    .links
                    .iter()
                    .filter(|l| l.alias == name)
                    .any(|l| l.enabled_arches.iter().any(|a| a == arch))
        };
        manifest
            .disabled_arches
            .iter()
            .map(String::as_str)
            .filter(|arch| !enabled(*arch))
            .collect()
    }

    pub fn is_disabled(&self, name: &str, arch: &str) -> bool {
        self.disabled_arches(name).iter().any(|a| *a == arch)
    }

    /// Minimal package meta document, with a build disable per disabled arch
    pub fn synthesize_meta(&self, name: &str) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        let mut root = BytesStart::new("package");
        root.push_attribute(("project", self.project.name.as_str()));
        root.push_attribute(("name", name));
        writer.write_event(Event::Start(root))?;

        for (tag, text) in [("title", name), ("description", "Description\n"), ("url", META_URL)] {
            writer.write_event(Event::Start(BytesStart::new(tag)))?;
            writer.write_event(Event::Text(BytesText::new(text)))?;
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }

        let disabled = self.disabled_arches(name);
        if !disabled.is_empty() {
            writer.write_event(Event::Start(BytesStart::new("build")))?;
            for arch in disabled {
                let mut disable = BytesStart::new("disable");
                disable.push_attribute(("arch", arch));
                writer.write_event(Event::Empty(disable))?;
            }
            writer.write_event(Event::End(BytesEnd::new("build")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("package")))?;
        let mut out = String::from_utf8(writer.into_inner())?;
        out.push('\n');
        Ok(out)
    }
}

/// Listing entries for the blobs of a tree, skipping reserved names.
///
/// Hashes come from the cached revision; every entry carries `mtime`.
pub fn list_entries(tree: &[TreeEntry], mtime: i64, record: &RevisionRecord) -> Vec<ListedEntry> {
    tree.iter()
        .filter(|entry| entry.is_blob && !is_reserved(&entry.name))
        .filter_map(|entry| {
            let md5 = record.entry_md5(&entry.name)?;
            Some(ListedEntry {
                name: entry.name.clone(),
                size: entry.size,
                mtime,
                md5: md5.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{content_hash, FileEntry, PackageManifest};

    fn project(manifest: &str) -> Project {
        Project {
            name: "Core:master:i586".to_string(),
            repo_path: "obs-projects/Core".to_string(),
            branch: "master".to_string(),
            subdir: "i586".to_string(),
            manifest: PackageManifest::parse(manifest).unwrap(),
            build_config: Vec::new(),
            meta: String::new(),
        }
    }

    #[test]
    fn test_disable_without_override() {
        let project = project(
            r#"<packages disablei586="1"><package name="foo" git="g" commit="c" followbranch="master"/></packages>"#,
        );
        let cache = MappingCache::new();
        let resolver = PackageResolver::new(&project, &cache);
        assert_eq!(resolver.disabled_arches("foo"), vec!["i586"]);
        assert!(resolver.is_disabled("foo", "i586"));
        assert!(!resolver.is_disabled("foo", "armv7l"));

        let meta = resolver.synthesize_meta("foo").unwrap();
        assert!(meta.contains(r#"<package project="Core:master:i586" name="foo">"#));
        assert!(meta.contains("<title>foo</title>"));
        assert!(meta.contains(r#"<disable arch="i586"/>"#));
    }

    #[test]
    fn test_enable_override_on_package_or_link() {
        let project = project(
            r#"<packages disablei586="1">
  <package name="foo" git="g" commit="c" followbranch="master" enablei586="1"/>
  <package name="bar" git="g" commit="c" followbranch="master"/>
  <link from="bar" to="baz" enablei586="1"/>
</packages>"#,
        );
        let cache = MappingCache::new();
        let resolver = PackageResolver::new(&project, &cache);
        assert!(resolver.disabled_arches("foo").is_empty());
        assert!(resolver.disabled_arches("baz").is_empty());
        assert_eq!(resolver.disabled_arches("bar"), vec!["i586"]);
        assert!(!resolver.synthesize_meta("foo").unwrap().contains("<build>"));
    }

    #[test]
    fn test_alias_cycle_is_broken_chain() {
        let project = project(
            r#"<packages><link from="b" to="a"/><link from="a" to="b"/></packages>"#,
        );
        let cache = MappingCache::new();
        let resolver = PackageResolver::new(&project, &cache);
        assert!(matches!(resolver.package_entry("a"), Err(ResolveError::BrokenAliasChain(_))));
        assert!(matches!(resolver.package_entry("zzz"), Err(ResolveError::NotFound(_))));
    }

    #[test]
    fn test_list_entries_skips_reserved_and_trees() {
        let record = RevisionRecord::new(
            "c1",
            1,
            vec![FileEntry::new("foo.spec", content_hash(b"spec"))],
        );
        let tree = vec![
            TreeEntry { name: "_meta".into(), oid: "1".into(), size: 3, is_blob: true },
            TreeEntry { name: "foo.spec".into(), oid: "2".into(), size: 4, is_blob: true },
            TreeEntry { name: "patches".into(), oid: "3".into(), size: 0, is_blob: false },
        ];
        let entries = list_entries(&tree, 1234, &record);
        assert_eq!(
            entries,
            vec![ListedEntry {
                name: "foo.spec".into(),
                size: 4,
                mtime: 1234,
                md5: content_hash(b"spec"),
            }]
        );
    }
}
