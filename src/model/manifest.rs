//! Project package manifest (`packages.xml`)
//!
//! ```xml
//! <packages disablei586="1">
//!   <package name="foo" git="packages-git/core/foo" commit="<sha>"
//!            followbranch="master" vrev="2" enablei586="1"/>
//!   <link from="foo" to="foo-alias"/>
//! </packages>
//! ```

use anyhow::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::warn;

pub const MANIFEST_NAME: &str = "packages.xml";

/// A package declared by the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    pub name: String,
    /// Path of the git repository holding the package sources
    pub git: String,
    /// Head commit published as `latest`
    pub commit: String,
    /// Branch whose revisions are served
    pub follow_branch: String,
    pub vrev: Option<String>,
    pub enabled_arches: Vec<String>,
}

impl PackageEntry {
    fn from_attrs(attrs: &Attrs) -> Option<Self> {
        Some(Self {
            name: attrs.get("name")?.to_string(),
            git: attrs.get("git")?.to_string(),
            commit: attrs.get("commit")?.to_string(),
            follow_branch: attrs.get("followbranch")?.to_string(),
            vrev: attrs.get("vrev").map(str::to_string),
            enabled_arches: attrs.arches("enable"),
        })
    }
}

/// An alias that forwards `alias` to the package `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub target: String,
    pub alias: String,
    pub enabled_arches: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    pub packages: Vec<PackageEntry>,
    pub links: Vec<LinkEntry>,
    /// Architectures disabled for every package unless overridden
    pub disabled_arches: Vec<String>,
}

impl PackageManifest {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut manifest = PackageManifest::default();
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) => {
                    let attrs = Attrs::read(&e)?;
                    match e.name().as_ref() {
                        b"packages" => manifest.disabled_arches = attrs.arches("disable"),
                        b"package" => match PackageEntry::from_attrs(&attrs) {
                            Some(entry) => manifest.packages.push(entry),
                            None => warn!(
                                name = attrs.get("name").unwrap_or(""),
                                "skipping <package> without name, git, commit and followbranch"
                            ),
                        },
                        b"link" => match (attrs.get("from"), attrs.get("to")) {
                            (Some(target), Some(alias)) => manifest.links.push(LinkEntry {
                                target: target.to_string(),
                                alias: alias.to_string(),
                                enabled_arches: attrs.arches("enable"),
                            }),
                            _ => warn!("skipping <link> without from and to"),
                        },
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(manifest)
    }

    pub fn package(&self, name: &str) -> Option<&PackageEntry> {
        self.packages.iter().find(|p| p.name == name)
    }

    pub fn link_for_alias(&self, alias: &str) -> Option<&LinkEntry> {
        self.links.iter().find(|l| l.alias == alias)
    }

    /// Names listed for the project: packages first, then link aliases
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.links.iter().map(|l| l.alias.as_str()))
    }
}

/// Package name announced by one `package`/`link` element line.
///
/// Used on lines removed from a manifest; anything that is not a single
/// parseable element yields `None`.
pub fn parse_fragment(line: &str) -> Option<String> {
    let mut reader = Reader::from_str(line.trim());
    reader.config_mut().check_end_names = false;

    loop {
        match reader.read_event().ok()? {
            Event::Start(e) | Event::Empty(e) => {
                let attrs = Attrs::read(&e).ok()?;
                return match e.name().as_ref() {
                    b"package" => attrs.get("name").map(str::to_string),
                    b"link" => attrs.get("to").map(str::to_string),
                    _ => None,
                };
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

struct Attrs(Vec<(String, String)>);

impl Attrs {
    fn read(element: &BytesStart<'_>) -> Result<Self> {
        let mut attrs = Vec::new();
        for attr in element.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attrs.push((key, value));
        }
        Ok(Self(attrs))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Architectures named by attributes like `disablei586="1"`
    fn arches(&self, prefix: &str) -> Vec<String> {
        self.0
            .iter()
            .filter_map(|(k, v)| {
                let arch = k.strip_prefix(prefix)?;
                (!arch.is_empty() && !v.is_empty()).then(|| arch.to_string())
            })
            .collect()
    }
}
