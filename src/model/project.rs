use super::manifest::PackageManifest;

pub const BUILD_CONFIG_NAME: &str = "_config";
pub const META_NAME: &str = "_meta";

/// A resolved `name:branch:subdir` project
#[derive(Debug, Clone)]
pub struct Project {
    /// Full external identifier, e.g. `Core:master:i586`
    pub name: String,
    pub repo_path: String,
    pub branch: String,
    pub subdir: String,
    pub manifest: PackageManifest,
    pub build_config: Vec<u8>,
    /// Project meta document with its project name rewritten to `name`
    pub meta: String,
}

/// Which revision of a package a request asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSelector {
    Latest,
    /// Commit id, content fingerprint or revision number
    Explicit(String),
}

impl PackageSelector {
    pub fn parse(rev: Option<&str>) -> Self {
        match rev {
            None | Some("") | Some("latest") | Some("upload") | Some("build") => PackageSelector::Latest,
            Some(other) => PackageSelector::Explicit(other.to_string()),
        }
    }
}

/// Compose the external identifier of a project level
pub fn project_id(name: &str, branch: &str, subdir: &str) -> String {
    format!("{}:{}:{}", name, branch, subdir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_normalization() {
        assert_eq!(PackageSelector::parse(None), PackageSelector::Latest);
        assert_eq!(PackageSelector::parse(Some("upload")), PackageSelector::Latest);
        assert_eq!(PackageSelector::parse(Some("build")), PackageSelector::Latest);
        assert_eq!(PackageSelector::parse(Some("latest")), PackageSelector::Latest);
        assert_eq!(PackageSelector::parse(Some("3")), PackageSelector::Explicit("3".to_string()));
    }

    #[test]
    fn test_project_id() {
        assert_eq!(project_id("Core", "master", "i586"), "Core:master:i586");
        assert_eq!(project_id("Core", "master", ""), "Core:master:");
    }
}
