/// Join a project subdirectory and a file name into a tree path.
///
/// An empty subdirectory means the repository root.
pub fn join_subdir(subdir: &str, name: &str) -> String {
    let subdir = subdir.trim_matches('/');
    if subdir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", subdir, name)
    }
}

/// Split a tree path into its directory and file name
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", path),
    }
}

/// Last path component, as used for requested binary names
pub fn basename(path: &str) -> &str {
    split_path(path.trim_end_matches('/')).1
}

/// File name without its final extension
pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}
