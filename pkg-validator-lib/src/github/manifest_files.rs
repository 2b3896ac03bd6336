use regex::Regex;
use std::sync::LazyLock;

/// Top-level manifest files: `Package.swift` and version-specific variants such as
/// `Package@swift-5.9.swift`.
static MANIFEST_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Package[^/]*\.swift$").expect("invalid regex"));

/// A manifest file fetched from a repository's default branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// The manifest file names among `paths`, sorted ascending.
#[must_use]
pub fn manifest_file_names<S: AsRef<str>>(paths: &[S]) -> Vec<String> {
    let mut names: Vec<String> = paths
        .iter()
        .map(AsRef::as_ref)
        .filter(|p| MANIFEST_NAME_REGEX.is_match(p))
        .map(str::to_string)
        .collect();
    names.sort();
    names
}

/// The manifest to treat as authoritative: the lexicographically last name, so a
/// version-suffixed file is preferred consistently over the plain one.
#[must_use]
pub fn primary_manifest(files: &[ManifestFile]) -> Option<&ManifestFile> {
    files.iter().max_by(|a, b| a.name.cmp(&b.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_file_names_filters_and_sorts() {
        let paths = [
            "README.md",
            "Package@swift-5.9.swift",
            "Package.swift",
            "Sources/Package.swift",
            "Package.resolved",
            "Package@swift-4.swift",
        ];

        assert_eq!(
            manifest_file_names(&paths),
            ["Package.swift", "Package@swift-4.swift", "Package@swift-5.9.swift"]
        );
    }

    #[test]
    fn test_manifest_file_names_empty() {
        assert!(manifest_file_names(&["README.md", "Cargo.toml"]).is_empty());
    }

    #[test]
    fn test_primary_manifest_is_last() {
        let files: Vec<_> = ["Package.swift", "Package@swift-6.swift", "Package@swift-5.swift"]
            .into_iter()
            .map(|name| ManifestFile {
                name: name.to_string(),
                contents: Vec::new(),
            })
            .collect();

        assert_eq!(primary_manifest(&files).unwrap().name, "Package@swift-6.swift");
        assert!(primary_manifest(&[]).is_none());
    }
}
