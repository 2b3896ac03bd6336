use super::PackageUrl;
use super::package_url::strip_git_suffix;
use crate::Result;
use core::fmt::{Display, Formatter};
use core::hash::{Hash, Hasher};
use ohno::bail;
use serde::{Deserialize, Serialize};

/// Scheme prefixes recognized in front of a repository location, longest first.
const PREFIXES: &[&str] = &["ssh://git@", "https://", "http://", "git://", "git@"];

/// Host + path identity for a repository, with scheme, suffix, and case differences removed.
///
/// Used when comparing against an external system of record, where `http` versus
/// `https`, `git@host:owner/repo` versus `https://host/owner/repo`, or casing must not
/// look like a different package. The original spelling of host and path is kept
/// for display and for [`package_url`](Self::package_url).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalUrl {
    hostname: String,
    path: String,
}

impl CanonicalUrl {
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();

        let Some((prefix, rest)) = PREFIXES.iter().find_map(|p| {
            let head = trimmed.get(..p.len())?;
            head.eq_ignore_ascii_case(p).then(|| (*p, trimmed.get(p.len()..).unwrap_or_default()))
        }) else {
            bail!("unrecognized repository location '{s}'");
        };

        // scp-style locations separate host and path with ':'
        let separator = if prefix == "git@" { ':' } else { '/' };
        let Some((hostname, path)) = rest.split_once(separator) else {
            bail!("repository location has no path: '{s}'");
        };

        let path = strip_git_suffix(path).trim_start_matches('/');
        if hostname.is_empty() || path.is_empty() {
            bail!("repository location has an empty host or path: '{s}'");
        }

        Ok(Self {
            hostname: hostname.to_string(),
            path: path.to_string(),
        })
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The identity key: lower-cased `host/path`.
    #[must_use]
    pub fn canonical_path(&self) -> String {
        format!("{}/{}", self.hostname, self.path).to_lowercase()
    }

    /// An `https` package URL for this repository, ending in `.git`.
    pub fn package_url(&self) -> Result<PackageUrl> {
        PackageUrl::parse(&format!("https://{}/{}.git", self.hostname, self.path))
    }
}

impl PartialEq for CanonicalUrl {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_path() == other.canonical_path()
    }
}

impl Eq for CanonicalUrl {}

impl Hash for CanonicalUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_path().hash(state);
    }
}

impl TryFrom<&PackageUrl> for CanonicalUrl {
    type Error = ohno::AppError;

    fn try_from(url: &PackageUrl) -> Result<Self> {
        Self::parse(url.as_str())
    }
}

impl TryFrom<String> for CanonicalUrl {
    type Error = ohno::AppError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<CanonicalUrl> for String {
    fn from(url: CanonicalUrl) -> Self {
        format!("https://{}/{}.git", url.hostname, url.path)
    }
}

impl Display for CanonicalUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.hostname, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_https() {
        let c = CanonicalUrl::parse("https://github.com/Foo/Bar.git").unwrap();
        assert_eq!(c.hostname(), "github.com");
        assert_eq!(c.path(), "Foo/Bar");
        assert_eq!(c.canonical_path(), "github.com/foo/bar");
    }

    #[test]
    fn test_scheme_and_suffix_variants_are_equal() {
        let reference = CanonicalUrl::parse("https://github.com/foo/bar").unwrap();
        for s in [
            "http://github.com/foo/bar",
            "https://GitHub.com/Foo/Bar.git",
            "git@github.com:foo/bar.git",
            "ssh://git@github.com/foo/bar",
            "git://github.com/foo/bar/",
            "https://github.com/foo/bar/.git",
        ] {
            assert_eq!(CanonicalUrl::parse(s).unwrap(), reference, "{s}");
        }
    }

    #[test]
    fn test_parse_rejects_unknown_or_empty() {
        let _ = CanonicalUrl::parse("ftp://github.com/foo/bar").unwrap_err();
        let _ = CanonicalUrl::parse("https://github.com").unwrap_err();
        let _ = CanonicalUrl::parse("https:///foo").unwrap_err();
    }

    #[test]
    fn test_package_url_preserves_spelling() {
        let c = CanonicalUrl::parse("git@github.com:Foo/Bar").unwrap();
        assert_eq!(c.package_url().unwrap().as_str(), "https://github.com/Foo/Bar.git");
    }

    #[test]
    fn test_deserialize_from_string() {
        let c: CanonicalUrl = serde_json::from_str(r#""https://github.com/org/1.git""#).unwrap();
        assert_eq!(c.canonical_path(), "github.com/org/1");
    }
}
