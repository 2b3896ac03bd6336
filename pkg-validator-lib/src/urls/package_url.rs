use crate::Result;
use core::fmt::{Display, Formatter};
use core::str::FromStr;
use ohno::{IntoAppError, bail};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// A URL identifying a package's source repository.
///
/// The original string is kept verbatim so the casing a list was written with
/// survives every round trip. Identity for de-duplication is the
/// [normalized form](Self::normalized).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageUrl {
    raw: Arc<str>,
    scheme: Arc<str>,
    host: Arc<str>,
    owner: Arc<str>,
    repository: Arc<str>,
}

impl PackageUrl {
    /// Validate and wrap an absolute repository URL.
    ///
    /// The URL needs a host and at least two path segments once any `.git` suffix
    /// is removed; the last two are the owner and the repository.
    pub fn parse(s: &str) -> Result<Self> {
        let url = Url::parse(s).into_app_err_with(|| format!("invalid package URL '{s}'"))?;

        let Some(host) = url.host_str().filter(|h| !h.is_empty()) else {
            bail!("package URL has no host: '{s}'");
        };

        let segments: Vec<&str> = strip_git_suffix(url.path()).split('/').filter(|s| !s.is_empty()).collect();
        let [.., owner, repository] = segments.as_slice() else {
            bail!("package URL needs an owner and a repository: '{s}'");
        };

        Ok(Self {
            raw: Arc::from(s),
            scheme: Arc::from(url.scheme()),
            host: Arc::from(host),
            owner: Arc::from(*owner),
            repository: Arc::from(*repository),
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// The lower-cased, `.git`-suffixed form used for de-duplication.
    #[must_use]
    pub fn normalized(&self) -> String {
        normalize(&self.raw)
    }

    /// The lower-cased form, without touching the suffix.
    #[must_use]
    pub fn lowercased(&self) -> String {
        self.raw.to_lowercase()
    }

    /// The same URL with any `.git`, `/.git`, or trailing `/` removed. Casing is preserved.
    #[must_use]
    pub fn deleting_git_extension(&self) -> Self {
        self.with_raw(strip_git_suffix(&self.raw))
    }

    /// The same URL ending in exactly one `.git`. Casing of the rest is preserved.
    #[must_use]
    pub fn appending_git_extension(&self) -> Self {
        self.with_raw(&format!("{}.git", strip_git_suffix(&self.raw)))
    }

    fn with_raw(&self, raw: &str) -> Self {
        Self {
            raw: Arc::from(raw),
            scheme: Arc::clone(&self.scheme),
            host: Arc::clone(&self.host),
            owner: Arc::clone(&self.owner),
            repository: Arc::clone(&self.repository),
        }
    }
}

/// Normalize a repository URL for identity comparisons.
///
/// The result is lower-cased and always ends in a single `.git`, whether the input
/// had `.git`, `.GIT`, `/.git`, a trailing `/`, or no suffix at all. Applying it
/// twice gives the same result as applying it once.
#[must_use]
pub fn normalize(url: &str) -> String {
    format!("{}.git", strip_git_suffix(&url.to_lowercase()))
}

/// Remove trailing slashes and one `.git` or `/.git` suffix, ignoring ASCII case.
pub(crate) fn strip_git_suffix(s: &str) -> &str {
    let s = s.trim_end_matches('/');
    let s = strip_suffix_ignore_ascii_case(s, "/.git")
        .or_else(|| strip_suffix_ignore_ascii_case(s, ".git"))
        .unwrap_or(s);
    s.trim_end_matches('/')
}

fn strip_suffix_ignore_ascii_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let split = s.len().checked_sub(suffix.len())?;
    if !s.is_char_boundary(split) {
        return None;
    }

    let (head, tail) = s.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

impl Display for PackageUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PackageUrl {
    type Err = ohno::AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PackageUrl {
    type Error = ohno::AppError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<PackageUrl> for String {
    fn from(url: PackageUrl) -> Self {
        url.raw.to_string()
    }
}
