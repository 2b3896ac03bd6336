//! Redirect resolution for repository URLs.
//!
//! A repository that was renamed or transferred keeps answering at its old URL with
//! a `301`. [`RedirectResolver`] follows those hops with `HEAD` requests until it
//! reaches a terminal [`Redirect`] outcome.

mod resolver;

pub use resolver::{HopError, RedirectResolver, RedirectSettings, is_connection_reset};

use crate::error::ValidatorError;
use crate::urls::PackageUrl;
use core::future::Future;
use core::time::Duration;

/// The outcome of resolving one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// The URL answered directly; nothing moved.
    Initial(PackageUrl),

    /// The URL moved; this is where the chain ended.
    Redirected(PackageUrl),

    /// The URL (or where it moved to) doesn't exist.
    NotFound(PackageUrl),

    /// The server asked us to back off for this long.
    RateLimited(Duration),

    /// The server refused to say anything about the URL.
    Unauthorized,

    /// Anything else that ends resolution for this URL.
    Error(String),
}

impl Redirect {
    /// The URL to keep, for outcomes that have one.
    #[must_use]
    pub const fn url(&self) -> Option<&PackageUrl> {
        match self {
            Self::Initial(url) | Self::Redirected(url) => Some(url),
            Self::NotFound(_) | Self::RateLimited(_) | Self::Unauthorized | Self::Error(_) => None,
        }
    }
}

/// Resolves a package URL to its current location.
///
/// The crawler and the commands depend on this rather than on [`RedirectResolver`]
/// directly, so tests can supply canned outcomes.
pub trait ResolveRedirects: Send + Sync {
    /// Resolve `url`, comparing without its `.git` suffix and reporting a moved URL
    /// with the suffix re-appended.
    fn resolve_package_redirects(&self, url: &PackageUrl) -> impl Future<Output = Result<Redirect, ValidatorError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_url() {
        let url = PackageUrl::parse("https://github.com/foo/bar").unwrap();

        assert_eq!(Redirect::Initial(url.clone()).url(), Some(&url));
        assert_eq!(Redirect::Redirected(url.clone()).url(), Some(&url));
        assert_eq!(Redirect::NotFound(url).url(), None);
        assert_eq!(Redirect::RateLimited(Duration::from_secs(5)).url(), None);
        assert_eq!(Redirect::Unauthorized.url(), None);
        assert_eq!(Redirect::Error("boom".into()).url(), None);
    }
}
