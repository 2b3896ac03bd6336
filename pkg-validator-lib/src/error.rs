//! Narrowly-scoped failure conditions raised by the engines.
//!
//! Lower-level components never abort a run. They return one of these conditions and
//! the crawler or command pattern-matches on it to decide whether an item is skipped,
//! retried, or whether the failure propagates to the command boundary.

use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    /// The repository does not exist (REST 404 or GraphQL `NOT_FOUND`).
    #[error("repository '{owner}/{name}' not found")]
    RepositoryNotFound { owner: String, name: String },

    /// The repository's default branch holds no package manifest.
    #[error("no package manifest found in '{owner}/{name}'")]
    ManifestNotFound { owner: String, name: String },

    /// The manifest evaluation tool failed or produced unreadable output.
    #[error("manifest dump failed: {0}")]
    ManifestDump(String),

    /// The repository metadata has no default branch.
    #[error("repository '{owner}/{name}' has no default branch")]
    MissingDefaultBranch { owner: String, name: String },

    /// The URL does not identify a usable package.
    #[error("invalid package '{0}'")]
    InvalidPackage(String),

    /// The upstream API refused the request until the given time.
    #[error("rate limited until {until}")]
    RateLimited { until: DateTime<Utc> },

    /// A bounded retry loop ran out of attempts.
    #[error("retry limit exceeded")]
    RetryLimitExceeded,

    /// A redirect chain exceeded the hop limit.
    #[error("max redirects exceeded for url '{0}'")]
    MaxRedirectsExceeded(String),

    /// The upstream answered with a status we don't handle.
    #[error("request for '{url}' failed with status {status}")]
    RequestFailed { url: String, status: u16 },

    /// A response body didn't match the expected shape.
    #[error("could not decode response from '{context}': {message}")]
    Decoding { context: String, message: String },

    /// The operation strictly requires an authentication token.
    #[error("an authentication token is required for this operation")]
    TokenRequired,

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else, carried through to the command boundary.
    #[error("{0:#}")]
    Other(ohno::AppError),
}

impl ValidatorError {
    /// Whether this condition means "no further contribution from this item" rather
    /// than a failure worth retrying.
    #[must_use]
    pub const fn is_per_item(&self) -> bool {
        matches!(
            self,
            Self::RepositoryNotFound { .. }
                | Self::ManifestNotFound { .. }
                | Self::ManifestDump(_)
                | Self::MissingDefaultBranch { .. }
                | Self::InvalidPackage(_)
        )
    }

    /// Whether this condition ends processing of a single item without retrying it.
    #[must_use]
    pub const fn is_fatal_for_item(&self) -> bool {
        matches!(self, Self::RetryLimitExceeded | Self::MaxRedirectsExceeded(_))
    }
}

// `AppError` is not itself a `std::error::Error`, so it can't be a `#[from]` source.
impl From<ohno::AppError> for ValidatorError {
    fn from(e: ohno::AppError) -> Self {
        Self::Other(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_item_classification() {
        let not_found = ValidatorError::RepositoryNotFound {
            owner: "o".into(),
            name: "r".into(),
        };
        assert!(not_found.is_per_item());
        assert!(!not_found.is_fatal_for_item());

        assert!(ValidatorError::ManifestDump("boom".into()).is_per_item());
        assert!(!ValidatorError::RetryLimitExceeded.is_per_item());
        assert!(ValidatorError::RetryLimitExceeded.is_fatal_for_item());
        assert!(ValidatorError::MaxRedirectsExceeded("u".into()).is_fatal_for_item());
    }

    #[test]
    fn test_display_names_the_url() {
        let e = ValidatorError::MaxRedirectsExceeded("https://github.com/a/b".into());
        assert_eq!(e.to_string(), "max redirects exceeded for url 'https://github.com/a/b'");

        let e = ValidatorError::RequestFailed {
            url: "https://api.github.com/repos/a/b".into(),
            status: 500,
        };
        assert!(e.to_string().contains("500"));
    }

    #[test]
    fn test_converts_into_app_error() {
        fn fails() -> crate::Result<()> {
            let result: Result<(), ValidatorError> = Err(ValidatorError::TokenRequired);
            result?;
            Ok(())
        }

        let e = fails().unwrap_err();
        assert!(format!("{e:#}").contains("token is required"));
    }

    #[test]
    fn test_io_errors_keep_their_source() {
        let e: ValidatorError = std::io::Error::other("disk gone").into();
        assert!(matches!(e, ValidatorError::Io(_)));
        assert_eq!(e.to_string(), "i/o failure: disk gone");
        assert!(core::error::Error::source(&e).is_some());
        assert!(!e.is_per_item());
    }
}
