//! Repository URL identity.
//!
//! A [`PackageUrl`] is the validated wrapper every other module passes around. Its
//! [normalized form](normalize) decides whether two URLs name the same repository
//! inside this tool, while [`CanonicalUrl`] is the stricter key used when comparing
//! against the package index's own records.

mod canonical_url;
mod keyed;
mod package_url;

pub use canonical_url::CanonicalUrl;
pub use keyed::Keyed;
pub use package_url::{PackageUrl, normalize};
