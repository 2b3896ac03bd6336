//! Rate-limit-aware access to the GitHub API.
//!
//! [`Github`] fetches repository metadata (REST or GraphQL), lists a repository's
//! files, and downloads raw manifest content. Rate limits are detected from response
//! headers, never from the status code alone.

mod client;
mod manifest_files;
mod rate_limit;
mod repository;

pub use client::{Github, GithubSettings};
pub use manifest_files::{ManifestFile, manifest_file_names, primary_manifest};
pub use rate_limit::{RateLimit, RateLimitInfo, RateLimitStatus, rate_limit_status};
pub use repository::Repository;
