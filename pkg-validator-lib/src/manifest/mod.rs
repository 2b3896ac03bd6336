//! The package manifest model.
//!
//! Manifests are never parsed here. An external tool evaluates the manifest files and
//! prints a JSON description, which is decoded into [`Manifest`].

mod dump;

pub use dump::DumpPackage;

use crate::error::ValidatorError;
use crate::github::{ManifestFile, Repository};
use core::future::Future;
use serde::{Deserialize, Serialize};

/// What a package declares: its name, the products it offers, and what it depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
}

/// A dependency declaration.
///
/// Older tool versions list source-control locations under `scm`, newer ones under
/// `sourceControl` with a list of remotes. Either may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scm: Vec<Scm>,
    #[serde(default, rename = "sourceControl", skip_serializing_if = "Vec::is_empty")]
    pub source_control: Vec<SourceControl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scm {
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceControl {
    pub location: SourceControlLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceControlLocation {
    #[serde(default)]
    pub remote: Vec<Remote>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Remote {
    Url(String),
    Object {
        #[serde(rename = "urlString")]
        url_string: String,
    },
}

impl Remote {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Url(url) | Self::Object { url_string: url } => url,
        }
    }
}

impl Dependency {
    /// The first source-control URL the declaration names, if any.
    #[must_use]
    pub fn first_remote(&self) -> Option<&str> {
        self.scm.first().map(|s| s.location.as_str()).or_else(|| {
            self.source_control
                .iter()
                .flat_map(|s| s.location.remote.iter())
                .map(Remote::as_str)
                .next()
        })
    }
}

/// Turns a repository's manifest files into a [`Manifest`].
pub trait DecodeManifest: Send + Sync {
    /// Decode `manifests`, the manifest files fetched from `repository`'s default branch.
    fn decode(&self, repository: &Repository, manifests: &[ManifestFile]) -> impl Future<Output = Result<Manifest, ValidatorError>> + Send;
}
