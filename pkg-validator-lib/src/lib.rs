#![doc(hidden)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for pkg-validator
//!
//! This library keeps a package index's list of source-repository URLs canonical,
//! deduplicated, and complete. It follows HTTP redirects to detect repositories that
//! moved, and crawls dependency manifests to discover repositories the list is missing.
//!
//! # Module Organization
//!
//! - [`urls`]: Repository URL identity (normalized and canonical forms)
//! - [`reconcile`]: Case-insensitive merging and subtraction of URL lists
//! - [`cache`]: Key-normalized memoization, optionally persisted between runs
//! - [`limiter`]: Bounded concurrency for outbound work
//! - [`github`]: Rate-limit-aware GitHub API client
//! - [`redirect`]: Redirect-resolution state machine
//! - [`manifest`]: Package manifest model and the external evaluation tool
//! - [`crawler`]: Dependency expansion over a working set of URLs
//! - [`index`]: Reconciliation against the package index's own records
//! - [`commands`]: Command-line interface and orchestration

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

pub mod cache;
pub mod crawler;
pub mod error;
pub mod github;
pub mod index;
pub mod limiter;
pub mod manifest;
pub mod package_list;
pub mod progress;
pub mod reconcile;
pub mod redirect;
pub mod urls;

#[cfg(any(debug_assertions, test))]
pub mod commands;
#[cfg(not(any(debug_assertions, test)))]
mod commands;

pub use crate::commands::{Host, run};
pub use crate::error::ValidatorError;
