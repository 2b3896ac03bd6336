//! Command-line interface and orchestration for pkg-validator
//!
//! This module implements the CLI commands and wires the engines together into
//! end-to-end workflows over package lists. It handles argument parsing,
//! configuration, logging, and where results are written.
//!
//! # Commands
//!
//! - **check-dependencies**: Crawl the dependency manifests of the input packages
//!   and add every repository they lead to
//! - **check-redirects**: Follow redirects for every input package, replacing moved
//!   repositories and dropping ones that no longer exist
//! - **merge-lists**: Case-insensitive union of several package list files
//! - **apply-deny-list**: Remove denied packages from a package list
//! - **reconcile**: Add dependencies the package index names but doesn't index
//! - **init**: Generate a default configuration file
//!
//! The network-facing commands share a session holding the configuration,
//! the GitHub and redirect clients, the cache, and the concurrency limiter. Input
//! selection (file, published list, or positional URLs) is validated before any
//! network activity. Output goes to a file, or to the host's output stream.

mod apply_deny_list;
mod check_dependencies;
mod check_redirects;
mod common;
mod config;
mod host;
mod init;
mod merge_lists;
mod progress_reporter;
mod reconcile;
mod run;

#[cfg(debug_assertions)]
pub use config::Config;

pub use apply_deny_list::{ApplyDenyListArgs, apply_deny_list_file};
pub use check_dependencies::{CheckDependenciesArgs, check_dependencies};
pub use check_redirects::{CheckRedirectsArgs, check_redirects};
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use merge_lists::{MergeListsArgs, merge_list_files};
pub use progress_reporter::ProgressReporter;
pub use reconcile::{ReconcileArgs, reconcile};
pub use run::run;
