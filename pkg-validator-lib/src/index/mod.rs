//! Reconciliation against the package index's own records.
//!
//! The index reports every package it tracks along with the dependencies it resolved
//! for each. Dependencies it has no record for are candidates to add to the list.

mod api;
mod reconciler;

pub use api::{IndexApi, PackageRecord, all_dependencies, indexed_packages};
pub use reconciler::{Reconciliation, find_new_packages};
