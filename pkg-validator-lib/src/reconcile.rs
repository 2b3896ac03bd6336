//! Case-insensitive union and difference of URL lists.
//!
//! [`merge_with_existing`] is the single rule for deciding whether a URL is a new
//! package: it is used by the crawler when folding in discoveries, by the redirect
//! check, and when reconciling against the package index.

use crate::urls::PackageUrl;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Merge candidate URLs after an authoritative list.
///
/// Every authoritative entry comes first in its original order, followed by each
/// candidate whose normalized form has not been seen yet, in candidate order. When
/// two entries share a normalized form, the first one seen keeps its casing.
#[must_use]
pub fn merge_with_existing(existing: &[PackageUrl], candidates: impl IntoIterator<Item = PackageUrl>) -> Vec<PackageUrl> {
    let mut seen = HashSet::with_capacity(existing.len());
    let mut merged = Vec::with_capacity(existing.len());

    for url in existing.iter().cloned().chain(candidates) {
        if seen.insert(url.normalized()) {
            merged.push(url);
        }
    }

    merged
}

/// Sort URLs by their normalized form.
pub fn sort_normalized(urls: &mut [PackageUrl]) {
    urls.sort_by_cached_key(PackageUrl::normalized);
}

/// Union of several lists, comparing lower-cased URLs, sorted.
///
/// Unlike [`merge_with_existing`] this does not treat `foo` and `foo.git` as the same
/// entry; list files are merged exactly as written apart from case.
#[must_use]
pub fn merge_lists<'a>(lists: impl IntoIterator<Item = &'a [PackageUrl]>) -> Vec<PackageUrl> {
    let mut seen = HashSet::new();
    let mut merged: Vec<PackageUrl> = lists
        .into_iter()
        .flatten()
        .filter(|url| seen.insert(url.lowercased()))
        .cloned()
        .collect();

    merged.sort_by_cached_key(PackageUrl::lowercased);
    merged
}

/// Remove every package that appears in the deny list, comparing lower-cased URLs.
///
/// The result has no case-insensitive duplicates and is sorted.
#[must_use]
pub fn apply_deny_list(packages: &[PackageUrl], deny_list: &[PackageUrl]) -> Vec<PackageUrl> {
    let mut excluded: HashSet<String> = deny_list.iter().map(PackageUrl::lowercased).collect();
    let mut kept: Vec<PackageUrl> = packages.iter().filter(|url| excluded.insert(url.lowercased())).cloned().collect();

    kept.sort_by_cached_key(PackageUrl::lowercased);
    kept
}

/// Normalized URLs seen so far, shared between concurrent tasks.
///
/// [`insert`](Self::insert) is an atomic test-and-insert, so two tasks that discover
/// the same URL at the same time cannot both accept it.
#[derive(Debug, Default)]
pub struct NormalizedSet {
    urls: Mutex<HashSet<String>>,
}

impl NormalizedSet {
    #[must_use]
    pub fn new<'a>(urls: impl IntoIterator<Item = &'a PackageUrl>) -> Self {
        Self {
            urls: Mutex::new(urls.into_iter().map(PackageUrl::normalized).collect()),
        }
    }

    /// Add the URL; returns `true` if it was not already present.
    pub fn insert(&self, url: &PackageUrl) -> bool {
        self.urls().insert(url.normalized())
    }

    #[must_use]
    pub fn contains(&self, url: &PackageUrl) -> bool {
        self.urls().contains(&url.normalized())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.urls().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Inserts are idempotent, so a set left behind by a panicking holder is still valid.
    fn urls(&self) -> MutexGuard<'_, HashSet<String>> {
        self.urls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
