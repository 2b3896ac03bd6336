use super::api::{PackageRecord, all_dependencies, indexed_packages};
use crate::github::Github;
use crate::redirect::ResolveRedirects;
use crate::urls::{CanonicalUrl, Keyed, PackageUrl};
use std::collections::HashSet;

const LOG_TARGET: &str = " reconcile";

/// What a reconciliation against the index found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Packages the index has records for.
    pub indexed: usize,

    /// Dependencies the index names but has no record for.
    pub missing: usize,

    /// Missing dependencies worth adding, `.git`-suffixed and sorted by canonical path.
    pub new_packages: Vec<PackageUrl>,

    /// Missing dependencies left out because their repository is a fork.
    pub dropped_forks: usize,
}

/// Dependencies the index knows about but doesn't index yet.
///
/// Each missing dependency is resolved to its current location first; it is skipped
/// if that location is already indexed, if it can't be resolved, or (with
/// `drop_forks`) if it is a fork. Comparisons use [`CanonicalUrl`] so scheme, suffix,
/// and case differences never look like a new package. Stops once `limit` new
/// packages were found.
pub async fn find_new_packages<R: ResolveRedirects>(
    records: &[PackageRecord],
    github: &Github,
    resolver: &R,
    limit: Option<usize>,
    drop_forks: bool,
) -> Reconciliation {
    let indexed = indexed_packages(records);

    let mut missing: Vec<CanonicalUrl> = all_dependencies(records).into_iter().filter(|d| !indexed.contains(d)).collect();
    missing.sort_by_cached_key(CanonicalUrl::canonical_path);

    log::info!(target: LOG_TARGET, "{} packages indexed, {} dependencies not indexed", indexed.len(), missing.len());

    let limit = limit.unwrap_or(usize::MAX);
    let mut found: HashSet<Keyed<CanonicalUrl>> = HashSet::new();
    let mut dropped_forks = 0;

    for dependency in &missing {
        if found.len() >= limit {
            log::info!(target: LOG_TARGET, "Limit of {limit} new packages reached");
            break;
        }

        let Ok(url) = dependency.package_url() else {
            log::info!(target: LOG_TARGET, "Skipping '{dependency}': not a package URL");
            continue;
        };

        let resolved = match resolver.resolve_package_redirects(&url).await {
            Ok(redirect) => match redirect.url() {
                Some(resolved) => resolved.appending_git_extension(),
                None => {
                    log::info!(target: LOG_TARGET, "Skipping '{url}': {redirect:?}");
                    continue;
                }
            },
            Err(e) => {
                log::info!(target: LOG_TARGET, "Skipping '{url}': {e}");
                continue;
            }
        };

        let Ok(canonical) = CanonicalUrl::try_from(&resolved) else {
            continue;
        };

        if canonical != *dependency {
            log::debug!(target: LOG_TARGET, "'{dependency}' redirected to '{resolved}'");
        }

        if indexed.contains(&canonical) {
            log::info!(target: LOG_TARGET, "Skipping '{url}': already indexed as '{resolved}'");
            continue;
        }

        if drop_forks {
            match github.fetch_repository(resolved.owner(), resolved.repository()).await {
                Ok(repository) if repository.is_fork => {
                    log::info!(target: LOG_TARGET, "Skipping '{resolved}': repository is a fork");
                    dropped_forks += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    log::info!(target: LOG_TARGET, "Skipping '{resolved}': {e}");
                    continue;
                }
            }
        }

        if found.insert(Keyed::from(canonical)) {
            log::info!(target: LOG_TARGET, "Adding '{resolved}' ({} new)", found.len());
        }
    }

    let mut found: Vec<Keyed<CanonicalUrl>> = found.into_iter().collect();
    found.sort_by(|a, b| a.key().cmp(b.key()));

    Reconciliation {
        indexed: indexed.len(),
        missing: missing.len(),
        new_packages: found.iter().filter_map(|k| k.value().package_url().ok()).collect(),
        dropped_forks,
    }
}
