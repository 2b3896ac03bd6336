//! Dependency expansion.
//!
//! Starting from a seed list, [`DependencyCrawler`] reads every package's manifest,
//! follows the dependencies it names to their current location, filters out forks and
//! packages with nothing to consume, and folds what's left into the working set. New
//! packages are crawled in turn until nothing new turns up or the limit is reached.

mod policy;

pub use policy::CrawlPolicy;

use crate::cache::{Cache, CacheKey};
use crate::error::ValidatorError;
use crate::github::{Github, Repository, primary_manifest};
use crate::limiter::ConcurrencyLimiter;
use crate::manifest::{DecodeManifest, Dependency, Manifest};
use crate::progress::{NoProgress, Progress};
use crate::reconcile::{merge_with_existing, sort_normalized};
use crate::redirect::ResolveRedirects;
use crate::urls::PackageUrl;
use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicU64, Ordering};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

const LOG_TARGET: &str = "   crawler";

/// Counters describing one crawler's work so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Seeds whose dependencies were looked up.
    pub processed: u64,

    /// Seeds skipped because of a per-item condition such as a missing manifest.
    pub skipped: u64,

    /// Seeds abandoned after running out of retries or redirects.
    pub failed: u64,

    /// Dependencies dropped because their repository is a fork.
    pub dropped_forks: u64,

    /// Dependencies dropped because their manifest declares no products.
    pub dropped_empty: u64,

    /// Dependencies dropped because their repository or manifest kept failing to load.
    pub dropped_failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    processed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    dropped_forks: AtomicU64,
    dropped_empty: AtomicU64,
    dropped_failed: AtomicU64,
}

pub struct DependencyCrawler<R, D> {
    github: Arc<Github>,
    resolver: Arc<R>,
    decoder: Arc<D>,
    manifests: Arc<Cache<Manifest>>,
    limiter: Arc<ConcurrencyLimiter>,
    policy: CrawlPolicy,
    progress: Arc<dyn Progress>,
    counters: Arc<Counters>,
}

impl<R, D> Debug for DependencyCrawler<R, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DependencyCrawler")
            .field("policy", &self.policy)
            .field("limiter", &self.limiter)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl<R: ResolveRedirects, D: DecodeManifest> DependencyCrawler<R, D> {
    #[must_use]
    pub fn new(
        github: Arc<Github>,
        resolver: Arc<R>,
        decoder: Arc<D>,
        manifests: Arc<Cache<Manifest>>,
        limiter: Arc<ConcurrencyLimiter>,
    ) -> Self {
        Self {
            github,
            resolver,
            decoder,
            manifests,
            limiter,
            policy: CrawlPolicy::default(),
            progress: Arc::new(NoProgress),
            counters: Arc::new(Counters::default()),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: CrawlPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn stats(&self) -> CrawlStats {
        let c = &self.counters;
        CrawlStats {
            processed: c.processed.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            dropped_forks: c.dropped_forks.load(Ordering::Relaxed),
            dropped_empty: c.dropped_empty.load(Ordering::Relaxed),
            dropped_failed: c.dropped_failed.load(Ordering::Relaxed),
        }
    }

    /// The seeds plus every package reachable from them through dependency manifests.
    ///
    /// The result is deduplicated by normalized URL, keeps the casing of the first
    /// occurrence (seeds first), and is sorted case-insensitively. With a `limit`, no
    /// more packages are discovered once the result holds that many, though seeds are
    /// never dropped. A seed that keeps failing transiently is retried `retries` times
    /// with exponential backoff before it is given up on.
    pub async fn expand(&self, seeds: &[PackageUrl], limit: Option<usize>, retries: u32) -> Vec<PackageUrl> {
        let mut result = merge_with_existing(&[], seeds.iter().cloned());
        let cap = limit.map_or(usize::MAX, |l| l.max(result.len()));
        let mut frontier = result.clone();

        self.progress.set_phase("Crawling");
        let counters = Arc::clone(&self.counters);
        let github = Arc::clone(&self.github);
        self.progress.set_determinate(Box::new(move || {
            let headroom = github.headroom().map_or_else(|| "?".to_string(), |h| h.remaining.to_string());
            (
                counters.queued.load(Ordering::Relaxed),
                counters.processed.load(Ordering::Relaxed),
                format!("rate limit headroom {headroom}"),
            )
        }));

        while !frontier.is_empty() && result.len() < cap {
            let _ = self.counters.queued.fetch_add(frontier.len() as u64, Ordering::Relaxed);
            let known: HashSet<String> = result.iter().map(PackageUrl::normalized).collect();

            let found = join_all(frontier.iter().map(|seed| self.dependencies_of(seed, retries, &known))).await;

            let before = result.len();
            result = merge_with_existing(&result, found.into_iter().flatten());
            result.truncate(cap);
            log::debug!(target: LOG_TARGET, "Round discovered {} new packages", result.len() - before);

            frontier = result.get(before..).map(<[PackageUrl]>::to_vec).unwrap_or_default();
        }

        self.progress.done();

        let stats = self.stats();
        log::info!(
            target: LOG_TARGET,
            "Processed {} packages ({} skipped, {} failed), dropped {} forks, {} without products and {} unreachable",
            stats.processed,
            stats.skipped,
            stats.failed,
            stats.dropped_forks,
            stats.dropped_empty,
            stats.dropped_failed
        );

        sort_normalized(&mut result);
        result
    }

    /// Dependencies of one seed, with retries. Never fails: a seed that can't be
    /// processed contributes nothing.
    async fn dependencies_of(&self, seed: &PackageUrl, retries: u32, known: &HashSet<String>) -> Vec<PackageUrl> {
        let result = self.find_dependencies_with_retry(seed, retries, known).await;

        let processed = self.counters.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if self.policy.progress_interval > 0 && processed.is_multiple_of(self.policy.progress_interval) {
            self.log_progress(processed);
        }

        match result {
            Ok(urls) => urls,
            Err(e) => {
                let _ = self.counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!(target: LOG_TARGET, "Giving up on '{seed}': {e}");
                Vec::new()
            }
        }
    }

    fn log_progress(&self, processed: u64) {
        let queued = self.counters.queued.load(Ordering::Relaxed);
        match self.github.headroom() {
            Some(h) => log::info!(target: LOG_TARGET, "Progress: {processed}/{queued} packages, rate limit headroom {}", h.remaining),
            None => log::info!(target: LOG_TARGET, "Progress: {processed}/{queued} packages"),
        }
    }

    async fn find_dependencies_with_retry(
        &self,
        seed: &PackageUrl,
        retries: u32,
        known: &HashSet<String>,
    ) -> Result<Vec<PackageUrl>, ValidatorError> {
        let mut attempt = 1;

        loop {
            let permit = self.limiter.acquire().await;
            let result = self.find_dependencies(seed, retries, known).await;
            permit.release();

            match result {
                Ok(urls) => return Ok(urls),

                Err(e) if e.is_per_item() => {
                    let _ = self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    if self.policy.is_quiet(seed) {
                        log::debug!(target: LOG_TARGET, "Skipping known-bad package '{seed}': {e}");
                    } else {
                        log::info!(target: LOG_TARGET, "Skipping package '{seed}': {e}");
                    }
                    return Ok(Vec::new());
                }

                Err(e) if e.is_fatal_for_item() => return Err(e),

                Err(e) => {
                    if attempt > retries {
                        log::debug!(target: LOG_TARGET, "Last error for '{seed}': {e}");
                        return Err(ValidatorError::RetryLimitExceeded);
                    }

                    let delay = self.policy.backoff(attempt);
                    log::warn!(
                        target: LOG_TARGET,
                        "Finding dependencies of '{seed}' failed: {e}; retrying in {}s (attempt {} of {})",
                        delay.as_secs(),
                        attempt + 1,
                        retries + 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One pass of the per-seed pipeline.
    async fn find_dependencies(&self, seed: &PackageUrl, retries: u32, known: &HashSet<String>) -> Result<Vec<PackageUrl>, ValidatorError> {
        log::debug!(target: LOG_TARGET, "Finding dependencies of '{seed}'");

        let repository = self.github.fetch_repository(seed.owner(), seed.repository()).await?;
        let manifest = self.load_manifest(&repository).await?;

        let candidates = self.candidates(seed, &manifest);
        let mut found: Vec<PackageUrl> = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let resolved = match self.resolver.resolve_package_redirects(&candidate).await {
                Ok(redirect) => {
                    if let Some(url) = redirect.url() {
                        url.clone()
                    } else {
                        log::info!(target: LOG_TARGET, "Dropping dependency '{candidate}' of '{seed}': {redirect:?}");
                        continue;
                    }
                }
                Err(e) => {
                    log::info!(target: LOG_TARGET, "Dropping dependency '{candidate}' of '{seed}': {e}");
                    continue;
                }
            };

            let normalized = resolved.normalized();
            if known.contains(&normalized) || found.iter().any(|f| f.normalized() == normalized) {
                continue;
            }

            if !self.passes_filters_with_retry(seed, &resolved, retries).await {
                continue;
            }

            log::debug!(target: LOG_TARGET, "  - {resolved}");
            found.push(resolved.appending_git_extension());
        }

        Ok(found)
    }

    /// `https` dependencies on the forge host, `.git`-suffixed.
    fn candidates(&self, seed: &PackageUrl, manifest: &Manifest) -> Vec<PackageUrl> {
        manifest
            .dependencies
            .iter()
            .filter_map(Dependency::first_remote)
            .filter_map(|remote| match PackageUrl::parse(remote) {
                Ok(url) => Some(url),
                Err(e) => {
                    log::debug!(target: LOG_TARGET, "Ignoring dependency '{remote}' of '{seed}': {e}");
                    None
                }
            })
            .filter(|url| self.policy.is_followed(url))
            .map(|url| url.appending_git_extension())
            .collect()
    }

    /// Apply the fork and no-products filters to one candidate, retrying transient
    /// failures. A candidate that still can't be checked is dropped on its own, leaving
    /// the seed's other dependencies intact.
    async fn passes_filters_with_retry(&self, seed: &PackageUrl, url: &PackageUrl, retries: u32) -> bool {
        let mut attempt = 1;

        loop {
            match self.passes_filters(url).await {
                Ok(passes) => return passes,

                Err(e) if e.is_fatal_for_item() || attempt > retries => {
                    let _ = self.counters.dropped_failed.fetch_add(1, Ordering::Relaxed);
                    log::warn!(target: LOG_TARGET, "Dropping dependency '{url}' of '{seed}' after {attempt} attempt(s): {e}");
                    return false;
                }

                Err(e) => {
                    let delay = self.policy.backoff(attempt);
                    log::debug!(target: LOG_TARGET, "Checking '{url}' failed: {e}; retrying in {}s", delay.as_secs());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Apply the fork and no-products filters. Per-item conditions drop the candidate;
    /// anything else is left to the caller to retry.
    async fn passes_filters(&self, url: &PackageUrl) -> Result<bool, ValidatorError> {
        if !self.policy.drop_forks && !self.policy.drop_empty_products {
            return Ok(true);
        }

        let repository = match self.github.fetch_repository(url.owner(), url.repository()).await {
            Ok(repository) => repository,
            Err(e) if e.is_per_item() => {
                log::info!(target: LOG_TARGET, "Dropping '{url}': {e}");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        if self.policy.drop_forks && repository.is_fork {
            let _ = self.counters.dropped_forks.fetch_add(1, Ordering::Relaxed);
            log::info!(target: LOG_TARGET, "Dropping '{url}': repository is a fork");
            return Ok(false);
        }

        if self.policy.drop_empty_products {
            match self.load_manifest(&repository).await {
                Ok(manifest) if manifest.products.is_empty() => {
                    let _ = self.counters.dropped_empty.fetch_add(1, Ordering::Relaxed);
                    log::info!(target: LOG_TARGET, "Dropping '{url}': manifest declares no products");
                    return Ok(false);
                }
                Ok(_) => {}
                Err(e) if e.is_per_item() => {
                    log::info!(target: LOG_TARGET, "Dropping '{url}': {e}");
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(true)
    }

    /// Decoded manifest for `repository`, memoized by repository identity.
    async fn load_manifest(&self, repository: &Repository) -> Result<Manifest, ValidatorError> {
        let key = CacheKey::new(&repository.identity());
        if let Some(manifest) = self.manifests.get(&key) {
            return Ok(manifest);
        }

        let files = self.github.fetch_manifests(repository).await?;
        if let Some(primary) = primary_manifest(&files) {
            log::debug!(target: LOG_TARGET, "Decoding '{}' of '{key}' ({} manifest files)", primary.name, files.len());
        }

        let manifest = self.decoder.decode(repository, &files).await?;
        self.manifests.insert(key, manifest.clone());
        Ok(manifest)
    }
}
