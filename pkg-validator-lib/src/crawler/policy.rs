use crate::urls::{PackageUrl, normalize};
use core::time::Duration;
use std::collections::HashSet;

/// Which discovered dependencies the crawler keeps, and how it paces itself.
#[derive(Debug, Clone)]
pub struct CrawlPolicy {
    /// Drop dependencies whose repository is a fork.
    pub drop_forks: bool,

    /// Drop dependencies whose manifest declares no products.
    pub drop_empty_products: bool,

    /// Only `https` dependencies on this host are followed.
    pub forge_host: String,

    /// First backoff delay when a seed fails transiently; doubled on every retry.
    pub retry_base_delay: Duration,

    /// Log a progress summary after this many seeds.
    pub progress_interval: u64,

    quiet_packages: HashSet<String>,
}

impl Default for CrawlPolicy {
    fn default() -> Self {
        Self {
            drop_forks: true,
            drop_empty_products: true,
            forge_host: "github.com".into(),
            retry_base_delay: Duration::from_secs(5),
            progress_interval: 50,
            quiet_packages: HashSet::new(),
        }
    }
}

impl CrawlPolicy {
    /// Packages known to be broken upstream. Failures for these are logged at debug.
    #[must_use]
    pub fn with_quiet_packages<S: AsRef<str>>(mut self, urls: impl IntoIterator<Item = S>) -> Self {
        self.quiet_packages = urls.into_iter().map(|u| normalize(u.as_ref())).collect();
        self
    }

    #[must_use]
    pub fn is_quiet(&self, url: &PackageUrl) -> bool {
        self.quiet_packages.contains(&url.normalized())
    }

    /// Whether `url` points at the forge over `https`.
    #[must_use]
    pub fn is_followed(&self, url: &PackageUrl) -> bool {
        url.scheme().eq_ignore_ascii_case("https") && url.host().eq_ignore_ascii_case(&self.forge_host)
    }

    /// Backoff before retry number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base_delay.saturating_mul(factor)
    }
}
