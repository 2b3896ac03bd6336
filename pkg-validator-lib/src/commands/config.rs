use crate::Result;
use crate::crawler::CrawlPolicy;
use crate::github::GithubSettings;
use crate::redirect::RedirectSettings;
use camino::{Utf8Path, Utf8PathBuf};
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Name of the configuration file looked up when `--config` isn't given
pub const CONFIG_FILE_NAME: &str = "validator.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Maximum number of packages processed at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// How often a package is retried after a transient failure
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// First retry delay; doubled on every further retry
    #[serde(default = "default_delay", with = "humantime_serde")]
    pub retry_base_delay: Duration,

    /// Redirect hops followed before a URL is given up on
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Requests allowed per URL while resolving redirects
    #[serde(default = "default_max_redirect_attempts")]
    pub max_redirect_attempts: u32,

    /// Wait before retrying after the server dropped the connection
    #[serde(default = "default_delay", with = "humantime_serde")]
    pub connection_retry_delay: Duration,

    /// Timeout for API requests
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Timeout for redirect checks
    #[serde(default = "default_delay", with = "humantime_serde")]
    pub head_timeout: Duration,

    /// Longest single wait for a rate limit to reset
    #[serde(default = "default_max_rate_limit_wait", with = "humantime_serde")]
    pub max_rate_limit_wait: Duration,

    /// Leave out dependencies that are forks
    #[serde(default = "default_true")]
    pub drop_forks: bool,

    /// Leave out dependencies whose manifest declares no products
    #[serde(default = "default_true")]
    pub drop_empty_products: bool,

    /// Only dependencies hosted here are followed
    #[serde(default = "default_forge_host")]
    pub forge_host: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_raw_base_url")]
    pub raw_base_url: String,

    #[serde(default = "default_index_api_base_url")]
    pub index_api_base_url: String,

    #[serde(default = "default_package_list_url")]
    pub package_list_url: String,

    /// Tool that prints a package manifest as JSON
    #[serde(default = "default_manifest_command")]
    pub manifest_command: Vec<String>,

    /// Log a progress line after this many packages
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,

    /// Packages whose failures are only logged at debug level
    #[serde(default)]
    pub quiet_packages: Vec<String>,
}

const fn default_concurrency() -> usize {
    1
}

const fn default_retries() -> u32 {
    3
}

const fn default_delay() -> Duration {
    Duration::from_secs(5)
}

const fn default_max_redirects() -> u32 {
    10
}

const fn default_max_redirect_attempts() -> u32 {
    30
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_max_rate_limit_wait() -> Duration {
    Duration::from_secs(3600)
}

const fn default_true() -> bool {
    true
}

fn default_forge_host() -> String {
    "github.com".into()
}

fn default_api_base_url() -> String {
    "https://api.github.com".into()
}

fn default_raw_base_url() -> String {
    "https://raw.githubusercontent.com".into()
}

fn default_index_api_base_url() -> String {
    "https://swiftpackageindex.com".into()
}

fn default_package_list_url() -> String {
    "https://raw.githubusercontent.com/SwiftPackageIndex/PackageList/main/packages.json".into()
}

fn default_manifest_command() -> Vec<String> {
    vec!["swift".into(), "package".into(), "dump-package".into()]
}

const fn default_progress_interval() -> u64 {
    50
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// Without an explicit path, `validator.toml` in `base_dir` is used if it exists.
    pub fn load(base_dir: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration file '{path}'"))?;
            (path.clone(), text)
        } else {
            let path = base_dir.join(CONFIG_FILE_NAME);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Ok(Self::default());
                }
                Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration file '{path}'")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{final_path}'"))?;
        config.validate()?;

        Ok(config)
    }

    /// Save the default configuration to a TOML file
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(app_err!("concurrency must be at least 1"));
        }

        if self.max_redirects == 0 {
            return Err(app_err!("max_redirects must be at least 1"));
        }

        if self.max_redirect_attempts <= self.max_redirects {
            return Err(app_err!(
                "max_redirect_attempts ({}) must be greater than max_redirects ({})",
                self.max_redirect_attempts,
                self.max_redirects
            ));
        }

        if self.manifest_command.is_empty() {
            return Err(app_err!("manifest_command must name a program"));
        }

        if self.progress_interval == 0 {
            return Err(app_err!("progress_interval must be at least 1"));
        }

        Ok(())
    }

    #[must_use]
    pub fn github_settings(&self) -> GithubSettings {
        GithubSettings {
            api_base_url: self.api_base_url.clone(),
            raw_base_url: self.raw_base_url.clone(),
            request_timeout: self.request_timeout,
            max_attempts: self.retries.max(1),
            max_rate_limit_wait: self.max_rate_limit_wait,
        }
    }

    #[must_use]
    pub fn redirect_settings(&self) -> RedirectSettings {
        RedirectSettings {
            max_redirects: self.max_redirects,
            max_attempts: self.max_redirect_attempts,
            default_retry_after: default_delay(),
            connection_retry_delay: self.connection_retry_delay,
            timeout: self.head_timeout,
        }
    }

    #[must_use]
    pub fn crawl_policy(&self) -> CrawlPolicy {
        let mut policy = CrawlPolicy::default().with_quiet_packages(&self.quiet_packages);
        policy.drop_forks = self.drop_forks;
        policy.drop_empty_products = self.drop_empty_products;
        policy.forge_host.clone_from(&self.forge_host);
        policy.retry_base_delay = self.retry_base_delay;
        policy.progress_interval = self.progress_interval;
        policy
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.retry_base_delay, Duration::from_secs(5));
        assert_eq!(config.quiet_packages.len(), 6);
    }

    #[test]
    fn test_empty_file_matches_defaults() {
        let config: Config = toml::from_str("").unwrap();
        let defaults = Config::default();
        assert_eq!(config.concurrency, defaults.concurrency);
        assert_eq!(config.max_rate_limit_wait, defaults.max_rate_limit_wait);
        assert_eq!(config.manifest_command, defaults.manifest_command);
        assert_eq!(config.package_list_url, defaults.package_list_url);
        assert!(config.quiet_packages.is_empty());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let _ = toml::from_str::<Config>("concurency = 4").unwrap_err();
    }

    #[test]
    fn test_humantime_durations() {
        let config: Config = toml::from_str("retry_base_delay = \"250ms\"\nmax_rate_limit_wait = \"10m\"").unwrap();
        assert_eq!(config.retry_base_delay, Duration::from_millis(250));
        assert_eq!(config.max_rate_limit_wait, Duration::from_secs(600));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let config = Config { concurrency: 0, ..Config::default() };
        let _ = config.validate().unwrap_err();
    }

    #[test]
    fn test_validate_zero_max_redirects() {
        let config = Config { max_redirects: 0, ..Config::default() };
        let _ = config.validate().unwrap_err();
    }

    #[test]
    fn test_validate_attempts_must_exceed_redirects() {
        let config = Config {
            max_redirects: 10,
            max_redirect_attempts: 10,
            ..Config::default()
        };
        let _ = config.validate().unwrap_err();
    }

    #[test]
    fn test_validate_empty_manifest_command() {
        let config = Config { manifest_command: Vec::new(), ..Config::default() };
        let _ = config.validate().unwrap_err();
    }

    #[test]
    fn test_validate_zero_progress_interval() {
        let config = Config { progress_interval: 0, ..Config::default() };
        let _ = config.validate().unwrap_err();
    }

    #[test]
    fn test_derived_settings() {
        let config = Config::default();

        let github = config.github_settings();
        assert_eq!(github.max_attempts, 3);
        assert_eq!(github.api_base_url, "https://api.github.com");

        let redirect = config.redirect_settings();
        assert_eq!(redirect.max_attempts, 30);
        assert_eq!(redirect.timeout, Duration::from_secs(5));

        let policy = config.crawl_policy();
        assert!(policy.drop_forks);
        assert!(policy.is_quiet(&crate::urls::PackageUrl::parse("https://github.com/mxcl/promisekit").unwrap()));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_save_default_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let output_path = Utf8PathBuf::try_from(tmp.path().join(CONFIG_FILE_NAME)).unwrap();
        Config::save_default(&output_path).unwrap();
        let loaded = Config::load(&Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap(), Some(&output_path)).unwrap();
        loaded.validate().unwrap();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_load_from_base_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        fs::write(base.join(CONFIG_FILE_NAME), "concurrency = 4\ndrop_forks = false\n").unwrap();

        let config = Config::load(&base, None).unwrap();
        assert_eq!(config.concurrency, 4);
        assert!(!config.drop_forks);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_load_missing_config_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        let config = Config::load(&base, None).unwrap();
        config.validate().unwrap();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_load_invalid_config_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        fs::write(base.join(CONFIG_FILE_NAME), "concurrency = 0\n").unwrap();

        let _ = Config::load(&base, None).unwrap_err();
    }
}
