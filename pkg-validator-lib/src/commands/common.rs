//! Plumbing shared by the subcommands.

use super::config::Config;
use super::{Host, ProgressReporter};
use crate::Result;
use crate::cache::CacheStore;
use crate::crawler::DependencyCrawler;
use crate::github::Github;
use crate::limiter::ConcurrencyLimiter;
use crate::manifest::DumpPackage;
use crate::package_list;
use crate::progress::Progress;
use crate::redirect::RedirectResolver;
use crate::urls::PackageUrl;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, ValueEnum};
use core::time::Duration;
use directories::BaseDirs;
use ohno::{IntoAppError, bail};
use std::io::Write;
use std::sync::Arc;

const LOG_TARGET: &str = "      list";

/// Color mode configuration for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Always use colors
    Always,

    /// Never use colors
    Never,

    /// Use colors if the output is a terminal, otherwise don't use colors
    Auto,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    /// No logging output
    None,

    /// Only error messages
    Error,

    /// Warning and error messages
    Warn,

    /// Info, warning, and error messages
    Info,

    /// Debug, info, warning, and error messages
    Debug,

    /// Trace, debug, info, warning, and error messages
    Trace,
}

/// Arguments shared by every command that talks to the network
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Path to configuration file (default is `validator.toml` in the working directory)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Directory where repository metadata and decoded manifests are cached
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<Utf8PathBuf>,

    /// Don't read or write the on-disk cache
    #[arg(long)]
    pub no_cache: bool,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    pub log_level: LogLevel,

    /// Control when to use colored output
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorMode,

    /// Maximum number of packages processed at the same time (overrides the configuration)
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,
}

/// Where a command's package URLs come from
#[derive(Args, Debug, Default)]
pub struct InputArgs {
    /// Package URLs to process
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Read the package URLs from a JSON list file
    #[arg(long, short = 'i', value_name = "PATH")]
    pub input: Option<Utf8PathBuf>,

    /// Fetch the package URLs from the published package list
    #[arg(long)]
    pub use_package_list: bool,
}

/// The one input a command was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(Utf8PathBuf),
    PackageList,
    Urls(Vec<String>),
}

impl InputArgs {
    /// Pick the input, rejecting anything but exactly one source.
    pub fn source(&self) -> Result<InputSource> {
        match (&self.input, self.use_package_list, self.urls.is_empty()) {
            (Some(path), false, true) => Ok(InputSource::File(path.clone())),
            (None, true, true) => Ok(InputSource::PackageList),
            (None, false, false) => Ok(InputSource::Urls(self.urls.clone())),
            _ => bail!("specify either an input file (--input), --use-package-list, or a list of package URLs"),
        }
    }

    pub async fn load(&self, config: &Config) -> Result<Vec<PackageUrl>> {
        match self.source()? {
            InputSource::File(path) => package_list::load(path.as_std_path()),
            InputSource::PackageList => package_list::fetch(&config.package_list_url, config.request_timeout).await,
            InputSource::Urls(urls) => urls.iter().map(|u| PackageUrl::parse(u)).collect(),
        }
    }
}

/// Write `urls` as a JSON list to `path`, or to the host's output when the path is
/// missing or `-`.
pub fn write_output<H: Host>(host: &mut H, path: Option<&Utf8PathBuf>, urls: &[PackageUrl]) -> Result<()> {
    match path {
        Some(path) if path.as_str() != "-" => {
            package_list::save(path.as_std_path(), urls)?;
            log::info!(target: LOG_TARGET, "Wrote {} packages to '{path}'", urls.len());
        }
        _ => {
            let json = package_list::to_json(urls)?;
            host.output().write_all(json.as_bytes()).into_app_err("writing package list")?;
        }
    }

    Ok(())
}

/// Initialize logger based on log level
///
/// Later calls keep the logger the first call installed.
pub fn init_logging(log_level: LogLevel) {
    if log_level == LogLevel::None {
        return;
    }

    let level = log_level.to_string();
    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .try_init();
}

/// Everything a network-facing command works with during one run.
#[derive(Debug)]
pub struct Session {
    pub config: Config,
    pub limiter: Arc<ConcurrencyLimiter>,
    pub github: Arc<Github>,
    pub resolver: Arc<RedirectResolver>,
    pub progress: Arc<ProgressReporter>,
    cache: CacheStore,
}

impl Session {
    /// Load the configuration and wire up the clients, cache, and limiter.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the cache can't be opened
    pub async fn new<H: Host>(host: &mut H, args: &CommonArgs) -> Result<Self> {
        init_logging(args.log_level);

        let config = Config::load(Utf8Path::new("."), args.config.as_ref())?;

        let concurrency = args.concurrency.unwrap_or(config.concurrency);
        if concurrency == 0 {
            bail!("--concurrency must be at least 1");
        }

        let token = args.github_token.as_deref().filter(|t| !t.is_empty());
        if token.is_none() {
            log::warn!(target: LOG_TARGET, "No GitHub token given, using anonymous access");
            let _ = writeln!(
                host.error(),
                "Warning: Using anonymous authentication -- you will quickly run into rate limiting issues"
            );
        }

        let cache = if args.no_cache {
            CacheStore::in_memory()
        } else {
            let cache_dir = if let Some(cache_path) = &args.cache_dir {
                cache_path.as_std_path().to_path_buf()
            } else {
                BaseDirs::new()
                    .into_app_err("could not determine cache directory")?
                    .cache_dir()
                    .join("pkg-validator")
            };
            CacheStore::open(&cache_dir).await?
        };

        let limiter = ConcurrencyLimiter::new(concurrency);
        let github = Github::new(token, config.github_settings(), cache.repositories())?.with_limiter(Arc::clone(&limiter));
        let resolver = RedirectResolver::new(token, config.redirect_settings())?;

        let delay = if args.log_level == LogLevel::None {
            Duration::from_millis(300)
        } else {
            Duration::from_hours(365 * 24)
        };

        let use_colors = match args.color {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => {
                use std::io::{IsTerminal, stderr};
                stderr().is_terminal()
            }
        };

        Ok(Self {
            config,
            limiter,
            github: Arc::new(github),
            resolver: Arc::new(resolver),
            progress: Arc::new(ProgressReporter::new(delay, use_colors)),
            cache,
        })
    }

    /// A crawler sharing this session's clients, caches, and limiter.
    pub fn crawler(&self) -> Result<DependencyCrawler<RedirectResolver, DumpPackage>> {
        let decoder = DumpPackage::new(self.config.manifest_command.clone())?;

        Ok(DependencyCrawler::new(
            Arc::clone(&self.github),
            Arc::clone(&self.resolver),
            Arc::new(decoder),
            self.cache.manifests(),
            Arc::clone(&self.limiter),
        )
        .with_policy(self.config.crawl_policy())
        .with_progress(Arc::clone(&self.progress) as Arc<dyn Progress>))
    }

    /// Clear the progress bar and save the caches.
    pub fn finish(&self) -> Result<()> {
        self.progress.done();
        self.cache.persist()
    }
}
