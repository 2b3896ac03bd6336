use super::{Redirect, ResolveRedirects};
use crate::error::ValidatorError;
use crate::urls::PackageUrl;
use core::error::Error;
use core::time::Duration;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, LOCATION, RETRY_AFTER};
use std::io::ErrorKind;
use url::Url;

const LOG_TARGET: &str = "  redirect";
const USER_AGENT: &str = "pkg-validator";

#[derive(Debug, Clone)]
pub struct RedirectSettings {
    /// Hops allowed before the chain is abandoned.
    pub max_redirects: u32,

    /// Requests allowed per URL across hops, rate-limit retries, and reconnects.
    pub max_attempts: u32,

    /// Wait used when a `429` carries no usable `Retry-After`.
    pub default_retry_after: Duration,

    /// Wait before retrying after a dropped connection or a `5xx`.
    pub connection_retry_delay: Duration,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RedirectSettings {
    fn default() -> Self {
        Self {
            max_redirects: 10,
            max_attempts: 30,
            default_retry_after: Duration::from_secs(5),
            connection_retry_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
        }
    }
}

/// A single request that didn't produce a [`Redirect`].
#[derive(Debug)]
pub enum HopError {
    /// The server dropped the connection. Worth retrying.
    ConnectionReset,

    /// A `5xx`. Worth retrying.
    ServerError(StatusCode),

    /// Any other transport failure.
    Transport(reqwest::Error),
}

/// Follows `301` chains with `HEAD` requests.
///
/// Automatic redirect handling in the HTTP client is disabled so each hop is seen
/// and counted. Instances hold no per-URL state and can resolve many URLs concurrently.
#[derive(Debug, Clone)]
pub struct RedirectResolver {
    client: reqwest::Client,
    settings: RedirectSettings,
}

impl RedirectResolver {
    pub fn new(token: Option<&str>, settings: RedirectSettings) -> crate::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(settings.timeout);

        if let Some(t) = token {
            let mut auth_val = HeaderValue::from_str(&format!("Bearer {t}"))?;
            auth_val.set_sensitive(true);

            let mut headers = HeaderMap::new();
            let _ = headers.insert(AUTHORIZATION, auth_val);
            builder = builder.default_headers(headers);
        }

        Ok(Self {
            client: builder.build()?,
            settings,
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &RedirectSettings {
        &self.settings
    }

    /// Issue one `HEAD` request and classify the response.
    ///
    /// A `301` comes back as [`Redirect::Redirected`] holding the next hop and a `429`
    /// as [`Redirect::RateLimited`]; it's up to the caller whether to follow or retry.
    pub async fn resolve_once(&self, url: &PackageUrl) -> Result<Redirect, HopError> {
        let response = match self.client.head(url.as_str()).send().await {
            Ok(response) => response,
            Err(e) if is_connection_reset(&e) => return Err(HopError::ConnectionReset),
            Err(e) => return Err(HopError::Transport(e)),
        };

        let status = response.status();
        Ok(match status.as_u16() {
            200..=299 => Redirect::Initial(url.clone()),
            301 => next_hop(url, response.headers()),
            404 => Redirect::NotFound(url.clone()),
            401 | 403 => Redirect::Unauthorized,
            429 => Redirect::RateLimited(retry_after(response.headers()).unwrap_or(self.settings.default_retry_after)),
            500..=599 => return Err(HopError::ServerError(status)),
            _ => Redirect::Error(format!("unexpected status '{}' for url '{url}'", status.as_u16())),
        })
    }

    /// Follow `url` until it answers with something other than a redirect.
    ///
    /// Ends in [`Redirect::Redirected`] with the last hop if at least one redirect was
    /// followed. Fails with [`ValidatorError::MaxRedirectsExceeded`] once the hop limit
    /// is passed, counting dropped connections as hops, and with
    /// [`ValidatorError::RetryLimitExceeded`] if the overall attempt ceiling is reached.
    pub async fn resolve(&self, url: &PackageUrl) -> Result<Redirect, ValidatorError> {
        let mut current = url.clone();
        let mut redirected = false;
        let mut hops = 0;

        for _ in 0..self.settings.max_attempts {
            match self.resolve_once(&current).await {
                Ok(Redirect::Initial(_)) => {
                    return Ok(if redirected {
                        Redirect::Redirected(current)
                    } else {
                        Redirect::Initial(current)
                    });
                }

                Ok(Redirect::Redirected(next)) => {
                    if hops >= self.settings.max_redirects {
                        return Err(ValidatorError::MaxRedirectsExceeded(url.to_string()));
                    }

                    log::debug!(target: LOG_TARGET, "'{current}' redirects to '{next}'");
                    hops += 1;
                    redirected = true;
                    current = next;
                }

                Ok(Redirect::RateLimited(delay)) => {
                    log::warn!(target: LOG_TARGET, "Rate limited while resolving '{current}', retrying in {}s", delay.as_secs());
                    tokio::time::sleep(delay).await;
                }

                Ok(terminal) => return Ok(terminal),

                Err(HopError::ConnectionReset) => {
                    hops += 1;
                    if hops > self.settings.max_redirects {
                        return Err(ValidatorError::MaxRedirectsExceeded(url.to_string()));
                    }

                    let delay = self.settings.connection_retry_delay;
                    log::warn!(target: LOG_TARGET, "Connection closed while resolving '{current}', retrying in {}s", delay.as_secs());
                    tokio::time::sleep(delay).await;
                }

                Err(HopError::ServerError(status)) => {
                    let delay = self.settings.connection_retry_delay;
                    log::info!(target: LOG_TARGET, "Server error {status} for '{current}', retrying in {}s", delay.as_secs());
                    tokio::time::sleep(delay).await;
                }

                Err(HopError::Transport(e)) => {
                    return Ok(Redirect::Error(format!("requesting '{current}': {e}")));
                }
            }
        }

        Err(ValidatorError::RetryLimitExceeded)
    }
}

impl ResolveRedirects for RedirectResolver {
    /// GitHub always redirects `.git`-suffixed `HEAD` requests, so the suffix is
    /// stripped before resolving and put back on a moved URL.
    async fn resolve_package_redirects(&self, url: &PackageUrl) -> Result<Redirect, ValidatorError> {
        Ok(match self.resolve(&url.deleting_git_extension()).await? {
            Redirect::Initial(_) => Redirect::Initial(url.clone()),
            Redirect::Redirected(to) => Redirect::Redirected(to.appending_git_extension()),
            Redirect::NotFound(_) => Redirect::NotFound(url.clone()),
            other => other,
        })
    }
}

/// The target of a `301`, resolved against the current URL when relative.
fn next_hop(current: &PackageUrl, headers: &HeaderMap) -> Redirect {
    let Some(location) = headers.get(LOCATION).and_then(|v| v.to_str().ok()) else {
        return Redirect::Error(format!("no Location header for url '{current}'"));
    };

    if let Ok(url) = PackageUrl::parse(location) {
        return Redirect::Redirected(url);
    }

    let joined = Url::parse(current.as_str())
        .and_then(|base| base.join(location))
        .ok()
        .and_then(|url| PackageUrl::parse(url.as_str()).ok());

    joined.map_or_else(
        || Redirect::Error(format!("invalid Location '{location}' for url '{current}'")),
        Redirect::Redirected,
    )
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs))
}

/// Whether a transport error means the server dropped the connection.
///
/// Walks the error's source chain, since the interesting cause is usually buried
/// a few layers below the HTTP client's own error.
#[must_use]
pub fn is_connection_reset(error: &(dyn Error + 'static)) -> bool {
    let mut source = Some(error);

    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && matches!(
                io.kind(),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof
            )
        {
            return true;
        }

        if e.to_string().contains("connection closed") {
            return true;
        }

        source = e.source();
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::{Display, Formatter};

    fn url(s: &str) -> PackageUrl {
        PackageUrl::parse(s).unwrap()
    }

    fn location(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(LOCATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_next_hop_absolute() {
        let result = next_hop(&url("https://github.com/foo/bar"), &location("https://github.com/Foo/Baz"));
        assert_eq!(result, Redirect::Redirected(url("https://github.com/Foo/Baz")));
    }

    #[test]
    fn test_next_hop_relative() {
        let result = next_hop(&url("https://github.com/foo/bar"), &location("/Foo/Baz"));
        assert_eq!(result, Redirect::Redirected(url("https://github.com/Foo/Baz")));
    }

    #[test]
    fn test_next_hop_missing_location() {
        let result = next_hop(&url("https://github.com/foo/bar"), &HeaderMap::new());
        assert!(matches!(result, Redirect::Error(msg) if msg.contains("no Location")));
    }

    #[test]
    fn test_next_hop_not_a_package() {
        let result = next_hop(&url("https://github.com/foo/bar"), &location("/login"));
        assert!(matches!(result, Redirect::Error(_)));
    }

    #[test]
    fn test_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        let _ = headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        let _ = headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[derive(Debug)]
    struct Wrapper(std::io::Error);

    impl Display for Wrapper {
        fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
            f.write_str("request failed")
        }
    }

    impl Error for Wrapper {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_is_connection_reset_walks_sources() {
        let reset = Wrapper(std::io::Error::from(ErrorKind::ConnectionReset));
        assert!(is_connection_reset(&reset));

        let refused = Wrapper(std::io::Error::from(ErrorKind::ConnectionRefused));
        assert!(!is_connection_reset(&refused));

        let closed = Wrapper(std::io::Error::other("connection closed before message completed"));
        assert!(is_connection_reset(&closed));
    }

    #[test]
    fn test_resolver_creation() {
        assert!(RedirectResolver::new(Some("token"), RedirectSettings::default()).is_ok());
        assert!(RedirectResolver::new(None, RedirectSettings::default()).is_ok());
        assert_eq!(RedirectResolver::new(None, RedirectSettings::default()).unwrap().settings().max_redirects, 10);
    }
}
