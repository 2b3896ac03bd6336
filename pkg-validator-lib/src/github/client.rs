//! GitHub API client
//!
//! Minimal client for repository metadata, file trees, and raw manifest content.

use super::manifest_files::{ManifestFile, manifest_file_names};
use super::rate_limit::{RateLimit, RateLimitInfo, RateLimitResponse, RateLimitStatus, rate_limit_status};
use super::repository::{GraphQlResponse, Repository, RestRepository, Tree};
use crate::cache::{Cache, CacheKey};
use crate::error::ValidatorError;
use crate::limiter::ConcurrencyLimiter;
use chrono::{DateTime, Utc};
use core::future::Future;
use core::time::Duration;
use ohno::IntoAppError;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};

const LOG_TARGET: &str = "    github";
const USER_AGENT: &str = "pkg-validator";

/// Fallback wait when a GraphQL rate-limit error arrives without reset headers.
const GRAPHQL_RATE_LIMIT_WAIT_SECS: i64 = 60;

const REPOSITORY_QUERY: &str = "query($owner: String!, $name: String!) { \
    repository(owner: $owner, name: $name) { name isFork defaultBranchRef { name } owner { login } } }";

#[derive(Debug, Clone)]
pub struct GithubSettings {
    pub api_base_url: String,
    pub raw_base_url: String,
    pub request_timeout: Duration,

    /// Total attempts per request when the response says we're rate limited.
    pub max_attempts: u32,

    /// Upper bound on a single wait for the quota to reset.
    pub max_rate_limit_wait: Duration,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".into(),
            raw_base_url: "https://raw.githubusercontent.com".into(),
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            max_rate_limit_wait: Duration::from_secs(3600),
        }
    }
}

/// Authenticated access to the GitHub REST and GraphQL APIs.
///
/// Repository lookups are memoized in a shared [`Cache`] keyed by the lower-cased
/// request URL. Requests denied for quota reasons are retried after the reported
/// reset time, up to [`GithubSettings::max_attempts`] attempts in total.
#[derive(Debug)]
pub struct Github {
    client: reqwest::Client,
    settings: GithubSettings,
    authenticated: bool,
    repositories: Arc<Cache<Repository>>,
    limiter: Option<Arc<ConcurrencyLimiter>>,
    headroom: Mutex<Option<RateLimitInfo>>,
}

impl Github {
    /// Create a client with an optional bearer token.
    pub fn new(token: Option<&str>, settings: GithubSettings, repositories: Arc<Cache<Repository>>) -> crate::Result<Self> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        if let Some(t) = token {
            let mut auth_val = HeaderValue::from_str(&format!("Bearer {t}"))?;
            auth_val.set_sensitive(true);
            let _ = headers.insert(AUTHORIZATION, auth_val);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            client,
            settings,
            authenticated: token.is_some(),
            repositories,
            limiter: None,
            headroom: Mutex::new(None),
        })
    }

    /// Pause `limiter` whenever a request hits the rate limit, so other tasks stop
    /// dispatching new work until the quota resets.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<ConcurrencyLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// The rate-limit state reported by the most recent response that carried it.
    #[must_use]
    pub fn headroom(&self) -> Option<RateLimitInfo> {
        *self.headroom.lock().expect("lock poisoned")
    }

    fn api_base(&self) -> &str {
        self.settings.api_base_url.trim_end_matches('/')
    }

    fn repository_url(&self, owner: &str, name: &str) -> String {
        format!("{}/repos/{owner}/{name}", self.api_base())
    }

    /// Repository metadata from `GET /repos/{owner}/{name}`.
    ///
    /// A 404 becomes [`ValidatorError::RepositoryNotFound`] so callers can filter the
    /// repository out rather than fail.
    pub async fn fetch_repository(&self, owner: &str, name: &str) -> Result<Repository, ValidatorError> {
        let url = self.repository_url(owner, name);
        let key = CacheKey::new(&url);

        if let Some(repository) = self.repositories.get(&key) {
            log::trace!(target: LOG_TARGET, "Cache hit for '{key}'");
            return Ok(repository);
        }

        let response = self.get(&url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ValidatorError::RepositoryNotFound {
                owner: owner.to_string(),
                name: name.to_string(),
            });
        }

        let repository: Repository = decode_json::<RestRepository>(&url, response).await?.into();
        self.repositories.insert(key, repository.clone());
        Ok(repository)
    }

    /// Repository metadata through the GraphQL API. Requires a token.
    ///
    /// Shares cache entries with [`fetch_repository`](Self::fetch_repository).
    pub async fn fetch_repository_graphql(&self, owner: &str, name: &str) -> Result<Repository, ValidatorError> {
        if !self.authenticated {
            return Err(ValidatorError::TokenRequired);
        }

        let key = CacheKey::new(&self.repository_url(owner, name));
        if let Some(repository) = self.repositories.get(&key) {
            return Ok(repository);
        }

        let url = format!("{}/graphql", self.api_base());
        let body = serde_json::json!({
            "query": REPOSITORY_QUERY,
            "variables": { "owner": owner, "name": name },
        });

        let (url, body) = (&url, &body);
        let repository = self
            .with_rate_limit_retry(|| async move {
                let response = self.send_once(url, self.client.post(url).json(body)).await?;
                let response: GraphQlResponse = decode_json(url, response).await?;
                self.interpret_graphql(url, owner, name, response)
            })
            .await?;

        self.repositories.insert(key, repository.clone());
        Ok(repository)
    }

    fn interpret_graphql(&self, url: &str, owner: &str, name: &str, response: GraphQlResponse) -> Result<Repository, ValidatorError> {
        for error in &response.errors {
            match error.kind.as_deref() {
                Some("NOT_FOUND") => {
                    return Err(ValidatorError::RepositoryNotFound {
                        owner: owner.to_string(),
                        name: name.to_string(),
                    });
                }
                Some("RATE_LIMITED") => {
                    let until = self
                        .headroom()
                        .map_or_else(|| Utc::now() + chrono::Duration::seconds(GRAPHQL_RATE_LIMIT_WAIT_SECS), |h| h.reset_at);
                    return Err(ValidatorError::RateLimited { until });
                }
                _ => {}
            }
        }

        match response.data.and_then(|d| d.repository) {
            Some(repository) => Ok(repository.into()),
            None => Err(ValidatorError::Decoding {
                context: url.to_string(),
                message: response
                    .errors
                    .first()
                    .map_or_else(|| "response has no repository".to_string(), |e| e.message.clone()),
            }),
        }
    }

    /// The caller's current quota from `GET /rate_limit`.
    pub async fn rate_limit(&self) -> Result<RateLimit, ValidatorError> {
        let url = format!("{}/rate_limit", self.api_base());
        let response = self.get(&url).await?;
        Ok(decode_json::<RateLimitResponse>(&url, response).await?.rate)
    }

    /// Paths of every file in the repository's default branch.
    pub async fn list_repository_file_paths(&self, repository: &Repository) -> Result<Vec<String>, ValidatorError> {
        let branch = default_branch(repository)?;
        let url = format!(
            "{}/repos/{}/{}/git/trees/{branch}",
            self.api_base(),
            repository.owner,
            repository.name
        );

        let response = self.get(&url).await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(ValidatorError::RepositoryNotFound {
                    owner: repository.owner.clone(),
                    name: repository.name.clone(),
                });
            }
            // empty repository
            StatusCode::CONFLICT => return Err(manifest_not_found(repository)),
            _ => {}
        }

        let tree: Tree = decode_json(&url, response).await?;
        Ok(tree.tree.into_iter().filter(|e| e.kind == "blob").map(|e| e.path).collect())
    }

    /// Every top-level manifest file in the default branch, sorted by name.
    pub async fn fetch_manifests(&self, repository: &Repository) -> Result<Vec<ManifestFile>, ValidatorError> {
        let names = self.manifest_names(repository).await?;

        let mut files = Vec::with_capacity(names.len());
        for name in names {
            let contents = self.fetch_raw(repository, &name).await?;
            files.push(ManifestFile { name, contents });
        }

        Ok(files)
    }

    /// Only the primary manifest: the lexicographically last manifest name.
    pub async fn fetch_manifest(&self, repository: &Repository) -> Result<ManifestFile, ValidatorError> {
        let mut names = self.manifest_names(repository).await?;
        let name = names.pop().ok_or_else(|| manifest_not_found(repository))?;
        let contents = self.fetch_raw(repository, &name).await?;
        Ok(ManifestFile { name, contents })
    }

    async fn manifest_names(&self, repository: &Repository) -> Result<Vec<String>, ValidatorError> {
        let paths = self.list_repository_file_paths(repository).await?;
        let names = manifest_file_names(&paths);
        if names.is_empty() {
            return Err(manifest_not_found(repository));
        }

        Ok(names)
    }

    async fn fetch_raw(&self, repository: &Repository, file_name: &str) -> Result<Vec<u8>, ValidatorError> {
        let branch = default_branch(repository)?;
        let url = format!(
            "{}/{}/{}/{branch}/{file_name}",
            self.settings.raw_base_url.trim_end_matches('/'),
            repository.owner,
            repository.name
        );

        let response = self.get(&url).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(manifest_not_found(repository));
        }

        if !status.is_success() {
            return Err(ValidatorError::RequestFailed {
                url,
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .into_app_err_with(|| format!("reading response body from '{url}'"))?;
        Ok(bytes.to_vec())
    }

    /// GET with rate-limit retry. Any status other than a rate-limit denial is returned
    /// to the caller for interpretation.
    async fn get(&self, url: &str) -> Result<Response, ValidatorError> {
        self.with_rate_limit_retry(|| self.send_once(url, self.client.get(url))).await
    }

    async fn send_once(&self, url: &str, request: RequestBuilder) -> Result<Response, ValidatorError> {
        log::trace!(target: LOG_TARGET, "Requesting '{url}'");

        let response = request
            .send()
            .await
            .into_app_err_with(|| format!("requesting '{url}'"))?;

        match rate_limit_status(response.status(), response.headers()) {
            RateLimitStatus::Limited { until } => {
                self.record_headroom(RateLimitInfo { remaining: 0, reset_at: until });
                Err(ValidatorError::RateLimited { until })
            }
            RateLimitStatus::Ok { remaining, reset_at } => {
                self.record_headroom(RateLimitInfo { remaining, reset_at });
                Ok(response)
            }
            RateLimitStatus::Unknown => Ok(response),
        }
    }

    /// Run `op` until it yields anything other than [`ValidatorError::RateLimited`],
    /// sleeping until the reported reset between attempts.
    async fn with_rate_limit_retry<T, F, Fut>(&self, mut op: F) -> Result<T, ValidatorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ValidatorError>>,
    {
        let max_attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match op().await {
                Err(ValidatorError::RateLimited { until }) => {
                    if attempt == max_attempts {
                        break;
                    }

                    self.wait_for_reset(until).await;
                }
                other => return other,
            }
        }

        log::warn!(target: LOG_TARGET, "Still rate limited after {max_attempts} attempts, giving up");
        Err(ValidatorError::RetryLimitExceeded)
    }

    async fn wait_for_reset(&self, reset_at: DateTime<Utc>) {
        let now = Utc::now();
        let max_wait = chrono::Duration::from_std(self.settings.max_rate_limit_wait).unwrap_or_else(|_| chrono::Duration::hours(1));
        let wait_until = reset_at.min(now + max_wait);
        let wait = (wait_until - now).to_std().unwrap_or(Duration::ZERO);

        if wait.is_zero() {
            log::debug!(target: LOG_TARGET, "Rate limit already reset, retrying");
            return;
        }

        let paused = self.limiter.as_ref().is_some_and(|limiter| limiter.pause_for(wait));
        if paused || self.limiter.is_none() {
            let formatted_time = wait_until.with_timezone(&chrono::Local).format("%T");
            log::warn!(target: LOG_TARGET, "GitHub rate limit exceeded, waiting until {formatted_time} to continue");
        }

        tokio::time::sleep(wait).await;
    }

    fn record_headroom(&self, info: RateLimitInfo) {
        *self.headroom.lock().expect("lock poisoned") = Some(info);
    }
}

fn default_branch(repository: &Repository) -> Result<&str, ValidatorError> {
    repository
        .default_branch
        .as_deref()
        .ok_or_else(|| ValidatorError::MissingDefaultBranch {
            owner: repository.owner.clone(),
            name: repository.name.clone(),
        })
}

fn manifest_not_found(repository: &Repository) -> ValidatorError {
    ValidatorError::ManifestNotFound {
        owner: repository.owner.clone(),
        name: repository.name.clone(),
    }
}

/// Decode a successful response body, or report the status as a failure.
async fn decode_json<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, ValidatorError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ValidatorError::RequestFailed {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = response
        .bytes()
        .await
        .into_app_err_with(|| format!("reading response body from '{url}'"))?;

    serde_json::from_slice(&bytes).map_err(|e| ValidatorError::Decoding {
        context: url.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github(token: Option<&str>) -> Github {
        Github::new(token, GithubSettings::default(), Arc::new(Cache::new())).unwrap()
    }

    fn repository(default_branch: Option<&str>) -> Repository {
        Repository {
            default_branch: default_branch.map(str::to_string),
            is_fork: false,
            owner: "foo".into(),
            name: "bar".into(),
        }
    }

    #[test]
    fn test_client_creation() {
        assert!(github(Some("test_token")).is_authenticated());
        assert!(!github(None).is_authenticated());
        assert!(github(None).headroom().is_none());
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let result = Github::new(Some("bad\ntoken"), GithubSettings::default(), Arc::new(Cache::new()));
        assert!(result.is_err());
    }

    #[test]
    fn test_repository_url_trims_trailing_slash() {
        let settings = GithubSettings {
            api_base_url: "http://localhost:1234/".into(),
            ..GithubSettings::default()
        };
        let client = Github::new(None, settings, Arc::new(Cache::new())).unwrap();
        assert_eq!(client.repository_url("Foo", "Bar"), "http://localhost:1234/repos/Foo/Bar");
    }

    #[test]
    fn test_default_branch_required() {
        assert_eq!(default_branch(&repository(Some("main"))).unwrap(), "main");

        let err = default_branch(&repository(None)).unwrap_err();
        assert!(matches!(err, ValidatorError::MissingDefaultBranch { .. }));
    }

    #[tokio::test]
    async fn test_graphql_requires_token() {
        let err = github(None).fetch_repository_graphql("foo", "bar").await.unwrap_err();
        assert!(matches!(err, ValidatorError::TokenRequired));
    }

    #[tokio::test]
    async fn test_cached_repository_skips_network() {
        let cache = Arc::new(Cache::new());
        cache.insert(CacheKey::new("https://api.github.com/repos/foo/bar"), repository(Some("main")));

        // Different casing still hits the same entry
        let client = Github::new(None, GithubSettings::default(), cache).unwrap();
        let repo = client.fetch_repository("Foo", "BAR").await.unwrap();
        assert_eq!(repo, repository(Some("main")));
    }

    #[test]
    fn test_interpret_graphql_errors() {
        let client = github(Some("t"));

        let not_found: GraphQlResponse =
            serde_json::from_str(r#"{"data": {"repository": null}, "errors": [{"type": "NOT_FOUND", "message": "nope"}]}"#).unwrap();
        assert!(matches!(
            client.interpret_graphql("u", "foo", "bar", not_found),
            Err(ValidatorError::RepositoryNotFound { .. })
        ));

        let limited: GraphQlResponse = serde_json::from_str(r#"{"errors": [{"type": "RATE_LIMITED", "message": "slow down"}]}"#).unwrap();
        assert!(matches!(
            client.interpret_graphql("u", "foo", "bar", limited),
            Err(ValidatorError::RateLimited { .. })
        ));

        let other: GraphQlResponse = serde_json::from_str(r#"{"errors": [{"message": "boom"}]}"#).unwrap();
        match client.interpret_graphql("u", "foo", "bar", other) {
            Err(ValidatorError::Decoding { message, .. }) => assert_eq!(message, "boom"),
            r => panic!("unexpected result: {r:?}"),
        }
    }
}
