use crate::Result;
use crate::urls::CanonicalUrl;
use core::time::Duration;
use ohno::IntoAppError;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const LOG_TARGET: &str = "     index";

/// A package as the index knows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    pub id: String,
    pub url: CanonicalUrl,
    #[serde(default)]
    pub resolved_dependencies: Option<Vec<CanonicalUrl>>,
}

/// Every package the records describe.
#[must_use]
pub fn indexed_packages(records: &[PackageRecord]) -> HashSet<CanonicalUrl> {
    records.iter().map(|r| r.url.clone()).collect()
}

/// Every dependency named by any record, whether or not it is indexed itself.
#[must_use]
pub fn all_dependencies(records: &[PackageRecord]) -> HashSet<CanonicalUrl> {
    records
        .iter()
        .filter_map(|r| r.resolved_dependencies.as_deref())
        .flatten()
        .cloned()
        .collect()
}

/// Read-only client for the index's package-record API.
#[derive(Debug, Clone)]
pub struct IndexApi {
    client: reqwest::Client,
    base_url: String,
}

impl IndexApi {
    pub fn new(base_url: impl Into<String>, token: &str, timeout: Duration) -> Result<Self> {
        let mut auth_val = HeaderValue::from_str(&format!("Bearer {token}"))?;
        auth_val.set_sensitive(true);

        let mut headers = HeaderMap::new();
        let _ = headers.insert(AUTHORIZATION, auth_val);

        let client = reqwest::Client::builder()
            .user_agent("pkg-validator")
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// `GET /api/dependencies`: every package with its resolved dependencies.
    pub async fn fetch_dependencies(&self) -> Result<Vec<PackageRecord>> {
        let url = format!("{}/api/dependencies", self.base_url.trim_end_matches('/'));
        log::info!(target: LOG_TARGET, "Fetching package records from '{url}'");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .into_app_err_with(|| format!("requesting '{url}'"))?
            .error_for_status()
            .into_app_err_with(|| format!("requesting '{url}'"))?;

        let bytes = response.bytes().await.into_app_err_with(|| format!("reading response from '{url}'"))?;
        let records: Vec<PackageRecord> = serde_json::from_slice(&bytes).into_app_err_with(|| format!("decoding package records from '{url}'"))?;

        log::debug!(target: LOG_TARGET, "Received {} package records", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDS: &str = r#"[
        {
            "id": "2f5e6d8a-0b1c-4e3f-9a7b-1c2d3e4f5a6b",
            "url": "https://github.com/foo/bar.git",
            "resolvedDependencies": ["https://github.com/foo/baz.git", "https://github.com/Foo/Bar"]
        },
        {
            "id": "7a8b9c0d-1e2f-4a3b-8c4d-5e6f7a8b9c0d",
            "url": "https://github.com/foo/baz",
            "resolvedDependencies": null
        },
        {
            "id": "0d1e2f3a-4b5c-4d6e-8f7a-9b0c1d2e3f4a",
            "url": "https://github.com/foo/qux.git"
        }
    ]"#;

    #[test]
    fn test_decode_records() {
        let records: Vec<PackageRecord> = serde_json::from_str(RECORDS).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].resolved_dependencies.as_ref().unwrap().len(), 2);
        assert!(records[1].resolved_dependencies.is_none());
        assert!(records[2].resolved_dependencies.is_none());
    }

    #[test]
    fn test_indexed_and_dependencies() {
        let records: Vec<PackageRecord> = serde_json::from_str(RECORDS).unwrap();

        let indexed = indexed_packages(&records);
        assert_eq!(indexed.len(), 3);

        // Same repository in different spellings counts once
        let deps = all_dependencies(&records);
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().all(|d| indexed.contains(d)));
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let _ = IndexApi::new("http://localhost", "bad\ntoken", Duration::from_secs(1)).unwrap_err();
    }
}
