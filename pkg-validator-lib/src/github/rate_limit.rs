use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Deserialize;

/// Rate limit information from response headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

/// What a response says about the caller's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitStatus {
    /// The request was denied because the quota is used up.
    Limited { until: DateTime<Utc> },

    /// The request was not denied for quota reasons.
    Ok { remaining: u64, reset_at: DateTime<Utc> },

    /// The response carries no usable rate-limit headers, or a denial that isn't about quota.
    Unknown,
}

/// Classify a response's rate-limit state.
///
/// Only a denial (403 or 429) whose `x-ratelimit-remaining` header is present and
/// zero counts as limited. A denial without those headers is some other failure.
#[must_use]
pub fn rate_limit_status(status: StatusCode, headers: &HeaderMap) -> RateLimitStatus {
    let Some(info) = extract_rate_limit_from_headers(headers) else {
        return RateLimitStatus::Unknown;
    };

    if matches!(status.as_u16(), 403 | 429) {
        if info.remaining == 0 {
            RateLimitStatus::Limited { until: info.reset_at }
        } else {
            RateLimitStatus::Unknown
        }
    } else {
        RateLimitStatus::Ok {
            remaining: info.remaining,
            reset_at: info.reset_at,
        }
    }
}

/// Extract rate limit information from API response headers
pub(super) fn extract_rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let remaining = headers.get("x-ratelimit-remaining")?.to_str().ok()?.parse::<u64>().ok()?;
    let reset_timestamp = headers.get("x-ratelimit-reset")?.to_str().ok()?.parse::<i64>().ok()?;
    let reset_at = DateTime::from_timestamp(reset_timestamp, 0)?;

    Some(RateLimitInfo { remaining, reset_at })
}

/// The core quota reported by `GET /rate_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimit {
    pub limit: u64,
    pub used: u64,
    pub remaining: u64,
    pub reset: i64,
}

impl RateLimit {
    #[must_use]
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.reset, 0)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct RateLimitResponse {
    pub rate: RateLimit,
}
