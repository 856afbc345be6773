//! HTTP fetching with retry, backoff, and per-domain request shaping.
//!
//! Both extractors fetch through the same retry-with-backoff utility; they
//! differ only in which failures they consider retryable. Each HTML attempt
//! rotates through a pool of desktop User-Agent strings and stretches its
//! timeout, which recovers a surprising number of flaky or picky hosts.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use url::Url;

use crate::{DistillError, Result};

/// Desktop User-Agent pool, rotated by `attempt % len`.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/121.0",
];

/// Retry and timeout policy for page fetches.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Timeout of the first attempt.
    pub base_timeout: Duration,
    /// Added to the timeout on every subsequent attempt.
    pub timeout_step: Duration,
    /// Retries beyond the first attempt.
    pub max_retries: usize,
    /// Sleep between attempts, indexed by attempt number.
    pub retry_delays: Vec<Duration>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(15),
            timeout_step: Duration::from_secs(5),
            max_retries: 3,
            retry_delays: vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(3)],
        }
    }
}

impl FetchConfig {
    /// A policy with no inter-attempt sleeps, for tests.
    pub fn immediate() -> Self {
        Self { retry_delays: vec![Duration::ZERO; 3], ..Self::default() }
    }
}

/// Builds the shared HTTP client used by both extractors.
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(5))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(DistillError::Http)
}

/// Runs `op` up to `1 + max_retries` times, sleeping `delays[attempt]`
/// between attempts. `op` receives the zero-based attempt index so callers
/// can rotate User-Agents and stretch timeouts. Errors `is_retryable`
/// rejects propagate immediately; otherwise the last error wins.
pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: usize, delays: &[Duration], is_retryable: impl Fn(&DistillError) -> bool, mut op: F,
) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_retries || !is_retryable(&err) {
                    return Err(err);
                }
                tracing::debug!(attempt = attempt + 1, error = %err, "attempt failed, retrying");
                if let Some(delay) = delays.get(attempt)
                    && !delay.is_zero()
                {
                    tokio::time::sleep(*delay).await;
                }
                attempt += 1;
            }
        }
    }
}

/// Fetches a page body with the full retry/rotation policy applied.
///
/// Any non-success status or transport error triggers the next retry;
/// after the final retry the last error propagates unchanged.
pub async fn fetch_html(client: &reqwest::Client, url: &str, config: &FetchConfig) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| DistillError::InvalidUrl(e.to_string()))?;
    let domain = parsed.host_str().unwrap_or("").to_lowercase();

    retry_with_backoff(config.max_retries, &config.retry_delays, |_| true, |attempt| {
        let client = client.clone();
        let url = url.to_string();
        let domain = domain.clone();
        let timeout = attempt_timeout(config, &domain, attempt);
        async move {
            tracing::debug!(attempt = attempt + 1, %url, "fetching page");
            let response = client
                .get(&url)
                .headers(request_headers(&domain, attempt))
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| map_transport_error(&e, &url))?;

            let status = response.status();
            if !(status.is_success() || status.is_redirection()) {
                return Err(map_status_error(status, &url));
            }

            let body = response
                .text()
                .await
                .map_err(|e| DistillError::FetchFailed { url: url.clone(), message: e.to_string() })?;
            tracing::debug!(%url, bytes = body.len(), "fetched page");
            Ok(body)
        }
    })
    .await
}

/// Per-attempt timeout: base + step per attempt, with a floor for AWS
/// documentation hosts which are reliably slow.
fn attempt_timeout(config: &FetchConfig, domain: &str, attempt: usize) -> Duration {
    let timeout = config.base_timeout + config.timeout_step * attempt as u32;
    if domain.contains("amazonaws.com") || domain.contains("aws.amazon.com") {
        timeout.max(Duration::from_secs(20))
    } else {
        timeout
    }
}

/// Browser-like header set with per-domain overrides for hosts known to be
/// picky about request shape.
fn request_headers(domain: &str, attempt: usize) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        HeaderValue::from_static(USER_AGENTS[attempt % USER_AGENTS.len()]),
    );
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        ),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
    headers.insert("Sec-Fetch-User", HeaderValue::from_static("?1"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

    if domain.contains("amazonaws.com") || domain.contains("aws.amazon.com") {
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
        );
        headers.insert("DNT", HeaderValue::from_static("1"));
    }
    if domain.contains("github.com") {
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
    }
    if domain.ends_with(".cn") || domain.contains("baidu.com") || domain.contains("zhihu.com") {
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9"));
    }

    headers
}

/// Maps a non-success HTTP status to the user-facing error for `url`.
pub(crate) fn map_status_error(status: StatusCode, url: &str) -> DistillError {
    match status.as_u16() {
        403 => DistillError::AccessForbidden { url: url.to_string() },
        404 => DistillError::PageNotFound { url: url.to_string() },
        429 => DistillError::RateLimited { url: url.to_string() },
        code if code >= 500 => DistillError::ServerError { url: url.to_string(), status: code },
        code => DistillError::FetchFailed { url: url.to_string(), message: format!("HTTP {}", code) },
    }
}

/// Maps reqwest transport failures onto the fetch error taxonomy. DNS
/// failures are only distinguishable from other connect errors by the
/// resolver error in the source chain, hence the string probe.
pub(crate) fn map_transport_error(err: &reqwest::Error, url: &str) -> DistillError {
    if err.is_timeout() {
        return DistillError::FetchTimeout { url: url.to_string() };
    }
    if err.is_connect() {
        let detail = format!("{err:?}").to_lowercase();
        if detail.contains("dns") {
            return DistillError::DomainResolution { url: url.to_string() };
        }
        return DistillError::ConnectionRefused { url: url.to_string() };
    }
    DistillError::FetchFailed { url: url.to_string(), message: err.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retry_exhausts_then_propagates_last_error() {
        let attempts = AtomicUsize::new(0);
        let result: Result<()> = retry_with_backoff(3, &[Duration::ZERO; 3], |_| true, |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(DistillError::AccessForbidden { url: "https://x.test".into() }) }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4, "1 initial + 3 retries");
        assert!(matches!(result, Err(DistillError::AccessForbidden { .. })));
    }

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(3, &[Duration::ZERO; 3], |_| true, |attempt| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(DistillError::FetchTimeout { url: "https://x.test".into() })
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let attempts = AtomicUsize::new(0);
        let result: Result<()> = retry_with_backoff(
            3,
            &[Duration::ZERO; 3],
            |err| !matches!(err, DistillError::PdfTooLarge { .. }),
            |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(DistillError::PdfTooLarge { limit_mb: 50 }) }
            },
        )
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(DistillError::PdfTooLarge { .. })));
    }

    #[test]
    fn test_user_agent_rotation_wraps() {
        let headers_a = request_headers("example.com", 0);
        let headers_b = request_headers("example.com", USER_AGENTS.len());
        assert_eq!(headers_a.get(header::USER_AGENT), headers_b.get(header::USER_AGENT));

        let headers_c = request_headers("example.com", 1);
        assert_ne!(headers_a.get(header::USER_AGENT), headers_c.get(header::USER_AGENT));
    }

    #[test]
    fn test_cjk_domains_get_narrow_language() {
        let headers = request_headers("www.zhihu.com", 0);
        assert_eq!(headers.get(header::ACCEPT_LANGUAGE).unwrap(), "zh-CN,zh;q=0.9");
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status_error(StatusCode::FORBIDDEN, "u"),
            DistillError::AccessForbidden { .. }
        ));
        assert!(matches!(map_status_error(StatusCode::NOT_FOUND, "u"), DistillError::PageNotFound { .. }));
        assert!(matches!(
            map_status_error(StatusCode::TOO_MANY_REQUESTS, "u"),
            DistillError::RateLimited { .. }
        ));
        assert!(matches!(
            map_status_error(StatusCode::BAD_GATEWAY, "u"),
            DistillError::ServerError { status: 502, .. }
        ));
    }

    #[test]
    fn test_aws_timeout_floor() {
        let config = FetchConfig::default();
        assert_eq!(attempt_timeout(&config, "docs.aws.amazon.com", 0), Duration::from_secs(20));
        assert_eq!(attempt_timeout(&config, "example.com", 0), Duration::from_secs(15));
        assert_eq!(attempt_timeout(&config, "example.com", 2), Duration::from_secs(25));
    }
}
