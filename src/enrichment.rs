use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::EnrichmentResult;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub company_name: String,
}

// `null` on the wire means the same as an absent field.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl EnrichRequest {
    pub fn new(url: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            company_name: company_name.into(),
        }
    }

    /// Company name for display, with a stand-in when the caller left it blank.
    pub fn display_name(&self) -> &str {
        match self.company_name.trim() {
            "" => "This company",
            name => name,
        }
    }

    /// Check the preconditions that must hold before any network call.
    pub fn validate(&self) -> Result<Url, EnrichmentError> {
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err(EnrichmentError::MissingInput);
        }
        let url = Url::parse(raw).map_err(|e| EnrichmentError::InvalidUrl(format!("{raw}: {e}")))?;
        if url.cannot_be_a_base() || !url.has_host() {
            return Err(EnrichmentError::InvalidUrl(format!("{raw}: not an absolute URL")));
        }
        Ok(url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichmentError {
    #[error("URL is required")]
    MissingInput,

    #[error("invalid URL {0}")]
    InvalidUrl(String),

    #[error("enrichment provider failed: {message}")]
    ProviderFailure { message: String, transient: bool },

    #[error("malformed enrichment response: {0}")]
    MalformedResponse(String),
}

impl EnrichmentError {
    pub fn transient(message: impl Into<String>) -> Self {
        EnrichmentError::ProviderFailure {
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        EnrichmentError::ProviderFailure {
            message: message.into(),
            transient: false,
        }
    }

    /// Whether trying the same request again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EnrichmentError::ProviderFailure {
                transient: true,
                ..
            }
        )
    }

    /// Errors caused by the request itself rather than the provider.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            EnrichmentError::MissingInput | EnrichmentError::InvalidUrl(_)
        )
    }
}

/// An out-of-process source of enrichment data.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn fetch(&self, request: &EnrichRequest) -> Result<EnrichmentResult, EnrichmentError>;
    fn name(&self) -> &str;
}

/// Run one enrichment request against `provider`, bounded by `timeout`.
///
/// Input is validated before the provider is touched. The returned future may
/// be dropped at any point to cancel; nothing is persisted here.
pub async fn enrich(
    provider: &dyn EnrichmentProvider,
    request: &EnrichRequest,
    timeout: Duration,
) -> Result<EnrichmentResult, EnrichmentError> {
    let url = request.validate()?;
    debug!(provider = provider.name(), %url, "starting enrichment");

    let issued_at = Utc::now();
    let outcome = match tokio::time::timeout(timeout, provider.fetch(request)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(provider = provider.name(), %url, ?timeout, "enrichment timed out");
            return Err(EnrichmentError::transient(format!(
                "no response within {}s",
                timeout.as_secs_f64()
            )));
        }
    };
    let received_at = Utc::now();

    let mut result = outcome
        .inspect_err(|e| warn!(provider = provider.name(), %url, error = %e, "enrichment failed"))?;

    check_result(&result, issued_at, received_at)?;
    result.dedup_keywords();

    info!(
        provider = provider.name(),
        %url,
        sources = result.sources.len(),
        "enrichment complete"
    );
    Ok(result)
}

/// Conformance rules every provider response must satisfy.
///
/// Remote providers stamp sources with millisecond precision, so the window
/// opens at `issued_at` truncated to the millisecond.
pub fn check_result(
    result: &EnrichmentResult,
    issued_at: DateTime<Utc>,
    received_at: DateTime<Utc>,
) -> Result<(), EnrichmentError> {
    let issued_at = issued_at.trunc_subsecs(3);
    if result.summary.trim().is_empty() {
        return Err(EnrichmentError::MalformedResponse(
            "summary is empty".to_string(),
        ));
    }
    if result.sources.is_empty() {
        return Err(EnrichmentError::MalformedResponse(
            "no sources in a successful response".to_string(),
        ));
    }
    for source in &result.sources {
        if source.url.trim().is_empty() {
            return Err(EnrichmentError::MalformedResponse(
                "source with empty url".to_string(),
            ));
        }
        if source.fetched_at < issued_at || source.fetched_at > received_at {
            return Err(EnrichmentError::MalformedResponse(format!(
                "source {} fetched at {} outside request window {} .. {}",
                source.url,
                source.fetched_at.to_rfc3339(),
                issued_at.to_rfc3339(),
                received_at.to_rfc3339()
            )));
        }
    }
    Ok(())
}

/// Companies with an enrichment currently running.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` if another enrichment for it is still pending.
    /// The claim is released when the guard drops.
    pub fn begin(&self, key: &str) -> Option<InFlightGuard> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if !keys.insert(key.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            keys: Arc::clone(&self.keys),
            key: key.to_string(),
        })
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        response: fn() -> Result<EnrichmentResult, EnrichmentError>,
        delay: Duration,
    }

    impl CountingProvider {
        fn new(response: fn() -> Result<EnrichmentResult, EnrichmentError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl EnrichmentProvider for CountingProvider {
        async fn fetch(&self, _request: &EnrichRequest) -> Result<EnrichmentResult, EnrichmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.response)()
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn good() -> Result<EnrichmentResult, EnrichmentError> {
        Ok(EnrichmentResult {
            summary: "Acme makes anvils.".to_string(),
            what_they_do: vec!["Anvils".to_string()],
            keywords: vec!["anvils".to_string(), "Anvils".to_string(), "cartoons".to_string()],
            derived_signals: vec![],
            sources: vec![Source {
                url: "https://acme.test/about".to_string(),
                fetched_at: Utc::now(),
            }],
        })
    }

    fn no_sources() -> Result<EnrichmentResult, EnrichmentError> {
        good().map(|mut r| {
            r.sources.clear();
            r
        })
    }

    fn stale_source() -> Result<EnrichmentResult, EnrichmentError> {
        good().map(|mut r| {
            r.sources[0].fetched_at = Utc::now() - chrono::Duration::days(1);
            r
        })
    }

    fn future_source() -> Result<EnrichmentResult, EnrichmentError> {
        good().map(|mut r| {
            r.sources[0].fetched_at = Utc::now() + chrono::Duration::days(1);
            r
        })
    }

    fn rate_limited() -> Result<EnrichmentResult, EnrichmentError> {
        Err(EnrichmentError::transient("429 Too Many Requests"))
    }

    #[tokio::test]
    async fn test_missing_url_never_calls_provider() {
        let provider = CountingProvider::new(good);
        for url in ["", "   "] {
            let request = EnrichRequest::new(url, "Acme");
            let err = enrich(&provider, &request, DEFAULT_TIMEOUT).await.unwrap_err();
            assert_eq!(err, EnrichmentError::MissingInput);
            assert!(err.is_caller_error());
            assert!(!err.is_retryable());
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_relative_url_is_rejected() {
        let provider = CountingProvider::new(good);
        let request = EnrichRequest::new("acme.test/about", "Acme");
        let err = enrich(&provider, &request, DEFAULT_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::InvalidUrl(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_enrichment_dedups_keywords() {
        let provider = CountingProvider::new(good);
        let request = EnrichRequest::new("https://acme.test", "");
        let result = enrich(&provider, &request, DEFAULT_TIMEOUT).await.unwrap();
        assert!(!result.sources.is_empty());
        assert_eq!(result.keywords, vec!["anvils".to_string(), "cartoons".to_string()]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_sources_is_malformed() {
        let provider = CountingProvider::new(no_sources);
        let request = EnrichRequest::new("https://acme.test", "Acme");
        let err = enrich(&provider, &request, DEFAULT_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::MalformedResponse(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_source_outside_request_window_is_malformed() {
        let provider = CountingProvider::new(stale_source);
        let request = EnrichRequest::new("https://acme.test", "Acme");
        let err = enrich(&provider, &request, DEFAULT_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_source_fetched_after_response_is_malformed() {
        let provider = CountingProvider::new(future_source);
        let request = EnrichRequest::new("https://acme.test", "Acme");
        let err = enrich(&provider, &request, DEFAULT_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::MalformedResponse(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_millisecond_stamps_within_issue_millisecond_are_accepted() {
        let issued_at = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let received_at = DateTime::from_timestamp(1_700_000_000, 123_900_000).unwrap();
        let mut result = good().unwrap();
        result.sources[0].fetched_at = DateTime::from_timestamp(1_700_000_000, 123_000_000).unwrap();
        assert_eq!(check_result(&result, issued_at, received_at), Ok(()));

        result.sources[0].fetched_at = DateTime::from_timestamp(1_700_000_000, 122_000_000).unwrap();
        assert!(matches!(
            check_result(&result, issued_at, received_at),
            Err(EnrichmentError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_null_fields_decode_as_empty() {
        let request: EnrichRequest =
            serde_json::from_str(r#"{"url":null,"companyName":null}"#).unwrap();
        assert_eq!(request, EnrichRequest::default());
        assert_eq!(request.validate(), Err(EnrichmentError::MissingInput));
        assert_eq!(request.display_name(), "This company");
    }

    #[tokio::test]
    async fn test_provider_failure_passes_through() {
        let provider = CountingProvider::new(rate_limited);
        let request = EnrichRequest::new("https://acme.test", "Acme");
        let err = enrich(&provider, &request, DEFAULT_TIMEOUT).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_is_transient_provider_failure() {
        let mut provider = CountingProvider::new(good);
        provider.delay = Duration::from_secs(60);
        let request = EnrichRequest::new("https://acme.test", "Acme");
        let err = enrich(&provider, &request, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(
            err,
            EnrichmentError::ProviderFailure {
                transient: true,
                ..
            }
        ));
    }

    #[test]
    fn test_display_name_falls_back() {
        assert_eq!(EnrichRequest::new("u", "  ").display_name(), "This company");
        assert_eq!(EnrichRequest::new("u", "Glean").display_name(), "Glean");
    }

    #[test]
    fn test_in_flight_rejects_duplicates_until_dropped() {
        let in_flight = InFlight::new();
        let guard = in_flight.begin("4").unwrap();
        assert!(in_flight.begin("4").is_none());
        assert!(in_flight.begin("5").is_some());
        drop(guard);
        assert!(in_flight.begin("4").is_some());
    }

    #[tokio::test]
    async fn test_cancelled_enrichment_releases_claim() {
        let in_flight = InFlight::new();
        let mut provider = CountingProvider::new(good);
        provider.delay = Duration::from_secs(60);
        let request = EnrichRequest::new("https://acme.test", "Acme");

        let task = async {
            let _guard = in_flight.begin("1");
            enrich(&provider, &request, DEFAULT_TIMEOUT).await
        };
        let abandoned = tokio::time::timeout(Duration::from_millis(10), task).await;
        assert!(abandoned.is_err());
        assert!(in_flight.begin("1").is_some());
    }
}
