use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::{Config, ProviderKind};
use crate::enrichment::{EnrichRequest, EnrichmentError, EnrichmentProvider};
use crate::models::{EnrichmentResult, Source};

pub fn provider_from_config(config: &Config) -> anyhow::Result<Box<dyn EnrichmentProvider>> {
    match &config.provider {
        ProviderKind::Mock => Ok(Box::new(MockProvider)),
        ProviderKind::Http { endpoint } => {
            let provider = HttpProvider::new(endpoint.clone(), config.enrich_timeout)?;
            Ok(Box::new(provider))
        }
    }
}

// --- Canned provider ---

/// Returns a fixed enrichment built from the request strings.
///
/// Stands in for a real fetch-and-summarize pipeline; the shape of what it
/// returns is the contract any replacement has to honour.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockProvider;

const WHAT_THEY_DO: [&str; 4] = [
    "Develop large language models with a focus on safety",
    "Research interpretability and alignment in AI systems",
    "Build enterprise AI solutions for various industries",
    "Publish research papers on AI safety and ethics",
];

const KEYWORDS: [&str; 8] = [
    "artificial intelligence",
    "machine learning",
    "AI safety",
    "large language models",
    "interpretability",
    "enterprise AI",
    "research",
    "Claude",
];

const DERIVED_SIGNALS: [&str; 4] = [
    "Careers page shows 50+ open positions across engineering and research",
    "Recent blog post about constitutional AI approach",
    "Strong GitHub presence with open-source libraries",
    "Research papers published at major conferences (NeurIPS, ICML)",
];

const SOURCE_PAGES: [&str; 3] = ["about", "blog", "careers"];

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl EnrichmentProvider for MockProvider {
    async fn fetch(&self, request: &EnrichRequest) -> Result<EnrichmentResult, EnrichmentError> {
        let base = request.url.trim().trim_end_matches('/');
        let sources = SOURCE_PAGES
            .iter()
            .map(|page| Source {
                url: format!("{}/{}", base, page),
                fetched_at: Utc::now(),
            })
            .collect();

        Ok(EnrichmentResult {
            summary: format!(
                "{} is an AI research company focused on developing safe and interpretable AI systems.",
                request.display_name()
            ),
            what_they_do: owned(&WHAT_THEY_DO),
            keywords: owned(&KEYWORDS),
            derived_signals: owned(&DERIVED_SIGNALS),
            sources,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// --- Remote provider ---

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Forwards requests to a remote service speaking the same JSON contract as
/// `POST /api/enrich`.
#[derive(Debug)]
pub struct HttpProvider {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(endpoint: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { endpoint, client })
    }
}

/// Whether a failed status is worth retrying.
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[async_trait]
impl EnrichmentProvider for HttpProvider {
    async fn fetch(&self, request: &EnrichRequest) -> Result<EnrichmentResult, EnrichmentError> {
        debug!(endpoint = %self.endpoint, "posting enrichment request");
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| EnrichmentError::transient(format!("request to {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_default();
            let message = format!("{} returned {}: {}", self.endpoint, status, detail);
            return Err(if is_transient_status(status) {
                EnrichmentError::transient(message)
            } else {
                EnrichmentError::permanent(message)
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| EnrichmentError::transient(format!("reading response body failed: {}", e)))?;
        serde_json::from_slice(&body).map_err(|e| EnrichmentError::MalformedResponse(e.to_string()))
    }

    fn name(&self) -> &str {
        "http"
    }
}
