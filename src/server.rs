use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, Request, State, rejection::QueryRejection},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::db::Database;
use crate::enrichment::{self, EnrichRequest, EnrichmentError, EnrichmentProvider, InFlight};
use crate::listing::{self, ALL, Facets, ListingPage, SortDirection, SortField};
use crate::models::{Company, EnrichmentResult};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub provider: Arc<dyn EnrichmentProvider>,
    pub in_flight: InFlight,
    pub enrich_timeout: Duration,
    pub page_size: usize,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(&'static str),
    Conflict(&'static str),
    EnrichmentFailed,
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.to_string()),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message.to_string()),
            ApiError::EnrichmentFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to enrich company data".to_string(),
            ),
            ApiError::Internal(e) => {
                let detail = format!("{:#}", e);
                error!(error = %detail, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/enrich", post(enrich_company))
        .route("/api/companies", get(list_companies))
        .route("/api/companies/facets", get(company_facets))
        .route("/api/companies/:id", get(get_company))
        .route("/api/companies/:id/enrichment", get(latest_enrichment))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %listener.local_addr()?, provider = state.provider.name(), "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "handled request"
    );
    response
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

// --- Enrichment ---

async fn enrich_company(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<EnrichmentResult>, ApiError> {
    // An unreadable body is treated like any other internal failure
    let request: EnrichRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "could not decode enrichment request");
        ApiError::EnrichmentFailed
    })?;

    match request.validate() {
        Err(EnrichmentError::MissingInput) => {
            return Err(ApiError::BadRequest("URL is required".to_string()));
        }
        Err(EnrichmentError::InvalidUrl(_)) => {
            return Err(ApiError::BadRequest("URL is invalid".to_string()));
        }
        _ => {}
    }

    let company = state.db.company_by_website(&request.url).map_err(|e| {
        let detail = format!("{:#}", e);
        error!(error = %detail, "company lookup failed");
        ApiError::EnrichmentFailed
    })?;
    let key = company
        .as_ref()
        .map(|c| c.id.clone())
        .unwrap_or_else(|| request.url.trim().trim_end_matches('/').to_lowercase());
    let Some(_guard) = state.in_flight.begin(&key) else {
        return Err(ApiError::Conflict("Enrichment already in progress"));
    };

    let result = enrichment::enrich(state.provider.as_ref(), &request, state.enrich_timeout)
        .await
        .map_err(|e| {
            error!(error = %e, retryable = e.is_retryable(), "Enrichment error");
            ApiError::EnrichmentFailed
        })?;

    if let Some(company) = &company {
        if let Err(e) = state.db.save_enrichment(&company.id, &result) {
            warn!(company_id = %company.id, error = %e, "could not store enrichment");
        }
    }

    Ok(Json(result))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredEnrichment {
    enriched_at: DateTime<Utc>,
    #[serde(flatten)]
    result: EnrichmentResult,
}

async fn latest_enrichment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoredEnrichment>, ApiError> {
    let (result, enriched_at) = state
        .db
        .latest_enrichment(&id)?
        .ok_or(ApiError::NotFound("No enrichment for this company"))?;
    Ok(Json(StoredEnrichment {
        enriched_at,
        result,
    }))
}

// --- Companies ---

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    q: Option<String>,
    industry: Option<String>,
    stage: Option<String>,
    sort: Option<String>,
    dir: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
}

impl ListParams {
    fn to_query(&self, default_page_size: usize) -> Result<listing::Query, listing::ListingError> {
        let sort_field = match &self.sort {
            Some(field) => field.parse()?,
            None => SortField::Name,
        };
        let sort_direction = match &self.dir {
            Some(dir) => dir.parse()?,
            None => SortDirection::Asc,
        };
        Ok(listing::Query {
            search_text: self.q.clone().unwrap_or_default(),
            industry_filter: self.industry.clone().unwrap_or_else(|| ALL.to_string()),
            stage_filter: self.stage.clone().unwrap_or_else(|| ALL.to_string()),
            sort_field,
            sort_direction,
            page: self.page.unwrap_or(1),
            page_size: self.page_size.unwrap_or(default_page_size),
        })
    }
}

async fn list_companies(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ListingPage>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let query = params
        .to_query(state.page_size)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let companies = state.db.list_companies()?;
    let page = listing::list(&companies, &query).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(page))
}

async fn company_facets(State(state): State<AppState>) -> Result<Json<Facets>, ApiError> {
    let companies = state.db.list_companies()?;
    Ok(Json(listing::facets(&companies)))
}

async fn get_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Company>, ApiError> {
    state
        .db
        .get_company(&id)?
        .map(Json)
        .ok_or(ApiError::NotFound("Company not found"))
}
