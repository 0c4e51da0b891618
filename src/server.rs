//! HTTP surface
//!
//! - `GET  /health`
//! - `GET  /usage_summary?date=YYYY-MM-DD` (defaults to today, UTC)
//! - `GET  /usage_summary/range?since=YYYY-MM-DD&until=YYYY-MM-DD`
//! - `GET  /usage_summary/dates` (dates that have recorded usage)
//! - `POST /usage` with a [`UsageRequest`] body
//! - `GET  /pricing`
//! - `GET  /stats`
//!
//! Errors are returned as `{"error": ..., "kind": ...}`: 400 for rejected
//! input, 500 for anything else.

use crate::error::UsageError;
use crate::ledger::{LedgerStats, UsageLedger};
use crate::models::{parse_date, CostBreakdown, DailySummary, UsageRequest};
use crate::pricing::{PricingEntry, Rates};
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<UsageLedger>,
}

#[derive(Debug)]
pub struct ApiError(UsageError);

impl From<UsageError> for ApiError {
    fn from(err: UsageError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            UsageError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, kind = self.0.kind(), "Request failed");
        }
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub since: String,
    pub until: String,
}

#[derive(Debug, Serialize)]
pub struct DatesResponse {
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct PricingResponse {
    pub models: Vec<PricingEntry>,
    pub fallback: Rates,
}

pub fn router(ledger: Arc<UsageLedger>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/usage_summary", get(usage_summary))
        .route("/usage_summary/range", get(usage_summary_range))
        .route("/usage_summary/dates", get(usage_dates))
        .route("/usage", post(record_usage))
        .route("/pricing", get(pricing))
        .route("/stats", get(stats))
        .with_state(AppState { ledger })
}

/// Serve until Ctrl-C.
pub async fn serve(ledger: Arc<UsageLedger>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, router(ledger))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn usage_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<DailySummary>, ApiError> {
    let summary = state.ledger.get_summary_for(query.date.as_deref()).await?;
    Ok(Json(summary))
}

async fn usage_summary_range(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<DailySummary>>, ApiError> {
    let since = parse_date(&query.since)?;
    let until = parse_date(&query.until)?;
    Ok(Json(state.ledger.get_summaries(since, until).await?))
}

async fn usage_dates(State(state): State<AppState>) -> Result<Json<DatesResponse>, ApiError> {
    let dates = state.ledger.available_dates().await?;
    Ok(Json(DatesResponse { dates }))
}

async fn record_usage(
    State(state): State<AppState>,
    payload: Result<Json<UsageRequest>, JsonRejection>,
) -> Result<Json<CostBreakdown>, ApiError> {
    let Json(request) =
        payload.map_err(|rejection| UsageError::validation(rejection.body_text()))?;
    Ok(Json(state.ledger.record(request).await?))
}

async fn pricing(State(state): State<AppState>) -> Json<PricingResponse> {
    let table = state.ledger.pricing();
    Json(PricingResponse {
        models: table.entries().into_iter().cloned().collect(),
        fallback: table.fallback(),
    })
}

async fn stats(State(state): State<AppState>) -> Json<LedgerStats> {
    Json(state.ledger.stats())
}
