use crate::api::AppState;
use crate::error::Result;
use crate::search::{
    QueryAnalysis, QueryStrategy, SearchMode, SearchRequest, SearchResponse, ServiceHealth,
    StrategyComparison, SuggestionRequest, SuggestionResponse,
};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use validator::Validate;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let health = state.service.health();
    Json(HealthResponse {
        status: if health.serving { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        details: health,
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub details: ServiceHealth,
}

/// Process liveness; never touches the backend
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Ready only while the backend is serving
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ServiceHealth>) {
    let health = state.service.health();
    let status = if health.serving {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

/// Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::gather_metrics(),
    )
}

/// Full search
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    request.validate()?;

    let ctx = state.service.new_context();
    let _guard = ctx.cancel_on_drop();
    let response = state.service.search_with_context(request, &ctx).await?;
    Ok(Json(response))
}

/// Facet counts without hits
pub async fn facets(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    request.validate()?;

    let ctx = state.service.new_context();
    let _guard = ctx.cancel_on_drop();
    let response = state.service.facets(request, &ctx).await?;
    Ok(Json(response))
}

/// Autocomplete
pub async fn suggest(
    State(state): State<AppState>,
    Query(request): Query<SuggestionRequest>,
) -> Result<Json<SuggestionResponse>> {
    request.validate()?;

    let ctx = state.service.new_context();
    let _guard = ctx.cancel_on_drop();
    let response = state.service.suggest(&request, &ctx).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeParams {
    #[serde(default)]
    #[validate(length(max = 256))]
    pub q: String,
}

/// Classify a query and recommend a strategy
pub async fn analyze(
    State(state): State<AppState>,
    Query(params): Query<AnalyzeParams>,
) -> Result<Json<QueryAnalysis>> {
    params.validate()?;
    Ok(Json(state.service.analyze(&params.q)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompareRequest {
    #[validate(length(min = 1, max = 256))]
    pub query: String,
}

/// Run the query under each comparison strategy
pub async fn compare(
    State(state): State<AppState>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<StrategyComparison>> {
    request.validate()?;

    let ctx = state.service.new_context();
    let _guard = ctx.cancel_on_drop();
    let comparison = state.service.compare(&request.query, &ctx).await?;
    Ok(Json(comparison))
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub strategy: QueryStrategy,
    pub mode: SearchMode,
    pub function_score: bool,
    pub boosts: BTreeMap<String, f32>,
    pub body: Value,
}

/// Show the backend query a request would execute
pub async fn plan(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<PlanResponse>> {
    let plan = state.service.plan(request)?;
    Ok(Json(PlanResponse {
        strategy: plan.strategy(),
        mode: plan.mode(),
        function_score: plan.has_function_score(),
        boosts: plan.boosts().clone(),
        body: plan.body().clone(),
    }))
}
