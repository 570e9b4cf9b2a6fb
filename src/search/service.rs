//! Search orchestrator

use crate::search::aggregation::AggregationEngine;
use crate::search::analytics::{AnalyticsEmitter, SearchEvent};
use crate::search::analyzer::{QueryAnalysis, QueryAnalyzer, StrategyComparison};
use crate::search::cache::SearchCache;
use crate::search::catalog::CatalogStore;
use crate::search::config::SearchConfig;
use crate::search::connection::{BackendRequest, ConnectionManager, ConnectionSnapshot};
use crate::search::context::RequestContext;
use crate::search::error::{SearchError, SearchResult};
use crate::search::query::{QueryBuilder, QueryPlan};
use crate::search::request::SearchRequest;
use crate::search::response::{parse_hits, parse_total, PaginationMeta, SearchResponse, Timing};
use crate::search::suggest::{SuggestionEngine, SuggestionRequest, SuggestionResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

/// Readiness view for health endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub serving: bool,
    pub connection: ConnectionSnapshot,
    pub cache: String,
}

/// Composes query building, execution, facet transformation, caching and
/// analytics for one search.
pub struct SearchService {
    config: SearchConfig,
    builder: QueryBuilder,
    aggregations: AggregationEngine,
    analyzer: QueryAnalyzer,
    suggestions: SuggestionEngine,
    connection: Arc<ConnectionManager>,
    cache: SearchCache,
    catalog: Arc<dyn CatalogStore>,
    analytics: AnalyticsEmitter,
}

impl SearchService {
    pub fn new(
        config: SearchConfig,
        connection: Arc<ConnectionManager>,
        cache: SearchCache,
        catalog: Arc<dyn CatalogStore>,
        analytics: AnalyticsEmitter,
    ) -> Self {
        Self {
            builder: QueryBuilder::new(config.clone()),
            aggregations: AggregationEngine::new(&config),
            analyzer: QueryAnalyzer::new(&config),
            suggestions: SuggestionEngine::new(&config),
            config,
            connection,
            cache,
            catalog,
            analytics,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Fresh context with the configured deadline
    pub fn new_context(&self) -> RequestContext {
        RequestContext::new(self.config.request_deadline())
    }

    /// Search with the default deadline
    pub async fn search(&self, request: SearchRequest) -> SearchResult<SearchResponse> {
        let ctx = self.new_context();
        self.search_with_context(request, &ctx).await
    }

    /// Search under a caller-supplied context
    pub async fn search_with_context(
        &self,
        request: SearchRequest,
        ctx: &RequestContext,
    ) -> SearchResult<SearchResponse> {
        self.run_search(request, ctx, false).await
    }

    /// Facet counts only: zero hits, facets forced on
    pub async fn facets(&self, request: SearchRequest, ctx: &RequestContext) -> SearchResult<SearchResponse> {
        let request = request.with_facets(true);
        self.run_search(request, ctx, true).await
    }

    async fn run_search(
        &self,
        request: SearchRequest,
        ctx: &RequestContext,
        facets_only: bool,
    ) -> SearchResult<SearchResponse> {
        let started = Instant::now();
        request.validate()?;
        let (request, warnings) = self.analyzer.validate_and_correct(request);
        let strategy = request.effective_strategy();
        debug!(request_id = %ctx.request_id(), strategy = %strategy, facets_only, "Search started");

        let result = ctx
            .run(self.execute_search(&request, warnings, ctx, facets_only, started))
            .await;

        let operation = if facets_only { "facets" } else { "search" };
        let outcome = match &result {
            Ok(response) if response.cached => "cache_hit",
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        crate::metrics::SEARCH_REQUESTS
            .with_label_values(&[strategy.as_ref(), outcome])
            .inc();
        crate::metrics::SEARCH_LATENCY
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());

        result
    }

    async fn execute_search(
        &self,
        request: &SearchRequest,
        warnings: Vec<String>,
        ctx: &RequestContext,
        facets_only: bool,
        started: Instant,
    ) -> SearchResult<SearchResponse> {
        let plan = if facets_only {
            self.builder.build_facets_only(request)
        } else {
            self.builder.build(request)
        };
        let cache_key = self.cache.key_for(request, plan.pagination());

        if let Some(mut cached) = self.cache.get(&cache_key).await {
            cached.cached = true;
            cached.timing.total_ms = started.elapsed().as_millis() as u64;
            cached.warnings = warnings;
            debug!(cache_key = %cache_key, "Serving cached response");
            self.emit_event(request, &cached);
            return Ok(cached);
        }

        let plan = self.attach_aggregations(request, plan);
        debug!(
            strategy = %plan.strategy(),
            mode = %plan.mode(),
            function_score = plan.has_function_score(),
            "Executing search plan"
        );

        let raw = self
            .connection
            .execute(
                &BackendRequest::search(&self.config.products_index, plan.body().clone()),
                ctx,
            )
            .await?;

        let hits = parse_hits(&raw);
        let total = parse_total(&raw);
        let facets = self
            .aggregations
            .transform(raw.get("aggregations"), request, self.catalog.as_ref())
            .await;

        let response = SearchResponse {
            hits,
            total,
            facets,
            pagination: PaginationMeta::new(plan.pagination(), total.value),
            strategy: plan.strategy(),
            mode: plan.mode(),
            cached: false,
            timing: Timing {
                took_ms: raw["took"].as_u64().unwrap_or(0),
                total_ms: started.elapsed().as_millis() as u64,
            },
            warnings,
        };

        self.cache.put(&cache_key, &response).await;
        self.emit_event(request, &response);

        info!(
            strategy = %response.strategy,
            total = response.total.value,
            hits = response.hits.len(),
            took_ms = response.timing.took_ms,
            total_ms = response.timing.total_ms,
            "Search completed"
        );
        Ok(response)
    }

    fn attach_aggregations(&self, request: &SearchRequest, plan: QueryPlan) -> QueryPlan {
        plan.with_aggregations(self.aggregations.build_aggregations(request, &request.facets))
    }

    fn emit_event(&self, request: &SearchRequest, response: &SearchResponse) {
        self.analytics.emit(SearchEvent {
            id: Uuid::now_v7(),
            query: request.query_text().map(str::to_string),
            strategy: response.strategy,
            mode: response.mode,
            result_count: response.total.value,
            latency_ms: response.timing.total_ms,
            filters_used: request
                .filters
                .active_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            cache_hit: response.cached,
            timestamp: Utc::now(),
        });
    }

    /// The query plan a request would execute, aggregations included
    pub fn plan(&self, request: SearchRequest) -> SearchResult<QueryPlan> {
        request.validate()?;
        let (request, _) = self.analyzer.validate_and_correct(request);
        let plan = self.builder.build(&request);
        Ok(self.attach_aggregations(&request, plan))
    }

    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        self.analyzer.analyze(query)
    }

    pub async fn compare(&self, query: &str, ctx: &RequestContext) -> SearchResult<StrategyComparison> {
        if query.trim().is_empty() {
            return Err(SearchError::Validation("query must not be empty".to_string()));
        }
        ctx.run(self.analyzer.compare(query, &self.builder, &self.connection, ctx))
            .await
    }

    pub async fn suggest(
        &self,
        request: &SuggestionRequest,
        ctx: &RequestContext,
    ) -> SearchResult<SuggestionResponse> {
        request.validate()?;
        let started = Instant::now();
        let result = ctx
            .run(self.suggestions.suggest(request, &self.connection, ctx))
            .await;
        crate::metrics::SEARCH_LATENCY
            .with_label_values(&["suggest"])
            .observe(started.elapsed().as_secs_f64());
        result
    }

    pub fn health(&self) -> ServiceHealth {
        let connection = self.connection.snapshot();
        ServiceHealth {
            serving: connection.is_serving(),
            connection,
            cache: self.cache.store_name().to_string(),
        }
    }
}
