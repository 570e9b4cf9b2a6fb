//! Autocomplete, popular-query and spelling suggestions

use crate::search::config::SearchConfig;
use crate::search::connection::{BackendRequest, ConnectionManager};
use crate::search::context::RequestContext;
use crate::search::error::SearchResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use strum_macros::{AsRefStr, Display};
use tracing::warn;
use validator::Validate;

const COMPLETION_FIELD: &str = "suggest";
const SPELLING_FIELD: &str = "title";
const QUERY_FIELD: &str = "query";
const QUERY_COUNT_FIELD: &str = "count";
const QUERY_LAST_SEEN_FIELD: &str = "last_searched_at";

/// Entity kinds with a completion suggester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SuggestionKind {
    Product,
    Category,
    Brand,
    Query,
    Correction,
}

/// Suggestion lookup parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SuggestionRequest {
    #[validate(length(max = 128))]
    pub q: String,

    #[serde(default = "default_suggest_limit")]
    #[validate(range(min = 1, max = 20))]
    pub limit: u32,

    /// Edit-distance tolerance on completion prefixes
    #[serde(default)]
    pub fuzzy: bool,
}

fn default_suggest_limit() -> u32 {
    5
}

impl SuggestionRequest {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            limit: default_suggest_limit(),
            fuzzy: false,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = fuzzy;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub kind: SuggestionKind,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Sections are filled independently; a failed section is empty and named
/// in `degraded`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionResponse {
    pub query: String,
    pub products: Vec<Suggestion>,
    pub categories: Vec<Suggestion>,
    pub brands: Vec<Suggestion>,
    pub popular_queries: Vec<Suggestion>,
    pub corrections: Vec<Suggestion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
}

/// Suggestion engine over the connection manager
#[derive(Debug, Clone)]
pub struct SuggestionEngine {
    products_index: String,
    categories_index: String,
    brands_index: String,
    queries_index: String,
}

impl SuggestionEngine {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            products_index: config.products_index.clone(),
            categories_index: config.categories_index.clone(),
            brands_index: config.brands_index.clone(),
            queries_index: config.queries_index.clone(),
        }
    }

    /// Run every lookup concurrently. Individual failures degrade their
    /// section to an empty list.
    pub async fn suggest(
        &self,
        request: &SuggestionRequest,
        connection: &ConnectionManager,
        ctx: &RequestContext,
    ) -> SearchResult<SuggestionResponse> {
        ctx.check()?;
        let prefix = request.q.trim();
        if prefix.is_empty() {
            return Ok(SuggestionResponse::default());
        }
        let limit = request.limit.clamp(1, 20);

        let (products, categories, brands, popular, corrections) = futures::join!(
            self.completion(&self.products_index, SuggestionKind::Product, prefix, limit, request.fuzzy, connection, ctx),
            self.completion(&self.categories_index, SuggestionKind::Category, prefix, limit, request.fuzzy, connection, ctx),
            self.completion(&self.brands_index, SuggestionKind::Brand, prefix, limit, request.fuzzy, connection, ctx),
            self.popular_queries(prefix, limit, connection, ctx),
            self.spelling(prefix, limit, connection, ctx),
        );

        // Cancellation or an expired deadline fails the whole request
        ctx.check()?;

        let mut response = SuggestionResponse {
            query: prefix.to_string(),
            ..Default::default()
        };
        response.products = settle("products", products, &mut response.degraded);
        response.categories = settle("categories", categories, &mut response.degraded);
        response.brands = settle("brands", brands, &mut response.degraded);
        response.popular_queries = settle("popular_queries", popular, &mut response.degraded);
        response.corrections = settle("corrections", corrections, &mut response.degraded);
        Ok(response)
    }

    #[allow(clippy::too_many_arguments)]
    async fn completion(
        &self,
        index: &str,
        kind: SuggestionKind,
        prefix: &str,
        limit: u32,
        fuzzy: bool,
        connection: &ConnectionManager,
        ctx: &RequestContext,
    ) -> SearchResult<Vec<Suggestion>> {
        let raw = connection
            .execute(
                &BackendRequest::search(index, completion_body(prefix, limit, fuzzy)),
                ctx,
            )
            .await?;
        Ok(parse_completion(&raw, kind, limit))
    }

    async fn popular_queries(
        &self,
        prefix: &str,
        limit: u32,
        connection: &ConnectionManager,
        ctx: &RequestContext,
    ) -> SearchResult<Vec<Suggestion>> {
        let raw = connection
            .execute(
                &BackendRequest::search(&self.queries_index, popular_queries_body(prefix, limit)),
                ctx,
            )
            .await?;
        Ok(parse_popular_queries(&raw, limit))
    }

    async fn spelling(
        &self,
        text: &str,
        limit: u32,
        connection: &ConnectionManager,
        ctx: &RequestContext,
    ) -> SearchResult<Vec<Suggestion>> {
        let raw = connection
            .execute(
                &BackendRequest::search(&self.products_index, spelling_body(text)),
                ctx,
            )
            .await?;
        Ok(parse_corrections(&raw, text, limit))
    }
}

fn settle(
    section: &str,
    result: SearchResult<Vec<Suggestion>>,
    degraded: &mut Vec<String>,
) -> Vec<Suggestion> {
    match result {
        Ok(suggestions) => suggestions,
        Err(e) => {
            warn!(section = %section, error = %e, "Suggestion lookup failed");
            crate::metrics::SUGGESTION_FAILURES
                .with_label_values(&[section])
                .inc();
            degraded.push(section.to_string());
            Vec::new()
        }
    }
}

pub fn completion_body(prefix: &str, limit: u32, fuzzy: bool) -> Value {
    let mut completion = json!({
        "field": COMPLETION_FIELD,
        "size": limit,
        "skip_duplicates": true
    });
    if fuzzy {
        completion["fuzzy"] = json!({ "fuzziness": "AUTO", "prefix_length": 1 });
    }
    json!({
        "_source": ["id", "title", "name"],
        "suggest": {
            "completion": {
                "prefix": prefix,
                "completion": completion
            }
        }
    })
}

/// Prefix matches on logged queries, ranked by log-scaled frequency and
/// decayed by time since last seen
pub fn popular_queries_body(prefix: &str, limit: u32) -> Value {
    let lowered = prefix.to_lowercase();
    json!({
        "size": limit,
        "_source": [QUERY_FIELD, QUERY_COUNT_FIELD],
        "query": {
            "function_score": {
                "query": {
                    "bool": {
                        "should": [
                            { "prefix": { "query.keyword": { "value": lowered, "boost": 2.0 } } },
                            { "match_phrase_prefix": { QUERY_FIELD: { "query": lowered } } }
                        ],
                        "minimum_should_match": 1,
                        "filter": [{ "range": { "result_count": { "gt": 0 } } }]
                    }
                },
                "functions": [
                    {
                        "field_value_factor": {
                            "field": QUERY_COUNT_FIELD,
                            "modifier": "log1p",
                            "missing": 1
                        }
                    },
                    {
                        "gauss": {
                            QUERY_LAST_SEEN_FIELD: {
                                "origin": "now",
                                "scale": "7d",
                                "decay": 0.5
                            }
                        }
                    }
                ],
                "score_mode": "multiply",
                "boost_mode": "multiply"
            }
        }
    })
}

pub fn spelling_body(text: &str) -> Value {
    json!({
        "size": 0,
        "suggest": {
            "text": text,
            "spelling": {
                "term": {
                    "field": SPELLING_FIELD,
                    "suggest_mode": "popular",
                    "sort": "frequency",
                    "max_edits": 2
                }
            }
        }
    })
}

fn parse_completion(raw: &Value, kind: SuggestionKind, limit: u32) -> Vec<Suggestion> {
    let mut seen = HashSet::new();
    raw["suggest"]["completion"]
        .as_array()
        .into_iter()
        .flatten()
        .flat_map(|entry| entry["options"].as_array().into_iter().flatten())
        .filter_map(|option| {
            let text = option["text"].as_str()?.to_string();
            if !seen.insert(text.to_lowercase()) {
                return None;
            }
            let id = option["_source"]["id"]
                .as_str()
                .map(str::to_string)
                .or_else(|| option["_source"]["id"].as_u64().map(|n| n.to_string()))
                .or_else(|| option["_id"].as_str().map(str::to_string));
            Some(Suggestion {
                text,
                kind,
                score: option["_score"].as_f64().unwrap_or(0.0),
                id,
            })
        })
        .take(limit as usize)
        .collect()
}

fn parse_popular_queries(raw: &Value, limit: u32) -> Vec<Suggestion> {
    let mut seen = HashSet::new();
    raw["hits"]["hits"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|hit| {
            let text = hit["_source"][QUERY_FIELD].as_str()?.trim().to_string();
            if text.is_empty() || !seen.insert(text.to_lowercase()) {
                return None;
            }
            Some(Suggestion {
                text,
                kind: SuggestionKind::Query,
                score: hit["_score"].as_f64().unwrap_or(0.0),
                id: None,
            })
        })
        .take(limit as usize)
        .collect()
}

/// Whole-query corrections: each term option replaces its token in the
/// original text. Deduplicated, the unchanged query excluded.
fn parse_corrections(raw: &Value, text: &str, limit: u32) -> Vec<Suggestion> {
    let original = text.to_lowercase();
    let tokens: Vec<&str> = original.split_whitespace().collect();
    let mut seen = HashSet::new();
    seen.insert(tokens.join(" "));

    let mut corrections = Vec::new();
    for entry in raw["suggest"]["spelling"].as_array().into_iter().flatten() {
        let Some(token) = entry["text"].as_str().map(str::to_lowercase) else {
            continue;
        };
        for option in entry["options"].as_array().into_iter().flatten() {
            let Some(replacement) = option["text"].as_str() else {
                continue;
            };
            let candidate = tokens
                .iter()
                .map(|t| if *t == token { replacement } else { *t })
                .collect::<Vec<_>>()
                .join(" ");
            if seen.insert(candidate.clone()) {
                corrections.push(Suggestion {
                    text: candidate,
                    kind: SuggestionKind::Correction,
                    score: option["score"].as_f64().unwrap_or(0.0),
                    id: None,
                });
            }
        }
    }

    corrections.sort_by(|a, b| b.score.total_cmp(&a.score));
    corrections.truncate(limit as usize);
    corrections
}
