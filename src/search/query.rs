//! Query building: SearchRequest -> backend query body
//!
//! Building is pure and infallible. Out-of-range request values are clamped,
//! a missing query text produces a match-all plan.

use crate::search::config::SearchConfig;
use crate::search::request::{
    Pagination, QueryStrategy, SearchFilters, SearchMode, SearchRequest, SortKey,
};
use crate::search::scoring::{
    wrap_function_score, CREATED_AT_FIELD, IN_STOCK_FIELD, POPULARITY_FIELD, RATING_FIELD,
    REVIEW_COUNT_FIELD,
};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Documents that are not active are never returned
pub const ACTIVE_FIELD: &str = "is_active";

/// Boost on the exact-phrase clause in standard mode
const PHRASE_BOOST: f32 = 2.0;

const MAX_PROXIMITY: u32 = 10;
const MIN_SHOULD_MATCH_PCT: u8 = 10;
const MAX_SHOULD_MATCH_PCT: u8 = 100;
const PREFIX_MAX_EXPANSIONS: u32 = 50;

/// Resolved, immutable query plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    strategy: QueryStrategy,
    mode: SearchMode,
    function_score: bool,
    boosts: BTreeMap<String, f32>,
    pagination: Pagination,
    body: Value,
}

impl QueryPlan {
    pub fn strategy(&self) -> QueryStrategy {
        self.strategy
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn has_function_score(&self) -> bool {
        self.function_score
    }

    pub fn boosts(&self) -> &BTreeMap<String, f32> {
        &self.boosts
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    /// Final backend query body
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// The `query` clause of the body
    pub fn query(&self) -> &Value {
        &self.body["query"]
    }

    /// Derive a new plan carrying an `aggs` section; the original is untouched.
    pub fn with_aggregations(&self, aggregations: Value) -> QueryPlan {
        let mut body = self.body.clone();
        if aggregations.as_object().map_or(false, |aggs| !aggs.is_empty()) {
            body["aggs"] = aggregations;
        }
        QueryPlan {
            body,
            ..self.clone()
        }
    }
}

/// Inputs handed to a strategy builder
pub(crate) struct StrategyInput<'a> {
    pub text: &'a str,
    pub boosts: &'a BTreeMap<String, f32>,
    pub mode: SearchMode,
    pub fuzzy: bool,
    pub proximity: u32,
    pub minimum_should_match: Option<u8>,
}

impl StrategyInput<'_> {
    /// `field^boost` list in boost-descending order
    fn weighted_fields(&self) -> Vec<String> {
        let mut fields: Vec<(&String, &f32)> = self.boosts.iter().collect();
        fields.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
        fields
            .into_iter()
            .map(|(field, boost)| format_field(field, *boost))
            .collect()
    }

    fn msm_pct(&self) -> Option<String> {
        self.minimum_should_match.map(|pct| format!("{}%", pct))
    }
}

fn format_field(field: &str, boost: f32) -> String {
    if (boost - 1.0).abs() < f32::EPSILON {
        field.to_string()
    } else {
        format!("{}^{}", field, boost)
    }
}

type StrategyFn = fn(&StrategyInput<'_>) -> Value;

/// Strategy tag -> pure clause builder
static STRATEGY_BUILDERS: Lazy<HashMap<QueryStrategy, StrategyFn>> = Lazy::new(|| {
    let mut builders: HashMap<QueryStrategy, StrategyFn> = HashMap::new();
    builders.insert(QueryStrategy::BestFields, best_fields_query);
    builders.insert(QueryStrategy::Phrase, phrase_query);
    builders.insert(QueryStrategy::Prefix, prefix_query);
    builders.insert(QueryStrategy::Fuzzy, fuzzy_query);
    builders.insert(QueryStrategy::Wildcard, wildcard_query);
    builders.insert(QueryStrategy::Boolean, boolean_query);
    builders
});

/// Field boost table per strategy (title >> brand/keywords > category > description)
pub fn default_boosts(strategy: QueryStrategy) -> BTreeMap<String, f32> {
    let table: &[(&str, f32)] = match strategy {
        QueryStrategy::BestFields | QueryStrategy::Boolean => &[
            ("title", 5.0),
            ("brand_name", 3.0),
            ("keywords", 3.0),
            ("category_names", 2.0),
            ("tags", 1.5),
            ("description", 1.0),
        ],
        QueryStrategy::Phrase => &[
            ("title", 5.0),
            ("brand_name", 2.5),
            ("category_names", 1.5),
            ("description", 1.0),
        ],
        QueryStrategy::Prefix => &[
            ("title", 4.0),
            ("brand_name", 2.0),
            ("keywords", 2.0),
            ("category_names", 1.5),
        ],
        QueryStrategy::Fuzzy => &[
            ("title", 3.0),
            ("brand_name", 2.0),
            ("keywords", 2.0),
            ("category_names", 1.5),
            ("description", 1.0),
        ],
        QueryStrategy::Wildcard => &[
            ("title", 3.0),
            ("brand_name", 2.0),
            ("keywords", 2.0),
            ("category_names", 1.0),
        ],
    };
    table
        .iter()
        .map(|(field, boost)| (field.to_string(), *boost))
        .collect()
}

/// Builds query plans from requests
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    config: SearchConfig,
}

impl QueryBuilder {
    /// Create a new query builder
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Build a plan for a hit-returning search
    pub fn build(&self, request: &SearchRequest) -> QueryPlan {
        let pagination = Pagination::resolve(
            request.page,
            request.limit,
            self.config.default_limit,
            self.config.max_limit,
            self.config.max_result_window,
        );
        self.build_with_window(request, pagination, true)
    }

    /// Build a plan that returns no hits, only counts and aggregations
    pub fn build_facets_only(&self, request: &SearchRequest) -> QueryPlan {
        let pagination = Pagination {
            page: 1,
            limit: 0,
            offset: 0,
        };
        self.build_with_window(request, pagination, false)
    }

    /// Build a plan with an explicit hit cap (strategy comparison)
    pub fn build_capped(&self, request: &SearchRequest, size: u32) -> QueryPlan {
        let pagination = Pagination {
            page: 1,
            limit: size,
            offset: 0,
        };
        self.build_with_window(request, pagination, false)
    }

    fn build_with_window(
        &self,
        request: &SearchRequest,
        pagination: Pagination,
        with_hit_decorations: bool,
    ) -> QueryPlan {
        let strategy = request.effective_strategy();
        let mode = request.effective_mode();
        let text = request.query_text();

        let mut boosts = default_boosts(strategy);
        for (field, boost) in &request.scoring.field_boosts {
            if boost.is_finite() && *boost > 0.0 {
                boosts.insert(field.clone(), *boost);
            }
        }

        let text_clause = match text {
            Some(text) => {
                let input = StrategyInput {
                    text,
                    boosts: &boosts,
                    mode,
                    fuzzy: request.fuzzy,
                    proximity: request.proximity.unwrap_or(0).min(MAX_PROXIMITY),
                    minimum_should_match: request
                        .minimum_should_match
                        .map(|pct| pct.clamp(MIN_SHOULD_MATCH_PCT, MAX_SHOULD_MATCH_PCT)),
                };
                STRATEGY_BUILDERS
                    .get(&strategy)
                    .map(|build| build(&input))
                    .unwrap_or_else(|| best_fields_query(&input))
            }
            None => json!({ "match_all": {} }),
        };

        let base = json!({
            "bool": {
                "must": [text_clause],
                "filter": build_filters(&request.filters),
            }
        });

        let function_score =
            self.config.scoring.enabled && !request.scoring.disable_function_score;
        let query = if function_score {
            wrap_function_score(
                base,
                &self.config.scoring,
                &request.scoring,
                text.is_some(),
            )
        } else {
            base
        };

        let mut body = json!({
            "query": query,
            "from": pagination.offset,
            "size": pagination.limit,
            "track_total_hits": self.config.max_result_window,
        });

        if with_hit_decorations {
            body["sort"] = sort_clause(request.sort);
            if text.is_some() && request.highlight && self.config.enable_highlighting {
                body["highlight"] = highlight_clause();
            }
        }

        QueryPlan {
            strategy,
            mode,
            function_score,
            boosts,
            pagination,
            body,
        }
    }
}

/// Filter context clauses; `is_active` is always present
pub fn build_filters(filters: &SearchFilters) -> Vec<Value> {
    let mut clauses = vec![json!({ "term": { ACTIVE_FIELD: true } })];

    if !filters.category_ids.is_empty() {
        clauses.push(json!({ "terms": { "category_ids": sorted_unique(&filters.category_ids) } }));
    }
    if !filters.brand_ids.is_empty() {
        clauses.push(json!({ "terms": { "brand_id": sorted_unique(&filters.brand_ids) } }));
    }
    if !filters.tags.is_empty() {
        clauses.push(json!({ "terms": { "tags": sorted_unique(&filters.tags) } }));
    }

    let mut price = serde_json::Map::new();
    if let Some(min) = filters.price_min.filter(|v| v.is_finite()) {
        price.insert("gte".to_string(), json!(min.max(0.0)));
    }
    if let Some(max) = filters.price_max.filter(|v| v.is_finite()) {
        price.insert("lte".to_string(), json!(max.max(0.0)));
    }
    if !price.is_empty() {
        clauses.push(json!({ "range": { "price": price } }));
    }

    if let Some(rating) = filters.rating_min.filter(|v| v.is_finite()) {
        clauses.push(json!({ "range": { RATING_FIELD: { "gte": rating.clamp(0.0, 5.0) } } }));
    }
    if let Some(in_stock) = filters.in_stock {
        clauses.push(json!({ "term": { IN_STOCK_FIELD: in_stock } }));
    }

    clauses
}

pub(crate) fn sorted_unique(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn sort_clause(sort: SortKey) -> Value {
    match sort {
        SortKey::Relevance => json!([{ "_score": "desc" }, { POPULARITY_FIELD: "desc" }]),
        SortKey::PriceAsc => json!([{ "price": "asc" }, { "_score": "desc" }]),
        SortKey::PriceDesc => json!([{ "price": "desc" }, { "_score": "desc" }]),
        SortKey::Rating => json!([
            { RATING_FIELD: "desc" },
            { REVIEW_COUNT_FIELD: "desc" },
            { "_score": "desc" }
        ]),
        SortKey::Newest => json!([{ CREATED_AT_FIELD: "desc" }, { "_score": "desc" }]),
        SortKey::Popularity => json!([{ POPULARITY_FIELD: "desc" }, { "_score": "desc" }]),
        SortKey::Name => json!([{ "title.keyword": "asc" }]),
    }
}

fn highlight_clause() -> Value {
    json!({
        "pre_tags": ["<em>"],
        "post_tags": ["</em>"],
        "fields": {
            "title": { "number_of_fragments": 0 },
            "description": { "fragment_size": 150, "number_of_fragments": 3 }
        }
    })
}

fn best_fields_query(input: &StrategyInput<'_>) -> Value {
    let fields = input.weighted_fields();

    match input.mode {
        SearchMode::Standard => {
            let mut multi_match = json!({
                "query": input.text,
                "fields": fields,
                "type": "best_fields",
                "operator": "or",
            });
            if input.fuzzy {
                multi_match["fuzziness"] = json!("AUTO");
            }
            if let Some(msm) = input.msm_pct() {
                multi_match["minimum_should_match"] = json!(msm);
            }
            json!({
                "bool": {
                    "should": [
                        { "multi_match": multi_match },
                        {
                            "multi_match": {
                                "query": input.text,
                                "fields": fields,
                                "type": "phrase",
                                "slop": input.proximity,
                                "boost": PHRASE_BOOST,
                            }
                        }
                    ],
                    "minimum_should_match": 1
                }
            })
        }
        SearchMode::Strict => {
            let mut multi_match = json!({
                "query": input.text,
                "fields": fields,
                "type": "best_fields",
                "operator": "and",
                "minimum_should_match": "100%",
            });
            if input.fuzzy {
                multi_match["fuzziness"] = json!("AUTO");
            }
            json!({ "multi_match": multi_match })
        }
        SearchMode::Relaxed => {
            let mut multi_match = json!({
                "query": input.text,
                "fields": fields,
                "type": "best_fields",
                "operator": "or",
                "minimum_should_match": input.msm_pct().unwrap_or_else(|| "50%".to_string()),
            });
            if input.fuzzy {
                multi_match["fuzziness"] = json!("AUTO");
            }
            json!({ "multi_match": multi_match })
        }
    }
}

fn phrase_query(input: &StrategyInput<'_>) -> Value {
    json!({
        "multi_match": {
            "query": strip_quotes(input.text),
            "fields": input.weighted_fields(),
            "type": "phrase",
            "slop": input.proximity,
        }
    })
}

fn prefix_query(input: &StrategyInput<'_>) -> Value {
    json!({
        "multi_match": {
            "query": input.text,
            "fields": input.weighted_fields(),
            "type": "phrase_prefix",
            "max_expansions": PREFIX_MAX_EXPANSIONS,
        }
    })
}

/// One fuzzy `match` per field; fuzziness does not compose across fields in a
/// single multi-field clause.
fn fuzzy_query(input: &StrategyInput<'_>) -> Value {
    let operator = if input.mode == SearchMode::Strict { "and" } else { "or" };
    let should: Vec<Value> = input
        .boosts
        .iter()
        .map(|(field, boost)| {
            json!({
                "match": {
                    field.as_str(): {
                        "query": input.text,
                        "fuzziness": "AUTO",
                        "prefix_length": 1,
                        "max_expansions": PREFIX_MAX_EXPANSIONS,
                        "operator": operator,
                        "boost": boost,
                    }
                }
            })
        })
        .collect();

    json!({ "bool": { "should": should, "minimum_should_match": 1 } })
}

fn wildcard_query(input: &StrategyInput<'_>) -> Value {
    let must: Vec<Value> = input
        .text
        .split_whitespace()
        .map(|token| {
            let token = token.to_lowercase();
            let pattern = if token.contains('*') || token.contains('?') {
                token
            } else {
                format!("*{}*", token)
            };
            let should: Vec<Value> = input
                .boosts
                .iter()
                .map(|(field, boost)| {
                    json!({
                        "wildcard": {
                            field.as_str(): {
                                "value": pattern,
                                "boost": boost,
                                "case_insensitive": true,
                            }
                        }
                    })
                })
                .collect();
            json!({ "bool": { "should": should, "minimum_should_match": 1 } })
        })
        .collect();

    json!({ "bool": { "must": must } })
}

/// Role of a token in boolean syntax
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRole {
    Required(String),
    Excluded(String),
    Optional(String),
}

/// Classify whitespace-separated tokens; `NOT x` excludes `x`, bare
/// `AND`/`OR` are connectives and dropped.
pub fn classify_tokens(text: &str) -> Vec<TokenRole> {
    let mut roles = Vec::new();
    let mut negate_next = false;

    for token in text.split_whitespace() {
        match token {
            "AND" | "OR" | "&&" | "||" => continue,
            "NOT" => {
                negate_next = true;
                continue;
            }
            _ => {}
        }

        let role = if let Some(term) = token.strip_prefix('+') {
            TokenRole::Required(term.to_string())
        } else if let Some(term) = token.strip_prefix('-') {
            TokenRole::Excluded(term.to_string())
        } else if negate_next {
            TokenRole::Excluded(token.to_string())
        } else {
            TokenRole::Optional(token.to_string())
        };
        negate_next = false;

        let empty = matches!(
            &role,
            TokenRole::Required(t) | TokenRole::Excluded(t) | TokenRole::Optional(t) if t.is_empty()
        );
        if !empty {
            roles.push(role);
        }
    }

    roles
}

fn boolean_query(input: &StrategyInput<'_>) -> Value {
    let fields = input.weighted_fields();
    let term_clause = |term: &str| {
        json!({
            "multi_match": {
                "query": term,
                "fields": fields,
                "type": "best_fields",
                "operator": "and",
            }
        })
    };

    let mut must = Vec::new();
    let mut must_not = Vec::new();
    let mut should = Vec::new();
    for role in classify_tokens(input.text) {
        match role {
            TokenRole::Required(term) => must.push(term_clause(&term)),
            TokenRole::Excluded(term) => must_not.push(term_clause(&term)),
            TokenRole::Optional(term) => should.push(term_clause(&term)),
        }
    }

    if must.is_empty() && should.is_empty() {
        must.push(json!({ "match_all": {} }));
    }

    let minimum_should_match = if must.is_empty() { 1 } else { 0 };
    json!({
        "bool": {
            "must": must,
            "must_not": must_not,
            "should": should,
            "minimum_should_match": minimum_should_match,
        }
    })
}

fn strip_quotes(text: &str) -> &str {
    text.trim().trim_matches('"').trim()
}
