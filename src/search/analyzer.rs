//! Heuristic query analysis and empirical strategy comparison

use crate::search::config::SearchConfig;
use crate::search::connection::{BackendRequest, ConnectionManager};
use crate::search::context::RequestContext;
use crate::search::error::SearchResult;
use crate::search::query::{classify_tokens, QueryBuilder, TokenRole};
use crate::search::request::{QueryStrategy, SearchMode, SearchRequest};
use crate::search::response::{parse_hits, parse_total};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strum_macros::{AsRefStr, Display};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const MAX_PROXIMITY: u32 = 10;
const MIN_SHOULD_MATCH_PCT: u8 = 10;
const MAX_SHOULD_MATCH_PCT: u8 = 100;

/// Term count from which a query is treated as long-form
const LONG_QUERY_TERMS: usize = 5;

/// Combinations tried by [`QueryAnalyzer::compare`], in tie-break order
pub const COMPARISON_COMBOS: [(QueryStrategy, SearchMode); 5] = [
    (QueryStrategy::BestFields, SearchMode::Standard),
    (QueryStrategy::BestFields, SearchMode::Strict),
    (QueryStrategy::Phrase, SearchMode::Standard),
    (QueryStrategy::Fuzzy, SearchMode::Relaxed),
    (QueryStrategy::Prefix, SearchMode::Standard),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Result of analyzing a raw query string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub query: String,
    pub term_count: usize,
    pub has_phrase: bool,
    pub has_wildcard: bool,
    pub has_boolean_operators: bool,
    pub estimated_complexity: Complexity,
    pub recommended_strategy: QueryStrategy,
    pub recommended_mode: SearchMode,
    /// Why the recommendation was made
    pub reasons: Vec<String>,
}

/// One strategy/mode run in a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRun {
    pub rank: usize,
    pub strategy: QueryStrategy,
    pub mode: SearchMode,
    pub total_hits: u64,
    pub top_score: Option<f64>,
    pub latency_ms: u64,
    pub top_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ranked comparison of strategies for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyComparison {
    pub query: String,
    pub runs: Vec<StrategyRun>,
    pub recommended_strategy: Option<QueryStrategy>,
    pub recommended_mode: Option<SearchMode>,
}

/// Query analyzer
#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    result_cap: u32,
}

impl QueryAnalyzer {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            result_cap: config.compare_result_cap.max(1),
        }
    }

    /// Classify `query` and recommend a strategy and mode. Pure.
    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        let trimmed = query.trim();
        let terms: Vec<&str> = trimmed.split_whitespace().collect();

        let has_phrase = trimmed.matches('"').count() >= 2;
        let has_wildcard = trimmed.contains('*') || trimmed.contains('?');
        let has_boolean_operators = terms.iter().any(|t| is_operator_token(t));

        let mut reasons = Vec::new();
        let feature_count = [has_phrase, has_wildcard, has_boolean_operators]
            .iter()
            .filter(|f| **f)
            .count();
        let length_score = match terms.len() {
            0..=3 => 0,
            4..=6 => 1,
            _ => 2,
        };
        let estimated_complexity = match length_score + feature_count {
            0 => Complexity::Low,
            1 | 2 => Complexity::Medium,
            _ => Complexity::High,
        };

        let (recommended_strategy, recommended_mode) = if terms.is_empty() {
            reasons.push("empty query browses the catalog".to_string());
            (QueryStrategy::BestFields, SearchMode::Standard)
        } else if has_boolean_operators {
            reasons.push("boolean operators present".to_string());
            (QueryStrategy::Boolean, SearchMode::Standard)
        } else if has_phrase {
            reasons.push("quoted phrase present".to_string());
            (QueryStrategy::Phrase, SearchMode::Standard)
        } else if has_wildcard {
            reasons.push("wildcard characters present".to_string());
            (QueryStrategy::Wildcard, SearchMode::Standard)
        } else if terms.len() >= LONG_QUERY_TERMS {
            reasons.push(format!("{} terms, relaxing term coverage", terms.len()));
            (QueryStrategy::BestFields, SearchMode::Relaxed)
        } else {
            reasons.push("plain keyword query".to_string());
            (QueryStrategy::BestFields, SearchMode::Standard)
        };

        QueryAnalysis {
            query: trimmed.to_string(),
            term_count: terms.len(),
            has_phrase,
            has_wildcard,
            has_boolean_operators,
            estimated_complexity,
            recommended_strategy,
            recommended_mode,
            reasons,
        }
    }

    /// Clamp numeric bounds and turn off incompatible options. Never fails;
    /// every correction is reported as a warning.
    pub fn validate_and_correct(&self, mut request: SearchRequest) -> (SearchRequest, Vec<String>) {
        let mut warnings = Vec::new();

        if let Some(proximity) = request.proximity {
            if proximity > MAX_PROXIMITY {
                warnings.push(format!(
                    "proximity {} exceeds {}, clamped",
                    proximity, MAX_PROXIMITY
                ));
                request.proximity = Some(MAX_PROXIMITY);
            }
        }

        if let Some(pct) = request.minimum_should_match {
            let clamped = pct.clamp(MIN_SHOULD_MATCH_PCT, MAX_SHOULD_MATCH_PCT);
            if clamped != pct {
                warnings.push(format!(
                    "minimum_should_match {}% outside {}-{}%, clamped to {}%",
                    pct, MIN_SHOULD_MATCH_PCT, MAX_SHOULD_MATCH_PCT, clamped
                ));
                request.minimum_should_match = Some(clamped);
            }
        }

        if request.fuzzy {
            let strategy = request.effective_strategy();
            if matches!(
                strategy,
                QueryStrategy::Phrase | QueryStrategy::Wildcard | QueryStrategy::Prefix
            ) {
                warnings.push(format!(
                    "fuzzy matching is not supported with the {} strategy and was disabled",
                    strategy
                ));
                request.fuzzy = false;
            }
        }

        for warning in &warnings {
            debug!(warning = %warning, "Request auto-corrected");
        }

        (request, warnings)
    }

    /// Run `query` under each fixed combination and rank them by top score,
    /// then latency, then combination order. Failed runs rank last.
    pub async fn compare(
        &self,
        query: &str,
        builder: &QueryBuilder,
        connection: &ConnectionManager,
        ctx: &RequestContext,
    ) -> SearchResult<StrategyComparison> {
        ctx.check()?;
        let index = builder.config().products_index.clone();

        let runs = COMPARISON_COMBOS.into_iter().map(|(strategy, mode)| {
            let request = SearchRequest::new(query)
                .with_strategy(strategy)
                .with_mode(mode)
                .with_facets(false);
            let plan = builder.build_capped(&request, self.result_cap);
            let backend_request = BackendRequest::search(index.clone(), plan.body().clone());
            async move {
                let started = Instant::now();
                let result = connection.execute(&backend_request, ctx).await;
                let latency_ms = started.elapsed().as_millis() as u64;
                (strategy, mode, latency_ms, result)
            }
        });

        let mut ranked: Vec<(usize, StrategyRun)> = join_all(runs)
            .await
            .into_iter()
            .enumerate()
            .map(|(order, (strategy, mode, latency_ms, result))| {
                let run = match result {
                    Ok(raw) => {
                        let hits = parse_hits(&raw);
                        StrategyRun {
                            rank: 0,
                            strategy,
                            mode,
                            total_hits: parse_total(&raw).value,
                            top_score: hits.iter().filter_map(|h| h.score).reduce(f64::max),
                            latency_ms,
                            top_ids: hits.into_iter().map(|h| h.product.id).collect(),
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!(strategy = %strategy, mode = %mode, error = %e, "Comparison run failed");
                        StrategyRun {
                            rank: 0,
                            strategy,
                            mode,
                            total_hits: 0,
                            top_score: None,
                            latency_ms,
                            top_ids: Vec::new(),
                            error: Some(e.to_string()),
                        }
                    }
                };
                (order, run)
            })
            .collect();

        // Propagate request-level failures instead of reporting five broken runs
        ctx.check()?;

        ranked.sort_by(|(order_a, a), (order_b, b)| compare_runs(a, b).then(order_a.cmp(order_b)));

        let runs: Vec<StrategyRun> = ranked
            .into_iter()
            .enumerate()
            .map(|(i, (_, run))| StrategyRun { rank: i + 1, ..run })
            .collect();

        let best = runs.first().filter(|run| run.error.is_none() && run.total_hits > 0);
        if let Some(best) = best {
            info!(
                query = %query,
                strategy = %best.strategy,
                mode = %best.mode,
                "Strategy comparison complete"
            );
        }

        Ok(StrategyComparison {
            query: query.trim().to_string(),
            recommended_strategy: best.map(|run| run.strategy),
            recommended_mode: best.map(|run| run.mode),
            runs,
        })
    }
}

fn is_operator_token(token: &str) -> bool {
    matches!(token, "AND" | "OR" | "NOT" | "&&" | "||")
        || (token.len() > 1 && (token.starts_with('+') || token.starts_with('-')))
}

/// Failed runs last, then higher top score, then lower latency
fn compare_runs(a: &StrategyRun, b: &StrategyRun) -> Ordering {
    match (a.error.is_some(), b.error.is_some()) {
        (false, true) => return Ordering::Less,
        (true, false) => return Ordering::Greater,
        _ => {}
    }
    let score_a = a.top_score.unwrap_or(f64::NEG_INFINITY);
    let score_b = b.top_score.unwrap_or(f64::NEG_INFINITY);
    score_b
        .total_cmp(&score_a)
        .then(a.latency_ms.cmp(&b.latency_ms))
}

/// Required/excluded/optional term counts, used by the CLI explain output
pub fn operator_summary(query: &str) -> (usize, usize, usize) {
    classify_tokens(query)
        .iter()
        .fold((0, 0, 0), |(req, exc, opt), role| match role {
            TokenRole::Required(_) => (req + 1, exc, opt),
            TokenRole::Excluded(_) => (req, exc + 1, opt),
            TokenRole::Optional(_) => (req, exc, opt + 1),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> QueryAnalyzer {
        QueryAnalyzer::new(&SearchConfig::default())
    }

    #[test]
    fn test_plain_two_term_query() {
        let analysis = analyzer().analyze("gaming laptop");
        assert_eq!(analysis.term_count, 2);
        assert_eq!(analysis.estimated_complexity, Complexity::Low);
        assert_eq!(analysis.recommended_strategy, QueryStrategy::BestFields);
        assert_eq!(analysis.recommended_mode, SearchMode::Standard);
        assert!(!analysis.has_phrase && !analysis.has_wildcard && !analysis.has_boolean_operators);
    }

    #[test]
    fn test_detects_features() {
        let a = analyzer().analyze("\"running shoes\" size 10");
        assert!(a.has_phrase);
        assert_eq!(a.recommended_strategy, QueryStrategy::Phrase);

        let a = analyzer().analyze("lapt*");
        assert!(a.has_wildcard);
        assert_eq!(a.recommended_strategy, QueryStrategy::Wildcard);

        let a = analyzer().analyze("+laptop -refurbished gaming");
        assert!(a.has_boolean_operators);
        assert_eq!(a.recommended_strategy, QueryStrategy::Boolean);

        let a = analyzer().analyze("laptop AND NOT refurbished");
        assert!(a.has_boolean_operators);
    }

    #[test]
    fn test_complexity_grows_with_terms_and_features() {
        assert_eq!(
            analyzer().analyze("light waterproof hiking jacket for women").estimated_complexity,
            Complexity::Medium
        );
        assert_eq!(
            analyzer().analyze("\"trail runner\" +waterproof -used gore* men size eleven wide").estimated_complexity,
            Complexity::High
        );
        let long = analyzer().analyze("light waterproof hiking jacket for women");
        assert_eq!(long.recommended_mode, SearchMode::Relaxed);
    }

    #[test]
    fn test_hyphen_alone_is_not_operator() {
        let a = analyzer().analyze("usb - c cable");
        assert!(!a.has_boolean_operators);
    }

    #[test]
    fn test_empty_query() {
        let a = analyzer().analyze("   ");
        assert_eq!(a.term_count, 0);
        assert_eq!(a.estimated_complexity, Complexity::Low);
        assert_eq!(a.recommended_strategy, QueryStrategy::BestFields);
    }

    #[test]
    fn test_fuzzy_phrase_is_auto_corrected() {
        let request = SearchRequest::new("red shoes")
            .with_strategy(QueryStrategy::Phrase)
            .with_fuzzy(true);
        let (corrected, warnings) = analyzer().validate_and_correct(request);
        assert!(!corrected.fuzzy);
        assert_eq!(corrected.strategy, Some(QueryStrategy::Phrase));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("phrase"));
    }

    #[test]
    fn test_fuzzy_best_fields_untouched() {
        let request = SearchRequest::new("red shoes").with_fuzzy(true);
        let (corrected, warnings) = analyzer().validate_and_correct(request.clone());
        assert_eq!(corrected, request);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_numeric_bounds_clamped() {
        let mut request = SearchRequest::new("red shoes");
        request.proximity = Some(25);
        request.minimum_should_match = Some(5);
        let (corrected, warnings) = analyzer().validate_and_correct(request);
        assert_eq!(corrected.proximity, Some(10));
        assert_eq!(corrected.minimum_should_match, Some(10));
        assert_eq!(warnings.len(), 2);
    }

    fn run(score: Option<f64>, latency_ms: u64, error: bool) -> StrategyRun {
        StrategyRun {
            rank: 0,
            strategy: QueryStrategy::BestFields,
            mode: SearchMode::Standard,
            total_hits: 1,
            top_score: score,
            latency_ms,
            top_ids: vec![],
            error: error.then(|| "boom".to_string()),
        }
    }

    #[test]
    fn test_run_ordering() {
        assert_eq!(compare_runs(&run(Some(2.0), 50, false), &run(Some(1.0), 5, false)), Ordering::Less);
        assert_eq!(compare_runs(&run(Some(1.0), 5, false), &run(Some(1.0), 50, false)), Ordering::Less);
        assert_eq!(compare_runs(&run(None, 5, true), &run(None, 50, false)), Ordering::Greater);
    }

    #[test]
    fn test_operator_summary() {
        assert_eq!(operator_summary("+laptop -refurbished gaming NOT used"), (1, 2, 1));
    }
}
