//! Function-score envelope layered over base relevance

use crate::search::config::ScoringConfig;
use crate::search::request::ScoringOverrides;
use serde_json::{json, Value};

/// Fields the boost functions read from product documents
pub const FEATURED_FIELD: &str = "is_featured";
pub const POPULARITY_FIELD: &str = "popularity_score";
pub const RATING_FIELD: &str = "rating_average";
pub const REVIEW_COUNT_FIELD: &str = "review_count";
pub const CREATED_AT_FIELD: &str = "created_at";
pub const IN_STOCK_FIELD: &str = "in_stock";

/// Wrap `query` in a multiplicative `function_score`.
///
/// Every function yields a strictly positive factor: filtered functions fall
/// back to 1 for documents that do not match the filter, and the log-scaled
/// ones use `ln2p` so a zero count never zeroes the product.
pub fn wrap_function_score(
    query: Value,
    config: &ScoringConfig,
    overrides: &ScoringOverrides,
    with_min_score: bool,
) -> Value {
    let featured_weight = override_or(overrides.featured_weight, config.featured_weight, false);
    let max_boost = override_or(overrides.max_boost, config.max_boost, false);

    let functions = vec![
        json!({
            "filter": { "term": { FEATURED_FIELD: true } },
            "weight": featured_weight
        }),
        json!({
            "field_value_factor": {
                "field": POPULARITY_FIELD,
                "factor": config.popularity_factor,
                "modifier": "ln2p",
                "missing": 0
            }
        }),
        json!({
            "filter": { "range": { RATING_FIELD: { "gt": 0 } } },
            "field_value_factor": {
                "field": RATING_FIELD,
                "factor": config.rating_factor,
                "modifier": "none",
                "missing": 1
            }
        }),
        json!({
            "filter": { "range": { REVIEW_COUNT_FIELD: { "gt": 0 } } },
            "field_value_factor": {
                "field": REVIEW_COUNT_FIELD,
                "factor": config.review_count_factor,
                "modifier": "ln2p",
                "missing": 0
            }
        }),
        json!({
            "gauss": {
                CREATED_AT_FIELD: {
                    "origin": "now",
                    "scale": format!("{}d", config.recency_scale_days),
                    "offset": format!("{}d", config.recency_offset_days),
                    "decay": config.recency_decay
                }
            }
        }),
        json!({
            "filter": { "term": { IN_STOCK_FIELD: true } },
            "weight": config.in_stock_weight
        }),
    ];

    let mut envelope = json!({
        "query": query,
        "functions": functions,
        "score_mode": "multiply",
        "boost_mode": "multiply",
        "max_boost": max_boost
    });

    if with_min_score {
        let min_score = override_or(overrides.min_score, config.min_score, true);
        envelope["min_score"] = json!(min_score);
    }

    json!({ "function_score": envelope })
}

/// Use an override only when the backend would accept it; anything else
/// falls back to the configured value.
fn override_or(value: Option<f64>, fallback: f64, allow_zero: bool) -> f64 {
    match value {
        Some(v) if v.is_finite() && (v > 0.0 || (allow_zero && v == 0.0)) => v,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let wrapped = wrap_function_score(
            json!({ "match_all": {} }),
            &ScoringConfig::default(),
            &ScoringOverrides::default(),
            true,
        );

        let fs = &wrapped["function_score"];
        assert_eq!(fs["score_mode"], "multiply");
        assert_eq!(fs["boost_mode"], "multiply");
        assert_eq!(fs["max_boost"], 10.0);
        assert_eq!(fs["min_score"], 0.1);
        assert_eq!(fs["functions"].as_array().unwrap().len(), 6);
        assert_eq!(fs["query"], json!({ "match_all": {} }));

        let gauss = &fs["functions"][4]["gauss"][CREATED_AT_FIELD];
        assert_eq!(gauss["scale"], "30d");
        assert_eq!(gauss["offset"], "7d");
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = ScoringOverrides {
            featured_weight: Some(3.0),
            max_boost: Some(4.0),
            min_score: Some(0.5),
            ..Default::default()
        };
        let wrapped = wrap_function_score(
            json!({ "match_all": {} }),
            &ScoringConfig::default(),
            &overrides,
            true,
        );

        let fs = &wrapped["function_score"];
        assert_eq!(fs["functions"][0]["weight"], 3.0);
        assert_eq!(fs["max_boost"], 4.0);
        assert_eq!(fs["min_score"], 0.5);
    }

    #[test]
    fn test_invalid_overrides_fall_back_to_config() {
        let config = ScoringConfig::default();
        for bad in [-5.0, 0.0, f64::NAN, f64::INFINITY] {
            let overrides = ScoringOverrides {
                featured_weight: Some(bad),
                max_boost: Some(bad),
                min_score: Some(if bad == 0.0 { -1.0 } else { bad }),
                ..Default::default()
            };
            let wrapped = wrap_function_score(json!({ "match_all": {} }), &config, &overrides, true);

            let fs = &wrapped["function_score"];
            assert_eq!(fs["functions"][0]["weight"], config.featured_weight);
            assert_eq!(fs["max_boost"], config.max_boost);
            assert_eq!(fs["min_score"], config.min_score);
        }
    }

    #[test]
    fn test_zero_min_score_override_is_kept() {
        let overrides = ScoringOverrides {
            min_score: Some(0.0),
            ..Default::default()
        };
        let wrapped = wrap_function_score(
            json!({ "match_all": {} }),
            &ScoringConfig::default(),
            &overrides,
            true,
        );
        assert_eq!(wrapped["function_score"]["min_score"], 0.0);
    }

    #[test]
    fn test_min_score_omitted_when_not_requested() {
        let wrapped = wrap_function_score(
            json!({ "match_all": {} }),
            &ScoringConfig::default(),
            &ScoringOverrides::default(),
            false,
        );
        assert!(wrapped["function_score"].get("min_score").is_none());
    }
}
