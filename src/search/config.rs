//! Search configuration

use crate::search::error::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Search service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Index holding product documents
    pub products_index: String,

    /// Completion index for categories
    pub categories_index: String,

    /// Completion index for brands
    pub brands_index: String,

    /// Index of logged search queries (popular query suggestions)
    pub queries_index: String,

    /// Page size used when the request leaves it out
    pub default_limit: u32,

    /// Hard upper bound on page size
    pub max_limit: u32,

    /// Backend `index.max_result_window`; offset + limit never exceeds it
    pub max_result_window: u64,

    /// Per-request deadline in milliseconds
    pub request_deadline_ms: u64,

    /// Hits fetched per combination when comparing strategies
    pub compare_result_cap: u32,

    /// Request highlight fragments for title/description
    pub enable_highlighting: bool,

    /// Stock level at or below which a product counts as low stock
    pub low_stock_threshold: u32,

    /// Stock level above which a product counts as high stock
    pub high_stock_threshold: u32,

    /// Price buckets for the price facet
    pub price_ranges: Vec<PriceRange>,

    /// Function-score defaults
    pub scoring: ScoringConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            products_index: "products".to_string(),
            categories_index: "categories".to_string(),
            brands_index: "brands".to_string(),
            queries_index: "search_queries".to_string(),
            default_limit: 20,
            max_limit: 100,
            max_result_window: 10_000,
            request_deadline_ms: 5_000,
            compare_result_cap: 5,
            enable_highlighting: true,
            low_stock_threshold: 10,
            high_stock_threshold: 100,
            price_ranges: default_price_ranges(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl SearchConfig {
    /// Create a new builder
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::new()
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> SearchResult<()> {
        if self.max_limit == 0 || self.default_limit == 0 {
            return Err(SearchError::InvalidConfiguration(
                "page size limits must be greater than 0".to_string(),
            ));
        }
        if self.default_limit > self.max_limit {
            return Err(SearchError::InvalidConfiguration(format!(
                "default_limit {} exceeds max_limit {}",
                self.default_limit, self.max_limit
            )));
        }
        if self.max_result_window < self.max_limit as u64 {
            return Err(SearchError::InvalidConfiguration(
                "max_result_window must be at least max_limit".to_string(),
            ));
        }
        if self.request_deadline_ms == 0 {
            return Err(SearchError::InvalidConfiguration(
                "request_deadline_ms must be greater than 0".to_string(),
            ));
        }
        if self.low_stock_threshold >= self.high_stock_threshold {
            return Err(SearchError::InvalidConfiguration(
                "low_stock_threshold must be below high_stock_threshold".to_string(),
            ));
        }
        Ok(())
    }
}

/// A half-open `[from, to)` price bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub from: Option<f64>,
    pub to: Option<f64>,
}

impl PriceRange {
    pub const fn new(from: Option<f64>, to: Option<f64>) -> Self {
        Self { from, to }
    }
}

fn default_price_ranges() -> Vec<PriceRange> {
    vec![
        PriceRange::new(None, Some(25.0)),
        PriceRange::new(Some(25.0), Some(50.0)),
        PriceRange::new(Some(50.0), Some(100.0)),
        PriceRange::new(Some(100.0), Some(200.0)),
        PriceRange::new(Some(200.0), Some(500.0)),
        PriceRange::new(Some(500.0), None),
    ]
}

/// Function-score tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Wrap text queries in a function_score envelope
    pub enabled: bool,
    pub featured_weight: f64,
    pub popularity_factor: f64,
    pub rating_factor: f64,
    pub review_count_factor: f64,
    pub recency_scale_days: u32,
    pub recency_offset_days: u32,
    pub recency_decay: f64,
    pub in_stock_weight: f64,
    pub max_boost: f64,
    pub min_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            featured_weight: 1.5,
            popularity_factor: 1.2,
            rating_factor: 0.3,
            review_count_factor: 1.1,
            recency_scale_days: 30,
            recency_offset_days: 7,
            recency_decay: 0.5,
            in_stock_weight: 1.2,
            max_boost: 10.0,
            min_score: 0.1,
        }
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn products_index(mut self, index: impl Into<String>) -> Self {
        self.config.products_index = index.into();
        self
    }

    pub fn default_limit(mut self, limit: u32) -> Self {
        self.config.default_limit = limit;
        self
    }

    pub fn max_limit(mut self, limit: u32) -> Self {
        self.config.max_limit = limit;
        self
    }

    pub fn max_result_window(mut self, window: u64) -> Self {
        self.config.max_result_window = window;
        self
    }

    pub fn request_deadline_ms(mut self, ms: u64) -> Self {
        self.config.request_deadline_ms = ms;
        self
    }

    pub fn compare_result_cap(mut self, cap: u32) -> Self {
        self.config.compare_result_cap = cap;
        self
    }

    pub fn enable_highlighting(mut self, enabled: bool) -> Self {
        self.config.enable_highlighting = enabled;
        self
    }

    pub fn stock_thresholds(mut self, low: u32, high: u32) -> Self {
        self.config.low_stock_threshold = low;
        self.config.high_stock_threshold = high;
        self
    }

    pub fn price_ranges(mut self, ranges: Vec<PriceRange>) -> Self {
        self.config.price_ranges = ranges;
        self
    }

    pub fn scoring(mut self, scoring: ScoringConfig) -> Self {
        self.config.scoring = scoring;
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
