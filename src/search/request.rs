//! Search request model and pagination normalization

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use validator::{Validate, ValidationError};

/// Query-construction approach
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueryStrategy {
    /// Weighted best-fields multi-match
    #[default]
    BestFields,
    /// Exact phrase
    Phrase,
    /// Prefix / search-as-you-type
    Prefix,
    /// Per-field fuzzy matches
    Fuzzy,
    /// Wildcard patterns
    Wildcard,
    /// `+required -excluded optional` token syntax
    Boolean,
}

/// How many query terms must match
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SearchMode {
    /// Multi-match plus a 2x phrase variant, any clause may match
    #[default]
    Standard,
    /// All terms required
    Strict,
    /// Half of the terms required
    Relaxed,
}

/// Result ordering
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortKey {
    #[default]
    Relevance,
    PriceAsc,
    PriceDesc,
    Rating,
    Newest,
    Popularity,
    Name,
}

/// Structured filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_price_bounds"))]
pub struct SearchFilters {
    #[serde(default)]
    pub category_ids: Vec<String>,

    #[serde(default)]
    pub brand_ids: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[validate(range(min = 0.0))]
    pub price_min: Option<f64>,

    #[validate(range(min = 0.0))]
    pub price_max: Option<f64>,

    #[validate(range(min = 0.0, max = 5.0))]
    pub rating_min: Option<f64>,

    pub in_stock: Option<bool>,
}

fn validate_price_bounds(filters: &SearchFilters) -> Result<(), ValidationError> {
    match (filters.price_min, filters.price_max) {
        (Some(min), Some(max)) if min > max => {
            let mut err = ValidationError::new("price_range");
            err.message = Some("price_min must not exceed price_max".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.category_ids.is_empty()
            && self.brand_ids.is_empty()
            && self.tags.is_empty()
            && self.price_min.is_none()
            && self.price_max.is_none()
            && self.rating_min.is_none()
            && self.in_stock.is_none()
    }

    /// Names of the filters in use, for analytics
    pub fn active_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if !self.category_ids.is_empty() {
            names.push("category");
        }
        if !self.brand_ids.is_empty() {
            names.push("brand");
        }
        if !self.tags.is_empty() {
            names.push("tag");
        }
        if self.price_min.is_some() || self.price_max.is_some() {
            names.push("price");
        }
        if self.rating_min.is_some() {
            names.push("rating");
        }
        if self.in_stock.is_some() {
            names.push("availability");
        }
        names
    }
}

/// Facet dimension
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FacetKind {
    Category,
    Brand,
    Price,
    Rating,
    Tag,
    Availability,
    Custom,
}

/// Toggle and tuning for one facet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetSpec {
    pub kind: FacetKind,

    /// Response key; defaults to the kind name (custom facets use the field)
    #[serde(default)]
    pub name: Option<String>,

    /// Document field for custom facets
    #[serde(default)]
    pub field: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bucket_size")]
    pub size: u32,

    #[serde(default = "default_min_doc_count")]
    pub min_doc_count: u64,

    /// Category levels to aggregate (1 = top level only)
    #[serde(default = "default_hierarchy_depth")]
    pub hierarchy_depth: u32,
}

impl FacetSpec {
    pub fn new(kind: FacetKind) -> Self {
        Self {
            kind,
            name: None,
            field: None,
            enabled: true,
            size: default_bucket_size(),
            min_doc_count: default_min_doc_count(),
            hierarchy_depth: default_hierarchy_depth(),
        }
    }

    pub fn custom(field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::new(FacetKind::Custom)
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn with_min_doc_count(mut self, min_doc_count: u64) -> Self {
        self.min_doc_count = min_doc_count;
        self
    }

    pub fn with_hierarchy_depth(mut self, depth: u32) -> Self {
        self.hierarchy_depth = depth;
        self
    }

    /// Key under which this facet appears in requests and responses
    pub fn key(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match (self.kind, &self.field) {
            (FacetKind::Custom, Some(field)) => field.clone(),
            (kind, _) => kind.to_string(),
        }
    }
}

/// Facet configuration for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetOptions {
    /// Count against the whole active catalog instead of the filtered result set
    #[serde(default)]
    pub global_counts: bool,

    #[serde(default = "default_facet_specs")]
    pub specs: Vec<FacetSpec>,
}

impl Default for FacetOptions {
    fn default() -> Self {
        Self {
            global_counts: false,
            specs: default_facet_specs(),
        }
    }
}

impl FacetOptions {
    pub fn enabled_specs(&self) -> impl Iterator<Item = &FacetSpec> {
        self.specs.iter().filter(|spec| spec.enabled)
    }
}

fn default_facet_specs() -> Vec<FacetSpec> {
    vec![
        FacetSpec::new(FacetKind::Category),
        FacetSpec::new(FacetKind::Brand),
        FacetSpec::new(FacetKind::Price),
        FacetSpec::new(FacetKind::Rating),
        FacetSpec::new(FacetKind::Availability),
    ]
}

/// Per-request scoring overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringOverrides {
    /// Merged over the strategy's field boost table
    #[serde(default)]
    pub field_boosts: BTreeMap<String, f32>,

    /// Opt out of the function-score envelope
    #[serde(default)]
    pub disable_function_score: bool,

    pub featured_weight: Option<f64>,
    pub max_boost: Option<f64>,
    pub min_score: Option<f64>,
}

/// Normalized search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SearchRequest {
    /// Free-text term
    #[serde(default)]
    #[validate(length(max = 256))]
    pub q: Option<String>,

    #[serde(default)]
    pub strategy: Option<QueryStrategy>,

    #[serde(default)]
    pub mode: Option<SearchMode>,

    /// Add edit-distance tolerance to multi-match clauses
    #[serde(default)]
    pub fuzzy: bool,

    /// Phrase slop (0-10)
    #[serde(default)]
    pub proximity: Option<u32>,

    /// Minimum-should-match percentage (10-100)
    #[serde(default)]
    pub minimum_should_match: Option<u8>,

    #[serde(default)]
    #[validate(nested)]
    pub filters: SearchFilters,

    #[serde(default)]
    pub sort: SortKey,

    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: u32,

    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u32,

    #[serde(default = "default_true")]
    pub include_facets: bool,

    #[serde(default)]
    pub facets: FacetOptions,

    #[serde(default)]
    pub scoring: ScoringOverrides,

    #[serde(default = "default_true")]
    pub highlight: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            q: None,
            strategy: None,
            mode: None,
            fuzzy: false,
            proximity: None,
            minimum_should_match: None,
            filters: SearchFilters::default(),
            sort: SortKey::default(),
            page: default_page(),
            limit: default_limit(),
            include_facets: true,
            facets: FacetOptions::default(),
            scoring: ScoringOverrides::default(),
            highlight: true,
        }
    }
}

impl SearchRequest {
    /// Create a request for a free-text term
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: Some(q.into()),
            ..Default::default()
        }
    }

    /// Create a browse request with no text
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Trimmed query text, `None` when absent or blank
    pub fn query_text(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    /// Explicit strategy, else best-fields
    pub fn effective_strategy(&self) -> QueryStrategy {
        self.strategy.unwrap_or_default()
    }

    /// Explicit mode, else standard
    pub fn effective_mode(&self) -> SearchMode {
        self.mode.unwrap_or_default()
    }

    pub fn with_strategy(mut self, strategy: QueryStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_categories(mut self, ids: Vec<impl Into<String>>) -> Self {
        self.filters.category_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_brands(mut self, ids: Vec<impl Into<String>>) -> Self {
        self.filters.brand_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.filters.price_min = min;
        self.filters.price_max = max;
        self
    }

    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_page(mut self, page: u32, limit: u32) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    pub fn with_facets(mut self, include: bool) -> Self {
        self.include_facets = include;
        self
    }

    pub fn with_facet_options(mut self, facets: FacetOptions) -> Self {
        self.facets = facets;
        self
    }

    pub fn without_function_score(mut self) -> Self {
        self.scoring.disable_function_score = true;
        self
    }
}

/// Resolved pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub offset: u64,
}

impl Pagination {
    /// Clamp page/limit and derive a bounded offset.
    ///
    /// `page` is at least 1, `limit` falls back to `default_limit` when zero and
    /// never exceeds `max_limit`, and `offset + limit` stays within
    /// `max_result_window`.
    pub fn resolve(
        page: u32,
        limit: u32,
        default_limit: u32,
        max_limit: u32,
        max_result_window: u64,
    ) -> Self {
        let max_limit = max_limit.max(1);
        let limit = if limit == 0 { default_limit } else { limit }.clamp(1, max_limit);
        let limit = (limit as u64).min(max_result_window.max(1)) as u32;
        let page = page.max(1);
        let offset = (page as u64 - 1) * limit as u64;
        let max_offset = max_result_window.saturating_sub(limit as u64);

        Self {
            page,
            limit,
            offset: offset.min(max_offset),
        }
    }
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

fn default_true() -> bool {
    true
}

fn default_bucket_size() -> u32 {
    20
}

fn default_min_doc_count() -> u64 {
    1
}

fn default_hierarchy_depth() -> u32 {
    1
}
