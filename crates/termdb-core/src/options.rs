//! Query options with their defaults, validated once before a query runs.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::CategoryId;

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const DEFAULT_AUTOCOMPLETE_LIMIT: usize = 10;

/// Score range every match is clamped into.
pub const SCORE_FLOOR: f64 = -100.0;
pub const SCORE_CEILING: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenMode {
    /// A candidate survives when any token matches.
    #[default]
    Any,
    /// Every token must be found in the title.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Title equality, then title prefix, then substring, then score.
    Exact,
    #[default]
    Similarity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnShape {
    #[default]
    Ids,
    Nodes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceAlgorithm {
    /// Levenshtein plus a single adjacent swap check.
    #[default]
    Fast,
    /// Full optimal-string-alignment Damerau-Levenshtein.
    Damerau,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// `None` picks the per-operation default (20 for search, 10 for autocomplete).
    pub limit: Option<usize>,
    /// Below this many shard candidates the fallback expansion runs.
    pub min_candidates: usize,
    pub token_mode: TokenMode,
    pub substring_min_len: usize,
    pub substring_boost: f64,
    pub prefix_boost: f64,
    pub word_boost: f64,
    pub phrase_boost: f64,
    pub all_tokens_boost: f64,
    pub missing_token_penalty: f64,
    /// Largest edit distance that still counts a token as found.
    pub distance_cutoff: usize,
    pub max_len_diff_for_distance: usize,
    pub mode: SortMode,
    pub return_shape: ReturnShape,
    pub category_ids: Vec<CategoryId>,
    /// Caps the nodes the fallback scan visits, and separately the distances
    /// computed for the candidates it finds.
    pub max_comparisons: usize,
    /// Shards larger than this are randomly sampled down to it.
    pub max_nodes_per_shard: Option<usize>,
    /// Neighbor shards within this bucket edit distance are read during fallback.
    pub branch_distance: usize,
    pub distance_algorithm: DistanceAlgorithm,
    /// Fixes the sampling/shuffling RNG; used for reproducible runs.
    pub sample_seed: Option<u64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: None,
            min_candidates: 25,
            token_mode: TokenMode::Any,
            substring_min_len: 3,
            substring_boost: 20.0,
            prefix_boost: 30.0,
            word_boost: 50.0,
            phrase_boost: 25.0,
            all_tokens_boost: 20.0,
            missing_token_penalty: 30.0,
            distance_cutoff: 2,
            max_len_diff_for_distance: 3,
            mode: SortMode::Similarity,
            return_shape: ReturnShape::Ids,
            category_ids: Vec::new(),
            max_comparisons: 5_000,
            max_nodes_per_shard: None,
            branch_distance: 1,
            distance_algorithm: DistanceAlgorithm::Fast,
            sample_seed: None,
        }
    }
}

impl SearchOptions {
    pub fn with_limit(mut self, limit: usize) -> Self { self.limit = Some(limit); self }
    pub fn with_mode(mut self, mode: SortMode) -> Self { self.mode = mode; self }
    pub fn with_return(mut self, shape: ReturnShape) -> Self { self.return_shape = shape; self }
    pub fn with_token_mode(mut self, mode: TokenMode) -> Self { self.token_mode = mode; self }
    pub fn with_categories(mut self, ids: Vec<CategoryId>) -> Self { self.category_ids = ids; self }
    pub fn with_min_candidates(mut self, n: usize) -> Self { self.min_candidates = n; self }
    pub fn with_max_comparisons(mut self, n: usize) -> Self { self.max_comparisons = n; self }
    pub fn with_max_nodes_per_shard(mut self, n: usize) -> Self { self.max_nodes_per_shard = Some(n); self }
    pub fn with_branch_distance(mut self, d: usize) -> Self { self.branch_distance = d; self }
    pub fn with_seed(mut self, seed: u64) -> Self { self.sample_seed = Some(seed); self }

    pub fn validate(&self) -> Result<()> {
        if self.limit == Some(0) {
            return Err(Error::InvalidConfig("limit must be at least 1".into()));
        }
        if self.max_nodes_per_shard == Some(0) {
            return Err(Error::InvalidConfig("max_nodes_per_shard must be at least 1".into()));
        }
        let weights = [
            ("substring_boost", self.substring_boost),
            ("prefix_boost", self.prefix_boost),
            ("word_boost", self.word_boost),
            ("phrase_boost", self.phrase_boost),
            ("all_tokens_boost", self.all_tokens_boost),
            ("missing_token_penalty", self.missing_token_penalty),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!("{name} must be a finite, non-negative number, got {value}")));
            }
        }
        Ok(())
    }

    pub fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default)
    }
}
