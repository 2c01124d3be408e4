//! Configuration for indexing, optimization, and model routing.
//!
//! All config structs are serde round-trippable, carry sensible defaults,
//! and validate on construction of the components that consume them:
//! weights must sum to 1.0, router thresholds must be ordered, sizes must
//! be positive.

use crate::error::{ConfigError, Result};
use crate::optimize::CompressionLevel;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Indexing pipeline options.
    pub indexing: IndexingConfig,
    /// Prompt optimization options.
    pub optimization: OptimizationConfig,
    /// Model routing options.
    pub model_router: RouterConfig,
}

impl Config {
    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<()> {
        self.indexing.validate()?;
        self.optimization.validate()?;
        self.model_router.validate()?;
        Ok(())
    }
}

/// Indexing pipeline options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Glob patterns for files to index.
    pub include_patterns: Vec<String>,
    /// Glob patterns excluded.
    pub exclude_patterns: Vec<String>,
    /// Files larger than this many bytes are skipped.
    pub max_file_size: u64,
    /// Enable mtime-based skip of unchanged files.
    pub incremental: bool,
    /// Target tokens per fragment.
    pub chunk_size: usize,
    /// Tokens of overlap between adjacent pieces of an oversized unit.
    pub overlap: usize,
    /// Worker count for per-file processing (0 = number of cores).
    pub parallelism: usize,
    /// Fragments per embedding batch.
    pub batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            include_patterns: vec!["**/*".to_string()],
            exclude_patterns: vec![
                "**/node_modules/**".to_string(),
                "**/.git/**".to_string(),
                "**/target/**".to_string(),
                "**/dist/**".to_string(),
            ],
            max_file_size: 1024 * 1024,
            incremental: true,
            chunk_size: 512,
            overlap: 128,
            parallelism: 0,
            batch_size: 100,
        }
    }
}

impl IndexingConfig {
    /// Validates sizes and glob patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for zero sizes, an overlap that
    /// is not smaller than the chunk size, or malformed glob patterns.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "indexing.chunk_size".to_string(),
                reason: "must be > 0".to_string(),
            }
            .into());
        }
        if self.overlap >= self.chunk_size {
            return Err(ConfigError::InvalidValue {
                key: "indexing.overlap".to_string(),
                reason: format!("overlap {} must be less than chunk_size {}", self.overlap, self.chunk_size),
            }
            .into());
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "indexing.batch_size".to_string(),
                reason: "must be > 0".to_string(),
            }
            .into());
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "indexing.max_file_size".to_string(),
                reason: "must be > 0".to_string(),
            }
            .into());
        }
        for pattern in self.include_patterns.iter().chain(&self.exclude_patterns) {
            glob::Pattern::new(pattern).map_err(|e| ConfigError::InvalidValue {
                key: "indexing.include_patterns/exclude_patterns".to_string(),
                reason: format!("bad glob {pattern:?}: {e}"),
            })?;
        }
        Ok(())
    }
}

/// Weights of the five relevance features. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Weight of cosine similarity between query and fragment embeddings.
    pub semantic: f32,
    /// Weight of symbol-name matching.
    pub symbol: f32,
    /// Weight of directory proximity to the current file.
    pub proximity: f32,
    /// Weight of modification recency.
    pub recency: f32,
    /// Weight of historical usefulness.
    pub frequency: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            semantic: 0.40,
            symbol: 0.25,
            proximity: 0.20,
            recency: 0.10,
            frequency: 0.05,
        }
    }
}

impl ScoreWeights {
    /// Sum of all weights.
    #[must_use]
    pub fn sum(&self) -> f32 {
        self.semantic + self.symbol + self.proximity + self.recency + self.frequency
    }

    /// Validates that the weights sum to 1.0 (within 1e-4).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WeightsSum`] otherwise.
    pub fn validate(&self) -> Result<()> {
        let sum = self.sum();
        if (sum - 1.0).abs() > 1e-4 {
            return Err(ConfigError::WeightsSum { sum }.into());
        }
        Ok(())
    }
}

/// Prompt optimization options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Default context budget in tokens.
    pub token_budget: usize,
    /// Relevance threshold for the budget selector.
    pub min_relevance: f32,
    /// Hard cap on selected fragments.
    pub max_chunks: usize,
    /// Compression level applied to selected fragments.
    pub compression_level: CompressionLevel,
    /// Feature weights for the relevance scorer.
    pub weights: ScoreWeights,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            token_budget: 16_000,
            min_relevance: 0.6,
            max_chunks: 20,
            compression_level: CompressionLevel::Medium,
            weights: ScoreWeights::default(),
        }
    }
}

impl OptimizationConfig {
    /// Validates weights and ranges.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for a bad weight sum or an out-of-range
    /// relevance threshold.
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if !(0.0..=1.0).contains(&self.min_relevance) {
            return Err(ConfigError::InvalidValue {
                key: "optimization.min_relevance".to_string(),
                reason: format!("{} not in [0, 1]", self.min_relevance),
            }
            .into());
        }
        if self.max_chunks == 0 {
            return Err(ConfigError::InvalidValue {
                key: "optimization.max_chunks".to_string(),
                reason: "must be > 0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Token and complexity thresholds for each routing tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterThresholds {
    /// Max tokens the local tier accepts.
    pub local_max_tokens: usize,
    /// Max complexity the local tier accepts.
    pub local_max_complexity: f32,
    /// Max tokens tier-1 accepts.
    pub tier1_max_tokens: usize,
    /// Max complexity tier-1 accepts.
    pub tier1_max_complexity: f32,
    /// Max tokens tier-2 accepts (alternatively, max complexity below).
    pub tier2_max_tokens: usize,
    /// Complexity below which tier-2 still accepts oversized prompts.
    pub tier2_max_complexity: f32,
}

impl Default for RouterThresholds {
    fn default() -> Self {
        Self {
            local_max_tokens: 8_000,
            local_max_complexity: 0.6,
            tier1_max_tokens: 20_000,
            tier1_max_complexity: 0.4,
            tier2_max_tokens: 100_000,
            tier2_max_complexity: 0.8,
        }
    }
}

/// Price per million tokens for each tier, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPrices {
    /// Local models run at no marginal cost.
    pub local: f64,
    /// Tier-1 cloud price.
    pub tier1: f64,
    /// Tier-2 cloud price.
    pub tier2: f64,
    /// Tier-3 cloud price.
    pub tier3: f64,
}

impl Default for TierPrices {
    fn default() -> Self {
        Self {
            local: 0.0,
            tier1: 0.25,
            tier2: 3.0,
            tier3: 15.0,
        }
    }
}

/// Model identifiers advertised per tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierModels {
    /// Local model identifier.
    pub local: String,
    /// Tier-1 cloud model identifier.
    pub tier1: String,
    /// Tier-2 cloud model identifier.
    pub tier2: String,
    /// Tier-3 cloud model identifier.
    pub tier3: String,
}

impl Default for TierModels {
    fn default() -> Self {
        Self {
            local: "local-code-7b".to_string(),
            tier1: "cloud-mini".to_string(),
            tier2: "cloud-standard".to_string(),
            tier3: "cloud-frontier".to_string(),
        }
    }
}

/// Model routing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Whether the local-tier step of the decision order is enabled.
    pub prefer_local: bool,
    /// Token/complexity thresholds.
    pub thresholds: RouterThresholds,
    /// Prices per million tokens.
    pub prices: TierPrices,
    /// Model identifiers.
    pub models: TierModels,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            prefer_local: true,
            thresholds: RouterThresholds::default(),
            prices: TierPrices::default(),
            models: TierModels::default(),
        }
    }
}

impl RouterConfig {
    /// Validates threshold ordering and complexity ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ThresholdOrder`] when token thresholds are not
    /// strictly increasing, or [`ConfigError::InvalidValue`] for
    /// complexities outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if !(t.local_max_tokens < t.tier1_max_tokens && t.tier1_max_tokens < t.tier2_max_tokens) {
            return Err(ConfigError::ThresholdOrder {
                message: format!(
                    "token thresholds must be strictly increasing: local {} < tier1 {} < tier2 {}",
                    t.local_max_tokens, t.tier1_max_tokens, t.tier2_max_tokens
                ),
            }
            .into());
        }
        for (key, value) in [
            ("local_max_complexity", t.local_max_complexity),
            ("tier1_max_complexity", t.tier1_max_complexity),
            ("tier2_max_complexity", t.tier2_max_complexity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key: format!("model_router.thresholds.{key}"),
                    reason: format!("{value} not in [0, 1]"),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let weights = ScoreWeights {
            semantic: 0.5,
            ..Default::default()
        };
        let err = weights.validate().unwrap_err();
        assert!(err.to_string().contains("sum"));

        ScoreWeights::default().validate().unwrap();
    }

    #[test]
    fn test_overlap_must_be_below_chunk_size() {
        let config = IndexingConfig {
            chunk_size: 100,
            overlap: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_glob_rejected() {
        let config = IndexingConfig {
            include_patterns: vec!["[".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_order_enforced() {
        let config = RouterConfig {
            thresholds: RouterThresholds {
                local_max_tokens: 50_000,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn test_complexity_range_enforced() {
        let config = RouterConfig {
            thresholds: RouterThresholds {
                tier1_max_complexity: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_relevance_range() {
        let config = OptimizationConfig {
            min_relevance: 1.2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"indexing": {"chunk_size": 256}}"#).unwrap();
        assert_eq!(config.indexing.chunk_size, 256);
        assert_eq!(config.indexing.batch_size, 100);
        assert!(config.model_router.prefer_local);
    }
}
