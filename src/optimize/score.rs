//! Multi-feature relevance scoring.
//!
//! Each candidate gets five normalized features: semantic (embedding
//! cosine), symbol (name match against query entities), proximity
//! (directory distance from the current file), recency (modification age),
//! and frequency (historical usefulness). The final score is their weighted
//! sum; weights come from configuration and must sum to 1.0.
//!
//! `score_batch` is a pure function of its inputs: identical fragments,
//! query, and context always produce identical breakdowns. The proximity
//! cache is per-batch and cleared on entry, so results never leak across
//! requests.

use crate::config::ScoreWeights;
use crate::core::{EntityKind, Fragment, QueryEmbedding, ScoringContext};
use crate::embedding::cosine_similarity;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Milliseconds per day.
const DAY_MS: f64 = 86_400_000.0;

/// Per-feature score components, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Embedding cosine similarity, clamped to `[0, 1]`.
    pub semantic: f32,
    /// Directory proximity to the current file.
    pub proximity: f32,
    /// Symbol-name match against query entities.
    pub symbol: f32,
    /// Modification recency.
    pub recency: f32,
    /// Historical usefulness.
    pub frequency: f32,
}

/// A fragment with its relevance score and per-feature breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFragment {
    /// The scored fragment.
    pub fragment: Fragment,
    /// Weighted final score in `[0, 1]`.
    pub score: f32,
    /// Per-feature components.
    pub breakdown: ScoreBreakdown,
}

/// Weighted five-feature scorer.
///
/// Per-request: construct one scorer per `score_batch` caller; the
/// proximity cache is not shared across concurrent batches.
pub struct RelevanceScorer {
    weights: ScoreWeights,
    proximity_cache: HashMap<(String, String), f32>,
}

impl RelevanceScorer {
    /// Creates a scorer with validated weights.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ConfigError::WeightsSum`] when the weights do
    /// not sum to 1.0.
    pub fn new(weights: ScoreWeights) -> crate::error::Result<Self> {
        weights.validate()?;
        Ok(Self {
            weights,
            proximity_cache: HashMap::new(),
        })
    }

    /// Scores a batch of candidates.
    ///
    /// Results are returned in the original candidate order; callers sort.
    pub fn score_batch(
        &mut self,
        candidates: &[Fragment],
        query: &QueryEmbedding,
        context: &ScoringContext,
    ) -> Vec<ScoredFragment> {
        // The cache lives for exactly one batch.
        self.proximity_cache.clear();

        // Warm the cache sequentially over the distinct paths, then score
        // the batch in parallel against the now-read-only cache.
        if let Some(anchor) = context.proximity_anchor() {
            for fragment in candidates {
                let key = (fragment.file_path.clone(), anchor.to_string());
                if !self.proximity_cache.contains_key(&key) {
                    let score = path_proximity(&fragment.file_path, anchor);
                    self.proximity_cache.insert(key, score);
                }
            }
        }

        let query_entities: Vec<String> = query
            .entities
            .iter()
            .filter(|e| matches!(e.kind, EntityKind::Symbol | EntityKind::Keyword))
            .map(|e| e.value.to_lowercase())
            .collect();

        candidates
            .par_iter()
            .map(|fragment| {
                let breakdown = ScoreBreakdown {
                    semantic: semantic_score(fragment, query),
                    proximity: self.cached_proximity(fragment, context),
                    symbol: symbol_score(&fragment.name, &query_entities),
                    recency: recency_score(fragment, context),
                    frequency: frequency_score(fragment, context),
                };
                let score = self.weighted(&breakdown);
                ScoredFragment {
                    fragment: fragment.clone(),
                    score,
                    breakdown,
                }
            })
            .collect()
    }

    fn cached_proximity(&self, fragment: &Fragment, context: &ScoringContext) -> f32 {
        context.proximity_anchor().map_or(0.0, |anchor| {
            self.proximity_cache
                .get(&(fragment.file_path.clone(), anchor.to_string()))
                .copied()
                .unwrap_or_else(|| path_proximity(&fragment.file_path, anchor))
        })
    }

    fn weighted(&self, b: &ScoreBreakdown) -> f32 {
        let w = &self.weights;
        (b.semantic * w.semantic
            + b.symbol * w.symbol
            + b.proximity * w.proximity
            + b.recency * w.recency
            + b.frequency * w.frequency)
            .clamp(0.0, 1.0)
    }
}

/// Sorts scored fragments by final score descending, breaking ties by the
/// semantic component descending.
pub fn sort_by_score(scored: &mut [ScoredFragment]) {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.breakdown
                    .semantic
                    .partial_cmp(&a.breakdown.semantic)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });
}

/// Cosine similarity clamped to `[0, 1]`; 0 when either vector is absent or
/// the dimensions differ.
fn semantic_score(fragment: &Fragment, query: &QueryEmbedding) -> f32 {
    fragment.embedding.as_ref().map_or(0.0, |embedding| {
        cosine_similarity(&query.vector, embedding).clamp(0.0, 1.0)
    })
}

/// Best match between the fragment name and any symbol/keyword entity:
/// exact 1.0, containment 0.8, else edit-distance falloff scaled by 0.6.
fn symbol_score(name: &str, entities_lower: &[String]) -> f32 {
    if entities_lower.is_empty() {
        return 0.0;
    }
    let name_lower = name.to_lowercase();

    entities_lower
        .iter()
        .map(|entity| {
            if *entity == name_lower {
                1.0
            } else if name_lower.contains(entity.as_str()) || entity.contains(&name_lower) {
                0.8
            } else {
                let distance = levenshtein(&name_lower, entity);
                let max_len = name_lower.chars().count().max(entity.chars().count()).max(1);
                #[allow(clippy::cast_precision_loss)]
                {
                    0.6 * (1.0 - distance as f32 / max_len as f32)
                }
            }
        })
        .fold(0.0, f32::max)
}

/// Directory-distance proximity between a fragment path and the anchor.
fn path_proximity(fragment_path: &str, anchor: &str) -> f32 {
    if fragment_path == anchor {
        return 1.0;
    }

    let frag: Vec<&str> = fragment_path.split('/').filter(|s| !s.is_empty()).collect();
    let anch: Vec<&str> = anchor.split('/').filter(|s| !s.is_empty()).collect();

    let common = frag
        .iter()
        .zip(anch.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 {
        return 0.05;
    }

    // Same directory: everything but the file name is shared.
    if common == frag.len() - 1 && common == anch.len() - 1 {
        return 0.8;
    }

    #[allow(clippy::cast_precision_loss)]
    let distance = (frag.len() - common) + (anch.len() - common);
    #[allow(clippy::cast_precision_loss)]
    let score = 0.8 - 0.1 * distance as f32;
    score.max(0.1)
}

/// Half-life decay over modification age: 0.5^(age_days/30), floored at
/// 0.1; 0.5 when the modification time is unknown.
fn recency_score(fragment: &Fragment, context: &ScoringContext) -> f32 {
    let Some(modified) = fragment.last_modified else {
        return 0.5;
    };
    #[allow(clippy::cast_precision_loss)]
    let age_days = (context.now.saturating_sub(modified)) as f64 / DAY_MS;
    #[allow(clippy::cast_possible_truncation)]
    let decay = 0.5f64.powf(age_days / 30.0) as f32;
    decay.clamp(0.1, 1.0)
}

/// Helpfulness ratio damped by sample size: `(h/n) * min(1, n/10)`.
fn frequency_score(fragment: &Fragment, context: &ScoringContext) -> f32 {
    let mut total = 0u32;
    let mut helpful = 0u32;
    for event in &context.usage_history {
        if event.fragment_id == fragment.id {
            total += 1;
            if event.helpful {
                helpful += 1;
            }
        }
    }
    if total == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    {
        (helpful as f32 / total as f32) * (total as f32 / 10.0).min(1.0)
    }
}

/// Classic two-row Levenshtein distance over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let substitution = usize::from(a_char != b_char);
            current[j + 1] = (previous[j] + substitution)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}
