//! Hash-based fallback embedder.
//!
//! Provides deterministic pseudo-embeddings when `FastEmbed` is not
//! available. The signal is built for source code: identifiers are split
//! into subtokens first, so `fetchUser`, `fetch_user`, and `FetchUser` all
//! land on the same features regardless of naming convention.

use crate::embedding::Embedder;
use crate::error::Result;
use std::collections::HashMap;
use xxhash_rust::xxh3::xxh3_64;

/// Weight of the adjacent-subtoken pair signal relative to single tokens.
const PAIR_WEIGHT: f32 = 0.5;

/// Weight of the secondary probe relative to the primary one.
const SECOND_PROBE_WEIGHT: f32 = 0.5;

/// Deterministic feature-hashing embedder over identifier subtokens.
///
/// Three design points, none of which pretend to be semantics:
///
/// - **Subtoken vocabulary.** Text is split on non-alphanumerics and then
///   on case boundaries, lowercased. Code that names the same thing in
///   camelCase and snake_case produces the same subtokens.
/// - **Damped term frequency.** Each distinct subtoken contributes
///   `1 + ln(count)`, so a fragment repeating one identifier fifty times
///   does not drown out the rest of its vocabulary.
/// - **Two-probe scatter with a pair signal.** Every feature lands on two
///   slots derived from one xxh3 hash (halving collision damage at small
///   dimensions), and adjacent subtoken pairs add a weaker ordered signal
///   so `user cache` and `cache user` do not embed identically.
///
/// Vectors are unit-normalized; xxh3 keeps them stable across processes
/// and releases, matching the fragment-id contract.
///
/// # Examples
///
/// ```
/// use promptpack::embedding::{Embedder, FallbackEmbedder};
///
/// let embedder = FallbackEmbedder::new(64);
/// let emb1 = embedder.embed("validateToken").unwrap();
/// let emb2 = embedder.embed("validateToken").unwrap();
/// assert_eq!(emb1, emb2); // Deterministic
/// ```
pub struct FallbackEmbedder {
    dimensions: usize,
}

impl FallbackEmbedder {
    /// Creates a new fallback embedder with the specified dimensions.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Generates a pseudo-embedding from text.
    #[allow(clippy::cast_precision_loss)]
    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return embedding;
        }

        let tokens = subtokens(text);
        if tokens.is_empty() {
            return embedding;
        }

        // Damped term frequency per distinct subtoken.
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }
        for (token, count) in &counts {
            let weight = 1.0 + (*count as f32).ln();
            scatter(&mut embedding, xxh3_64(token.as_bytes()), weight);
        }

        // Ordered pair signal over adjacent subtokens, damped the same way.
        let mut pair_counts: HashMap<String, u32> = HashMap::new();
        for window in tokens.windows(2) {
            let pair = format!("{}\u{1f}{}", window[0], window[1]);
            *pair_counts.entry(pair).or_insert(0) += 1;
        }
        for (pair, count) in &pair_counts {
            let weight = PAIR_WEIGHT * (1.0 + (*count as f32).ln());
            scatter(&mut embedding, xxh3_64(pair.as_bytes()), weight);
        }

        normalize(&mut embedding);
        embedding
    }
}

impl Embedder for FallbackEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.generate_embedding(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.len() > self.max_batch_size() {
            return Err(crate::error::EmbeddingError::BatchTooLarge {
                size: texts.len(),
                max: self.max_batch_size(),
            }
            .into());
        }

        // Parallel processing for batch embedding
        use rayon::prelude::*;

        Ok(texts
            .par_iter()
            .map(|text| self.generate_embedding(text))
            .collect())
    }
}

/// Splits text into lowercase identifier subtokens: non-alphanumerics
/// separate tokens, and a lower-to-upper case change inside a run does too.
/// `parseHTTPRequest` becomes `parse`, `httprequest`; `retry_count` becomes
/// `retry`, `count`.
fn subtokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_was_lower = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            if c.is_uppercase() && prev_was_lower && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            current.extend(c.to_lowercase());
            prev_was_lower = c.is_lowercase() || c.is_numeric();
        } else {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_was_lower = false;
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Adds a weighted feature at two slots derived from one hash. The probes
/// use independent hash halves and sign bits.
fn scatter(embedding: &mut [f32], hash: u64, weight: f32) {
    let dims = embedding.len();
    #[allow(clippy::cast_possible_truncation)]
    let (lo, hi) = ((hash & 0xffff_ffff) as usize, (hash >> 32) as usize);

    let primary_sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
    let secondary_sign = if hash & 2 == 0 { 1.0 } else { -1.0 };

    embedding[lo % dims] += primary_sign * weight;
    embedding[hi % dims] += secondary_sign * weight * SECOND_PROBE_WEIGHT;
}

/// Scales the vector to unit length; zero vectors stay zero.
fn normalize(embedding: &mut [f32]) {
    let norm_sq: f32 = embedding.iter().map(|x| x * x).sum();
    if norm_sq > 0.0 {
        let inv = norm_sq.sqrt().recip();
        for value in embedding.iter_mut() {
            *value *= inv;
        }
    }
}
