//! Token budget accounting and token estimation.
//!
//! All budget arithmetic in the crate goes through one [`TokenEstimator`] so
//! selection, compression, and savings figures are mutually consistent.

use serde::{Deserialize, Serialize};

/// Estimates the token count of a text.
///
/// The default [`HeuristicEstimator`] is language-independent; callers with a
/// real tokenizer inject their own implementation.
pub trait TokenEstimator: Send + Sync {
    /// Returns the estimated token count. Must be at least 1 for any input
    /// (including the empty string) so that ratios stay well-defined.
    fn estimate(&self, text: &str) -> usize;
}

/// Character-count heuristic: ~4 characters per token, never below 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        (text.len() / 4).max(1)
    }
}

/// Prompt-space accounting for one optimization request.
///
/// Invariants: `used + remaining == total` and
/// `system + user_query + available_for_context <= total`.
///
/// # Examples
///
/// ```
/// use promptpack::core::TokenBudget;
///
/// let mut budget = TokenBudget::new(10_000, 200, 50);
/// assert_eq!(budget.available_for_context, 9_750);
/// budget.charge(1_000);
/// assert_eq!(budget.remaining, 8_750);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Total tokens the prompt may occupy.
    pub total: usize,
    /// Tokens already committed (system + query + charged context).
    pub used: usize,
    /// Tokens still available.
    pub remaining: usize,
    /// Tokens reserved for the system preamble.
    pub system: usize,
    /// Tokens occupied by the user query.
    pub user_query: usize,
    /// Tokens available for context fragments.
    pub available_for_context: usize,
}

impl TokenBudget {
    /// Creates a budget with the system preamble and user query charged
    /// up front.
    ///
    /// When the preamble and query alone exceed `total`, the context
    /// allowance is zero and `used` is clamped to `total`.
    #[must_use]
    pub const fn new(total: usize, system: usize, user_query: usize) -> Self {
        let fixed = system + user_query;
        let used = if fixed > total { total } else { fixed };
        Self {
            total,
            used,
            remaining: total - used,
            system,
            user_query,
            available_for_context: total - used,
        }
    }

    /// Charges context tokens against the budget, saturating at `total`.
    pub const fn charge(&mut self, tokens: usize) {
        let charged = if tokens > self.remaining {
            self.remaining
        } else {
            tokens
        };
        self.used += charged;
        self.remaining -= charged;
    }

    /// Whether `tokens` more context tokens fit.
    #[must_use]
    pub const fn fits(&self, tokens: usize) -> bool {
        tokens <= self.remaining
    }
}
