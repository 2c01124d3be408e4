//! Budget-constrained fragment selection.
//!
//! Greedy selection by score density (score per token) with a bounded
//! swap-refinement pass. One very-high-value fragment may overrun the
//! budget by up to 10%; everything else must fit.

use crate::core::{HeuristicEstimator, TokenEstimator};
use crate::optimize::score::ScoredFragment;
use std::sync::Arc;
use tracing::debug;

/// Default relevance threshold.
pub const DEFAULT_MIN_RELEVANCE: f32 = 0.6;

/// Fragments scoring above this may overrun the budget (once, by <= 10%).
const HIGH_VALUE_SCORE: f32 = 0.8;

/// How many fragments the threshold fallback keeps.
const FALLBACK_TOP_N: usize = 5;

/// Maximum swap-refinement passes.
const MAX_SWAP_PASSES: usize = 3;

/// Greedy score-density selector.
///
/// # Examples
///
/// ```
/// use promptpack::optimize::BudgetSelector;
///
/// let selector = BudgetSelector::new(0.6, 20);
/// assert!(selector.select(&[], 1_000).is_empty());
/// ```
pub struct BudgetSelector {
    min_relevance: f32,
    max_chunks: usize,
    estimator: Arc<dyn TokenEstimator>,
}

impl BudgetSelector {
    /// Creates a selector with the default token estimator.
    #[must_use]
    pub fn new(min_relevance: f32, max_chunks: usize) -> Self {
        Self {
            min_relevance,
            max_chunks,
            estimator: Arc::new(HeuristicEstimator),
        }
    }

    /// Injects a tokenizer; the same estimator must be used for all budget
    /// arithmetic in a request.
    #[must_use]
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Estimated token cost of one fragment.
    #[must_use]
    pub fn cost(&self, fragment: &ScoredFragment) -> usize {
        self.estimator.estimate(&fragment.fragment.content)
    }

    /// Selects fragments within `budget_tokens`.
    ///
    /// A zero budget selects nothing. When no candidate clears the
    /// relevance threshold, the top five by score are considered instead.
    #[must_use]
    pub fn select(&self, scored: &[ScoredFragment], budget_tokens: usize) -> Vec<ScoredFragment> {
        if budget_tokens == 0 || scored.is_empty() {
            return Vec::new();
        }

        // Threshold filter, with a top-N fallback so sparse corpora still
        // produce context.
        let mut pool: Vec<&ScoredFragment> = scored
            .iter()
            .filter(|s| s.score >= self.min_relevance)
            .collect();
        if pool.is_empty() {
            let mut by_score: Vec<&ScoredFragment> = scored.iter().collect();
            by_score.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            pool = by_score.into_iter().take(FALLBACK_TOP_N).collect();
        }

        // Density order: score per token, descending.
        #[allow(clippy::cast_precision_loss)]
        let density =
            |s: &ScoredFragment| f64::from(s.score) / self.cost(s) as f64;
        pool.sort_by(|a, b| {
            density(b)
                .partial_cmp(&density(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Greedy walk with a single high-value overrun allowance.
        let mut selected: Vec<usize> = Vec::new();
        let mut spent = 0usize;
        let mut overrun_used = false;
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let overrun_cap = (budget_tokens as f64 * 1.1) as usize;

        for (position, candidate) in pool.iter().enumerate() {
            if selected.len() >= self.max_chunks {
                break;
            }
            let tokens = self.cost(candidate);
            if spent + tokens <= budget_tokens {
                selected.push(position);
                spent += tokens;
            } else if !overrun_used
                && candidate.score > HIGH_VALUE_SCORE
                && spent + tokens <= overrun_cap
            {
                selected.push(position);
                spent += tokens;
                overrun_used = true;
            }
        }

        self.refine_swaps(&pool, &mut selected, &mut spent, budget_tokens);

        debug!(
            selected = selected.len(),
            spent, budget_tokens, "selection complete"
        );
        selected.into_iter().map(|i| pool[i].clone()).collect()
    }

    /// Bounded local search: swap one selected fragment for one unselected
    /// fragment whenever the swap fits the budget and strictly increases
    /// total score. Hard-capped at three passes.
    fn refine_swaps(
        &self,
        pool: &[&ScoredFragment],
        selected: &mut Vec<usize>,
        spent: &mut usize,
        budget_tokens: usize,
    ) {
        for _pass in 0..MAX_SWAP_PASSES {
            let mut improved = false;

            'outer: for sel_idx in 0..selected.len() {
                let current = selected[sel_idx];
                for (candidate, entry) in pool.iter().enumerate() {
                    if selected.contains(&candidate) {
                        continue;
                    }
                    let new_spent =
                        *spent - self.cost(pool[current]) + self.cost(entry);
                    if new_spent <= budget_tokens && entry.score > pool[current].score {
                        selected[sel_idx] = candidate;
                        *spent = new_spent;
                        improved = true;
                        continue 'outer;
                    }
                }
            }

            if !improved {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Fragment, FragmentKind};
    use crate::optimize::score::{ScoreBreakdown, ScoredFragment};

    /// A fragment whose content estimates to roughly `tokens` tokens.
    fn scored(name: &str, score: f32, tokens: usize) -> ScoredFragment {
        let content = "x".repeat(tokens * 4);
        ScoredFragment {
            fragment: Fragment::new(
                "/r/a.ts",
                name,
                FragmentKind::Function,
                1,
                2,
                &content,
                "typescript",
            ),
            score,
            breakdown: ScoreBreakdown {
                semantic: score,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_zero_budget_selects_nothing() {
        let selector = BudgetSelector::new(0.6, 20);
        let candidates = vec![scored("a", 0.9, 100)];
        assert!(selector.select(&candidates, 0).is_empty());
    }

    #[test]
    fn test_budget_for_everything_selects_all_above_threshold() {
        let selector = BudgetSelector::new(0.6, 20);
        let candidates = vec![
            scored("a", 0.9, 100),
            scored("b", 0.7, 100),
            scored("c", 0.5, 100), // below threshold
        ];
        let total: usize = candidates.iter().map(|c| selector.cost(c)).sum();
        let picked = selector.select(&candidates, total);
        let names: Vec<&str> = picked.iter().map(|s| s.fragment.name.as_str()).collect();
        assert_eq!(picked.len(), 2);
        assert!(names.contains(&"a"));
        assert!(names.contains(&"b"));
    }

    #[test]
    fn test_fallback_top_five_when_nothing_clears_threshold() {
        let selector = BudgetSelector::new(0.9, 20);
        let candidates: Vec<ScoredFragment> = (0..8)
            .map(|i| scored(&format!("f{i}"), 0.1 + 0.05 * i as f32, 10))
            .collect();
        let picked = selector.select(&candidates, 10_000);
        assert_eq!(picked.len(), FALLBACK_TOP_N);
        // The five highest scores made it.
        assert!(picked.iter().all(|s| s.score >= 0.25));
    }

    #[test]
    fn test_density_priority() {
        let selector = BudgetSelector::new(0.6, 20);
        // "dense" delivers more score per token than "bulky".
        let candidates = vec![scored("bulky", 0.9, 1_000), scored("dense", 0.8, 100)];
        let picked = selector.select(&candidates, 100);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].fragment.name, "dense");
    }

    #[test]
    fn test_max_chunks_cap() {
        let selector = BudgetSelector::new(0.6, 2);
        let candidates: Vec<ScoredFragment> =
            (0..6).map(|i| scored(&format!("f{i}"), 0.9, 10)).collect();
        let picked = selector.select(&candidates, 10_000);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_high_value_overrun_admitted_once() {
        let selector = BudgetSelector::new(0.6, 20);
        // Budget 1000; the 1050-token candidate scores over 0.8 and fits the
        // 10% overrun; a second overrun candidate must not be admitted.
        let candidates = vec![scored("big1", 0.95, 1_050), scored("big2", 0.94, 1_050)];
        let picked = selector.select(&candidates, 1_000);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].fragment.name, "big1");
    }

    #[test]
    fn test_overrun_not_granted_below_high_score() {
        let selector = BudgetSelector::new(0.6, 20);
        let candidates = vec![scored("meh", 0.7, 1_050)];
        assert!(selector.select(&candidates, 1_000).is_empty());
    }

    #[test]
    fn test_selector_swap_scenario() {
        // A=(0.95, 5000), B=(0.85, 800), C=(0.84, 800), D=(0.83, 800),
        // budget 2500: greedy takes {B, C, D}; no swap for A fits; the swap
        // phase must terminate.
        let selector = BudgetSelector::new(0.6, 20);
        let candidates = vec![
            scored("A", 0.95, 5_000),
            scored("B", 0.85, 800),
            scored("C", 0.84, 800),
            scored("D", 0.83, 800),
        ];
        let picked = selector.select(&candidates, 2_500);
        let mut names: Vec<&str> = picked.iter().map(|s| s.fragment.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["B", "C", "D"]);
    }

    #[test]
    fn test_swap_improves_total_score() {
        // Greedy by density picks the small mediocre fragment first and
        // fills the budget; swapping it for the bigger, better one wins.
        let selector = BudgetSelector::new(0.1, 1);
        let candidates = vec![scored("small", 0.4, 50), scored("better", 0.9, 400)];
        let picked = selector.select(&candidates, 450);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].fragment.name, "better");
    }

    #[test]
    fn test_empty_input() {
        let selector = BudgetSelector::new(0.6, 20);
        assert!(selector.select(&[], 1_000).is_empty());
    }
}
