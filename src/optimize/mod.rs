//! Prompt optimization pipeline.
//!
//! `optimize(query, budget)` runs the six-phase composition: intent
//! analysis → query embedding → multi-hop retrieval → relevance scoring →
//! budget-constrained selection → compression → model routing, and emits an
//! [`OptimizedPrompt`] that fits the token budget.

mod compress;
mod intent;
mod retrieve;
mod route;
mod score;
mod select;

pub use compress::{CompressedFragment, CompressionLevel, Compressor};
pub use intent::{IntentAnalyzer, IntentKind, QueryIntent, QueryScope};
pub use retrieve::{Candidate, DEFAULT_K, DEFAULT_MAX_CANDIDATES, Provenance, Retriever};
pub use route::{ModelChoice, ModelRouter, ProviderAvailability, ProviderTier, cost_usd};
pub use score::{RelevanceScorer, ScoreBreakdown, ScoredFragment, sort_by_score};
pub use select::{BudgetSelector, DEFAULT_MIN_RELEVANCE};

use crate::config::OptimizationConfig;
use crate::core::{
    Fragment, HeuristicEstimator, QueryEmbedding, ScoringContext, TokenBudget, TokenEstimator,
};
use crate::error::{OptimizeError, Result};
use crate::index::VectorIndex;
use crate::store::FragmentStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// System preamble prepended to every assembled prompt.
const SYSTEM_PREAMBLE: &str =
    "You are assisting with a software engineering task. \
     Relevant code fragments from the repository follow the query.";

/// Token accounting of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Savings {
    /// Tokens saved against the uncompressed baseline.
    pub tokens_saved: usize,
    /// Percentage saved, in `[0, 100]`.
    pub percentage: f64,
    /// Dollar value of the saved tokens at the chosen tier's price.
    pub cost_saved_usd: f64,
}

/// The assembled, budgeted, routed prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedPrompt {
    /// Final prompt text.
    pub prompt: String,
    /// Total tokens (system + query + context).
    pub tokens_used: usize,
    /// Compressed fragments included, in selection order.
    pub fragments: Vec<CompressedFragment>,
    /// Chosen model identifier.
    pub model: String,
    /// Savings against the no-optimization baseline.
    pub savings: Savings,
    /// Routing decision.
    pub routing: ModelChoice,
}

/// Six-phase prompt optimizer over a populated store and index.
///
/// Shared state is limited to the store and index; the scorer (and its
/// proximity cache) is constructed per request.
pub struct Optimizer {
    store: Arc<dyn FragmentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn crate::embedding::Embedder>,
    config: OptimizationConfig,
    analyzer: IntentAnalyzer,
    retriever: Retriever,
    compressor: Compressor,
    router: ModelRouter,
    estimator: Arc<dyn TokenEstimator>,
}

impl Optimizer {
    /// Builds an optimizer, validating configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid weights or router thresholds.
    pub fn new(
        store: Arc<dyn FragmentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn crate::embedding::Embedder>,
        config: OptimizationConfig,
        router_config: crate::config::RouterConfig,
    ) -> Result<Self> {
        config.validate()?;
        let estimator: Arc<dyn TokenEstimator> = Arc::new(HeuristicEstimator);
        let retriever = Retriever::new(Arc::clone(&store), Arc::clone(&index));
        Ok(Self {
            store,
            index,
            embedder,
            config,
            analyzer: IntentAnalyzer::new(),
            retriever,
            compressor: Compressor::new(),
            router: ModelRouter::new(router_config)?,
            estimator,
        })
    }

    /// Replaces the default token estimator everywhere budget arithmetic
    /// happens (selection, compression, savings).
    #[must_use]
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.compressor = Compressor::new().with_estimator(Arc::clone(&estimator));
        self.estimator = estimator;
        self
    }

    /// Analyzes a query without running the full pipeline.
    #[must_use]
    pub fn analyze(&self, query: &str, history: &[String]) -> QueryIntent {
        self.analyzer.analyze(query, history)
    }

    /// Runs [`Optimizer::optimize`] with the configured default budget.
    ///
    /// # Errors
    ///
    /// Same as [`Optimizer::optimize`].
    pub fn optimize_default(
        &self,
        query: &str,
        context: &ScoringContext,
        availability: &ProviderAvailability,
    ) -> Result<OptimizedPrompt> {
        self.optimize(query, self.config.token_budget, context, availability)
    }

    /// Runs the full pipeline for a query under a token budget.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizeError::TokenBudgetExceeded`] when even a single
    /// aggressively compressed fragment cannot fit, an embedding error when
    /// the query cannot be embedded, or a routing error when no provider is
    /// reachable.
    pub fn optimize(
        &self,
        query: &str,
        budget_tokens: usize,
        context: &ScoringContext,
        availability: &ProviderAvailability,
    ) -> Result<OptimizedPrompt> {
        // Phase 1: intent.
        let intent = self.analyzer.analyze(query, &[]);
        debug!(kind = ?intent.kind, complexity = intent.complexity, "intent");

        // Phase 2: retrieval (query embedding + three hops).
        let vector = self.embedder.embed(query)?;
        let query_embedding = QueryEmbedding::new(query, vector, intent.entities.clone());
        let candidates = self
            .retriever
            .retrieve(&intent, &query_embedding, DEFAULT_K)?;

        // Phase 3: scoring. The scorer is per-request; its cache dies here.
        let fragments: Vec<Fragment> =
            candidates.into_iter().map(|c| c.fragment).collect();
        let mut scorer = RelevanceScorer::new(self.config.weights)?;
        let mut scored = scorer.score_batch(&fragments, &query_embedding, context);
        sort_by_score(&mut scored);

        // Phase 4: budget-constrained selection.
        let budget = TokenBudget::new(
            budget_tokens,
            self.estimator.estimate(SYSTEM_PREAMBLE),
            self.estimator.estimate(query),
        );
        let selector = BudgetSelector::new(self.config.min_relevance, self.config.max_chunks)
            .with_estimator(Arc::clone(&self.estimator));
        let selected = selector.select(&scored, budget.available_for_context);

        // Phase 5: compression. Light when the raw selection already fits,
        // otherwise the configured level.
        let raw_total: usize = selected.iter().map(|s| selector.cost(s)).sum();
        let level = if raw_total <= budget.available_for_context {
            CompressionLevel::Light
        } else {
            self.config.compression_level
        };

        let mut compressed: Vec<CompressedFragment> = selected
            .iter()
            .map(|s| self.compressor.compress(&s.fragment, level))
            .collect();

        // Smallest-selection fallback: with candidates on the table but an
        // empty selection, one aggressively compressed fragment is the
        // minimum useful prompt.
        if compressed.is_empty() && !scored.is_empty() && budget.available_for_context > 0 {
            let smallest = self.smallest_candidate(&scored, &selector);
            let aggressive = self
                .compressor
                .compress(&smallest.fragment, CompressionLevel::Aggressive);
            if aggressive.compressed_tokens <= budget.available_for_context {
                compressed = vec![aggressive];
            } else {
                return Err(OptimizeError::TokenBudgetExceeded {
                    fragment_id: smallest.fragment.id.clone(),
                    needed: aggressive.compressed_tokens,
                    budget: budget.available_for_context,
                }
                .into());
            }
        }

        // Final fit: the prompt must not exceed the total budget; shed the
        // lowest-priority fragments if compression alone fell short.
        let mut prompt = assemble(query, &compressed);
        let mut tokens_used = self.estimator.estimate(&prompt);
        while tokens_used > budget.total && !compressed.is_empty() {
            compressed.pop();
            prompt = assemble(query, &compressed);
            tokens_used = self.estimator.estimate(&prompt);
        }
        if tokens_used > budget.total {
            return Err(OptimizeError::TokenBudgetExceeded {
                fragment_id: "user-query".to_string(),
                needed: tokens_used,
                budget: budget.total,
            }
            .into());
        }

        // Phase 6: routing and savings.
        let routing = self
            .router
            .select_model(tokens_used, intent.complexity, availability)?;

        let baseline_tokens = self.baseline_tokens(query, &compressed);
        let tokens_saved = baseline_tokens.saturating_sub(tokens_used);
        #[allow(clippy::cast_precision_loss)]
        let percentage = if baseline_tokens == 0 {
            0.0
        } else {
            (tokens_saved as f64 / baseline_tokens as f64 * 100.0).clamp(0.0, 100.0)
        };
        let savings = Savings {
            tokens_saved,
            percentage,
            cost_saved_usd: cost_usd(
                tokens_saved,
                self.router.price_per_million(routing.provider),
            ),
        };

        info!(
            tokens_used,
            fragments = compressed.len(),
            provider = routing.provider.as_str(),
            saved = tokens_saved,
            "optimization complete"
        );

        Ok(OptimizedPrompt {
            prompt,
            tokens_used,
            fragments: compressed,
            model: routing.model.clone(),
            savings,
            routing,
        })
    }

    /// The candidate with the smallest token cost; falls back to the first
    /// when costs tie.
    fn smallest_candidate<'a>(
        &self,
        scored: &'a [ScoredFragment],
        selector: &BudgetSelector,
    ) -> &'a ScoredFragment {
        let mut best = &scored[0];
        for candidate in scored {
            if selector.cost(candidate) < selector.cost(best) {
                best = candidate;
            }
        }
        best
    }

    /// Tokens the same prompt would take with uncompressed fragment bodies.
    fn baseline_tokens(&self, query: &str, compressed: &[CompressedFragment]) -> usize {
        let mut baseline = String::with_capacity(1024);
        baseline.push_str(SYSTEM_PREAMBLE);
        baseline.push_str("\n\n## Query\n");
        baseline.push_str(query);
        baseline.push_str("\n\n## Context\n");
        for fragment in compressed {
            baseline.push_str(&fragment.original.content);
            baseline.push_str("\n\n");
        }
        self.estimator.estimate(&baseline)
    }

    /// Number of fragments currently in the backing store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn corpus_size(&self) -> Result<usize> {
        self.store.fragment_count()
    }

    /// Number of vectors currently in the backing index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index read fails.
    pub fn index_size(&self) -> Result<usize> {
        self.index.size()
    }
}

/// Prompt text: preamble, query, then the compressed fragments.
fn assemble(query: &str, fragments: &[CompressedFragment]) -> String {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str(SYSTEM_PREAMBLE);
    prompt.push_str("\n\n## Query\n");
    prompt.push_str(query);
    prompt.push_str("\n\n## Context\n");
    for fragment in fragments {
        prompt.push_str(&fragment.content);
        prompt.push_str("\n\n");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FragmentKind;
    use crate::embedding::{Embedder, FallbackEmbedder};
    use crate::index::FlatVectorIndex;
    use crate::store::MemoryFragmentStore;

    const DIMS: usize = 32;

    fn seeded_optimizer(contents: &[(&str, &str, &str)]) -> Optimizer {
        let store = Arc::new(MemoryFragmentStore::new());
        let index = Arc::new(FlatVectorIndex::new(DIMS));
        let embedder = FallbackEmbedder::new(DIMS);

        for (path, name, content) in contents {
            let mut fragment =
                Fragment::new(path, name, FragmentKind::Function, 1, 8, content, "typescript");
            fragment.set_embedding(embedder.embed(content).unwrap());
            store.insert(&fragment).unwrap();
            index
                .insert(&fragment.id, path, fragment.embedding.clone().unwrap())
                .unwrap();
        }

        Optimizer::new(
            store as Arc<dyn FragmentStore>,
            index as Arc<dyn VectorIndex>,
            Arc::new(FallbackEmbedder::new(DIMS)),
            OptimizationConfig {
                min_relevance: 0.05,
                ..Default::default()
            },
            crate::config::RouterConfig::default(),
        )
        .unwrap()
    }

    fn corpus() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            (
                "/repo/src/auth.ts",
                "validateToken",
                "function validateToken(token) {\n  // check token\n  return token.length > 0;\n}",
            ),
            (
                "/repo/src/middleware.ts",
                "authMiddleware",
                "function authMiddleware(req) {\n  return validateToken(req.token);\n}",
            ),
            (
                "/repo/src/unrelated.ts",
                "renderChart",
                "function renderChart(data) {\n  return data.map(drawBar);\n}",
            ),
        ]
    }

    #[test]
    fn test_optimize_produces_bounded_prompt() {
        let optimizer = seeded_optimizer(&corpus());
        let ctx = ScoringContext::new(1_700_000_000_000).with_current_file("/repo/src/auth.ts");

        let result = optimizer
            .optimize("fix the token auth bug", 10_000, &ctx, &ProviderAvailability::all())
            .unwrap();

        assert!(result.tokens_used <= 10_000);
        assert!(!result.fragments.is_empty());
        assert!(result.prompt.contains("fix the token auth bug"));
        assert!((0.0..=100.0).contains(&result.savings.percentage));
        assert!(!result.model.is_empty());
    }

    #[test]
    fn test_optimize_is_deterministic() {
        let optimizer = seeded_optimizer(&corpus());
        let ctx = ScoringContext::new(1_700_000_000_000).with_current_file("/repo/src/auth.ts");

        let a = optimizer
            .optimize("fix the auth bug", 10_000, &ctx, &ProviderAvailability::all())
            .unwrap();
        let b = optimizer
            .optimize("fix the auth bug", 10_000, &ctx, &ProviderAvailability::all())
            .unwrap();

        let ids_a: Vec<&str> = a.fragments.iter().map(|f| f.original.id.as_str()).collect();
        let ids_b: Vec<&str> = b.fragments.iter().map(|f| f.original.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(a.tokens_used, b.tokens_used);
    }

    #[test]
    fn test_optimize_empty_corpus() {
        let optimizer = seeded_optimizer(&[]);
        let ctx = ScoringContext::new(0);

        let result = optimizer
            .optimize("explain the architecture", 10_000, &ctx, &ProviderAvailability::all())
            .unwrap();
        assert!(result.fragments.is_empty());
        assert!(result.tokens_used <= 10_000);
    }

    #[test]
    fn test_tiny_budget_errors_or_fits() {
        let optimizer = seeded_optimizer(&corpus());
        let ctx = ScoringContext::new(0);

        // 40 tokens cannot hold preamble + query + any fragment.
        let result =
            optimizer.optimize("fix the auth bug", 40, &ctx, &ProviderAvailability::all());
        match result {
            Ok(prompt) => assert!(prompt.tokens_used <= 40),
            Err(err) => assert!(err.to_string().contains("token budget exceeded")),
        }
    }

    #[test]
    fn test_light_level_when_selection_fits() {
        let optimizer = seeded_optimizer(&corpus());
        let ctx = ScoringContext::new(0);

        let result = optimizer
            .optimize("fix the token auth bug", 50_000, &ctx, &ProviderAvailability::all())
            .unwrap();
        assert!(
            result
                .fragments
                .iter()
                .all(|f| f.level == CompressionLevel::Light)
        );
    }

    #[test]
    fn test_savings_against_baseline() {
        let optimizer = seeded_optimizer(&corpus());
        let ctx = ScoringContext::new(0);

        let result = optimizer
            .optimize("fix the token auth bug", 10_000, &ctx, &ProviderAvailability::all())
            .unwrap();
        // tokens_saved is consistent with the reported percentage.
        if result.savings.tokens_saved == 0 {
            assert!(result.savings.percentage.abs() < f64::EPSILON);
        } else {
            assert!(result.savings.percentage > 0.0);
        }
    }

    #[test]
    fn test_optimize_default_uses_configured_budget() {
        let optimizer = seeded_optimizer(&corpus());
        let ctx = ScoringContext::new(0);

        let result = optimizer
            .optimize_default("fix the token auth bug", &ctx, &ProviderAvailability::all())
            .unwrap();
        assert!(result.tokens_used <= OptimizationConfig::default().token_budget);
    }

    #[test]
    fn test_routing_respects_availability() {
        let optimizer = seeded_optimizer(&corpus());
        let ctx = ScoringContext::new(0);

        let local = optimizer
            .optimize("fix the auth bug", 5_000, &ctx, &ProviderAvailability::all())
            .unwrap();
        assert_eq!(local.routing.provider, ProviderTier::Local);

        let cloud = optimizer
            .optimize("fix the auth bug", 5_000, &ctx, &ProviderAvailability::cloud_only())
            .unwrap();
        assert_ne!(cloud.routing.provider, ProviderTier::Local);
    }
}
