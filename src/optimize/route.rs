//! Threshold-based model routing.
//!
//! Maps `(prompt tokens, query complexity, provider availability)` to a
//! provider tier and cost estimate. The decision order is fixed: local when
//! preferred and the prompt is small and simple, then increasingly capable
//! cloud tiers; thresholds and prices come from configuration.

use crate::config::RouterConfig;
use crate::error::{OptimizeError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Provider tier chosen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderTier {
    /// Local model, no marginal cost.
    Local,
    /// Small/cheap cloud model.
    Tier1,
    /// Mid-range cloud model.
    Tier2,
    /// Frontier cloud model.
    Tier3,
}

impl ProviderTier {
    /// Stable identifier used in routing reasons and telemetry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Tier1 => "tier-1",
            Self::Tier2 => "tier-2",
            Self::Tier3 => "tier-3",
        }
    }
}

/// Which providers are reachable right now. Probing is the caller's
/// responsibility; the router only consumes the booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAvailability {
    /// A local model is loaded and reachable.
    pub local: bool,
    /// Tier-1 cloud is reachable.
    pub tier1: bool,
    /// Tier-2 cloud is reachable.
    pub tier2: bool,
    /// Tier-3 cloud is reachable.
    pub tier3: bool,
}

impl ProviderAvailability {
    /// Everything reachable.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            local: true,
            tier1: true,
            tier2: true,
            tier3: true,
        }
    }

    /// Cloud tiers reachable, no local model.
    #[must_use]
    pub const fn cloud_only() -> Self {
        Self {
            local: false,
            tier1: true,
            tier2: true,
            tier3: true,
        }
    }
}

/// The router's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelChoice {
    /// Model identifier for the chosen tier.
    pub model: String,
    /// Chosen tier.
    pub provider: ProviderTier,
    /// Human-readable justification.
    pub reason: String,
    /// Estimated cost of the prompt at the tier's price, in USD.
    pub estimated_cost_usd: f64,
}

/// Threshold router over configured tiers.
///
/// # Examples
///
/// ```
/// use promptpack::config::RouterConfig;
/// use promptpack::optimize::{ModelRouter, ProviderAvailability, ProviderTier};
///
/// let router = ModelRouter::new(RouterConfig::default()).unwrap();
/// let choice = router
///     .select_model(5_000, 0.3, &ProviderAvailability::all())
///     .unwrap();
/// assert_eq!(choice.provider, ProviderTier::Local);
/// ```
pub struct ModelRouter {
    config: RouterConfig,
}

impl ModelRouter {
    /// Creates a router from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error when thresholds are out of order.
    pub fn new(config: RouterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Price per million tokens for a tier.
    #[must_use]
    pub const fn price_per_million(&self, tier: ProviderTier) -> f64 {
        match tier {
            ProviderTier::Local => self.config.prices.local,
            ProviderTier::Tier1 => self.config.prices.tier1,
            ProviderTier::Tier2 => self.config.prices.tier2,
            ProviderTier::Tier3 => self.config.prices.tier3,
        }
    }

    /// Selects a provider for a prompt.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizeError::ModelRoutingFailed`] when no reachable
    /// provider satisfies the constraints.
    pub fn select_model(
        &self,
        tokens: usize,
        complexity: f32,
        availability: &ProviderAvailability,
    ) -> Result<ModelChoice> {
        let t = &self.config.thresholds;

        let choice = if self.config.prefer_local
            && availability.local
            && tokens < t.local_max_tokens
            && complexity < t.local_max_complexity
        {
            self.choose(
                ProviderTier::Local,
                tokens,
                format!("local model fits {tokens} tokens at complexity {complexity:.2}"),
            )
        } else if availability.tier1
            && tokens < t.tier1_max_tokens
            && complexity < t.tier1_max_complexity
        {
            self.choose(
                ProviderTier::Tier1,
                tokens,
                format!("small prompt ({tokens} tokens), low complexity {complexity:.2}"),
            )
        } else if availability.tier2
            && (tokens < t.tier2_max_tokens || complexity < t.tier2_max_complexity)
        {
            self.choose(
                ProviderTier::Tier2,
                tokens,
                format!("{tokens} tokens at complexity {complexity:.2} fit the mid tier"),
            )
        } else if availability.tier3 {
            self.choose(
                ProviderTier::Tier3,
                tokens,
                format!(
                    "large or complex prompt ({tokens} tokens, complexity {complexity:.2})"
                ),
            )
        } else {
            return Err(OptimizeError::ModelRoutingFailed {
                reason: format!(
                    "no reachable provider for {tokens} tokens at complexity {complexity:.2}"
                ),
            }
            .into());
        };

        debug!(
            provider = choice.provider.as_str(),
            tokens, complexity, "routing decision"
        );
        Ok(choice)
    }

    fn choose(&self, tier: ProviderTier, tokens: usize, reason: String) -> ModelChoice {
        let model = match tier {
            ProviderTier::Local => &self.config.models.local,
            ProviderTier::Tier1 => &self.config.models.tier1,
            ProviderTier::Tier2 => &self.config.models.tier2,
            ProviderTier::Tier3 => &self.config.models.tier3,
        };
        ModelChoice {
            model: model.clone(),
            provider: tier,
            reason,
            estimated_cost_usd: cost_usd(tokens, self.price_per_million(tier)),
        }
    }
}

/// Cost of `tokens` at `price_per_million` USD.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cost_usd(tokens: usize, price_per_million: f64) -> f64 {
    tokens as f64 / 1_000_000.0 * price_per_million
}
