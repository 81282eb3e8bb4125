//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Rule toggles for the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// A natural 20 always hits and a natural 1 always misses. Off by
    /// default: a hit is exactly `total >= armor class`.
    pub natural_rolls_decide: bool,

    /// A critical hit rolls each damage component's dice twice.
    pub double_critical_dice: bool,
}

impl ResolverConfig {
    pub fn with_natural_rolls_decide(mut self, enabled: bool) -> Self {
        self.natural_rolls_decide = enabled;
        self
    }

    pub fn with_double_critical_dice(mut self, enabled: bool) -> Self {
        self.double_critical_dice = enabled;
        self
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            natural_rolls_decide: false,
            double_critical_dice: true,
        }
    }
}

/// Configuration for an [`Encounter`](crate::encounter::Encounter).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for the encounter's RNG. `None` seeds from system entropy.
    pub seed: Option<u64>,

    pub resolver: ResolverConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every roll in the encounter reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    /// Load from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
