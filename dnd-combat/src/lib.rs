//! D&D 5e combat resolution engine.
//!
//! This crate provides:
//! - Dice rolling with advantage/disadvantage and critical detection
//! - A feature pipeline where racial and class rules modify rolls
//! - Attack, check and saving throw resolution with typed damage
//! - Resource ledgers (spell slots, limited uses, hit dice) with rests
//! - Conditions that shape advantage, saves, speed and who may act
//! - Initiative and turn tracking
//!
//! # Quick Start
//!
//! ```
//! use dnd_combat::testing::{sample_fighter, sample_goblin};
//! use dnd_combat::{Advantage, Encounter, EngineConfig};
//!
//! let mut encounter = Encounter::with_builtin_features(EngineConfig::new().with_seed(42));
//! let fighter = encounter.add_combatant(sample_fighter("Roland"));
//! let goblin = encounter.add_combatant(sample_goblin("Snik"));
//!
//! encounter.start();
//! let attacker = encounter.current().map(|c| c.id).unwrap();
//! let (action, target) = if attacker == fighter {
//!     ("longsword", goblin)
//! } else {
//!     ("scimitar", fighter)
//! };
//! let outcome = encounter.attack(attacker, action, target, Advantage::Normal).unwrap();
//! println!("{} (hit: {})", outcome.roll, outcome.hit);
//! ```

pub mod actions;
pub mod combatant;
pub mod conditions;
pub mod config;
pub mod dice;
pub mod encounter;
pub mod features;
pub mod resolver;
pub mod resources;
pub mod testing;
pub mod tracker;

// Primary public API
pub use actions::{ActionDefinition, ActionError, ActionKind, ActionRegistry, Effect, EffectTarget};
pub use combatant::{Ability, AbilityScores, Actor, Combatant, CombatantId, Defender, Skill};
pub use conditions::{Condition, ConditionSet};
pub use config::{EngineConfig, ResolverConfig};
pub use dice::{Advantage, DiceError, DieSource, RollOutcome};
pub use encounter::{CombatError, Encounter};
pub use features::{Feature, FeatureError, FeatureRegistry, FeatureSet, RollKind};
pub use resolver::{
    AttackOutcome, AttackProfile, AttackRange, DamageComponent, DamageOutcome, DamageType,
    Resolver, SaveOutcome,
};
pub use resources::{RechargePolicy, Resource, ResourceError, ResourceLedger, RestKind};
pub use tracker::{CombatTracker, Roster};
