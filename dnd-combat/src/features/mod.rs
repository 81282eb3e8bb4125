//! Feature hooks and the modifier pipeline.
//!
//! A feature is a named rule (racial trait, class feature, feat) that can
//! alter roll outcomes, grant actions or resources on attach, react to turn
//! and combat boundaries, adjust damage dealt or taken, change speed, or
//! override armor class. Every hook has a no-op default so a feature only
//! implements what it touches.
//!
//! Roll hooks chain: each feature sees the previous feature's outcome, in
//! attachment order. Value hooks such as the armor class override go through
//! [`FeatureSet::dispatch`], where the last feature returning `Some` wins.

mod builtin;

pub use builtin::{
    Claws, FelineAgility, GreatWeaponFighting, HalflingLuck, Talent, UnarmoredDefense,
};

use crate::combatant::{Actor, Combatant};
use crate::dice::{DieSource, RollOutcome};
use crate::resources::ResourceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors from attaching, detaching or activating features.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    #[error("Unknown feature: {0}")]
    Unknown(String),

    #[error("Feature cannot be activated right now: {0}")]
    NotActivatable(String),

    #[error("Feature not attached: {0}")]
    NotAttached(String),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
}

/// Which roll a pipeline pass is modifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RollKind {
    Attack,
    AbilityCheck,
    SkillCheck,
    SavingThrow,
    Initiative,
    Damage,
}

impl RollKind {
    pub fn is_d20(&self) -> bool {
        !matches!(self, RollKind::Damage)
    }
}

/// Where a feature comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureSource {
    Race,
    Class,
    Background,
    Feat,
    Item,
    Other,
}

/// A rule that hooks into resolution.
pub trait Feature: Send + Sync {
    fn name(&self) -> &str;

    fn source(&self) -> FeatureSource {
        FeatureSource::Other
    }

    /// Whether the roll hooks do anything. Features returning false are
    /// skipped by [`FeatureSet::apply`].
    fn affects_rolls(&self) -> bool {
        false
    }

    /// Grant actions, resources or proficiencies.
    fn on_attach(&self, _host: &mut Combatant) -> Result<(), FeatureError> {
        Ok(())
    }

    /// Undo whatever `on_attach` granted.
    fn on_detach(&self, _host: &mut Combatant) {}

    /// Runs before the kind-specific hook on every d20 roll.
    fn on_d20_roll(&self, roll: RollOutcome, _dice: &mut dyn DieSource) -> RollOutcome {
        roll
    }

    fn on_attack_roll(&self, roll: RollOutcome, _dice: &mut dyn DieSource) -> RollOutcome {
        roll
    }

    /// Ability and skill checks.
    fn on_ability_check(&self, roll: RollOutcome, _dice: &mut dyn DieSource) -> RollOutcome {
        roll
    }

    fn on_saving_throw(&self, roll: RollOutcome, _dice: &mut dyn DieSource) -> RollOutcome {
        roll
    }

    fn on_initiative(&self, roll: RollOutcome, _dice: &mut dyn DieSource) -> RollOutcome {
        roll
    }

    fn on_damage_roll(&self, roll: RollOutcome, _dice: &mut dyn DieSource) -> RollOutcome {
        roll
    }

    fn on_turn_start(&self, _host: &mut Combatant) {}

    fn on_turn_end(&self, _host: &mut Combatant) {}

    fn on_combat_start(&self, _host: &mut Combatant) {}

    fn on_combat_end(&self, _host: &mut Combatant) {}

    /// Adjust damage the host is about to take. Hooks chain in attachment
    /// order.
    fn on_take_damage(&self, _host: &Combatant, amount: i32) -> i32 {
        amount
    }

    /// Adjust damage the host is about to deal.
    fn on_deal_damage(&self, _host: &Combatant, amount: i32) -> i32 {
        amount
    }

    /// Walking speed after this feature. Hooks chain.
    fn modify_speed(&self, _host: &Combatant, speed: u32) -> u32 {
        speed
    }

    /// Replacement armor class, if this feature computes one.
    fn modify_armor_class(&self, _host: &dyn Actor, _base: i32) -> Option<i32> {
        None
    }

    fn can_activate(&self, _host: &Combatant) -> bool {
        false
    }

    fn activate(&self, _host: &mut Combatant) -> Result<(), FeatureError> {
        Err(FeatureError::NotActivatable(self.name().to_string()))
    }
}

// ============================================================================
// Feature Set
// ============================================================================

/// The features attached to one combatant, in attachment order.
#[derive(Clone, Default)]
pub struct FeatureSet {
    features: Vec<Arc<dyn Feature>>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.iter().any(|f| f.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Feature>> {
        self.features.iter().find(|f| f.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Feature> {
        self.features.iter().map(|f| f.as_ref())
    }

    /// Thread a value through every feature, in order.
    pub fn chain<T>(&self, init: T, mut hook: impl FnMut(&dyn Feature, T) -> T) -> T {
        let mut value = init;
        for feature in &self.features {
            value = hook(feature.as_ref(), value);
        }
        value
    }

    pub(crate) fn push(&mut self, feature: Arc<dyn Feature>) {
        self.features.push(feature);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Arc<dyn Feature>> {
        let index = self.features.iter().position(|f| f.name() == name)?;
        Some(self.features.remove(index))
    }

    /// Owned handles, so hooks can borrow the host mutably.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Feature>> {
        self.features.clone()
    }

    /// Run a roll through every roll-affecting feature, in order.
    pub fn apply(&self, kind: RollKind, roll: RollOutcome, dice: &mut dyn DieSource) -> RollOutcome {
        let mut roll = roll;
        for feature in self.features.iter().filter(|f| f.affects_rolls()) {
            roll = apply_one(feature.as_ref(), kind, roll, dice);
        }
        roll
    }

    /// Ask every feature; the last `Some` wins. Results never stack.
    pub fn dispatch<T>(&self, mut hook: impl FnMut(&dyn Feature) -> Option<T>) -> Option<T> {
        let mut result = None;
        for feature in &self.features {
            if let Some(value) = hook(feature.as_ref()) {
                result = Some(value);
            }
        }
        result
    }
}

fn apply_one(
    feature: &dyn Feature,
    kind: RollKind,
    roll: RollOutcome,
    dice: &mut dyn DieSource,
) -> RollOutcome {
    match kind {
        RollKind::Damage => feature.on_damage_roll(roll, dice),
        RollKind::Attack => {
            let roll = feature.on_d20_roll(roll, dice);
            feature.on_attack_roll(roll, dice)
        }
        RollKind::AbilityCheck | RollKind::SkillCheck => {
            let roll = feature.on_d20_roll(roll, dice);
            feature.on_ability_check(roll, dice)
        }
        RollKind::SavingThrow => {
            let roll = feature.on_d20_roll(roll, dice);
            feature.on_saving_throw(roll, dice)
        }
        RollKind::Initiative => {
            let roll = feature.on_d20_roll(roll, dice);
            feature.on_initiative(roll, dice)
        }
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

type FeatureFactory = Arc<dyn Fn() -> Arc<dyn Feature> + Send + Sync>;

/// Maps declarative feature names to constructors.
///
/// Built once at startup and shared behind an `Arc`; lookups never mutate it.
#[derive(Clone, Default)]
pub struct FeatureRegistry {
    factories: BTreeMap<String, FeatureFactory>,
}

impl FeatureRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in feature.
    pub fn builtin() -> Self {
        Self::new()
            .with(HalflingLuck::NAME, || Arc::new(HalflingLuck))
            .with(FelineAgility::NAME, || Arc::new(FelineAgility))
            .with(Claws::NAME, || Arc::new(Claws))
            .with(Talent::NAME, || Arc::new(Talent))
            .with(GreatWeaponFighting::NAME, || Arc::new(GreatWeaponFighting))
            .with(UnarmoredDefense::NAME, || Arc::new(UnarmoredDefense))
    }

    /// Register a constructor, replacing any previous one with that name.
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Feature> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, name: &str) -> Result<Arc<dyn Feature>, FeatureError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| FeatureError::Unknown(name.to_string()))
    }
}

impl fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("features", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{Combatant, Defender};
    use crate::testing::ScriptedDice;

    /// Adds a fixed amount to the kept die; records its name in metadata.
    struct Bump(&'static str, u32);

    impl Feature for Bump {
        fn name(&self) -> &str {
            self.0
        }

        fn affects_rolls(&self) -> bool {
            true
        }

        fn on_attack_roll(&self, mut roll: RollOutcome, _dice: &mut dyn DieSource) -> RollOutcome {
            let face = roll.kept()[0] + self.1;
            roll.set_kept(0, face);
            roll.insert_metadata(self.0, face);
            roll
        }
    }

    /// Overrides armor class to a fixed value.
    struct FixedArmor(&'static str, i32);

    impl Feature for FixedArmor {
        fn name(&self) -> &str {
            self.0
        }

        fn modify_armor_class(&self, _host: &dyn Actor, _base: i32) -> Option<i32> {
            Some(self.1)
        }
    }

    struct Silent;

    impl Feature for Silent {
        fn name(&self) -> &str {
            "Silent"
        }

        fn on_attack_roll(&self, _roll: RollOutcome, _dice: &mut dyn DieSource) -> RollOutcome {
            RollOutcome::fixed(20, vec![1])
        }
    }

    #[test]
    fn test_roll_hooks_chain_in_order() {
        let mut set = FeatureSet::new();
        set.push(Arc::new(Bump("first", 2)));
        set.push(Arc::new(Bump("second", 3)));

        let mut dice = ScriptedDice::new([]);
        let roll = set.apply(RollKind::Attack, RollOutcome::fixed(20, vec![10]), &mut dice);
        assert_eq!(roll.kept(), &[15]);
        assert_eq!(roll.metadata()["first"], 12);
        assert_eq!(roll.metadata()["second"], 15);
    }

    #[test]
    fn test_hooks_only_for_matching_kind() {
        let mut set = FeatureSet::new();
        set.push(Arc::new(Bump("attack only", 5)));
        let mut dice = ScriptedDice::new([]);
        let roll = set.apply(RollKind::SavingThrow, RollOutcome::fixed(20, vec![10]), &mut dice);
        assert_eq!(roll.kept(), &[10]);
    }

    #[test]
    fn test_features_without_roll_capability_are_skipped() {
        let mut set = FeatureSet::new();
        set.push(Arc::new(Silent));
        let mut dice = ScriptedDice::new([]);
        let roll = set.apply(RollKind::Attack, RollOutcome::fixed(20, vec![17]), &mut dice);
        assert_eq!(roll.kept(), &[17]);
    }

    #[test]
    fn test_dispatch_last_some_wins() {
        let mut host = Combatant::new("Warden").with_armor_class(12);
        host.attach(Arc::new(FixedArmor("Mage Armor", 16))).unwrap();
        host.attach(Arc::new(Silent)).unwrap();
        host.attach(Arc::new(FixedArmor("Barkskin", 14))).unwrap();

        // The later override replaces the earlier one even though it is lower.
        assert_eq!(host.armor_class(), 14);
    }

    /// Reduces incoming damage by a flat amount.
    struct Ward(&'static str, i32);

    impl Feature for Ward {
        fn name(&self) -> &str {
            self.0
        }

        fn on_take_damage(&self, _host: &Combatant, amount: i32) -> i32 {
            (amount - self.1).max(0)
        }
    }

    struct Halve;

    impl Feature for Halve {
        fn name(&self) -> &str {
            "Halve"
        }

        fn on_take_damage(&self, _host: &Combatant, amount: i32) -> i32 {
            amount / 2
        }
    }

    #[test]
    fn test_chain_runs_in_attachment_order() {
        let mut set = FeatureSet::new();
        set.push(Arc::new(Ward("Stoneskin", 3)));
        set.push(Arc::new(Halve));
        let host = Combatant::new("Golem");
        let taken = set.chain(11, |f, amount| f.on_take_damage(&host, amount));
        assert_eq!(taken, 4);

        let mut set = FeatureSet::new();
        set.push(Arc::new(Halve));
        set.push(Arc::new(Ward("Stoneskin", 3)));
        let taken = set.chain(11, |f, amount| f.on_take_damage(&host, amount));
        assert_eq!(taken, 2);
    }

    #[test]
    fn test_dispatch_none_falls_back() {
        let set = FeatureSet::new();
        assert_eq!(set.dispatch(|_| None::<i32>), None);
    }

    #[test]
    fn test_registry_unknown_name() {
        let registry = FeatureRegistry::builtin();
        assert!(matches!(
            registry.create("Rage"),
            Err(FeatureError::Unknown(name)) if name == "Rage"
        ));
    }

    #[test]
    fn test_registry_builtin_names() {
        let registry = FeatureRegistry::builtin();
        for name in [
            "Halfling Luck",
            "Feline Agility",
            "Claws",
            "Talent",
            "Great Weapon Fighting",
            "Unarmored Defense",
        ] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_attach_twice_is_noop() {
        let registry = FeatureRegistry::builtin();
        let mut host = Combatant::new("Nim");
        assert_eq!(host.attach_feature(&registry, "Halfling Luck"), Ok(true));
        assert_eq!(host.attach_feature(&registry, "Halfling Luck"), Ok(false));
        assert_eq!(host.features().len(), 1);
    }
}
