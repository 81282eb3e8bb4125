//! Combatant model.
//!
//! The resolver only needs a handful of capabilities from a creature:
//! ability modifiers, proficiency lookups, the proficiency bonus, attached
//! features, and (for targets) armor class. Those are the [`Actor`] and
//! [`Defender`] traits. [`Combatant`] is the concrete creature used by
//! encounters; character and NPC builders produce one and hand it over.

use crate::actions::ActionRegistry;
use crate::conditions::{Condition, ConditionSet};
use crate::features::{Feature, FeatureError, FeatureRegistry, FeatureSet};
use crate::resources::{HitPoints, RechargePolicy, ResourceLedger};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for combatants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CombatantId(pub Uuid);

impl CombatantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CombatantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ability Scores
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "Strength",
            Ability::Dexterity => "Dexterity",
            Ability::Constitution => "Constitution",
            Ability::Intelligence => "Intelligence",
            Ability::Wisdom => "Wisdom",
            Ability::Charisma => "Charisma",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Ability scores container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, value: u8) {
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        // Floor division: 8-9 = -1, 10-11 = 0, 12-13 = +1.
        (self.get(ability) as i32 - 10).div_euclid(2)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Skills and Proficiencies
// ============================================================================

/// D&D 5e skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Skill {
    Athletics,
    Acrobatics,
    SleightOfHand,
    Stealth,
    Arcana,
    History,
    Investigation,
    Nature,
    Religion,
    AnimalHandling,
    Insight,
    Medicine,
    Perception,
    Survival,
    Deception,
    Intimidation,
    Performance,
    Persuasion,
}

impl Skill {
    pub fn ability(&self) -> Ability {
        match self {
            Skill::Athletics => Ability::Strength,
            Skill::Acrobatics | Skill::SleightOfHand | Skill::Stealth => Ability::Dexterity,
            Skill::Arcana
            | Skill::History
            | Skill::Investigation
            | Skill::Nature
            | Skill::Religion => Ability::Intelligence,
            Skill::AnimalHandling
            | Skill::Insight
            | Skill::Medicine
            | Skill::Perception
            | Skill::Survival => Ability::Wisdom,
            Skill::Deception | Skill::Intimidation | Skill::Performance | Skill::Persuasion => {
                Ability::Charisma
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Skill::Athletics => "Athletics",
            Skill::Acrobatics => "Acrobatics",
            Skill::SleightOfHand => "Sleight of Hand",
            Skill::Stealth => "Stealth",
            Skill::Arcana => "Arcana",
            Skill::History => "History",
            Skill::Investigation => "Investigation",
            Skill::Nature => "Nature",
            Skill::Religion => "Religion",
            Skill::AnimalHandling => "Animal Handling",
            Skill::Insight => "Insight",
            Skill::Medicine => "Medicine",
            Skill::Perception => "Perception",
            Skill::Survival => "Survival",
            Skill::Deception => "Deception",
            Skill::Intimidation => "Intimidation",
            Skill::Performance => "Performance",
            Skill::Persuasion => "Persuasion",
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Proficiency level for skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProficiencyLevel {
    #[default]
    None,
    Proficient,
    Expertise,
}

impl ProficiencyLevel {
    pub fn bonus(&self, proficiency_bonus: i32) -> i32 {
        match self {
            ProficiencyLevel::None => 0,
            ProficiencyLevel::Proficient => proficiency_bonus,
            ProficiencyLevel::Expertise => proficiency_bonus * 2,
        }
    }
}

/// Categories of proficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProficiencyKind {
    Armor,
    Weapon,
    Tool,
    Skill,
    Save,
    Language,
}

/// A reference to one proficiency, e.g. weapon "simple melee".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Proficiency {
    pub kind: ProficiencyKind,
    pub name: String,
}

impl Proficiency {
    pub fn new(kind: ProficiencyKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn weapon(name: impl Into<String>) -> Self {
        Self::new(ProficiencyKind::Weapon, name)
    }
}

/// Proficiencies held by one creature. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProficiencySet {
    entries: BTreeMap<ProficiencyKind, BTreeSet<String>>,
    expertise: BTreeSet<Skill>,
}

impl ProficiencySet {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.trim().to_lowercase()
    }

    pub fn add(&mut self, kind: ProficiencyKind, name: &str) {
        self.entries.entry(kind).or_default().insert(Self::key(name));
    }

    pub fn remove(&mut self, kind: ProficiencyKind, name: &str) -> bool {
        self.entries
            .get_mut(&kind)
            .is_some_and(|names| names.remove(&Self::key(name)))
    }

    pub fn has(&self, kind: ProficiencyKind, name: &str) -> bool {
        self.entries
            .get(&kind)
            .is_some_and(|names| names.contains(&Self::key(name)))
    }

    pub fn add_skill(&mut self, skill: Skill) {
        self.add(ProficiencyKind::Skill, skill.name());
    }

    pub fn add_expertise(&mut self, skill: Skill) {
        self.add_skill(skill);
        self.expertise.insert(skill);
    }

    pub fn add_save(&mut self, ability: Ability) {
        self.add(ProficiencyKind::Save, ability.name());
    }

    pub fn skill_level(&self, skill: Skill) -> ProficiencyLevel {
        if self.expertise.contains(&skill) {
            ProficiencyLevel::Expertise
        } else if self.has(ProficiencyKind::Skill, skill.name()) {
            ProficiencyLevel::Proficient
        } else {
            ProficiencyLevel::None
        }
    }
}

/// Proficiency bonus by character level.
pub fn proficiency_bonus_for_level(level: u8) -> i32 {
    match level {
        0..=4 => 2,
        5..=8 => 3,
        9..=12 => 4,
        13..=16 => 5,
        // Level 17+ caps at 6 (5e max level is 20)
        _ => 6,
    }
}

// ============================================================================
// Movement and Transient Effects
// ============================================================================

/// Movement speed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speed {
    pub walk: u32,
    pub swim: Option<u32>,
    pub fly: Option<u32>,
    pub climb: Option<u32>,
}

impl Speed {
    pub fn new(walk: u32) -> Self {
        Self {
            walk,
            swim: None,
            fly: None,
            climb: None,
        }
    }
}

impl Default for Speed {
    fn default() -> Self {
        Self::new(30)
    }
}

/// Effect name that doubles walking speed while active (Dash).
pub const DOUBLE_SPEED: &str = "double speed";

/// When a transient effect wears off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectExpiry {
    StartOfTurn,
    EndOfTurn,
    /// Stays until removed explicitly.
    Manual,
}

/// A named, temporary effect on a combatant (Dash, Feline Agility, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEffect {
    pub name: String,
    pub source: String,
    pub expires: EffectExpiry,
}

impl ActiveEffect {
    pub fn new(name: impl Into<String>, source: impl Into<String>, expires: EffectExpiry) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            expires,
        }
    }

    pub fn until_end_of_turn(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(name, source, EffectExpiry::EndOfTurn)
    }
}

// ============================================================================
// Capability Traits
// ============================================================================

/// What the resolver reads from the creature making a roll.
///
/// Only the first five methods are required; check, save, and initiative
/// bonuses derive from them unless a creature has precomputed scores.
pub trait Actor {
    fn name(&self) -> &str;

    fn ability_modifier(&self, ability: Ability) -> i32;

    fn has_proficiency(&self, kind: ProficiencyKind, name: &str) -> bool;

    fn proficiency_bonus(&self) -> i32;

    /// Attached features, in attachment order.
    fn features(&self) -> &FeatureSet;

    /// Conditions that change this creature's own rolls.
    fn conditions(&self) -> &ConditionSet {
        ConditionSet::none()
    }

    fn ability_check_bonus(&self, ability: Ability) -> i32 {
        self.ability_modifier(ability)
    }

    fn skill_bonus(&self, skill: Skill) -> i32 {
        let proficient = self.has_proficiency(ProficiencyKind::Skill, skill.name());
        self.ability_modifier(skill.ability())
            + if proficient {
                self.proficiency_bonus()
            } else {
                0
            }
    }

    fn saving_throw_bonus(&self, ability: Ability) -> i32 {
        let proficient = self.has_proficiency(ProficiencyKind::Save, ability.name());
        self.ability_modifier(ability)
            + if proficient {
                self.proficiency_bonus()
            } else {
                0
            }
    }

    fn initiative_modifier(&self) -> i32 {
        self.ability_modifier(Ability::Dexterity)
    }
}

/// What the resolver reads from the target of an attack.
pub trait Defender {
    fn armor_class(&self) -> i32;

    /// Conditions that change rolls made against this creature.
    fn conditions(&self) -> &ConditionSet {
        ConditionSet::none()
    }
}

// ============================================================================
// Combatant
// ============================================================================

/// A creature taking part in combat.
///
/// Owns its resource ledger, action registry, and attached features. Nothing
/// outside the combatant spends its resources or edits its actions.
#[derive(Debug, Clone)]
pub struct Combatant {
    pub id: CombatantId,
    pub name: String,
    pub is_player: bool,
    pub level: u8,
    pub ability_scores: AbilityScores,
    pub proficiencies: ProficiencySet,
    pub proficiency_bonus: i32,
    /// Armor class before feature overrides.
    pub base_armor_class: i32,
    pub speed: Speed,
    pub resources: ResourceLedger,
    pub actions: ActionRegistry,
    pub effects: Vec<ActiveEffect>,
    /// Precomputed skill bonuses (statblocks), used instead of derivation.
    pub skill_scores: HashMap<Skill, i32>,
    /// Precomputed saving throw bonuses (statblocks).
    pub save_scores: HashMap<Ability, i32>,
    features: FeatureSet,
    conditions: ConditionSet,
}

impl Combatant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CombatantId::new(),
            name: name.into(),
            is_player: true,
            level: 1,
            ability_scores: AbilityScores::default(),
            proficiencies: ProficiencySet::new(),
            proficiency_bonus: proficiency_bonus_for_level(1),
            base_armor_class: 10,
            speed: Speed::default(),
            resources: ResourceLedger::new(),
            actions: ActionRegistry::new(),
            effects: Vec::new(),
            skill_scores: HashMap::new(),
            save_scores: HashMap::new(),
            features: FeatureSet::new(),
            conditions: ConditionSet::new(),
        }
    }

    /// Mark this combatant as a non-player creature.
    pub fn non_player(mut self) -> Self {
        self.is_player = false;
        self
    }

    /// Set the level and the matching proficiency bonus.
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self.proficiency_bonus = proficiency_bonus_for_level(level);
        self
    }

    pub fn with_ability_scores(mut self, scores: AbilityScores) -> Self {
        self.ability_scores = scores;
        self
    }

    pub fn with_armor_class(mut self, armor_class: i32) -> Self {
        self.base_armor_class = armor_class;
        self
    }

    pub fn with_hit_points(mut self, maximum: i32) -> Self {
        self.resources.hit_points = HitPoints::new(maximum);
        self
    }

    pub fn with_proficiency(mut self, kind: ProficiencyKind, name: &str) -> Self {
        self.proficiencies.add(kind, name);
        self
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    pub fn conditions_mut(&mut self) -> &mut ConditionSet {
        &mut self.conditions
    }

    /// Returns false if a condition of that kind was already present.
    pub fn add_condition(&mut self, condition: Condition) -> bool {
        let added = self.conditions.add(condition);
        debug!(combatant = %self.name, %condition, added, "condition applied");
        added
    }

    pub fn remove_condition(&mut self, condition: &Condition) -> bool {
        let removed = self.conditions.remove(condition);
        if removed {
            debug!(combatant = %self.name, %condition, "condition removed");
        }
        removed
    }

    /// Attach a feature by its registered name.
    ///
    /// Returns `Ok(false)` if a feature with that name is already attached.
    pub fn attach_feature(
        &mut self,
        registry: &FeatureRegistry,
        name: &str,
    ) -> Result<bool, FeatureError> {
        if self.features.contains(name) {
            return Ok(false);
        }
        let feature = registry.create(name)?;
        self.attach(feature)
    }

    /// Attach an already constructed feature.
    pub fn attach(&mut self, feature: Arc<dyn Feature>) -> Result<bool, FeatureError> {
        if self.features.contains(feature.name()) {
            return Ok(false);
        }
        feature.on_attach(self)?;
        debug!(combatant = %self.name, feature = feature.name(), "feature attached");
        self.features.push(feature);
        Ok(true)
    }

    pub fn detach_feature(&mut self, name: &str) -> Result<(), FeatureError> {
        let feature = self
            .features
            .remove(name)
            .ok_or_else(|| FeatureError::NotAttached(name.to_string()))?;
        feature.on_detach(self);
        debug!(combatant = %self.name, feature = name, "feature detached");
        Ok(())
    }

    /// Use an activatable feature (e.g. Feline Agility).
    pub fn activate_feature(&mut self, name: &str) -> Result<(), FeatureError> {
        let feature = self
            .features
            .get(name)
            .ok_or_else(|| FeatureError::NotAttached(name.to_string()))?;
        if !feature.can_activate(self) {
            return Err(FeatureError::NotActivatable(name.to_string()));
        }
        feature.activate(self)
    }

    /// Run combat-start hooks.
    pub fn start_combat(&mut self) {
        for feature in self.features.snapshot() {
            feature.on_combat_start(self);
        }
    }

    /// Run combat-end hooks.
    pub fn end_combat(&mut self) {
        for feature in self.features.snapshot() {
            feature.on_combat_end(self);
        }
    }

    /// Turn-start bookkeeping: refresh per-turn resources, expire
    /// start-of-turn effects, run turn-start hooks.
    pub fn start_turn(&mut self) {
        self.resources.apply_rest(RechargePolicy::Turn);
        self.effects
            .retain(|effect| effect.expires != EffectExpiry::StartOfTurn);
        for feature in self.features.snapshot() {
            feature.on_turn_start(self);
        }
    }

    /// Turn-end bookkeeping: run turn-end hooks, expire end-of-turn effects.
    pub fn end_turn(&mut self) {
        for feature in self.features.snapshot() {
            feature.on_turn_end(self);
        }
        self.effects.retain(|effect| effect.expires != EffectExpiry::EndOfTurn);
    }

    pub fn add_effect(&mut self, effect: ActiveEffect) {
        self.effects.push(effect);
    }

    pub fn remove_effect(&mut self, name: &str) -> bool {
        let before = self.effects.len();
        self.effects.retain(|effect| effect.name != name);
        self.effects.len() != before
    }

    pub fn has_effect(&self, name: &str) -> bool {
        self.effects.iter().any(|effect| effect.name == name)
    }

    /// Walking speed after feature hooks, transient effects and
    /// conditions, in that order.
    pub fn walking_speed(&self) -> u32 {
        let mut speed = self.speed.walk;
        for feature in self.features.iter() {
            speed = feature.modify_speed(self, speed);
        }
        if self.has_effect(DOUBLE_SPEED) {
            speed = speed.saturating_mul(2);
        }
        self.conditions.speed(speed)
    }

    /// Movement left after standing up from prone, if prone.
    pub fn stand_up_cost(&self) -> u32 {
        self.conditions.stand_up_cost(self.walking_speed())
    }

    /// Whether conditions allow taking actions and reactions.
    pub fn can_act(&self) -> bool {
        self.conditions.preventing_action().is_none()
    }

    pub fn is_conscious(&self) -> bool {
        !self.resources.hit_points.is_unconscious()
    }
}

impl Actor for Combatant {
    fn name(&self) -> &str {
        &self.name
    }

    fn ability_modifier(&self, ability: Ability) -> i32 {
        self.ability_scores.modifier(ability)
    }

    fn has_proficiency(&self, kind: ProficiencyKind, name: &str) -> bool {
        self.proficiencies.has(kind, name)
    }

    fn proficiency_bonus(&self) -> i32 {
        self.proficiency_bonus
    }

    fn features(&self) -> &FeatureSet {
        &self.features
    }

    fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    fn skill_bonus(&self, skill: Skill) -> i32 {
        if let Some(&score) = self.skill_scores.get(&skill) {
            return score;
        }
        self.ability_modifier(skill.ability())
            + self
                .proficiencies
                .skill_level(skill)
                .bonus(self.proficiency_bonus)
    }

    fn saving_throw_bonus(&self, ability: Ability) -> i32 {
        if let Some(&score) = self.save_scores.get(&ability) {
            return score;
        }
        let proficient = self.proficiencies.has(ProficiencyKind::Save, ability.name());
        self.ability_modifier(ability) + if proficient { self.proficiency_bonus } else { 0 }
    }
}

impl Defender for Combatant {
    /// Base armor class, unless a feature overrides it. When several
    /// features override, the last attached one wins.
    fn armor_class(&self) -> i32 {
        let base = self.base_armor_class;
        self.features
            .dispatch(|feature| feature.modify_armor_class(self, base))
            .unwrap_or(base)
    }

    fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{RechargePolicy, Resource, ResourceCategory};

    #[test]
    fn test_ability_modifier_floors() {
        let scores = AbilityScores::new(8, 9, 10, 11, 12, 20);
        assert_eq!(scores.modifier(Ability::Strength), -1);
        assert_eq!(scores.modifier(Ability::Dexterity), -1);
        assert_eq!(scores.modifier(Ability::Constitution), 0);
        assert_eq!(scores.modifier(Ability::Intelligence), 0);
        assert_eq!(scores.modifier(Ability::Wisdom), 1);
        assert_eq!(scores.modifier(Ability::Charisma), 5);
    }

    #[test]
    fn test_proficiency_bonus_by_level() {
        assert_eq!(proficiency_bonus_for_level(1), 2);
        assert_eq!(proficiency_bonus_for_level(5), 3);
        assert_eq!(proficiency_bonus_for_level(17), 6);
    }

    #[test]
    fn test_proficiency_names_ignore_case() {
        let mut set = ProficiencySet::new();
        set.add(ProficiencyKind::Weapon, "Simple Melee");
        assert!(set.has(ProficiencyKind::Weapon, "simple melee"));
        assert!(!set.has(ProficiencyKind::Armor, "simple melee"));
        assert!(set.remove(ProficiencyKind::Weapon, "SIMPLE MELEE"));
        assert!(!set.has(ProficiencyKind::Weapon, "simple melee"));
    }

    #[test]
    fn test_skill_bonus_with_expertise() {
        let mut rogue = Combatant::new("Vex")
            .with_level(5)
            .with_ability_scores(AbilityScores::new(10, 16, 12, 10, 14, 10));
        rogue.proficiencies.add_skill(Skill::Perception);
        rogue.proficiencies.add_expertise(Skill::Stealth);

        assert_eq!(rogue.skill_bonus(Skill::Perception), 2 + 3);
        assert_eq!(rogue.skill_bonus(Skill::Stealth), 3 + 6);
        assert_eq!(rogue.skill_bonus(Skill::Athletics), 0);
    }

    #[test]
    fn test_precomputed_scores_replace_derivation() {
        let mut ogre = Combatant::new("Ogre").non_player();
        ogre.skill_scores.insert(Skill::Athletics, 7);
        ogre.save_scores.insert(Ability::Constitution, 5);
        assert_eq!(ogre.skill_bonus(Skill::Athletics), 7);
        assert_eq!(ogre.saving_throw_bonus(Ability::Constitution), 5);
        assert_eq!(ogre.saving_throw_bonus(Ability::Wisdom), 0);
    }

    #[test]
    fn test_saving_throw_proficiency() {
        let mut fighter = Combatant::new("Roland")
            .with_ability_scores(AbilityScores::new(16, 10, 14, 10, 10, 10));
        fighter.proficiencies.add_save(Ability::Strength);
        assert_eq!(fighter.saving_throw_bonus(Ability::Strength), 3 + 2);
        assert_eq!(fighter.saving_throw_bonus(Ability::Constitution), 2);
    }

    #[test]
    fn test_turn_start_refreshes_turn_resources() {
        let mut c = Combatant::new("Kit");
        c.resources.add(Resource::new(
            "reaction",
            "Reaction",
            ResourceCategory::Custom,
            1,
            RechargePolicy::Turn,
        ));
        c.resources.spend("reaction", 1).unwrap();
        c.add_effect(ActiveEffect::until_end_of_turn(DOUBLE_SPEED, "Dash"));
        assert_eq!(c.walking_speed(), 60);

        c.end_turn();
        assert_eq!(c.walking_speed(), 30);
        assert_eq!(c.resources.get("reaction").unwrap().current(), 0);

        c.start_turn();
        assert_eq!(c.resources.get("reaction").unwrap().current(), 1);
    }

    #[test]
    fn test_conditions_limit_speed() {
        let mut c = Combatant::new("Kit");
        c.add_effect(ActiveEffect::until_end_of_turn(DOUBLE_SPEED, "Dash"));
        c.add_condition(Condition::Exhaustion { level: 2 });
        assert_eq!(c.walking_speed(), 30);

        c.add_condition(Condition::Prone);
        assert_eq!(c.stand_up_cost(), 15);

        c.add_condition(Condition::Grappled);
        assert_eq!(c.walking_speed(), 0);
        assert!(c.remove_condition(&Condition::Grappled));
        assert_eq!(c.walking_speed(), 30);
    }

    #[test]
    fn test_incapacitated_cannot_act() {
        let mut c = Combatant::new("Kit");
        assert!(c.can_act());
        c.add_condition(Condition::Stunned);
        assert!(!c.can_act());
        // Both capability traits see the same set.
        assert!(Actor::conditions(&c).has(&Condition::Stunned));
        assert!(Defender::conditions(&c).has(&Condition::Stunned));
    }

    #[test]
    fn test_detach_unknown_feature() {
        let mut c = Combatant::new("Kit");
        assert_eq!(
            c.detach_feature("Claws"),
            Err(FeatureError::NotAttached("Claws".to_string()))
        );
    }
}
