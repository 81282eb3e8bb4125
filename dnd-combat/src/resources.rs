//! Resource ledger: spell slots, limited-use abilities, hit points, hit dice.
//!
//! Every resource obeys `0 <= current <= maximum`. Spending fails outright
//! when the pool is short; nothing is ever partially consumed.

use crate::combatant::{Ability, Actor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Not enough {id}: requested {requested}, {available} available")]
    Insufficient {
        id: String,
        requested: u32,
        available: u32,
    },

    #[error("No d{0} hit dice remaining")]
    NoHitDice(u32),
}

// ============================================================================
// Resource Definitions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    SpellSlot,
    ClassResource,
    FeatureUse,
    ItemCharge,
    LimitedUse,
    Custom,
}

/// When a resource refills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RechargePolicy {
    ShortRest,
    LongRest,
    Daily,
    /// Refilled at the start of the owner's turn.
    Turn,
    /// Never refills on its own.
    None,
}

/// Rules for maxima that depend on the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MaximumRule {
    /// The owner's ability modifier, never below `minimum`.
    AbilityModifier { ability: Ability, minimum: u32 },
    ProficiencyBonus,
}

impl MaximumRule {
    pub fn resolve(&self, actor: &dyn Actor) -> u32 {
        match *self {
            MaximumRule::AbilityModifier { ability, minimum } => {
                let modifier = actor.ability_modifier(ability).max(0) as u32;
                modifier.max(minimum)
            }
            MaximumRule::ProficiencyBonus => actor.proficiency_bonus().max(0) as u32,
        }
    }
}

/// A bounded consumable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ResourceRecord")]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub category: ResourceCategory,
    current: u32,
    maximum: u32,
    pub recharge: RechargePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_rule: Option<MaximumRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Resource {
    /// A full resource.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: ResourceCategory,
        maximum: u32,
        recharge: RechargePolicy,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            current: maximum,
            maximum,
            recharge,
            maximum_rule: None,
            source: None,
        }
    }

    /// Spell slots of one level, refilled on a long rest.
    pub fn spell_slots(level: u8, count: u32) -> Self {
        Self::new(
            format!("level_{level}_spell_slots"),
            format!("Level {level} Spell Slots"),
            ResourceCategory::SpellSlot,
            count,
            RechargePolicy::LongRest,
        )
        .with_source("class")
    }

    /// Start with `current` instead of full, clamped to the maximum.
    pub fn with_current(mut self, current: u32) -> Self {
        self.current = current.min(self.maximum);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_maximum_rule(mut self, rule: MaximumRule) -> Self {
        self.maximum_rule = Some(rule);
        self
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn maximum(&self) -> u32 {
        self.maximum
    }

    pub fn is_depleted(&self) -> bool {
        self.current == 0
    }

    /// Change the maximum; current is clamped to it.
    pub fn set_maximum(&mut self, maximum: u32) {
        self.maximum = maximum;
        self.current = self.current.min(maximum);
    }

    fn refill(&mut self) {
        self.current = self.maximum;
    }
}

/// Wire form of [`Resource`]; loading clamps `current` into range.
#[derive(Deserialize)]
struct ResourceRecord {
    id: String,
    name: String,
    category: ResourceCategory,
    current: Option<u32>,
    maximum: u32,
    recharge: RechargePolicy,
    #[serde(default)]
    maximum_rule: Option<MaximumRule>,
    #[serde(default)]
    source: Option<String>,
}

impl From<ResourceRecord> for Resource {
    fn from(record: ResourceRecord) -> Self {
        Resource {
            id: record.id,
            name: record.name,
            category: record.category,
            current: record.current.unwrap_or(record.maximum).min(record.maximum),
            maximum: record.maximum,
            recharge: record.recharge,
            maximum_rule: record.maximum_rule,
            source: record.source,
        }
    }
}

// ============================================================================
// Hit Points, Hit Dice, Death Saves
// ============================================================================

/// Hit point tracking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i32,
    pub maximum: i32,
    pub temporary: i32,
}

impl HitPoints {
    pub fn new(maximum: i32) -> Self {
        Self {
            current: maximum,
            maximum,
            temporary: 0,
        }
    }

    /// Temporary hit points absorb damage first. Current never drops below 0.
    pub fn take_damage(&mut self, amount: i32) -> DamageResult {
        let amount = amount.max(0);
        let absorbed = self.temporary.min(amount);
        self.temporary -= absorbed;

        let remaining = amount - absorbed;
        self.current = (self.current - remaining).max(0);
        DamageResult {
            damage_taken: amount,
            dropped_to_zero: remaining > 0 && self.current == 0,
        }
    }

    /// Heal up to the maximum; returns the amount actually healed.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let old = self.current;
        self.current = self.current.saturating_add(amount.max(0)).min(self.maximum);
        self.current - old
    }

    /// Temporary hit points don't stack; the larger pool is kept.
    pub fn add_temp_hp(&mut self, amount: i32) {
        self.temporary = self.temporary.max(amount);
    }

    pub fn is_unconscious(&self) -> bool {
        self.current <= 0
    }
}

/// Result of taking damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageResult {
    pub damage_taken: i32,
    pub dropped_to_zero: bool,
}

/// Hit dice keyed by face size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitDice {
    pub total: BTreeMap<u32, u32>,
    pub remaining: BTreeMap<u32, u32>,
}

impl HitDice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, face: u32, count: u32) {
        *self.total.entry(face).or_insert(0) += count;
        *self.remaining.entry(face).or_insert(0) += count;
    }

    pub fn spend(&mut self, face: u32) -> bool {
        match self.remaining.get_mut(&face) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn remaining(&self, face: u32) -> u32 {
        self.remaining.get(&face).copied().unwrap_or(0)
    }

    /// Long rest: regain half of each pool (rounded up, at least one).
    pub fn recover_half(&mut self) {
        for (face, &total) in &self.total {
            let recover = total.div_ceil(2).max(1);
            let remaining = self.remaining.entry(*face).or_insert(0);
            *remaining = (*remaining + recover).min(total);
        }
    }
}

/// Death saving throw tracking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathSaves {
    pub successes: u8,
    pub failures: u8,
}

impl DeathSaves {
    /// Returns true once stabilized (three successes).
    pub fn add_success(&mut self) -> bool {
        self.successes = (self.successes + 1).min(3);
        self.successes >= 3
    }

    /// Returns true once dead (three failures).
    pub fn add_failure(&mut self) -> bool {
        self.failures = (self.failures + 1).min(3);
        self.failures >= 3
    }

    pub fn reset(&mut self) {
        self.successes = 0;
        self.failures = 0;
    }
}

/// Type of rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestKind {
    Short,
    Long,
}

// ============================================================================
// Ledger
// ============================================================================

/// Everything consumable one combatant owns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLedger {
    resources: BTreeMap<String, Resource>,
    pub hit_points: HitPoints,
    pub hit_dice: HitDice,
    pub death_saves: DeathSaves,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, replacing any with the same id.
    pub fn add(&mut self, resource: Resource) -> Option<Resource> {
        debug!(resource = %resource.id, maximum = resource.maximum, "resource added");
        self.resources.insert(resource.id.clone(), resource)
    }

    pub fn remove(&mut self, id: &str) -> Option<Resource> {
        self.resources.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn current(&self, id: &str) -> Result<u32, ResourceError> {
        self.lookup(id).map(Resource::current)
    }

    fn lookup(&self, id: &str) -> Result<&Resource, ResourceError> {
        self.resources
            .get(id)
            .ok_or_else(|| ResourceError::NotFound(id.to_string()))
    }

    /// Check that `amount` could be spent without spending it.
    pub fn can_spend(&self, id: &str, amount: u32) -> Result<(), ResourceError> {
        let resource = self.lookup(id)?;
        if resource.current < amount {
            return Err(ResourceError::Insufficient {
                id: id.to_string(),
                requested: amount,
                available: resource.current,
            });
        }
        Ok(())
    }

    /// Spend `amount`; returns what is left.
    pub fn spend(&mut self, id: &str, amount: u32) -> Result<u32, ResourceError> {
        self.can_spend(id, amount)?;
        let resource = self
            .resources
            .get_mut(id)
            .ok_or_else(|| ResourceError::NotFound(id.to_string()))?;
        resource.current -= amount;
        debug!(resource = id, amount, remaining = resource.current, "resource spent");
        Ok(resource.current)
    }

    /// Restore up to `amount`, clamped at the maximum; returns the amount
    /// actually restored.
    pub fn restore(&mut self, id: &str, amount: u32) -> Result<u32, ResourceError> {
        let resource = self
            .resources
            .get_mut(id)
            .ok_or_else(|| ResourceError::NotFound(id.to_string()))?;
        let before = resource.current;
        resource.current = resource.current.saturating_add(amount).min(resource.maximum);
        let restored = resource.current - before;
        debug!(resource = id, restored, current = resource.current, "resource restored");
        Ok(restored)
    }

    /// Refill every resource with exactly this recharge policy. Returns how
    /// many resources were refilled.
    pub fn apply_rest(&mut self, policy: RechargePolicy) -> usize {
        let mut refilled = 0;
        for resource in self.resources.values_mut() {
            if resource.recharge == policy {
                resource.refill();
                refilled += 1;
            }
        }
        if refilled > 0 {
            debug!(?policy, refilled, "resources recharged");
        }
        refilled
    }

    /// A full rest. Short rests recharge short-rest resources. Long rests
    /// also recharge long-rest and daily resources, restore hit points,
    /// recover half the hit dice and clear death saves.
    pub fn rest(&mut self, kind: RestKind) {
        self.apply_rest(RechargePolicy::ShortRest);
        if kind == RestKind::Long {
            self.apply_rest(RechargePolicy::LongRest);
            self.apply_rest(RechargePolicy::Daily);
            self.hit_points.current = self.hit_points.maximum;
            self.hit_points.temporary = 0;
            self.hit_dice.recover_half();
            self.death_saves.reset();
        }
        debug!(?kind, "rest completed");
    }

    /// Recompute maxima bound to the owner, e.g. after an ability score or
    /// level change.
    pub fn refresh_maxima(&mut self, owner: &dyn Actor) {
        for resource in self.resources.values_mut() {
            if let Some(rule) = resource.maximum_rule {
                resource.set_maximum(rule.resolve(owner));
            }
        }
    }

    /// Adjust maximum and current hit points together (level-up, Tough).
    pub fn update_health(&mut self, delta: i32) {
        let hp = &mut self.hit_points;
        hp.maximum = hp.maximum.saturating_add(delta).max(0);
        hp.current = hp.current.saturating_add(delta).clamp(0, hp.maximum);
    }

    /// Gain `count` hit dice of the given face size.
    pub fn update_hit_die(&mut self, face: u32, count: u32) {
        if face == 0 {
            warn!("ignoring hit dice with zero faces");
            return;
        }
        self.hit_dice.add(face, count);
    }

    pub fn spend_hit_die(&mut self, face: u32) -> Result<(), ResourceError> {
        if self.hit_dice.spend(face) {
            Ok(())
        } else {
            Err(ResourceError::NoHitDice(face))
        }
    }

    pub fn take_damage(&mut self, amount: i32) -> DamageResult {
        let result = self.hit_points.take_damage(amount);
        debug!(
            amount,
            current = self.hit_points.current,
            dropped_to_zero = result.dropped_to_zero,
            "damage taken"
        );
        result
    }

    pub fn heal(&mut self, amount: i32) -> i32 {
        let healed = self.hit_points.heal(amount);
        if healed > 0 && self.hit_points.current > 0 {
            self.death_saves.reset();
        }
        healed
    }

    pub fn add_temp_hp(&mut self, amount: i32) {
        self.hit_points.add_temp_hp(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{AbilityScores, Combatant};

    fn slots(current: u32, maximum: u32) -> ResourceLedger {
        let mut ledger = ResourceLedger::new();
        ledger.add(Resource::spell_slots(1, maximum).with_current(current));
        ledger
    }

    #[test]
    fn test_spend_and_overspend() {
        let mut ledger = slots(2, 4);
        assert_eq!(ledger.spend("level_1_spell_slots", 1), Ok(1));

        let err = ledger.spend("level_1_spell_slots", 5).unwrap_err();
        assert_eq!(
            err,
            ResourceError::Insufficient {
                id: "level_1_spell_slots".to_string(),
                requested: 5,
                available: 1,
            }
        );
        assert_eq!(ledger.current("level_1_spell_slots"), Ok(1));
    }

    #[test]
    fn test_unknown_resource() {
        let mut ledger = ResourceLedger::new();
        assert_eq!(
            ledger.spend("ki", 1),
            Err(ResourceError::NotFound("ki".to_string()))
        );
        assert_eq!(
            ledger.restore("ki", 1),
            Err(ResourceError::NotFound("ki".to_string()))
        );
    }

    #[test]
    fn test_restore_clamps_at_maximum() {
        let mut ledger = slots(1, 4);
        assert_eq!(ledger.restore("level_1_spell_slots", 10), Ok(3));
        assert_eq!(ledger.current("level_1_spell_slots"), Ok(4));
    }

    #[test]
    fn test_with_current_clamps() {
        let slot = Resource::spell_slots(2, 3).with_current(7);
        assert_eq!(slot.current(), 3);
    }

    #[test]
    fn test_apply_rest_matches_policy_exactly() {
        let mut ledger = slots(0, 4);
        ledger.add(
            Resource::new(
                "second_wind",
                "Second Wind",
                ResourceCategory::ClassResource,
                1,
                RechargePolicy::ShortRest,
            )
            .with_current(0),
        );

        assert_eq!(ledger.apply_rest(RechargePolicy::ShortRest), 1);
        assert_eq!(ledger.current("second_wind"), Ok(1));
        assert_eq!(ledger.current("level_1_spell_slots"), Ok(0));

        assert_eq!(ledger.apply_rest(RechargePolicy::LongRest), 1);
        assert_eq!(ledger.current("level_1_spell_slots"), Ok(4));
    }

    #[test]
    fn test_long_rest() {
        let mut ledger = slots(0, 2);
        ledger.hit_points = HitPoints::new(20);
        ledger.take_damage(15);
        ledger.update_hit_die(10, 5);
        for _ in 0..5 {
            ledger.spend_hit_die(10).unwrap();
        }
        ledger.death_saves.add_failure();

        ledger.rest(RestKind::Long);

        assert_eq!(ledger.hit_points.current, 20);
        assert_eq!(ledger.hit_dice.remaining(10), 3);
        assert_eq!(ledger.death_saves, DeathSaves::default());
        assert_eq!(ledger.current("level_1_spell_slots"), Ok(2));
    }

    #[test]
    fn test_short_rest_leaves_long_rest_resources() {
        let mut ledger = slots(0, 2);
        ledger.rest(RestKind::Short);
        assert_eq!(ledger.current("level_1_spell_slots"), Ok(0));
    }

    #[test]
    fn test_hit_dice() {
        let mut ledger = ResourceLedger::new();
        ledger.update_hit_die(8, 1);
        assert_eq!(ledger.spend_hit_die(8), Ok(()));
        assert_eq!(ledger.spend_hit_die(8), Err(ResourceError::NoHitDice(8)));
        assert_eq!(ledger.spend_hit_die(12), Err(ResourceError::NoHitDice(12)));

        // One die recovers one, never more than the total.
        ledger.hit_dice.recover_half();
        ledger.hit_dice.recover_half();
        assert_eq!(ledger.hit_dice.remaining(8), 1);
    }

    #[test]
    fn test_temp_hp_absorbs_first() {
        let mut hp = HitPoints::new(10);
        hp.add_temp_hp(5);
        hp.add_temp_hp(3);
        assert_eq!(hp.temporary, 5);

        let result = hp.take_damage(7);
        assert_eq!(hp.temporary, 0);
        assert_eq!(hp.current, 8);
        assert!(!result.dropped_to_zero);

        let result = hp.take_damage(20);
        assert_eq!(hp.current, 0);
        assert!(result.dropped_to_zero);
        assert!(hp.is_unconscious());
    }

    #[test]
    fn test_update_health() {
        let mut ledger = ResourceLedger::new();
        ledger.hit_points = HitPoints::new(10);
        ledger.take_damage(4);
        ledger.update_health(7);
        assert_eq!(ledger.hit_points.maximum, 17);
        assert_eq!(ledger.hit_points.current, 13);

        ledger.update_health(-20);
        assert_eq!(ledger.hit_points.maximum, 0);
        assert_eq!(ledger.hit_points.current, 0);
    }

    #[test]
    fn test_refresh_maxima_from_owner() {
        let monk = Combatant::new("Ash")
            .with_level(5)
            .with_ability_scores(AbilityScores::new(10, 10, 10, 10, 16, 8));

        let mut ledger = ResourceLedger::new();
        ledger.add(
            Resource::new(
                "stunning_fist",
                "Stunning Fist",
                ResourceCategory::ClassResource,
                0,
                RechargePolicy::ShortRest,
            )
            .with_maximum_rule(MaximumRule::ProficiencyBonus),
        );
        ledger.add(
            Resource::new(
                "inspiration",
                "Bardic Inspiration",
                ResourceCategory::ClassResource,
                9,
                RechargePolicy::LongRest,
            )
            .with_maximum_rule(MaximumRule::AbilityModifier {
                ability: Ability::Charisma,
                minimum: 1,
            }),
        );

        ledger.refresh_maxima(&monk);
        assert_eq!(ledger.get("stunning_fist").unwrap().maximum(), 3);
        assert_eq!(ledger.get("inspiration").unwrap().maximum(), 1);
        assert_eq!(ledger.current("inspiration"), Ok(1));
    }

    #[test]
    fn test_death_saves_cap() {
        let mut saves = DeathSaves::default();
        assert!(!saves.add_success());
        assert!(!saves.add_success());
        assert!(saves.add_success());
        assert!(saves.add_success());
        assert_eq!(saves.successes, 3);
    }

    #[test]
    fn test_resource_from_json() {
        let json = r#"{
            "id": "ki",
            "name": "Ki Points",
            "category": "class_resource",
            "current": 2,
            "maximum": 5,
            "recharge": "short_rest",
            "source": "Monk"
        }"#;
        let resource: Resource = serde_json::from_str(json).unwrap();
        assert_eq!(resource.current(), 2);
        assert_eq!(resource.recharge, RechargePolicy::ShortRest);
        assert_eq!(resource.maximum_rule, None);
    }

    #[test]
    fn test_loaded_resource_is_clamped() {
        let json = r#"{"id":"rage","name":"Rage","category":"class_resource",
            "current":9,"maximum":3,"recharge":"long_rest"}"#;
        let resource: Resource = serde_json::from_str(json).unwrap();
        assert_eq!(resource.current(), 3);

        let json = r#"{"id":"rage","name":"Rage","category":"class_resource",
            "maximum":3,"recharge":"long_rest"}"#;
        let resource: Resource = serde_json::from_str(json).unwrap();
        assert_eq!(resource.current(), 3);
    }

    #[test]
    fn test_huge_heal_saturates_at_maximum() {
        let mut ledger = ResourceLedger::new();
        ledger.hit_points = HitPoints::new(20);
        ledger.take_damage(15);
        assert_eq!(ledger.heal(i32::MAX), 15);
        assert_eq!(ledger.hit_points.current, 20);
    }

    #[test]
    fn test_update_health_saturates() {
        let mut ledger = ResourceLedger::new();
        ledger.hit_points = HitPoints::new(20);
        ledger.update_health(i32::MAX);
        assert_eq!(ledger.hit_points.maximum, i32::MAX);
        assert_eq!(ledger.hit_points.current, i32::MAX);

        ledger.update_health(i32::MIN);
        assert_eq!(ledger.hit_points.maximum, 0);
        assert_eq!(ledger.hit_points.current, 0);
    }
}
