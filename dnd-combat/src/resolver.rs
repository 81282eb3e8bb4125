//! Attack, check, save and damage resolution.
//!
//! Every d20 resolution follows the same steps: draw with the requested
//! advantage, run the outcome through the actor's feature pipeline, then add
//! the flat modifier. The resolver holds no state besides its configuration;
//! creatures are read through [`Actor`] and [`Defender`].

use crate::combatant::{Ability, Actor, Defender, Proficiency, Skill};
use crate::conditions;
use crate::config::ResolverConfig;
use crate::dice::{self, Advantage, DiceError, DiceExpression, DieSource, RollOutcome};
use crate::features::RollKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Damage Types
// ============================================================================

/// Common D&D damage types.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DamageType {
    Slashing,
    Piercing,
    Bludgeoning,
    Fire,
    Cold,
    Lightning,
    Thunder,
    Acid,
    Poison,
    Necrotic,
    Radiant,
    Force,
    Psychic,
}

impl DamageType {
    pub fn name(&self) -> &'static str {
        match self {
            DamageType::Slashing => "slashing",
            DamageType::Piercing => "piercing",
            DamageType::Bludgeoning => "bludgeoning",
            DamageType::Fire => "fire",
            DamageType::Cold => "cold",
            DamageType::Lightning => "lightning",
            DamageType::Thunder => "thunder",
            DamageType::Acid => "acid",
            DamageType::Poison => "poison",
            DamageType::Necrotic => "necrotic",
            DamageType::Radiant => "radiant",
            DamageType::Force => "force",
            DamageType::Psychic => "psychic",
        }
    }

    pub fn all() -> [DamageType; 13] {
        [
            DamageType::Slashing,
            DamageType::Piercing,
            DamageType::Bludgeoning,
            DamageType::Fire,
            DamageType::Cold,
            DamageType::Lightning,
            DamageType::Thunder,
            DamageType::Acid,
            DamageType::Poison,
            DamageType::Necrotic,
            DamageType::Radiant,
            DamageType::Force,
            DamageType::Psychic,
        ]
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown damage type: {0}")]
pub struct UnknownDamageType(pub String);

impl FromStr for DamageType {
    type Err = UnknownDamageType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        DamageType::all()
            .into_iter()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| UnknownDamageType(s.to_string()))
    }
}

// ============================================================================
// Attack and Damage Profiles
// ============================================================================

/// How an attack's to-hit modifier is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttackProfile {
    /// A statblock "+5 to hit".
    Precomputed { bonus: i32 },
    /// Ability modifier plus `bonus`, plus the proficiency bonus when the
    /// attacker has `proficiency`.
    Derived {
        ability: Ability,
        #[serde(default)]
        bonus: i32,
        #[serde(default)]
        proficiency: Option<Proficiency>,
    },
}

/// Whether an attack is made in melee or at range. Some conditions on the
/// target (prone) care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackRange {
    #[default]
    Melee,
    Ranged,
}

impl AttackProfile {
    pub fn to_hit(&self, attacker: &dyn Actor) -> i32 {
        match self {
            AttackProfile::Precomputed { bonus } => *bonus,
            AttackProfile::Derived {
                ability,
                bonus,
                proficiency,
            } => {
                let proficient = proficiency
                    .as_ref()
                    .is_some_and(|p| attacker.has_proficiency(p.kind, &p.name));
                attacker.ability_modifier(*ability)
                    + bonus
                    + if proficient {
                        attacker.proficiency_bonus()
                    } else {
                        0
                    }
            }
        }
    }
}

/// Flat modifier added to a damage component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DamageBonus {
    Precomputed { bonus: i32 },
    Derived { ability: Ability, bonus: i32 },
}

impl DamageBonus {
    pub fn resolve(&self, attacker: &dyn Actor) -> i32 {
        match self {
            DamageBonus::Precomputed { bonus } => *bonus,
            DamageBonus::Derived { ability, bonus } => attacker.ability_modifier(*ability) + bonus,
        }
    }
}

impl Default for DamageBonus {
    fn default() -> Self {
        DamageBonus::Precomputed { bonus: 0 }
    }
}

/// One typed damage roll, e.g. `1d8 + STR slashing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageComponent {
    pub count: u32,
    pub sides: u32,
    pub damage_type: DamageType,
    #[serde(default)]
    pub bonus: DamageBonus,
}

impl DamageComponent {
    pub fn new(count: u32, sides: u32, damage_type: DamageType) -> Self {
        Self {
            count,
            sides,
            damage_type,
            bonus: DamageBonus::default(),
        }
    }

    /// Parse statblock notation such as `2d6+3`. Only one kind of die is
    /// allowed per component; the modifier becomes a precomputed bonus.
    pub fn from_notation(notation: &str, damage_type: DamageType) -> Result<Self, DiceError> {
        let expression = DiceExpression::parse(notation)?;
        if expression.components.len() > 1 {
            return Err(DiceError::InvalidNotation(notation.to_string()));
        }
        let (count, sides) = expression
            .components
            .first()
            .map_or((0, 1), |c| (c.count, c.die_type.sides()));
        Ok(Self {
            count,
            sides,
            damage_type,
            bonus: DamageBonus::Precomputed {
                bonus: expression.modifier,
            },
        })
    }

    /// Add the attacker's ability modifier, keeping any flat bonus.
    pub fn with_ability(mut self, ability: Ability) -> Self {
        let bonus = match self.bonus {
            DamageBonus::Precomputed { bonus } | DamageBonus::Derived { bonus, .. } => bonus,
        };
        self.bonus = DamageBonus::Derived { ability, bonus };
        self
    }

    pub fn with_bonus(mut self, amount: i32) -> Self {
        match &mut self.bonus {
            DamageBonus::Precomputed { bonus } | DamageBonus::Derived { bonus, .. } => {
                *bonus = amount
            }
        }
        self
    }
}

/// Who sets a saving throw's DC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaveDc {
    Fixed { dc: i32 },
    /// 8 + the owner's ability modifier + proficiency bonus.
    Derived { ability: Ability },
}

/// A saving throw an action forces on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveProfile {
    pub ability: Ability,
    pub dc: SaveDc,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Damage grouped by type. A type can hold several rolls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageOutcome {
    rolls: BTreeMap<DamageType, Vec<RollOutcome>>,
}

impl DamageOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, damage_type: DamageType, roll: RollOutcome) {
        self.rolls.entry(damage_type).or_default().push(roll);
    }

    pub fn get(&self, damage_type: DamageType) -> &[RollOutcome] {
        self.rolls
            .get(&damage_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (DamageType, &[RollOutcome])> {
        self.rolls.iter().map(|(t, rolls)| (*t, rolls.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.rolls.is_empty()
    }

    /// Subtotal per damage type; a negative subtotal counts as zero.
    pub fn breakdown(&self) -> BTreeMap<DamageType, i32> {
        self.rolls
            .iter()
            .map(|(t, rolls)| (*t, rolls.iter().map(RollOutcome::total).sum::<i32>().max(0)))
            .collect()
    }

    pub fn total(&self) -> i32 {
        self.breakdown().values().sum()
    }
}

impl fmt::Display for DamageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .breakdown()
            .iter()
            .map(|(t, amount)| format!("{amount} {t}"))
            .collect();
        write!(f, "{}", parts.join(" + "))
    }
}

/// Result of an attack roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub roll: RollOutcome,
    pub target_ac: i32,
    pub hit: bool,
    pub critical: bool,
    /// Present only on a hit.
    pub damage: Option<DamageOutcome>,
}

impl AttackOutcome {
    pub fn damage_total(&self) -> i32 {
        self.damage.as_ref().map_or(0, DamageOutcome::total)
    }
}

/// Result of a forced saving throw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub roll: RollOutcome,
    pub dc: i32,
    pub success: bool,
    /// Rolled only when the save fails.
    pub damage: Option<DamageOutcome>,
}

impl SaveOutcome {
    pub fn damage_total(&self) -> i32 {
        self.damage.as_ref().map_or(0, DamageOutcome::total)
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves rolls for any [`Actor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Draw a d20, pipe it through the actor's features, add `modifier`.
    pub fn roll_d20(
        &self,
        actor: &dyn Actor,
        kind: RollKind,
        advantage: Advantage,
        modifier: i32,
        dice: &mut dyn DieSource,
    ) -> RollOutcome {
        let roll = dice::d20(dice, advantage);
        let mut roll = actor.features().apply(kind, roll, dice);
        roll.add_modifier(modifier);
        roll
    }

    /// Resolve an attack roll and, on a hit, its damage.
    ///
    /// The requested advantage is folded with the attacker's and target's
    /// conditions before any die is drawn. A melee hit on a target whose
    /// conditions allow it is a critical hit.
    #[allow(clippy::too_many_arguments)]
    pub fn roll_attack(
        &self,
        attacker: &dyn Actor,
        attack: &AttackProfile,
        range: AttackRange,
        damage: &[DamageComponent],
        target: &dyn Defender,
        advantage: Advantage,
        dice: &mut dyn DieSource,
    ) -> Result<AttackOutcome, DiceError> {
        let advantage = conditions::attack_advantage(
            advantage,
            attacker.conditions(),
            target.conditions(),
            range,
        );
        let to_hit = attack.to_hit(attacker);
        let roll = self.roll_d20(attacker, RollKind::Attack, advantage, to_hit, dice);
        let target_ac = target.armor_class();

        let hit = if self.config.natural_rolls_decide && roll.is_critical() {
            true
        } else if self.config.natural_rolls_decide && roll.is_fumble() {
            false
        } else {
            roll.total() >= target_ac
        };
        let critical = roll.is_critical()
            || (hit && range == AttackRange::Melee && target.conditions().melee_hits_are_critical());

        let damage = if hit {
            Some(self.roll_damage(attacker, damage, critical, dice)?)
        } else {
            None
        };

        debug!(
            attacker = attacker.name(),
            roll = %roll,
            target_ac,
            hit,
            critical,
            damage = damage.as_ref().map_or(0, DamageOutcome::total),
            "attack resolved"
        );

        Ok(AttackOutcome {
            roll,
            target_ac,
            hit,
            critical,
            damage,
        })
    }

    /// Roll every component and group the results by damage type.
    pub fn roll_damage(
        &self,
        attacker: &dyn Actor,
        components: &[DamageComponent],
        critical: bool,
        dice: &mut dyn DieSource,
    ) -> Result<DamageOutcome, DiceError> {
        let mut outcome = DamageOutcome::new();
        for component in components {
            let count = if critical && self.config.double_critical_dice {
                component.count.saturating_mul(2)
            } else {
                component.count
            };
            let roll = if count == 0 {
                RollOutcome::fixed(component.sides.max(1), Vec::new())
            } else {
                dice::roll(dice, component.sides, count, Advantage::Normal)?
            };
            let mut roll = attacker.features().apply(RollKind::Damage, roll, dice);
            roll.add_modifier(component.bonus.resolve(attacker));
            outcome.add(component.damage_type, roll);
        }
        Ok(outcome)
    }

    pub fn roll_ability_check(
        &self,
        actor: &dyn Actor,
        ability: Ability,
        advantage: Advantage,
        dice: &mut dyn DieSource,
    ) -> RollOutcome {
        let modifier = actor.ability_check_bonus(ability);
        self.roll_d20(actor, RollKind::AbilityCheck, advantage, modifier, dice)
    }

    pub fn roll_skill_check(
        &self,
        actor: &dyn Actor,
        skill: Skill,
        advantage: Advantage,
        dice: &mut dyn DieSource,
    ) -> RollOutcome {
        let modifier = actor.skill_bonus(skill);
        self.roll_d20(actor, RollKind::SkillCheck, advantage, modifier, dice)
    }

    pub fn roll_saving_throw(
        &self,
        actor: &dyn Actor,
        ability: Ability,
        advantage: Advantage,
        dice: &mut dyn DieSource,
    ) -> RollOutcome {
        let modifier = actor.saving_throw_bonus(ability);
        self.roll_d20(actor, RollKind::SavingThrow, advantage, modifier, dice)
    }

    pub fn roll_initiative(
        &self,
        actor: &dyn Actor,
        advantage: Advantage,
        dice: &mut dyn DieSource,
    ) -> RollOutcome {
        let modifier = actor.initiative_modifier();
        self.roll_d20(actor, RollKind::Initiative, advantage, modifier, dice)
    }

    pub fn save_dc(&self, owner: &dyn Actor, dc: SaveDc) -> i32 {
        match dc {
            SaveDc::Fixed { dc } => dc,
            SaveDc::Derived { ability } => {
                8 + owner.ability_modifier(ability) + owner.proficiency_bonus()
            }
        }
    }

    /// Make `target` save against `owner`'s effect. Damage is rolled only on
    /// a failed save. A save the target's conditions fail automatically
    /// draws no d20; its roll is empty and carries `auto_fail` metadata.
    pub fn request_save(
        &self,
        owner: &dyn Actor,
        save: &SaveProfile,
        damage: &[DamageComponent],
        target: &dyn Actor,
        advantage: Advantage,
        dice: &mut dyn DieSource,
    ) -> Result<SaveOutcome, DiceError> {
        let dc = self.save_dc(owner, save.dc);
        let auto_fail = target.conditions().auto_fails_save(save.ability);
        let (roll, success) = if auto_fail {
            let mut roll = RollOutcome::fixed(20, Vec::new());
            roll.insert_metadata("auto_fail", true);
            (roll, false)
        } else {
            let roll = self.roll_saving_throw(target, save.ability, advantage, dice);
            let success = roll.meets(dc);
            (roll, success)
        };
        let damage = if success || damage.is_empty() {
            None
        } else {
            Some(self.roll_damage(owner, damage, false, dice)?)
        };

        debug!(
            owner = owner.name(),
            target = target.name(),
            ability = %save.ability,
            dc,
            roll = %roll,
            success,
            "save resolved"
        );

        Ok(SaveOutcome {
            roll,
            dc,
            success,
            damage,
        })
    }
}
