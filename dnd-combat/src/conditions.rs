//! Conditions: the closed set of status effects from the rules.
//!
//! A condition changes rolls made by or against its bearer, blocks actions,
//! or lowers speed. The resolver reads a creature's [`ConditionSet`] through
//! the `conditions` methods on [`Actor`](crate::Actor) and
//! [`Defender`](crate::Defender); the encounter reads it before letting a
//! combatant act.

use crate::combatant::{Ability, CombatantId};
use crate::dice::Advantage;
use crate::resolver::AttackRange;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem;

/// Exhaustion stops accumulating here.
pub const MAX_EXHAUSTION: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Blinded,
    /// Cannot attack the charmer.
    Charmed { by: CombatantId },
    Deafened,
    Exhaustion { level: u8 },
    Frightened,
    Grappled,
    Incapacitated,
    Invisible,
    Paralyzed,
    Petrified,
    Poisoned,
    Prone,
    Restrained,
    Stunned,
    Unconscious,
}

impl Condition {
    pub fn name(&self) -> &'static str {
        match self {
            Condition::Blinded => "blinded",
            Condition::Charmed { .. } => "charmed",
            Condition::Deafened => "deafened",
            Condition::Exhaustion { .. } => "exhaustion",
            Condition::Frightened => "frightened",
            Condition::Grappled => "grappled",
            Condition::Incapacitated => "incapacitated",
            Condition::Invisible => "invisible",
            Condition::Paralyzed => "paralyzed",
            Condition::Petrified => "petrified",
            Condition::Poisoned => "poisoned",
            Condition::Prone => "prone",
            Condition::Restrained => "restrained",
            Condition::Stunned => "stunned",
            Condition::Unconscious => "unconscious",
        }
    }

    /// Same condition, ignoring exhaustion level and charmer.
    pub fn same_kind(&self, other: &Condition) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }

    /// The bearer cannot take actions or reactions.
    pub fn is_incapacitating(&self) -> bool {
        matches!(
            self,
            Condition::Incapacitated
                | Condition::Paralyzed
                | Condition::Petrified
                | Condition::Stunned
                | Condition::Unconscious
        )
    }

    /// The bearer's own attack rolls are at disadvantage.
    fn hinders_own_attacks(&self) -> bool {
        match self {
            Condition::Blinded
            | Condition::Frightened
            | Condition::Poisoned
            | Condition::Restrained => true,
            Condition::Exhaustion { level } => *level >= 1,
            _ => false,
        }
    }

    /// How attacks against the bearer are affected.
    fn against(&self, range: AttackRange) -> Advantage {
        match self {
            Condition::Blinded
            | Condition::Paralyzed
            | Condition::Petrified
            | Condition::Restrained
            | Condition::Stunned
            | Condition::Unconscious => Advantage::Advantage,
            Condition::Invisible => Advantage::Disadvantage,
            Condition::Prone => match range {
                AttackRange::Melee => Advantage::Advantage,
                AttackRange::Ranged => Advantage::Disadvantage,
            },
            _ => Advantage::Normal,
        }
    }

    fn fails_save(&self, ability: Ability) -> bool {
        matches!(ability, Ability::Strength | Ability::Dexterity)
            && matches!(
                self,
                Condition::Paralyzed | Condition::Stunned | Condition::Unconscious
            )
    }

    fn stops_movement(&self) -> bool {
        match self {
            Condition::Grappled
            | Condition::Petrified
            | Condition::Restrained
            | Condition::Stunned
            | Condition::Unconscious => true,
            Condition::Exhaustion { level } => *level >= 5,
            _ => false,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Exhaustion { level } => write!(f, "exhaustion {level}"),
            other => write!(f, "{}", other.name()),
        }
    }
}

static NO_CONDITIONS: ConditionSet = ConditionSet::new();

/// The conditions on one creature. At most one of each kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    pub const fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// A shared empty set, for creatures that never carry conditions.
    pub fn none() -> &'static ConditionSet {
        &NO_CONDITIONS
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    /// Add a condition. Returns false if one of that kind was already
    /// present; a new exhaustion level or charmer replaces the old one.
    pub fn add(&mut self, condition: Condition) -> bool {
        let condition = match condition {
            Condition::Exhaustion { level } => Condition::Exhaustion {
                level: level.min(MAX_EXHAUSTION),
            },
            other => other,
        };
        match self.conditions.iter_mut().find(|c| c.same_kind(&condition)) {
            Some(existing) => {
                *existing = condition;
                false
            }
            None => {
                self.conditions.push(condition);
                true
            }
        }
    }

    /// Remove the condition of the same kind, whatever its level or charmer.
    pub fn remove(&mut self, condition: &Condition) -> bool {
        let before = self.conditions.len();
        self.conditions.retain(|c| !c.same_kind(condition));
        self.conditions.len() != before
    }

    pub fn has(&self, condition: &Condition) -> bool {
        self.conditions.iter().any(|c| c.same_kind(condition))
    }

    pub fn exhaustion_level(&self) -> u8 {
        self.conditions
            .iter()
            .find_map(|c| match c {
                Condition::Exhaustion { level } => Some(*level),
                _ => None,
            })
            .unwrap_or(0)
    }

    pub fn is_charmed_by(&self, id: CombatantId) -> bool {
        self.conditions
            .iter()
            .any(|c| matches!(c, Condition::Charmed { by } if *by == id))
    }

    /// The first condition that keeps the bearer from acting.
    pub fn preventing_action(&self) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.is_incapacitating())
    }

    /// Strength and Dexterity saves fail without a roll while paralyzed,
    /// stunned, or unconscious.
    pub fn auto_fails_save(&self, ability: Ability) -> bool {
        self.conditions.iter().any(|c| c.fails_save(ability))
    }

    /// Any melee hit against an unconscious creature is a critical hit.
    pub fn melee_hits_are_critical(&self) -> bool {
        self.has(&Condition::Unconscious)
    }

    /// Walking speed after conditions.
    pub fn speed(&self, base: u32) -> u32 {
        if self.conditions.iter().any(Condition::stops_movement) {
            return 0;
        }
        if self.exhaustion_level() >= 2 {
            base / 2
        } else {
            base
        }
    }

    /// Movement spent standing up from prone.
    pub fn stand_up_cost(&self, speed: u32) -> u32 {
        if self.has(&Condition::Prone) {
            speed / 2
        } else {
            0
        }
    }
}

/// Fold the requested advantage with the attacker's and target's
/// conditions. Any advantage source together with any disadvantage source
/// gives a normal roll.
pub fn attack_advantage(
    requested: Advantage,
    attacker: &ConditionSet,
    target: &ConditionSet,
    range: AttackRange,
) -> Advantage {
    let mut advantage = requested == Advantage::Advantage;
    let mut disadvantage = requested == Advantage::Disadvantage;

    for condition in attacker.iter() {
        disadvantage |= condition.hinders_own_attacks();
        advantage |= matches!(condition, Condition::Invisible);
    }
    for condition in target.iter() {
        match condition.against(range) {
            Advantage::Advantage => advantage = true,
            Advantage::Disadvantage => disadvantage = true,
            Advantage::Normal => {}
        }
    }

    Advantage::from_sources(advantage, disadvantage)
}
