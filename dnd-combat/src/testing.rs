//! Testing utilities for the combat engine.
//!
//! - `ScriptedDice` plays back fixed faces so rolls are deterministic
//! - Sample combatants for scenario tests
//! - Assertion helpers for verifying combatant state

use crate::actions::{ActionDefinition, ActionKind, Effect, EffectTarget};
use crate::combatant::{Ability, AbilityScores, Combatant, Proficiency, ProficiencyKind, Skill};
use crate::dice::DieSource;
use crate::resolver::{AttackProfile, DamageComponent, DamageType};
use crate::resources::{RechargePolicy, Resource, ResourceCategory};
use std::collections::VecDeque;
use tracing::warn;

/// A die source that returns scripted faces in order.
///
/// Faces larger than the die are clamped to it. Once the script runs out
/// every draw returns 1.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    faces: VecDeque<u32>,
    consumed: usize,
}

impl ScriptedDice {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        Self {
            faces: faces.into_iter().collect(),
            consumed: 0,
        }
    }

    /// Append more faces to the script.
    pub fn push(&mut self, faces: impl IntoIterator<Item = u32>) {
        self.faces.extend(faces);
    }

    /// How many draws have been made.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Faces not yet drawn.
    pub fn remaining(&self) -> usize {
        self.faces.len()
    }
}

impl DieSource for ScriptedDice {
    fn draw(&mut self, sides: u32) -> u32 {
        self.consumed += 1;
        match self.faces.pop_front() {
            Some(face) => face.clamp(1, sides.max(1)),
            None => {
                warn!(sides, "dice script exhausted");
                1
            }
        }
    }
}

/// A level 3 human fighter with a longsword and Second Wind.
pub fn sample_fighter(name: &str) -> Combatant {
    let level = 3;
    let mut fighter = Combatant::new(name)
        .with_level(level)
        .with_ability_scores(AbilityScores::new(16, 14, 14, 10, 12, 8))
        .with_armor_class(18)
        .with_hit_points(28)
        .with_proficiency(ProficiencyKind::Armor, "heavy")
        .with_proficiency(ProficiencyKind::Weapon, "simple melee")
        .with_proficiency(ProficiencyKind::Weapon, "martial melee");

    fighter.proficiencies.add_save(Ability::Strength);
    fighter.proficiencies.add_save(Ability::Constitution);
    for skill in [Skill::Athletics, Skill::Perception, Skill::Intimidation] {
        fighter.proficiencies.add_skill(skill);
    }

    fighter.resources.update_hit_die(10, 3);
    fighter.resources.add(
        Resource::new(
            "second_wind",
            "Second Wind",
            ResourceCategory::ClassResource,
            1,
            RechargePolicy::ShortRest,
        )
        .with_source("Fighter"),
    );

    fighter.actions.add(
        ActionDefinition::new("longsword", "Longsword", ActionKind::Action)
            .with_source("equipment")
            .with_attack(AttackProfile::Derived {
                ability: Ability::Strength,
                bonus: 0,
                proficiency: Some(Proficiency::weapon("martial melee")),
            })
            .with_damage(
                DamageComponent::new(1, 8, DamageType::Slashing).with_ability(Ability::Strength),
            ),
    );
    fighter.actions.add(
        ActionDefinition::new("second_wind", "Second Wind", ActionKind::BonusAction)
            .with_source("Fighter")
            .with_cost("second_wind", 1)
            .with_effect(move |_, _, dice| {
                vec![Effect::Healed {
                    target: EffectTarget::Actor,
                    amount: dice.draw(10) as i32 + i32::from(level),
                }]
            }),
    );
    fighter
}

/// A goblin from a statblock: precomputed attack and damage bonuses.
pub fn sample_goblin(name: &str) -> Combatant {
    let mut goblin = Combatant::new(name)
        .non_player()
        .with_ability_scores(AbilityScores::new(8, 14, 10, 10, 8, 8))
        .with_armor_class(15)
        .with_hit_points(7);
    goblin.skill_scores.insert(Skill::Stealth, 6);
    goblin.resources.update_hit_die(6, 2);
    goblin.actions.add(
        ActionDefinition::new("scimitar", "Scimitar", ActionKind::Action)
            .with_source("statblock")
            .with_attack(AttackProfile::Precomputed { bonus: 4 })
            .with_damage(DamageComponent::new(1, 6, DamageType::Slashing).with_bonus(2)),
    );
    goblin
}

/// Assert a combatant's current and maximum hit points.
pub fn assert_hp(combatant: &Combatant, current: i32, max: i32) {
    let hp = &combatant.resources.hit_points;
    assert_eq!(
        (hp.current, hp.maximum),
        (current, max),
        "{} HP mismatch",
        combatant.name
    );
}

/// Assert how many uses of a resource remain.
pub fn assert_resource(combatant: &Combatant, id: &str, current: u32) {
    let actual = combatant.resources.current(id);
    assert_eq!(actual, Ok(current), "{} resource {id} mismatch", combatant.name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{Actor, Defender};

    #[test]
    fn test_scripted_dice_plays_back() {
        let mut dice = ScriptedDice::new([3, 25]);
        assert_eq!(dice.draw(6), 3);
        assert_eq!(dice.draw(20), 20);
        assert_eq!(dice.draw(20), 1);
        assert_eq!(dice.consumed(), 3);
        assert_eq!(dice.remaining(), 0);

        dice.push([4]);
        assert_eq!(dice.draw(8), 4);
    }

    #[test]
    fn test_sample_fighter() {
        let fighter = sample_fighter("Roland");
        assert_eq!(fighter.proficiency_bonus(), 2);
        assert_eq!(fighter.armor_class(), 18);
        assert_eq!(fighter.saving_throw_bonus(Ability::Strength), 5);
        assert_eq!(fighter.skill_bonus(Skill::Athletics), 5);
        assert_hp(&fighter, 28, 28);
        assert_resource(&fighter, "second_wind", 1);
        assert_eq!(fighter.resources.hit_dice.remaining(10), 3);
    }

    #[test]
    fn test_sample_goblin() {
        let goblin = sample_goblin("Snik");
        assert!(!goblin.is_player);
        assert_eq!(goblin.skill_bonus(Skill::Stealth), 6);
        assert_eq!(goblin.armor_class(), 15);
        assert!(goblin.actions.get("scimitar").is_ok());
    }
}
