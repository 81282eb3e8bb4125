//! Built-in features.

use super::{Feature, FeatureError, FeatureSource};
use crate::actions::{ActionDefinition, ActionKind};
use crate::combatant::{
    Ability, ActiveEffect, Actor, Combatant, Proficiency, ProficiencyKind, Skill,
};
use crate::dice::{DieSource, RollOutcome};
use crate::resources::{RechargePolicy, Resource, ResourceCategory};
use crate::resolver::{AttackProfile, DamageComponent, DamageType};

/// Reroll a natural 1 on a d20, once. The new roll must be used.
#[derive(Debug, Clone, Copy, Default)]
pub struct HalflingLuck;

impl HalflingLuck {
    pub const NAME: &'static str = "Halfling Luck";
}

impl Feature for HalflingLuck {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn source(&self) -> FeatureSource {
        FeatureSource::Race
    }

    fn affects_rolls(&self) -> bool {
        true
    }

    fn on_d20_roll(&self, mut roll: RollOutcome, dice: &mut dyn DieSource) -> RollOutcome {
        if roll.sides() != 20 {
            return roll;
        }
        let ones: Vec<usize> = (0..roll.kept().len())
            .filter(|&i| roll.kept()[i] == 1)
            .collect();
        for index in &ones {
            roll.reroll_kept(*index, dice);
        }
        if !ones.is_empty() {
            roll.insert_metadata("halfling_luck", ones.len());
        }
        roll
    }
}

/// Once per turn, double walking speed until the end of the turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct FelineAgility;

impl FelineAgility {
    pub const NAME: &'static str = "Feline Agility";
    pub const RESOURCE: &'static str = "feline_agility";
}

impl Feature for FelineAgility {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn source(&self) -> FeatureSource {
        FeatureSource::Race
    }

    fn on_attach(&self, host: &mut Combatant) -> Result<(), FeatureError> {
        host.resources.add(
            Resource::new(
                Self::RESOURCE,
                Self::NAME,
                ResourceCategory::FeatureUse,
                1,
                RechargePolicy::Turn,
            )
            .with_source("Tabaxi"),
        );
        Ok(())
    }

    fn on_detach(&self, host: &mut Combatant) {
        host.resources.remove(Self::RESOURCE);
    }

    fn can_activate(&self, host: &Combatant) -> bool {
        host.resources
            .get(Self::RESOURCE)
            .is_some_and(|uses| !uses.is_depleted())
    }

    fn activate(&self, host: &mut Combatant) -> Result<(), FeatureError> {
        host.resources.spend(Self::RESOURCE, 1)?;
        host.add_effect(ActiveEffect::until_end_of_turn(Self::NAME, "Tabaxi"));
        Ok(())
    }

    fn modify_speed(&self, host: &Combatant, speed: u32) -> u32 {
        if host.has_effect(Self::NAME) {
            speed.saturating_mul(2)
        } else {
            speed
        }
    }
}

/// Climbing speed and a natural claw weapon.
#[derive(Debug, Clone, Copy, Default)]
pub struct Claws;

impl Claws {
    pub const NAME: &'static str = "Claws";
    pub const ACTION: &'static str = "claw_attack";
    const CLIMB_SPEED: u32 = 20;

    fn claw_attack() -> ActionDefinition {
        ActionDefinition::new(Self::ACTION, "Claw Attack", ActionKind::Action)
            .with_source(Self::NAME)
            .with_attack(AttackProfile::Derived {
                ability: Ability::Dexterity,
                bonus: 0,
                proficiency: Some(Proficiency::weapon("simple melee")),
            })
            .with_damage(
                DamageComponent::new(1, 4, DamageType::Slashing).with_ability(Ability::Dexterity),
            )
    }
}

impl Feature for Claws {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn source(&self) -> FeatureSource {
        FeatureSource::Race
    }

    fn on_attach(&self, host: &mut Combatant) -> Result<(), FeatureError> {
        host.speed.climb = Some(Self::CLIMB_SPEED);
        host.actions.add(Self::claw_attack());
        Ok(())
    }

    fn on_detach(&self, host: &mut Combatant) {
        host.speed.climb = None;
        host.actions.remove(Self::ACTION);
    }
}

/// Proficiency in Perception and Stealth.
#[derive(Debug, Clone, Copy, Default)]
pub struct Talent;

impl Talent {
    pub const NAME: &'static str = "Talent";
    const SKILLS: [Skill; 2] = [Skill::Perception, Skill::Stealth];
}

impl Feature for Talent {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn source(&self) -> FeatureSource {
        FeatureSource::Race
    }

    fn on_attach(&self, host: &mut Combatant) -> Result<(), FeatureError> {
        for skill in Self::SKILLS {
            host.proficiencies.add_skill(skill);
        }
        Ok(())
    }

    fn on_detach(&self, host: &mut Combatant) {
        for skill in Self::SKILLS {
            host.proficiencies.remove(ProficiencyKind::Skill, skill.name());
        }
    }
}

/// Reroll damage dice showing 1 or 2, once.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreatWeaponFighting;

impl GreatWeaponFighting {
    pub const NAME: &'static str = "Great Weapon Fighting";
}

impl Feature for GreatWeaponFighting {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn source(&self) -> FeatureSource {
        FeatureSource::Class
    }

    fn affects_rolls(&self) -> bool {
        true
    }

    fn on_damage_roll(&self, mut roll: RollOutcome, dice: &mut dyn DieSource) -> RollOutcome {
        let low: Vec<usize> = (0..roll.kept().len())
            .filter(|&i| roll.kept()[i] <= 2)
            .collect();
        for index in low {
            roll.reroll_kept(index, dice);
        }
        roll
    }
}

/// Without armor, AC is 10 + DEX + CON.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnarmoredDefense;

impl UnarmoredDefense {
    pub const NAME: &'static str = "Unarmored Defense";
}

impl Feature for UnarmoredDefense {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn source(&self) -> FeatureSource {
        FeatureSource::Class
    }

    fn modify_armor_class(&self, host: &dyn Actor, _base: i32) -> Option<i32> {
        Some(
            10 + host.ability_modifier(Ability::Dexterity)
                + host.ability_modifier(Ability::Constitution),
        )
    }
}
