//! Per-combatant action catalog.
//!
//! An [`ActionDefinition`] is data: attack profile, damage, forced save,
//! resource cost. Actions that do something other than attack or force a
//! save bind an [`ActionEffect`] callback, which reads the actor (and target)
//! and returns the [`Effect`]s to apply. The registry never mutates anyone;
//! the encounter applies effects afterwards.

use crate::combatant::{ActiveEffect, Actor, Defender};
use crate::dice::{Advantage, DiceError, DieSource};
use crate::resolver::{
    AttackOutcome, AttackProfile, AttackRange, DamageComponent, DamageType, Resolver, SaveOutcome,
    SaveProfile,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors from action lookup and dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("Action not found: {0}")]
    NotFound(String),

    #[error("Action {0} has no effect to execute")]
    NoEffect(String),

    #[error("Action {0} is not an attack")]
    NoAttackProfile(String),

    #[error("Action {0} does not force a saving throw")]
    NoSaveProfile(String),

    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),
}

/// Action economy slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Action,
    BonusAction,
    Reaction,
    Lair,
    Legendary,
    Free,
    Special,
}

impl ActionKind {
    /// Whether this kind of action can be taken on another creature's turn.
    pub fn allowed_out_of_turn(&self) -> bool {
        matches!(
            self,
            ActionKind::Reaction | ActionKind::Free | ActionKind::Legendary | ActionKind::Lair
        )
    }
}

/// Resource an action consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCost {
    pub resource: String,
    pub amount: u32,
}

/// Who an [`Effect`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectTarget {
    Actor,
    Target,
}

/// A state change produced by executing an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    Healed {
        target: EffectTarget,
        amount: i32,
    },
    Damaged {
        target: EffectTarget,
        amount: i32,
        damage_type: DamageType,
    },
    TemporaryHitPoints {
        target: EffectTarget,
        amount: i32,
    },
    /// Always the actor's own ledger.
    ResourceRestored {
        resource: String,
        amount: u32,
    },
    EffectApplied {
        target: EffectTarget,
        effect: ActiveEffect,
    },
    Note(String),
}

type EffectFn = dyn Fn(&dyn Actor, Option<&dyn Actor>, &mut dyn DieSource) -> Vec<Effect> + Send + Sync;

/// Callback bound to an action.
#[derive(Clone)]
pub struct ActionEffect(Arc<EffectFn>);

impl ActionEffect {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&dyn Actor, Option<&dyn Actor>, &mut dyn DieSource) -> Vec<Effect>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(
        &self,
        actor: &dyn Actor,
        target: Option<&dyn Actor>,
        dice: &mut dyn DieSource,
    ) -> Vec<Effect> {
        (self.0)(actor, target, dice)
    }
}

impl fmt::Debug for ActionEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionEffect(..)")
    }
}

/// A single action a combatant can take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub id: String,
    pub name: String,
    pub kind: ActionKind,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub attack: Option<AttackProfile>,
    /// Melee unless stated.
    #[serde(default)]
    pub range: AttackRange,
    #[serde(default)]
    pub damage: Vec<DamageComponent>,
    #[serde(default)]
    pub save: Option<SaveProfile>,
    #[serde(default)]
    pub cost: Option<ResourceCost>,
    /// Not serialized; bind after loading.
    #[serde(skip)]
    pub effect: Option<ActionEffect>,
}

impl ActionDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            source: None,
            attack: None,
            range: AttackRange::Melee,
            damage: Vec::new(),
            save: None,
            cost: None,
            effect: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_attack(mut self, attack: AttackProfile) -> Self {
        self.attack = Some(attack);
        self
    }

    pub fn with_range(mut self, range: AttackRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_damage(mut self, component: DamageComponent) -> Self {
        self.damage.push(component);
        self
    }

    pub fn with_save(mut self, save: SaveProfile) -> Self {
        self.save = Some(save);
        self
    }

    pub fn with_cost(mut self, resource: impl Into<String>, amount: u32) -> Self {
        self.cost = Some(ResourceCost {
            resource: resource.into(),
            amount,
        });
        self
    }

    pub fn with_effect<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Actor, Option<&dyn Actor>, &mut dyn DieSource) -> Vec<Effect>
            + Send
            + Sync
            + 'static,
    {
        self.effect = Some(ActionEffect::new(f));
        self
    }
}

/// Actions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, ActionDefinition>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an action, replacing any with the same id.
    pub fn add(&mut self, action: ActionDefinition) -> Option<ActionDefinition> {
        self.actions.insert(action.id.clone(), action)
    }

    pub fn remove(&mut self, id: &str) -> Option<ActionDefinition> {
        self.actions.remove(id)
    }

    pub fn get(&self, id: &str) -> Result<&ActionDefinition, ActionError> {
        self.actions
            .get(id)
            .ok_or_else(|| ActionError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.actions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Snapshot of every action, sorted by id.
    pub fn available(&self) -> Vec<ActionDefinition> {
        self.actions.values().cloned().collect()
    }

    /// Run the action's bound effect.
    pub fn execute(
        &self,
        id: &str,
        actor: &dyn Actor,
        target: Option<&dyn Actor>,
        dice: &mut dyn DieSource,
    ) -> Result<Vec<Effect>, ActionError> {
        let action = self.get(id)?;
        let effect = action
            .effect
            .as_ref()
            .ok_or_else(|| ActionError::NoEffect(id.to_string()))?;
        Ok(effect.call(actor, target, dice))
    }

    pub fn roll_attack(
        &self,
        id: &str,
        resolver: &Resolver,
        attacker: &dyn Actor,
        target: &dyn Defender,
        advantage: Advantage,
        dice: &mut dyn DieSource,
    ) -> Result<AttackOutcome, ActionError> {
        let action = self.get(id)?;
        let attack = action
            .attack
            .as_ref()
            .ok_or_else(|| ActionError::NoAttackProfile(id.to_string()))?;
        Ok(resolver.roll_attack(
            attacker,
            attack,
            action.range,
            &action.damage,
            target,
            advantage,
            dice,
        )?)
    }

    pub fn request_save(
        &self,
        id: &str,
        resolver: &Resolver,
        owner: &dyn Actor,
        target: &dyn Actor,
        advantage: Advantage,
        dice: &mut dyn DieSource,
    ) -> Result<SaveOutcome, ActionError> {
        let action = self.get(id)?;
        let save = action
            .save
            .as_ref()
            .ok_or_else(|| ActionError::NoSaveProfile(id.to_string()))?;
        Ok(resolver.request_save(owner, save, &action.damage, target, advantage, dice)?)
    }
}
