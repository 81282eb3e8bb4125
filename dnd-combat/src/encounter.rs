//! A running encounter: combatants, initiative, and the turn protocol.
//!
//! The encounter owns every participant, the tracker, the shared feature
//! registry and a seeded RNG. Acting operations check that combat is running,
//! that it is the actor's turn and that no condition stops the actor. They
//! check the action's resource cost before resolving and debit it only after
//! resolution succeeds.

use crate::actions::{ActionError, ActionKind, Effect, EffectTarget, ResourceCost};
use crate::combatant::{Ability, Actor, Combatant, CombatantId, Skill};
use crate::conditions::Condition;
use crate::config::EngineConfig;
use crate::dice::{Advantage, DiceError, RollOutcome};
use crate::features::{FeatureError, FeatureRegistry};
use crate::resolver::{AttackOutcome, Resolver, SaveOutcome};
use crate::resources::{DamageResult, ResourceError, RestKind};
use crate::tracker::CombatTracker;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error type for encounter operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombatError {
    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("Unknown combatant: {0}")]
    UnknownCombatant(CombatantId),

    #[error("No combat in progress")]
    NotActive,

    #[error("It is not {0}'s turn")]
    NotYourTurn(String),

    #[error("Action {0} needs a target")]
    MissingTarget(String),

    #[error("Cannot rest during combat")]
    RestDuringCombat,

    #[error("{0} cannot act while {1}")]
    CannotAct(String, Condition),

    #[error("{0} is charmed by {1} and cannot attack them")]
    Charmed(String, String),
}

/// A combat encounter.
#[derive(Debug)]
pub struct Encounter {
    combatants: BTreeMap<CombatantId, Combatant>,
    tracker: CombatTracker,
    features: Arc<FeatureRegistry>,
    resolver: Resolver,
    rng: StdRng,
}

impl Encounter {
    pub fn new(config: EngineConfig, features: Arc<FeatureRegistry>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            combatants: BTreeMap::new(),
            tracker: CombatTracker::new(),
            features,
            resolver: Resolver::new(config.resolver),
            rng,
        }
    }

    /// An encounter using the built-in feature registry.
    pub fn with_builtin_features(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(FeatureRegistry::builtin()))
    }

    pub fn tracker(&self) -> &CombatTracker {
        &self.tracker
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn features(&self) -> &Arc<FeatureRegistry> {
        &self.features
    }

    pub fn round(&self) -> u32 {
        self.tracker.round()
    }

    pub fn is_active(&self) -> bool {
        self.tracker.is_active()
    }

    // ========================================================================
    // Roster
    // ========================================================================

    /// Add a combatant and roll its initiative.
    pub fn add_combatant(&mut self, combatant: Combatant) -> CombatantId {
        let id = combatant.id;
        self.tracker
            .add_combatant(id, &combatant, &self.resolver, &mut self.rng);
        self.insert(combatant);
        id
    }

    /// Add a combatant with an initiative rolled at the table.
    pub fn add_combatant_with_initiative(
        &mut self,
        combatant: Combatant,
        initiative: i32,
    ) -> CombatantId {
        let id = combatant.id;
        self.tracker.add_with_initiative(
            id,
            combatant.name.clone(),
            initiative,
            combatant.initiative_modifier(),
        );
        self.insert(combatant);
        id
    }

    fn insert(&mut self, mut combatant: Combatant) {
        if self.combatants.contains_key(&combatant.id) {
            warn!(combatant = %combatant.name, "replacing combatant with the same id");
        }
        if self.tracker.is_active() {
            combatant.start_combat();
        }
        self.combatants.insert(combatant.id, combatant);
    }

    /// Remove a combatant. If it was acting, the next combatant's turn
    /// starts.
    pub fn remove_combatant(&mut self, id: CombatantId) -> Result<Combatant, CombatError> {
        if !self.combatants.contains_key(&id) {
            return Err(CombatError::UnknownCombatant(id));
        }
        self.tracker.remove_combatant(id, &mut self.combatants);
        self.combatants
            .remove(&id)
            .ok_or(CombatError::UnknownCombatant(id))
    }

    pub fn combatant(&self, id: CombatantId) -> Result<&Combatant, CombatError> {
        lookup(&self.combatants, id)
    }

    pub fn combatant_mut(&mut self, id: CombatantId) -> Result<&mut Combatant, CombatError> {
        self.combatants
            .get_mut(&id)
            .ok_or(CombatError::UnknownCombatant(id))
    }

    /// Combatants in initiative order.
    pub fn combatants(&self) -> impl Iterator<Item = &Combatant> {
        self.tracker
            .order()
            .iter()
            .filter_map(|entry| self.combatants.get(&entry.id))
    }

    pub fn attach_feature(&mut self, id: CombatantId, name: &str) -> Result<bool, CombatError> {
        let combatant = self
            .combatants
            .get_mut(&id)
            .ok_or(CombatError::UnknownCombatant(id))?;
        Ok(combatant.attach_feature(&self.features, name)?)
    }

    pub fn detach_feature(&mut self, id: CombatantId, name: &str) -> Result<(), CombatError> {
        Ok(self.combatant_mut(id)?.detach_feature(name)?)
    }

    /// Returns false if a condition of that kind was already present.
    pub fn add_condition(
        &mut self,
        id: CombatantId,
        condition: Condition,
    ) -> Result<bool, CombatError> {
        Ok(self.combatant_mut(id)?.add_condition(condition))
    }

    pub fn remove_condition(
        &mut self,
        id: CombatantId,
        condition: &Condition,
    ) -> Result<bool, CombatError> {
        Ok(self.combatant_mut(id)?.remove_condition(condition))
    }

    // ========================================================================
    // Turn Flow
    // ========================================================================

    /// Start combat; returns whoever acts first.
    pub fn start(&mut self) -> Option<CombatantId> {
        info!(combatants = self.combatants.len(), "encounter started");
        self.tracker.start_combat(&mut self.combatants)
    }

    pub fn next_turn(&mut self) -> Option<CombatantId> {
        self.tracker.next_turn(&mut self.combatants)
    }

    pub fn end(&mut self) {
        self.tracker.end_combat(&mut self.combatants);
        info!(rounds = self.tracker.round(), "encounter ended");
    }

    /// The combatant whose turn it is.
    pub fn current(&self) -> Option<&Combatant> {
        self.tracker
            .current_combatant()
            .and_then(|id| self.combatants.get(&id))
    }

    fn check_turn(&self, actor: &Combatant, kind: ActionKind) -> Result<(), CombatError> {
        if !self.tracker.is_active() {
            return Err(CombatError::NotActive);
        }
        if let Some(condition) = actor.conditions().preventing_action() {
            return Err(CombatError::CannotAct(actor.name.clone(), *condition));
        }
        if kind.allowed_out_of_turn() || self.tracker.current_combatant() == Some(actor.id) {
            Ok(())
        } else {
            Err(CombatError::NotYourTurn(actor.name.clone()))
        }
    }

    /// Turn check and cost check for an action, before anything is rolled.
    fn prepare(
        &self,
        actor_id: CombatantId,
        action_id: &str,
    ) -> Result<Option<ResourceCost>, CombatError> {
        let actor = self.combatant(actor_id)?;
        let action = actor.actions.get(action_id)?;
        self.check_turn(actor, action.kind)?;
        if let Some(cost) = &action.cost {
            actor.resources.can_spend(&cost.resource, cost.amount)?;
        }
        Ok(action.cost.clone())
    }

    fn debit(&mut self, actor_id: CombatantId, cost: Option<ResourceCost>) -> Result<(), CombatError> {
        if let Some(cost) = cost {
            self.combatant_mut(actor_id)?
                .resources
                .spend(&cost.resource, cost.amount)?;
        }
        Ok(())
    }

    // ========================================================================
    // Acting
    // ========================================================================

    /// Attack with an action. Damage on a hit goes through the attacker's
    /// deal-damage hooks, then is applied to the target.
    pub fn attack(
        &mut self,
        actor_id: CombatantId,
        action_id: &str,
        target_id: CombatantId,
        advantage: Advantage,
    ) -> Result<AttackOutcome, CombatError> {
        let cost = self.prepare(actor_id, action_id)?;
        let actor = lookup(&self.combatants, actor_id)?;
        let target = lookup(&self.combatants, target_id)?;
        check_charm(actor, target)?;
        let outcome = actor.actions.roll_attack(
            action_id,
            &self.resolver,
            actor,
            target,
            advantage,
            &mut self.rng,
        )?;
        let dealt = outcome.damage.as_ref().map(|damage| deal_damage(actor, damage.total()));
        self.debit(actor_id, cost)?;
        if let Some(amount) = dealt {
            self.apply_damage(target_id, amount)?;
        }
        Ok(outcome)
    }

    /// Force the target to save against an action. Damage on a failed save
    /// is applied to the target.
    pub fn request_save(
        &mut self,
        actor_id: CombatantId,
        action_id: &str,
        target_id: CombatantId,
        advantage: Advantage,
    ) -> Result<SaveOutcome, CombatError> {
        let cost = self.prepare(actor_id, action_id)?;
        let actor = lookup(&self.combatants, actor_id)?;
        let target = lookup(&self.combatants, target_id)?;
        check_charm(actor, target)?;
        let outcome = actor.actions.request_save(
            action_id,
            &self.resolver,
            actor,
            target,
            advantage,
            &mut self.rng,
        )?;
        let dealt = outcome.damage.as_ref().map(|damage| deal_damage(actor, damage.total()));
        self.debit(actor_id, cost)?;
        if let Some(amount) = dealt {
            self.apply_damage(target_id, amount)?;
        }
        Ok(outcome)
    }

    /// Execute an action's bound effect and apply what it produces.
    ///
    /// Every effect is checked before the cost is debited, so a failure
    /// leaves the actor, the target and their resources untouched.
    pub fn execute(
        &mut self,
        actor_id: CombatantId,
        action_id: &str,
        target_id: Option<CombatantId>,
    ) -> Result<Vec<Effect>, CombatError> {
        let cost = self.prepare(actor_id, action_id)?;
        let actor = lookup(&self.combatants, actor_id)?;
        let target = match target_id {
            Some(id) => Some(lookup(&self.combatants, id)? as &dyn Actor),
            None => None,
        };
        let effects = actor
            .actions
            .execute(action_id, actor, target, &mut self.rng)?;

        let mut recipients = Vec::with_capacity(effects.len());
        for effect in &effects {
            let recipient = match effect_target(effect) {
                Some(EffectTarget::Target) => target_id
                    .ok_or_else(|| CombatError::MissingTarget(action_id.to_string()))?,
                _ => actor_id,
            };
            if let Effect::ResourceRestored { resource, .. } = effect {
                if !actor.resources.contains(resource) {
                    return Err(ResourceError::NotFound(resource.clone()).into());
                }
            }
            recipients.push(recipient);
        }

        self.debit(actor_id, cost)?;
        for (recipient, effect) in recipients.into_iter().zip(&effects) {
            self.apply_effect(recipient, effect)?;
        }
        Ok(effects)
    }

    /// Apply one checked effect.
    fn apply_effect(&mut self, recipient: CombatantId, effect: &Effect) -> Result<(), CombatError> {
        match effect {
            Effect::Healed { amount, .. } => {
                self.heal(recipient, *amount)?;
            }
            Effect::Damaged { amount, .. } => {
                self.apply_damage(recipient, *amount)?;
            }
            Effect::TemporaryHitPoints { amount, .. } => {
                self.combatant_mut(recipient)?.resources.add_temp_hp(*amount);
            }
            Effect::ResourceRestored { resource, amount } => {
                self.combatant_mut(recipient)?
                    .resources
                    .restore(resource, *amount)?;
            }
            Effect::EffectApplied { effect, .. } => {
                self.combatant_mut(recipient)?.add_effect(effect.clone());
            }
            Effect::Note(note) => {
                let combatant = self.combatant(recipient)?;
                debug!(combatant = %combatant.name, %note, "action note");
            }
        }
        Ok(())
    }

    /// Use an activatable feature on the actor's turn.
    pub fn activate_feature(&mut self, actor_id: CombatantId, name: &str) -> Result<(), CombatError> {
        let actor = self.combatant(actor_id)?;
        self.check_turn(actor, ActionKind::Special)?;
        Ok(self.combatant_mut(actor_id)?.activate_feature(name)?)
    }

    // ========================================================================
    // Checks, Saves, Hit Points, Rests
    // ========================================================================

    pub fn roll_ability_check(
        &mut self,
        id: CombatantId,
        ability: Ability,
        advantage: Advantage,
    ) -> Result<RollOutcome, CombatError> {
        let combatant = lookup(&self.combatants, id)?;
        Ok(self
            .resolver
            .roll_ability_check(combatant, ability, advantage, &mut self.rng))
    }

    pub fn roll_skill_check(
        &mut self,
        id: CombatantId,
        skill: Skill,
        advantage: Advantage,
    ) -> Result<RollOutcome, CombatError> {
        let combatant = lookup(&self.combatants, id)?;
        Ok(self
            .resolver
            .roll_skill_check(combatant, skill, advantage, &mut self.rng))
    }

    pub fn roll_saving_throw(
        &mut self,
        id: CombatantId,
        ability: Ability,
        advantage: Advantage,
    ) -> Result<RollOutcome, CombatError> {
        let combatant = lookup(&self.combatants, id)?;
        Ok(self
            .resolver
            .roll_saving_throw(combatant, ability, advantage, &mut self.rng))
    }

    /// Damage a combatant after its take-damage hooks. Dropping to 0 hit
    /// points leaves it unconscious.
    pub fn apply_damage(
        &mut self,
        id: CombatantId,
        amount: i32,
    ) -> Result<DamageResult, CombatError> {
        let target = self.combatant(id)?;
        let amount = target
            .features()
            .chain(amount, |feature, amount| feature.on_take_damage(target, amount));
        let combatant = self.combatant_mut(id)?;
        let result = combatant.resources.take_damage(amount);
        if result.dropped_to_zero {
            info!(combatant = %combatant.name, "dropped to 0 HP");
            combatant.add_condition(Condition::Unconscious);
        }
        Ok(result)
    }

    /// Heal a combatant. Any healing above 0 hit points wakes it.
    pub fn heal(&mut self, id: CombatantId, amount: i32) -> Result<i32, CombatError> {
        let combatant = self.combatant_mut(id)?;
        let healed = combatant.resources.heal(amount);
        if combatant.is_conscious() {
            combatant.remove_condition(&Condition::Unconscious);
        }
        Ok(healed)
    }

    /// Rest outside combat.
    pub fn rest(&mut self, id: CombatantId, kind: RestKind) -> Result<(), CombatError> {
        if self.tracker.is_active() {
            return Err(CombatError::RestDuringCombat);
        }
        self.combatant_mut(id)?.resources.rest(kind);
        Ok(())
    }
}

fn lookup(
    combatants: &BTreeMap<CombatantId, Combatant>,
    id: CombatantId,
) -> Result<&Combatant, CombatError> {
    combatants.get(&id).ok_or(CombatError::UnknownCombatant(id))
}

/// Run the attacker's deal-damage hooks.
fn deal_damage(attacker: &Combatant, amount: i32) -> i32 {
    attacker
        .features()
        .chain(amount, |feature, amount| feature.on_deal_damage(attacker, amount))
}

fn check_charm(actor: &Combatant, target: &Combatant) -> Result<(), CombatError> {
    if actor.conditions().is_charmed_by(target.id) {
        Err(CombatError::Charmed(actor.name.clone(), target.name.clone()))
    } else {
        Ok(())
    }
}

fn effect_target(effect: &Effect) -> Option<EffectTarget> {
    match effect {
        Effect::Healed { target, .. }
        | Effect::Damaged { target, .. }
        | Effect::TemporaryHitPoints { target, .. }
        | Effect::EffectApplied { target, .. } => Some(*target),
        Effect::ResourceRestored { .. } | Effect::Note(_) => None,
    }
}
