//! Initiative order, rounds and turn boundaries.
//!
//! The tracker is idle until [`CombatTracker::start_combat`] and goes back to
//! idle on [`CombatTracker::end_combat`]. It only stores ids and rolled
//! initiative; combat and turn bookkeeping on the combatants themselves goes
//! through a [`Roster`].

use crate::combatant::{Actor, Combatant, CombatantId};
use crate::dice::{Advantage, DieSource};
use crate::resolver::Resolver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Whoever owns the combatants the tracker orders.
pub trait Roster {
    fn start_turn(&mut self, id: CombatantId);
    fn end_turn(&mut self, id: CombatantId);
    fn combat_started(&mut self, id: CombatantId);
    fn combat_ended(&mut self, id: CombatantId);
}

impl Roster for BTreeMap<CombatantId, Combatant> {
    fn combat_started(&mut self, id: CombatantId) {
        if let Some(combatant) = self.get_mut(&id) {
            combatant.start_combat();
        }
    }

    fn combat_ended(&mut self, id: CombatantId) {
        if let Some(combatant) = self.get_mut(&id) {
            combatant.end_combat();
        }
    }

    fn start_turn(&mut self, id: CombatantId) {
        if let Some(combatant) = self.get_mut(&id) {
            combatant.start_turn();
        }
    }

    fn end_turn(&mut self, id: CombatantId) {
        if let Some(combatant) = self.get_mut(&id) {
            combatant.end_turn();
        }
    }
}

/// One combatant's place in the initiative order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeEntry {
    pub id: CombatantId,
    pub name: String,
    pub initiative: i32,
    /// Initiative modifier, the first tie-breaker.
    pub modifier: i32,
    /// Registration order, the final tie-breaker.
    sequence: u64,
}

/// Combat turn tracking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombatTracker {
    entries: Vec<InitiativeEntry>,
    turn_index: usize,
    round: u32,
    active: bool,
    next_sequence: u64,
}

impl CombatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current round, starting at 1. Zero before combat starts.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn turn_index(&self) -> usize {
        self.turn_index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: CombatantId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Entries in turn order.
    pub fn order(&self) -> &[InitiativeEntry] {
        &self.entries
    }

    pub fn initiative_of(&self, id: CombatantId) -> Option<i32> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.initiative)
    }

    /// The combatant whose turn it is; `None` when idle.
    pub fn current_combatant(&self) -> Option<CombatantId> {
        if !self.active {
            return None;
        }
        self.entries.get(self.turn_index).map(|e| e.id)
    }

    /// Roll initiative for a new combatant and place it in the order.
    ///
    /// A combatant already present keeps the value it rolled before.
    pub fn add_combatant(
        &mut self,
        id: CombatantId,
        actor: &dyn Actor,
        resolver: &Resolver,
        dice: &mut dyn DieSource,
    ) -> i32 {
        if let Some(initiative) = self.initiative_of(id) {
            warn!(combatant = actor.name(), "already in initiative; keeping roll");
            return initiative;
        }
        let roll = resolver.roll_initiative(actor, Advantage::Normal, dice);
        debug!(combatant = actor.name(), roll = %roll, "initiative rolled");
        self.insert(id, actor.name(), roll.total(), actor.initiative_modifier());
        roll.total()
    }

    /// Place a combatant with an initiative rolled elsewhere.
    pub fn add_with_initiative(
        &mut self,
        id: CombatantId,
        name: impl Into<String>,
        initiative: i32,
        modifier: i32,
    ) -> i32 {
        if let Some(existing) = self.initiative_of(id) {
            warn!(%id, "already in initiative; keeping roll");
            return existing;
        }
        self.insert(id, name.into(), initiative, modifier);
        initiative
    }

    fn insert(&mut self, id: CombatantId, name: impl Into<String>, initiative: i32, modifier: i32) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.push(InitiativeEntry {
            id,
            name: name.into(),
            initiative,
            modifier,
            sequence,
        });
        self.resort();
    }

    /// Remove a combatant. During combat it leaves through
    /// [`Roster::combat_ended`]. If it was the current one, the next in order
    /// becomes current (wrapping into the next round past the end) and its
    /// turn starts.
    pub fn remove_combatant(
        &mut self,
        id: CombatantId,
        roster: &mut dyn Roster,
    ) -> Option<InitiativeEntry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        let was_current = self.active && index == self.turn_index;
        let entry = self.entries.remove(index);

        if index < self.turn_index {
            self.turn_index -= 1;
        } else if was_current && self.turn_index >= self.entries.len() {
            self.turn_index = 0;
            self.round += 1;
        }
        debug!(combatant = %entry.name, "removed from initiative");

        if self.active {
            roster.combat_ended(id);
        }
        if was_current {
            if let Some(next) = self.current_combatant() {
                debug!(round = self.round, %next, "turn passed on removal");
                roster.start_turn(next);
            }
        }
        Some(entry)
    }

    /// Sort by initiative, then modifier, then registration. Never rerolls.
    /// The current combatant stays current.
    fn resort(&mut self) {
        let current = self.current_combatant();
        self.entries.sort_by(|a, b| {
            b.initiative
                .cmp(&a.initiative)
                .then(b.modifier.cmp(&a.modifier))
                .then(a.sequence.cmp(&b.sequence))
        });
        if let Some(id) = current {
            if let Some(index) = self.entries.iter().position(|e| e.id == id) {
                self.turn_index = index;
            }
        }
    }

    /// Begin round 1 with the highest initiative. Every combatant enters
    /// combat before the first turn starts.
    pub fn start_combat(&mut self, roster: &mut dyn Roster) -> Option<CombatantId> {
        self.active = true;
        self.round = 1;
        self.turn_index = 0;
        self.resort();
        for entry in &self.entries {
            roster.combat_started(entry.id);
        }
        let first = self.current_combatant()?;
        debug!(combatants = self.entries.len(), "combat started");
        roster.start_turn(first);
        Some(first)
    }

    /// End the current turn and start the next one. Returns the new current
    /// combatant, or `None` when idle or empty.
    pub fn next_turn(&mut self, roster: &mut dyn Roster) -> Option<CombatantId> {
        let ending = self.current_combatant()?;
        roster.end_turn(ending);

        self.turn_index += 1;
        if self.turn_index >= self.entries.len() {
            self.turn_index = 0;
            self.round += 1;
        }

        let next = self.entries.get(self.turn_index)?;
        debug!(round = self.round, combatant = %next.name, "turn started");
        let id = next.id;
        roster.start_turn(id);
        Some(id)
    }

    /// Return to idle. Combat-end bookkeeping runs once, in turn order.
    pub fn end_combat(&mut self, roster: &mut dyn Roster) {
        if self.active {
            for entry in &self.entries {
                roster.combat_ended(entry.id);
            }
        }
        self.active = false;
        self.turn_index = 0;
        debug!(rounds = self.round, "combat ended");
    }
}
