//! Central authority over the game state.
//!
//! Entities never touch the roster or the counters themselves; they post a
//! [`GameEvent`] and the coordinator validates it against the current state
//! before applying it. Follow-up events that a resolution produces (a monster
//! stepping onto the player, for one) are settled in the same pass so they
//! cannot be lost to a full channel.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info, trace};

use crate::bus::Outbox;
use crate::entity::guardian::MEETING_STATUS;
use crate::entity::star::BonusKind;
use crate::error::Result;
use crate::events::{GameEvent, MonsterFeedback};
use crate::gate::MapGate;
use crate::state::GameState;
use crate::types::{EntityId, Outcome, Position};

pub const CAUGHT_STATUS: &str = "GAME OVER! You were caught by the monster!";

pub struct Coordinator {
    gate: MapGate,
    feedback: BTreeMap<EntityId, Outbox<MonsterFeedback>>,
    handled: u64,
}

impl Coordinator {
    pub fn new(gate: MapGate, feedback: BTreeMap<EntityId, Outbox<MonsterFeedback>>) -> Self {
        Self {
            gate,
            feedback,
            handled: 0,
        }
    }

    pub fn handled(&self) -> u64 {
        self.handled
    }

    pub async fn handle(&mut self, event: GameEvent) -> Result<()> {
        let mut state = self.gate.access().await?;
        self.resolve(&mut state, event);
        Ok(())
    }

    /// Applies one event and everything it gives rise to.
    pub fn resolve(&mut self, state: &mut GameState, event: GameEvent) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            self.handled += 1;
            trace!(?event, "resolving");
            if state.is_over() {
                if let GameEvent::MonsterMove { id, .. } = event {
                    self.reply(id, MonsterFeedback::Rejected);
                }
                continue;
            }
            self.apply(state, event, &mut pending);
        }
    }

    fn apply(&self, state: &mut GameState, event: GameEvent, pending: &mut VecDeque<GameEvent>) {
        match event {
            GameEvent::MonsterMove { id, from, to } => {
                let verdict = self.judge_move(state, id, from, to, pending);
                self.reply(id, verdict);
            }
            GameEvent::MonsterModeChanged { id, mode } => {
                if let Some(marker) = state.monsters.get_mut(&id) {
                    marker.mode = mode;
                }
            }
            GameEvent::MonsterTimeout { message, .. } => {
                state.status = format!("Alert: {message}");
            }
            GameEvent::MonsterCollision { id, at } => {
                if state.lives > 0 {
                    state.lives -= 1;
                    state.status = format!("{id} hit you! Lives left: {}", state.lives);
                    info!(entity = %id, %at, lives = state.lives, "life lost");
                } else {
                    state.status = CAUGHT_STATUS.to_string();
                    state.outcome = Some(Outcome::Caught { by: id });
                    info!(entity = %id, %at, "player caught");
                }
            }
            GameEvent::RemoveItem { id, at } => {
                if !state.clear_item(at) {
                    debug!(entity = %id, %at, "nothing left to remove");
                }
            }
            GameEvent::ApplyInvisibility { steps, .. } => {
                state.invisible_steps = steps;
                state.status = "Invisibility collected!".to_string();
            }
            GameEvent::StarCollected { bonus, jumps, .. } => {
                match bonus.kind {
                    BonusKind::Score | BonusKind::Power => state.score += bonus.value,
                    BonusKind::Life => state.lives += bonus.value,
                }
                state.double_jumps += jumps;
                state.status = format!(
                    "Star collected! {} +{}, double jump x{}",
                    bonus.kind.label(),
                    bonus.value,
                    state.double_jumps
                );
            }
            GameEvent::StarStateChanged { id, to, .. } => {
                state.status = format!("{id} is now {}", to.label());
            }
            GameEvent::StarPulse { pulses, .. } => {
                state.status = format!("Star pulsing ({pulses} pulses)");
            }
            GameEvent::StarCharged { energy, .. } => {
                state.status = format!("Star charged! Energy: {energy}");
            }
            GameEvent::StarTimeout { id, action, .. } => {
                state.status = format!("{id} grew restless and chose to {}", action.label());
            }
            GameEvent::StarCommunicated { message, .. } => {
                state.status = format!("Stars communicating: {}", message.label());
            }
            GameEvent::GuardianMet { id } => {
                state.enemies_released = true;
                state.status = MEETING_STATUS.to_string();
                debug!(entity = %id, "guardian meeting acknowledged");
            }
        }
    }

    fn judge_move(
        &self,
        state: &mut GameState,
        id: EntityId,
        from: Position,
        to: Position,
        pending: &mut VecDeque<GameEvent>,
    ) -> MonsterFeedback {
        let Some(marker) = state.monsters.get(&id).copied() else {
            return MonsterFeedback::Rejected;
        };
        if marker.at != from {
            // Stale proposal; pull the monster back in line with the roster.
            return MonsterFeedback::Placed(marker.at);
        }
        let (dx, dy) = (to.x - from.x, to.y - from.y);
        if (dx == 0 && dy == 0) || dx.abs() > 1 || dy.abs() > 1 {
            return MonsterFeedback::Rejected;
        }
        if to == state.player {
            if state.is_invisible() {
                return MonsterFeedback::Rejected;
            }
            let spared = state.lives > 0;
            pending.push_back(GameEvent::MonsterCollision { id, at: to });
            if spared {
                return MonsterFeedback::Rejected;
            }
        } else if !state.can_enter(to) || state.monster_at(to).is_some() {
            return MonsterFeedback::Rejected;
        }
        if let Some(marker) = state.monsters.get_mut(&id) {
            marker.at = to;
        }
        MonsterFeedback::Placed(to)
    }

    fn reply(&self, id: EntityId, verdict: MonsterFeedback) {
        if let Some(outbox) = self.feedback.get(&id) {
            outbox.post(verdict);
        }
    }
}
