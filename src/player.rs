use tracing::{debug, info};

use crate::bus::{Bus, Fanout, Outbox};
use crate::constants::INTERACT_RADIUS;
use crate::coordinator::CAUGHT_STATUS;
use crate::entity::patrol::EnemyRelease;
use crate::error::Result;
use crate::events::{AlertKind, EnemyCommand, PlayerAlert, PlayerCollect, PlayerState};
use crate::gate::MapGate;
use crate::state::GameState;
use crate::types::{Direction, EntityId, InputEvent, Outcome, Position};

pub const GUARDIAN_WARNING: &str = "Guardian: beware of the enemies!";
pub const ENEMY_ELIMINATED: &str = "Enemy eliminated!";

/// Sending side of one patrol enemy's command channel.
#[derive(Clone, Debug)]
pub struct EnemyHandle {
    pub id: EntityId,
    pub commands: Outbox<EnemyCommand>,
}

/// Hunter monsters within this many cells of the player sense it even
/// without line of sight.
const NEARBY_RANGE: i32 = 2;

enum Stride {
    Moved,
    Blocked,
    Struck,
}

/// Applies player input to the state and tells the entities about it.
pub struct PlayerProcessor {
    gate: MapGate,
    player_state: Fanout<PlayerState>,
    alerts: Fanout<PlayerAlert>,
    collects: Fanout<PlayerCollect>,
    enemies: Vec<EnemyHandle>,
    release: EnemyRelease,
}

impl PlayerProcessor {
    pub fn new(gate: MapGate, bus: &Bus, enemies: Vec<EnemyHandle>, release: EnemyRelease) -> Self {
        Self {
            gate,
            player_state: bus.player_state.clone(),
            alerts: bus.alerts.clone(),
            collects: bus.collects.clone(),
            enemies,
            release,
        }
    }

    pub async fn handle(&mut self, input: InputEvent) -> Result<()> {
        let mut state = self.gate.access().await?;
        if state.is_over() {
            return Ok(());
        }
        match input {
            InputEvent::Move(direction) => self.walk(&mut state, direction),
            InputEvent::Jump(direction) => self.jump(&mut state, direction),
            InputEvent::Interact => self.interact(&mut state),
            InputEvent::Quit => {
                state.outcome = Some(Outcome::Quit);
                info!(steps = state.steps, "player quit");
            }
        }
        Ok(())
    }

    /// Announces the player's current position to everyone listening.
    pub fn announce(&self, state: &GameState) {
        if state.is_invisible() {
            return;
        }
        self.player_state.post(PlayerState { at: state.player });
        if state
            .monsters
            .values()
            .any(|marker| marker.at.chebyshev(state.player) <= NEARBY_RANGE)
        {
            self.alerts.post(PlayerAlert {
                kind: AlertKind::Nearby,
                at: state.player,
            });
        }
    }

    fn walk(&self, state: &mut GameState, direction: Direction) {
        if let Stride::Moved = self.stride(state, direction, true) {
            self.announce(state);
        }
    }

    fn jump(&self, state: &mut GameState, direction: Direction) {
        if state.double_jumps == 0 {
            state.status = "No double jumps left".to_string();
            return;
        }
        let middle = state.player.step(direction);
        let landing = middle.step(direction);
        if !state.can_enter(middle) || !state.can_enter(landing) {
            state.status = "Nowhere to land".to_string();
            return;
        }
        state.double_jumps -= 1;
        // Items under the first stride are jumped over, not picked up.
        for landing in [false, true] {
            if !matches!(self.stride(state, direction, landing), Stride::Moved) {
                return;
            }
        }
        debug!(at = %state.player, left = state.double_jumps, "double jump");
        self.announce(state);
        self.alerts.post(PlayerAlert {
            kind: AlertKind::Noise,
            at: state.player,
        });
    }

    /// One cell of movement, with monster contact resolved on the spot.
    /// `pick_up` says whether an item on the new cell is collected.
    fn stride(&self, state: &mut GameState, direction: Direction, pick_up: bool) -> Stride {
        let target = state.player.step(direction);
        if let Some(monster) = state.monster_at(target) {
            if !state.is_invisible() {
                strike(state, monster, target);
                return Stride::Struck;
            }
        }
        let (dx, dy) = direction.delta();
        let Some(under) = state.move_player(dx, dy) else {
            return Stride::Blocked;
        };
        if pick_up && under.kind.is_collectible() {
            self.collects.post(PlayerCollect { at: state.player });
        }
        Stride::Moved
    }

    fn interact(&mut self, state: &mut GameState) {
        let player = state.player;
        let near_guardian = state
            .guardians
            .values()
            .any(|at| at.chebyshev(player) <= 1);
        if near_guardian && self.release.fire() {
            state.enemies_released = true;
            state.status = GUARDIAN_WARNING.to_string();
            info!(at = %player, "enemies released by interaction");
        }

        if state.enemies_released {
            let in_reach: Vec<EntityId> = state
                .enemies
                .iter()
                .filter(|(_, at)| at.distance(player) <= INTERACT_RADIUS)
                .map(|(id, _)| *id)
                .collect();
            for id in in_reach {
                let Some(index) = self.enemies.iter().position(|handle| handle.id == id) else {
                    continue;
                };
                if self.enemies[index].commands.post(EnemyCommand::Stop) {
                    self.enemies.swap_remove(index);
                    state.status = ENEMY_ELIMINATED.to_string();
                    info!(entity = %id, "enemy eliminated");
                }
            }
        }

        self.alerts.post(PlayerAlert {
            kind: AlertKind::Noise,
            at: player,
        });
    }
}

/// The player walked into a monster.
fn strike(state: &mut GameState, monster: EntityId, at: Position) {
    if state.lives > 0 {
        state.lives -= 1;
        state.status = format!("You ran into {monster}! Lives left: {}", state.lives);
        return;
    }
    state.status = CAUGHT_STATUS.to_string();
    state.outcome = Some(Outcome::Caught { by: monster });
    info!(entity = %monster, %at, "player walked into a monster");
}
