use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::bus::Shutdown;
use crate::events::EnemyCommand;
use crate::gate::MapGate;
use crate::state::GameState;
use crate::types::{EntityId, Outcome, Position};
use crate::world::Cell;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
    Moved(Position),
    Turned,
    Bumped,
}

/// Something written into the grid that paces back and forth along its row.
#[derive(Clone, Debug)]
pub struct Walker {
    pub id: EntityId,
    pub position: Position,
    pub facing: i32,
    pub under: Cell,
    pub look: Cell,
}

impl Walker {
    pub fn new(id: EntityId, position: Position, look: Cell, under: Cell) -> Self {
        Self {
            id,
            position,
            facing: 1,
            under,
            look,
        }
    }

    /// One horizontal step, turning around at walls, map edges, items and
    /// anything impassable. Walking into the player is reported, not
    /// performed.
    pub fn advance(&mut self, state: &mut GameState) -> Advance {
        let ahead = self.position.offset(self.facing, 0);
        if ahead == state.player {
            self.facing = -self.facing;
            return Advance::Bumped;
        }
        // Walkers never cover items.
        let item_ahead = state
            .grid
            .get(ahead)
            .is_some_and(|cell| cell.kind.is_collectible());
        if item_ahead
            || !state.can_enter(ahead)
            || !state
                .grid
                .move_occupant(self.position, self.facing, 0, &mut self.under)
        {
            self.facing = -self.facing;
            return Advance::Turned;
        }
        self.position = ahead;
        Advance::Moved(ahead)
    }

    /// Takes the walker off the grid, putting back what it stood on.
    pub fn vacate(&self, state: &mut GameState) {
        if state.grid.get(self.position) == Some(self.look) {
            state.grid.set(self.position, self.under);
        }
    }
}

/// One-way switch that lets the patrol enemies loose.
#[derive(Clone, Debug)]
pub struct EnemyRelease {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for EnemyRelease {
    fn default() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
}

impl EnemyRelease {
    /// Returns true only for the call that actually flipped the switch.
    pub fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

pub struct EnemyActor {
    pub walker: Walker,
    pub lethal: bool,
    pub gate: MapGate,
    pub commands: mpsc::Receiver<EnemyCommand>,
    pub release: watch::Receiver<bool>,
    pub tick: Duration,
    pub shutdown: Shutdown,
}

impl EnemyActor {
    pub async fn run(self) {
        let Self {
            mut walker,
            lethal,
            gate,
            mut commands,
            mut release,
            tick,
            mut shutdown,
        } = self;
        let id = walker.id;

        tokio::select! {
            _ = shutdown.cancelled() => return,
            fired = released(&mut release) => {
                if !fired {
                    return;
                }
            }
            command = commands.recv() => {
                if let Some(EnemyCommand::Stop) = command {
                    remove(&gate, &walker).await;
                }
                return;
            }
        }
        debug!(entity = %id, at = %walker.position, "enemy released");

        let mut ticker = time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                command = commands.recv() => {
                    if let Some(EnemyCommand::Stop) = command {
                        remove(&gate, &walker).await;
                    }
                    break;
                }
                _ = ticker.tick() => {
                    let Ok(mut state) = gate.access().await else {
                        break;
                    };
                    if state.is_over() {
                        break;
                    }
                    match walker.advance(&mut state) {
                        Advance::Moved(at) => {
                            state.enemies.insert(id, at);
                        }
                        Advance::Bumped if lethal => {
                            state.status = "You were defeated!".to_string();
                            state.outcome = Some(Outcome::Caught { by: id });
                            info!(entity = %id, at = %walker.position, "enemy caught the player");
                            break;
                        }
                        Advance::Bumped | Advance::Turned => {}
                    }
                }
            }
        }
        debug!(entity = %id, "enemy stopped");
    }
}

/// False when every release handle is gone without firing.
pub async fn released(release: &mut watch::Receiver<bool>) -> bool {
    release.wait_for(|fired| *fired).await.is_ok()
}

async fn remove(gate: &MapGate, walker: &Walker) {
    match gate.access().await {
        Ok(mut state) => {
            walker.vacate(&mut state);
            state.enemies.remove(&walker.id);
            debug!(entity = %walker.id, "enemy removed");
        }
        Err(err) => warn!(entity = %walker.id, %err, "enemy could not reach the map"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{shutdown_pair, ShutdownTrigger};
    use crate::types::EntityKind;
    use crate::world::{parse_map, GlyphTable};

    const ID: EntityId = EntityId::new(EntityKind::Enemy, 0);

    fn state(text: &str) -> GameState {
        let glyphs = Arc::new(GlyphTable::default());
        GameState::new(parse_map(text, &glyphs).unwrap(), glyphs)
    }

    fn walker(state: &GameState, at: Position) -> Walker {
        Walker::new(ID, at, state.glyphs.enemy, state.glyphs.empty)
    }

    #[test]
    fn walker_bounces_between_walls() {
        let mut state = state("▤☣  ▤\n☺");
        let mut walker = walker(&state, Position::new(1, 0));
        assert_eq!(walker.advance(&mut state), Advance::Moved(Position::new(2, 0)));
        assert_eq!(walker.advance(&mut state), Advance::Moved(Position::new(3, 0)));
        assert_eq!(walker.advance(&mut state), Advance::Turned);
        assert_eq!(walker.advance(&mut state), Advance::Moved(Position::new(2, 0)));
        assert_eq!(state.grid.get(Position::new(2, 0)), Some(state.glyphs.enemy));
        assert_eq!(state.grid.get(Position::new(3, 0)), Some(state.glyphs.empty));
    }

    #[test]
    fn walker_turns_at_map_edge() {
        let mut state = state("☣ \n☺");
        let mut walker = walker(&state, Position::new(0, 0));
        assert_eq!(walker.advance(&mut state), Advance::Moved(Position::new(1, 0)));
        assert_eq!(walker.advance(&mut state), Advance::Turned);
    }

    #[test]
    fn walker_restores_vegetation_it_crosses() {
        let mut state = state("☣♣ \n☺");
        let mut walker = walker(&state, Position::new(0, 0));
        walker.advance(&mut state);
        walker.advance(&mut state);
        assert_eq!(state.grid.get(Position::new(1, 0)), Some(state.glyphs.vegetation));
    }

    #[test]
    fn walker_turns_at_items_and_leaves_them_alone() {
        let mut state = state("☣★  \n☺");
        let mut walker = walker(&state, Position::new(0, 0));
        assert_eq!(walker.advance(&mut state), Advance::Turned);
        assert_eq!(walker.position, Position::new(0, 0));

        assert!(state.paint_star(Position::new(1, 0), state.glyphs.star_hidden));
        walker.advance(&mut state);
        walker.advance(&mut state);
        assert_eq!(state.grid.get(Position::new(1, 0)), Some(state.glyphs.star_hidden));

        let mut state = self::state("☣ ¤\n☺");
        let mut walker = self::walker(&state, Position::new(0, 0));
        assert_eq!(walker.advance(&mut state), Advance::Moved(Position::new(1, 0)));
        assert_eq!(walker.advance(&mut state), Advance::Turned);
        assert_eq!(state.grid.get(Position::new(2, 0)), Some(state.glyphs.invisibility));
    }

    #[test]
    fn walker_reports_player_ahead() {
        let mut state = state("☣☺");
        let mut walker = walker(&state, Position::new(0, 0));
        assert_eq!(walker.advance(&mut state), Advance::Bumped);
        assert_eq!(walker.position, Position::new(0, 0));
    }

    #[test]
    fn release_fires_once() {
        let release = EnemyRelease::default();
        assert!(!release.is_fired());
        assert!(release.fire());
        assert!(!release.fire());
        assert!(release.is_fired());
    }

    type Spawned = (
        MapGate,
        EnemyRelease,
        mpsc::Sender<EnemyCommand>,
        ShutdownTrigger,
        tokio::task::JoinHandle<()>,
    );

    fn spawn(text: &str, at: Position, lethal: bool) -> Spawned {
        let mut state = state(text);
        state.enemies.insert(ID, at);
        let walker = walker(&state, at);
        let gate = MapGate::lock(state);
        let release = EnemyRelease::default();
        let (tx, commands) = mpsc::channel(4);
        let (trigger, shutdown) = shutdown_pair();
        let task = tokio::spawn(
            EnemyActor {
                walker,
                lethal,
                gate: gate.clone(),
                commands,
                release: release.subscribe(),
                tick: Duration::from_millis(300),
                shutdown,
            }
            .run(),
        );
        (gate, release, tx, trigger, task)
    }

    #[tokio::test(start_paused = true)]
    async fn enemy_waits_for_release() {
        let (gate, release, _tx, trigger, task) = spawn("☣   \n☺", Position::new(0, 0), true);
        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(gate.access().await.unwrap().enemies[&ID], Position::new(0, 0));

        release.fire();
        time::sleep(Duration::from_millis(350)).await;
        assert_ne!(gate.access().await.unwrap().enemies[&ID], Position::new(0, 0));
        trigger.trigger();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_command_removes_enemy() {
        let (gate, release, tx, _trigger, task) = spawn("☣   \n☺", Position::new(0, 0), true);
        release.fire();
        time::sleep(Duration::from_millis(400)).await;
        tx.send(EnemyCommand::Stop).await.unwrap();
        task.await.unwrap();

        let state = gate.access().await.unwrap();
        assert!(state.enemies.is_empty());
        assert!(state
            .grid
            .rows()
            .iter()
            .flatten()
            .all(|cell| *cell != state.glyphs.enemy));
    }

    #[tokio::test(start_paused = true)]
    async fn lethal_enemy_ends_session_on_contact() {
        let (gate, release, _tx, _trigger, task) = spawn("☣ ☺", Position::new(0, 0), true);
        release.fire();
        task.await.unwrap();
        let state = gate.access().await.unwrap();
        assert_eq!(state.outcome, Some(Outcome::Caught { by: ID }));
        assert_eq!(state.status, "You were defeated!");
    }
}
