use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::bus::{Outbox, Shutdown};
use crate::entity::patrol::{Advance, EnemyRelease, Walker};
use crate::events::GameEvent;
use crate::gate::MapGate;
use crate::state::GameState;

pub const MEETING_STATUS: &str = "Guardian: you received a sword! Beware of the enemies!";

pub struct GuardianActor {
    pub walker: Walker,
    pub gate: MapGate,
    pub events: Outbox<GameEvent>,
    pub release: EnemyRelease,
    pub tick: Duration,
    pub shutdown: Shutdown,
}

impl GuardianActor {
    pub async fn run(self) {
        let Self {
            mut walker,
            gate,
            events,
            release,
            tick,
            mut shutdown,
        } = self;

        let mut ticker = time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let Ok(mut state) = gate.access().await else {
                        break;
                    };
                    if state.is_over() {
                        break;
                    }
                    if let Advance::Moved(at) = walker.advance(&mut state) {
                        state.guardians.insert(walker.id, at);
                    }
                    if meet(&walker, &mut state, &release) {
                        events.post(GameEvent::GuardianMet { id: walker.id });
                    }
                }
            }
        }
        debug!(entity = %walker.id, "guardian stopped");
    }
}

/// Releases the enemies the first time the player stands next to the
/// guardian.
fn meet(walker: &Walker, state: &mut GameState, release: &EnemyRelease) -> bool {
    if walker.position.chebyshev(state.player) > 1 || !release.fire() {
        return false;
    }
    state.enemies_released = true;
    state.status = MEETING_STATUS.to_string();
    info!(entity = %walker.id, at = %walker.position, "player met the guardian");
    true
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::bus::{shutdown_pair, BusStats};
    use crate::types::{EntityId, EntityKind, Position};
    use crate::world::{parse_map, GlyphTable};

    const ID: EntityId = EntityId::new(EntityKind::Guardian, 0);

    fn state(text: &str) -> GameState {
        let glyphs = Arc::new(GlyphTable::default());
        GameState::new(parse_map(text, &glyphs).unwrap(), glyphs)
    }

    #[test]
    fn meeting_happens_once() {
        let mut state = state("☥☺");
        let walker = Walker::new(ID, Position::new(0, 0), state.glyphs.guardian, state.glyphs.empty);
        let release = EnemyRelease::default();
        assert!(meet(&walker, &mut state, &release));
        assert!(state.enemies_released);
        assert_eq!(state.status, MEETING_STATUS);
        assert!(!meet(&walker, &mut state, &release));
    }

    #[test]
    fn distant_guardian_keeps_enemies_caged() {
        let mut state = state("☥  ☺");
        let walker = Walker::new(ID, Position::new(0, 0), state.glyphs.guardian, state.glyphs.empty);
        let release = EnemyRelease::default();
        assert!(!meet(&walker, &mut state, &release));
        assert!(!release.is_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn guardian_walks_up_to_player_and_reports_meeting() {
        let mut state = state("☥   ☺");
        state.guardians.insert(ID, Position::new(0, 0));
        let walker = Walker::new(ID, Position::new(0, 0), state.glyphs.guardian, state.glyphs.empty);
        let gate = MapGate::lock(state);
        let (tx, mut rx) = mpsc::channel(4);
        let release = EnemyRelease::default();
        let (trigger, shutdown) = shutdown_pair();
        let task = tokio::spawn(
            GuardianActor {
                walker,
                gate: gate.clone(),
                events: Outbox::new(tx, Arc::new(BusStats::default())),
                release: release.clone(),
                tick: Duration::from_millis(300),
                shutdown,
            }
            .run(),
        );

        assert_eq!(rx.recv().await, Some(GameEvent::GuardianMet { id: ID }));
        assert!(release.is_fired());
        assert_eq!(gate.access().await.unwrap().guardians[&ID], Position::new(3, 0));
        trigger.trigger();
        task.await.unwrap();
    }
}
