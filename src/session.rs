//! One game from map load to outcome.
//!
//! The session wires every entity actor to the bus and the map gate, then
//! drives the main loop: player input, entity events and an idle tick, each
//! followed by a render. When the loop ends it cancels the actors and waits
//! for all of them before reporting.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::bus::{shutdown_pair, Bus, Outbox};
use crate::config::GameConfig;
use crate::constants::COMMAND_CAPACITY;
use crate::coordinator::Coordinator;
use crate::entity::collectible::InvisibilityActor;
use crate::entity::guardian::GuardianActor;
use crate::entity::monster::{MonsterActor, MonsterBrain, MonsterMode};
use crate::entity::patrol::{EnemyActor, EnemyRelease, Walker};
use crate::entity::star::{StarActor, StarBrain};
use crate::error::Result;
use crate::events::PlayerState;
use crate::gate::MapGate;
use crate::player::{EnemyHandle, PlayerProcessor};
use crate::rng::Rng;
use crate::state::{GameState, GameView, MonsterMarker};
use crate::types::{EntityId, EntityKind, InputEvent, Outcome};
use crate::world::{GlyphTable, LoadedMap};

/// Front-end that shows a frame after every change.
pub trait Renderer {
    fn draw(&mut self, view: &GameView) -> std::io::Result<()>;
}

/// Renderer that only remembers the last frame.
#[derive(Debug, Default)]
pub struct Headless {
    pub frames: u64,
    pub last: Option<GameView>,
}

impl Renderer for Headless {
    fn draw(&mut self, view: &GameView) -> std::io::Result<()> {
        self.frames += 1;
        self.last = Some(view.clone());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub seed: u32,
    pub outcome: Outcome,
    pub score: u32,
    pub lives: u32,
    pub double_jumps: u32,
    pub steps: u64,
    pub events_handled: u64,
    pub events_sent: u64,
    pub events_dropped: u64,
}

pub struct Session {
    config: GameConfig,
    map: LoadedMap,
    glyphs: Arc<GlyphTable>,
    seed: u32,
}

impl Session {
    pub fn new(config: GameConfig, map: LoadedMap, glyphs: Arc<GlyphTable>) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        Self {
            config,
            map,
            glyphs,
            seed,
        }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Runs until the player quits, gets caught, or the input source closes.
    pub async fn run<R: Renderer>(
        self,
        mut inputs: mpsc::Receiver<InputEvent>,
        renderer: &mut R,
    ) -> Result<SessionReport> {
        let Self {
            config,
            map,
            glyphs,
            seed,
        } = self;
        let spawns = map.spawns.clone();
        let (bus, mut events) = Bus::new(config.channel_capacity);
        let (trigger, shutdown) = shutdown_pair();

        let mut state = GameState::new(map, glyphs.clone());
        for (index, at) in spawns.monsters.iter().enumerate() {
            let id = EntityId::new(EntityKind::Monster, index);
            state.monsters.insert(
                id,
                MonsterMarker {
                    id,
                    at: *at,
                    mode: MonsterMode::Patrolling,
                },
            );
        }
        for (index, at) in spawns.enemies.iter().enumerate() {
            state
                .enemies
                .insert(EntityId::new(EntityKind::Enemy, index), *at);
        }
        for (index, at) in spawns.guardians.iter().enumerate() {
            state
                .guardians
                .insert(EntityId::new(EntityKind::Guardian, index), *at);
        }
        let (width, height) = (state.grid.width(), state.grid.height());
        let start = state.player;
        let gate = MapGate::new(config.gate, state);

        let mut actors = JoinSet::new();
        let mut entity = 0usize;
        let mut next_rng = || {
            entity += 1;
            Rng::for_entity(seed, entity)
        };

        let mut feedback = BTreeMap::new();
        for (index, at) in spawns.monsters.iter().enumerate() {
            let id = EntityId::new(EntityKind::Monster, index);
            let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
            feedback.insert(id, Outbox::new(tx, bus.stats.clone()));
            let brain = MonsterBrain::new(
                id,
                *at,
                config.monster,
                width,
                height,
                next_rng(),
            );
            actors.spawn(
                MonsterActor {
                    brain,
                    events: bus.events.clone(),
                    player_state: bus.player_state.subscribe(),
                    alerts: bus.alerts.subscribe(),
                    feedback: rx,
                    shutdown: shutdown.clone(),
                }
                .run(),
            );
        }

        let release = EnemyRelease::default();
        let mut handles = Vec::new();
        for (index, at) in spawns.enemies.iter().enumerate() {
            let id = EntityId::new(EntityKind::Enemy, index);
            let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
            handles.push(EnemyHandle {
                id,
                commands: Outbox::new(tx, bus.stats.clone()),
            });
            actors.spawn(
                EnemyActor {
                    walker: Walker::new(id, *at, glyphs.enemy, glyphs.empty),
                    lethal: config.lethal_enemies,
                    gate: gate.clone(),
                    commands: rx,
                    release: release.subscribe(),
                    tick: config.patrol_tick(),
                    shutdown: shutdown.clone(),
                }
                .run(),
            );
        }

        for (index, at) in spawns.guardians.iter().enumerate() {
            let id = EntityId::new(EntityKind::Guardian, index);
            actors.spawn(
                GuardianActor {
                    walker: Walker::new(id, *at, glyphs.guardian, glyphs.empty),
                    gate: gate.clone(),
                    events: bus.events.clone(),
                    release: release.clone(),
                    tick: config.patrol_tick(),
                    shutdown: shutdown.clone(),
                }
                .run(),
            );
        }

        for (index, at) in spawns.stars.iter().enumerate() {
            let id = EntityId::new(EntityKind::Star, index);
            actors.spawn(
                StarActor {
                    brain: StarBrain::new(id, *at, next_rng()),
                    jumps: config.star_jump_grant,
                    gate: gate.clone(),
                    events: bus.events.clone(),
                    commands: bus.star_commands.clone(),
                    command_rx: bus.star_commands.subscribe(),
                    player_state: bus.player_state.subscribe(),
                    collects: bus.collects.subscribe(),
                    shutdown: shutdown.clone(),
                }
                .run(),
            );
        }

        for (index, at) in spawns.invisibility.iter().enumerate() {
            actors.spawn(
                InvisibilityActor {
                    id: EntityId::new(EntityKind::Invisibility, index),
                    at: *at,
                    steps: config.invisibility_steps,
                    events: bus.events.clone(),
                    collects: bus.collects.subscribe(),
                    shutdown: shutdown.clone(),
                }
                .run(),
            );
        }
        info!(
            seed,
            actors = actors.len(),
            gate = ?config.gate,
            %start,
            "session started"
        );

        let mut coordinator = Coordinator::new(gate.clone(), feedback);
        let mut player = PlayerProcessor::new(gate.clone(), &bus, handles, release);
        bus.player_state.post(PlayerState { at: start });

        let mut idle = time::interval(config.idle_tick());
        idle.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut view = gate.access().await?.view();
        renderer.draw(&view)?;

        let outcome = loop {
            tokio::select! {
                input = inputs.recv() => match input {
                    Some(input) => player.handle(input).await?,
                    None => {
                        let mut state = gate.access().await?;
                        if state.outcome.is_none() {
                            state.outcome = Some(Outcome::InputClosed);
                        }
                    }
                },
                Some(event) = events.recv() => coordinator.handle(event).await?,
                _ = idle.tick() => {}
            }
            view = gate.access().await?.view();
            renderer.draw(&view)?;
            if let Some(outcome) = view.outcome {
                break outcome;
            }
        };

        trigger.trigger();
        while let Some(joined) = actors.join_next().await {
            if let Err(err) = joined {
                warn!(%err, "actor task failed");
            }
        }
        debug!("all actors stopped");

        let report = SessionReport {
            seed,
            outcome,
            score: view.score,
            lives: view.lives,
            double_jumps: view.double_jumps,
            steps: view.steps,
            events_handled: coordinator.handled(),
            events_sent: bus.stats.sent(),
            events_dropped: bus.stats.dropped(),
        };
        info!(?report, "session finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::GateKind;
    use crate::types::{Direction, Position};
    use crate::world::{parse_map, CellKind};

    fn session(text: &str, gate: GateKind) -> Session {
        let glyphs = Arc::new(GlyphTable::default());
        let map = parse_map(text, &glyphs).unwrap();
        let config = GameConfig {
            gate,
            seed: Some(1),
            ..GameConfig::default()
        };
        Session::new(config, map, glyphs)
    }

    async fn feed(tx: mpsc::Sender<InputEvent>, inputs: Vec<InputEvent>) {
        for input in inputs {
            time::sleep(Duration::from_millis(100)).await;
            tx.send(input).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn closed_input_ends_session() {
        let (tx, rx) = mpsc::channel(4);
        drop(tx);
        let mut renderer = Headless::default();
        let report = session("▤▤▤\n▤☺ ▤\n▤▤▤", GateKind::Lock)
            .run(rx, &mut renderer)
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::InputClosed);
        assert_eq!(report.steps, 0);
        let view = renderer.last.unwrap();
        assert_eq!(view.player, Position::new(1, 1));
        assert!(view.grid.can_enter(Position::new(1, 1)));
        assert!(!view.grid.can_enter(Position::new(0, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn star_pickup_is_applied_once_and_cell_empties() {
        for gate in [GateKind::Lock, GateKind::Broker] {
            let (tx, rx) = mpsc::channel(4);
            let script = tokio::spawn(feed(
                tx,
                vec![
                    InputEvent::Move(Direction::Right),
                    InputEvent::Move(Direction::Left),
                    InputEvent::Quit,
                ],
            ));
            let mut renderer = Headless::default();
            let report = session("▤▤▤▤▤\n▤☺★ ▤\n▤▤▤▤▤", gate)
                .run(rx, &mut renderer)
                .await
                .unwrap();
            script.await.unwrap();

            assert_eq!(report.outcome, Outcome::Quit);
            assert_eq!(report.double_jumps, 2);
            assert!(report.score >= 100);
            let view = renderer.last.unwrap();
            assert_eq!(view.player, Position::new(1, 1));
            assert_eq!(view.grid.get(Position::new(2, 1)).unwrap().kind, CellKind::Empty);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hunter_catches_idle_player() {
        for gate in [GateKind::Lock, GateKind::Broker] {
            let (_tx, rx) = mpsc::channel(4);
            let mut renderer = Headless::default();
            let report = session("☺  ☠", gate).run(rx, &mut renderer).await.unwrap();
            assert_eq!(
                report.outcome,
                Outcome::Caught {
                    by: EntityId::new(EntityKind::Monster, 0)
                }
            );
            assert!(renderer.frames > 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quit_stops_every_actor() {
        let (tx, rx) = mpsc::channel(4);
        let script = tokio::spawn(feed(tx, vec![InputEvent::Quit]));
        let mut renderer = Headless::default();
        let report = session("☺ ★ ¤ ☣ ☥", GateKind::Broker)
            .run(rx, &mut renderer)
            .await
            .unwrap();
        script.await.unwrap();
        assert_eq!(report.outcome, Outcome::Quit);
        assert_eq!(report.seed, 1);
    }
}
