use std::pin::pin;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::bus::{delivery, Delivery, Outbox, Shutdown};
use crate::config::MonsterProfile;
use crate::events::{GameEvent, MonsterFeedback, PlayerAlert, PlayerState};
use crate::rng::Rng;
use crate::types::{EntityId, Position};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonsterMode {
    Patrolling,
    Hunting,
}

/// Decision state of one hunter monster. Pure and synchronous; the actor
/// feeds it observations and forwards whatever it proposes.
#[derive(Clone, Debug)]
pub struct MonsterBrain {
    id: EntityId,
    profile: MonsterProfile,
    width: i32,
    height: i32,
    position: Position,
    mode: MonsterMode,
    destination: Position,
    last_seen: Position,
    step_counter: u32,
    alerted: bool,
    prefer_vertical: bool,
    blocked: u32,
    rng: Rng,
}

impl MonsterBrain {
    pub fn new(
        id: EntityId,
        start: Position,
        profile: MonsterProfile,
        width: i32,
        height: i32,
        rng: Rng,
    ) -> Self {
        let mut brain = Self {
            id,
            profile,
            width,
            height,
            position: start,
            mode: MonsterMode::Patrolling,
            destination: start,
            last_seen: start,
            step_counter: 0,
            alerted: false,
            prefer_vertical: false,
            blocked: 0,
            rng,
        };
        brain.destination = brain.random_destination();
        brain
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn mode(&self) -> MonsterMode {
        self.mode
    }

    pub fn destination(&self) -> Position {
        self.destination
    }

    pub fn last_seen(&self) -> Position {
        self.last_seen
    }

    pub fn is_alerted(&self) -> bool {
        self.alerted
    }

    /// Fresh player position. Returns the new mode if it changed.
    pub fn observe_player(&mut self, at: Position) -> Option<MonsterMode> {
        self.alerted = false;
        let before = self.mode;
        match self.mode {
            MonsterMode::Patrolling => {
                if self.position.distance(at) <= self.profile.visibility_radius {
                    self.mode = MonsterMode::Hunting;
                    self.destination = at;
                    self.last_seen = at;
                }
            }
            MonsterMode::Hunting => {
                self.destination = at;
                self.last_seen = at;
            }
        }
        self.check_arrival();
        (self.mode != before).then_some(self.mode)
    }

    /// A noise or proximity signal forces a hunt regardless of visibility.
    pub fn hear(&mut self, alert: PlayerAlert) -> Option<MonsterMode> {
        let before = self.mode;
        self.alerted = false;
        self.mode = MonsterMode::Hunting;
        self.destination = alert.at;
        self.last_seen = alert.at;
        self.check_arrival();
        (self.mode != before).then_some(self.mode)
    }

    /// No player update for a whole timeout window.
    pub fn time_out(&mut self) -> Option<MonsterMode> {
        self.alerted = true;
        if self.mode == MonsterMode::Hunting {
            self.start_patrol();
            return Some(MonsterMode::Patrolling);
        }
        None
    }

    /// One movement tick. Returns a proposed next cell when a step is due.
    pub fn tick(&mut self) -> Option<Position> {
        self.step_counter += 1;
        let needed = match self.mode {
            MonsterMode::Hunting => self.profile.hunt_ticks_per_step,
            MonsterMode::Patrolling if self.alerted => 1,
            MonsterMode::Patrolling => self.profile.patrol_ticks_per_step,
        };
        if self.step_counter < needed.max(1) {
            return None;
        }
        self.step_counter = 0;

        if self.mode == MonsterMode::Patrolling && self.position.distance(self.destination) < 1.0
        {
            self.destination = self.random_destination();
        }
        self.next_step()
    }

    pub fn placed(&mut self, at: Position) -> Option<MonsterMode> {
        let before = self.mode;
        self.position = at;
        self.blocked = 0;
        self.check_arrival();
        (self.mode != before).then_some(self.mode)
    }

    pub fn rejected(&mut self) {
        self.prefer_vertical = !self.prefer_vertical;
        self.blocked += 1;
        if self.mode == MonsterMode::Patrolling && self.blocked >= 2 {
            self.blocked = 0;
            self.destination = self.random_destination();
        }
    }

    fn check_arrival(&mut self) {
        if self.mode == MonsterMode::Hunting
            && self.position.distance(self.last_seen) < self.profile.closeness
        {
            self.start_patrol();
        }
    }

    fn start_patrol(&mut self) {
        self.mode = MonsterMode::Patrolling;
        self.destination = self.random_destination();
    }

    fn next_step(&self) -> Option<Position> {
        let dx = (self.destination.x - self.position.x).signum();
        let dy = (self.destination.y - self.position.y).signum();
        if dx == 0 && dy == 0 {
            return None;
        }
        if self.profile.diagonal {
            return Some(self.position.offset(dx, dy));
        }
        let horizontal = dx != 0 && (dy == 0 || !self.prefer_vertical);
        if horizontal {
            Some(self.position.offset(dx, 0))
        } else {
            Some(self.position.offset(0, dy))
        }
    }

    fn random_destination(&mut self) -> Position {
        let radius = f64::from(self.profile.patrol_radius.max(1));
        for _ in 0..self.profile.destination_attempts {
            let angle = self.rng.angle();
            let reach = self.rng.next_f64() * radius;
            let candidate = self.position.offset(
                (reach * angle.cos()) as i32,
                (reach * angle.sin()) as i32,
            );
            if self.in_bounds(candidate) {
                return candidate;
            }
        }
        let jitter = self
            .position
            .offset(self.rng.int(-1, 1), self.rng.int(-1, 1));
        Position::new(
            jitter.x.clamp(0, (self.width - 1).max(0)),
            jitter.y.clamp(0, (self.height - 1).max(0)),
        )
    }

    fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }
}

pub struct MonsterActor {
    pub brain: MonsterBrain,
    pub events: Outbox<GameEvent>,
    pub player_state: broadcast::Receiver<PlayerState>,
    pub alerts: broadcast::Receiver<PlayerAlert>,
    pub feedback: mpsc::Receiver<MonsterFeedback>,
    pub shutdown: Shutdown,
}

impl MonsterActor {
    pub async fn run(self) {
        let Self {
            mut brain,
            events,
            mut player_state,
            mut alerts,
            mut feedback,
            mut shutdown,
        } = self;
        let id = brain.id();
        let alert_timeout = brain.profile.alert_timeout();

        let mut ticker = time::interval(brain.profile.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut quiet = pin!(time::sleep(alert_timeout));
        let mut armed = true;

        debug!(entity = %id, at = %brain.position(), "monster started");
        loop {
            let changed = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = player_state.recv() => match delivery(received) {
                    Delivery::Message(update) => {
                        quiet.as_mut().reset(Instant::now() + alert_timeout);
                        armed = true;
                        brain.observe_player(update.at)
                    }
                    Delivery::Skipped => None,
                    Delivery::Closed => break,
                },
                received = alerts.recv() => match delivery(received) {
                    Delivery::Message(alert) => {
                        trace!(entity = %id, kind = ?alert.kind, at = %alert.at, "alert heard");
                        brain.hear(alert)
                    }
                    Delivery::Skipped => None,
                    Delivery::Closed => break,
                },
                Some(verdict) = feedback.recv() => match verdict {
                    MonsterFeedback::Placed(at) => brain.placed(at),
                    MonsterFeedback::Rejected => {
                        brain.rejected();
                        None
                    }
                },
                () = &mut quiet, if armed => {
                    armed = false;
                    events.post(GameEvent::MonsterTimeout {
                        id,
                        message: format!("{id} lost your trail and is roaming"),
                    });
                    brain.time_out()
                },
                _ = ticker.tick() => {
                    if let Some(to) = brain.tick() {
                        events.post(GameEvent::MonsterMove {
                            id,
                            from: brain.position(),
                            to,
                        });
                    }
                    None
                },
            };

            if let Some(mode) = changed {
                debug!(entity = %id, ?mode, at = %brain.position(), "monster mode changed");
                events.post(GameEvent::MonsterModeChanged { id, mode });
            }
        }
        debug!(entity = %id, "monster stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bus::{shutdown_pair, Bus};
    use crate::config::MonsterVariant;
    use crate::events::AlertKind;
    use crate::types::EntityKind;

    const ID: EntityId = EntityId::new(EntityKind::Monster, 0);

    fn make_brain(start: Position, variant: MonsterVariant) -> MonsterBrain {
        MonsterBrain::new(ID, start, variant.profile(), 100, 100, Rng::new(3))
    }

    #[test]
    fn distant_player_leaves_monster_patrolling() {
        let mut brain = make_brain(Position::new(10, 10), MonsterVariant::Stalker);
        assert_eq!(brain.observe_player(Position::new(40, 10)), None);
        for _ in 0..5 {
            brain.tick();
            assert_eq!(brain.mode(), MonsterMode::Patrolling);
        }
    }

    #[test]
    fn visible_player_starts_hunt_immediately() {
        let mut brain = make_brain(Position::new(10, 10), MonsterVariant::Stalker);
        let player = Position::new(30, 10);
        assert_eq!(brain.observe_player(player), Some(MonsterMode::Hunting));
        assert_eq!(brain.destination(), player);
        assert_eq!(brain.last_seen(), player);
    }

    #[test]
    fn hunting_tracks_every_update_even_out_of_sight() {
        let mut brain = make_brain(Position::new(10, 10), MonsterVariant::Stalker);
        brain.observe_player(Position::new(12, 10));
        assert_eq!(brain.observe_player(Position::new(60, 60)), None);
        assert_eq!(brain.mode(), MonsterMode::Hunting);
        assert_eq!(brain.destination(), Position::new(60, 60));
    }

    #[test]
    fn reaching_last_seen_returns_to_patrol() {
        let mut brain = make_brain(Position::new(10, 10), MonsterVariant::Stalker);
        brain.observe_player(Position::new(11, 10));
        assert_eq!(brain.placed(Position::new(11, 10)), Some(MonsterMode::Patrolling));
    }

    #[test]
    fn hunting_steps_every_tick_and_patrol_is_throttled() {
        let mut brain = make_brain(Position::new(10, 10), MonsterVariant::Stalker);
        brain.observe_player(Position::new(15, 10));
        assert_eq!(brain.tick(), Some(Position::new(11, 10)));
        assert_eq!(brain.tick(), Some(Position::new(11, 10)));

        let mut brain = brain_far_from_destination();
        let proposals = (0..4).filter_map(|_| brain.tick()).count();
        assert_eq!(proposals, 2);
    }

    fn brain_far_from_destination() -> MonsterBrain {
        let mut brain = make_brain(Position::new(50, 50), MonsterVariant::Stalker);
        brain.destination = Position::new(58, 50);
        brain
    }

    #[test]
    fn steps_never_exceed_one_cell_per_axis() {
        let mut brain = make_brain(Position::new(10, 10), MonsterVariant::Aggressive);
        brain.observe_player(Position::new(20, 25));
        let to = brain.tick().unwrap();
        assert_eq!(to, Position::new(11, 11));

        let mut brain = make_brain(Position::new(10, 10), MonsterVariant::Stalker);
        brain.observe_player(Position::new(10, 25));
        assert_eq!(brain.tick(), Some(Position::new(10, 11)));
    }

    #[test]
    fn rejection_switches_axis() {
        let mut brain = make_brain(Position::new(10, 10), MonsterVariant::Stalker);
        brain.observe_player(Position::new(15, 15));
        assert_eq!(brain.tick(), Some(Position::new(11, 10)));
        brain.rejected();
        assert_eq!(brain.tick(), Some(Position::new(10, 11)));
    }

    #[test]
    fn alert_forces_hunt_out_of_sight() {
        let mut brain = make_brain(Position::new(0, 0), MonsterVariant::Stalker);
        let alert = PlayerAlert {
            kind: AlertKind::Noise,
            at: Position::new(90, 90),
        };
        assert_eq!(brain.hear(alert), Some(MonsterMode::Hunting));
        assert_eq!(brain.destination(), Position::new(90, 90));
    }

    #[test]
    fn timeout_abandons_hunt_and_speeds_patrol() {
        let mut brain = make_brain(Position::new(10, 10), MonsterVariant::Stalker);
        brain.observe_player(Position::new(14, 10));
        assert_eq!(brain.time_out(), Some(MonsterMode::Patrolling));
        assert!(brain.is_alerted());
        brain.destination = Position::new(20, 10);
        assert!(brain.tick().is_some());
        assert!(brain.tick().is_some());
        brain.observe_player(Position::new(90, 90));
        assert!(!brain.is_alerted());
    }

    #[test]
    fn patrol_destinations_stay_on_the_map() {
        let mut brain = MonsterBrain::new(
            ID,
            Position::new(0, 0),
            MonsterVariant::Aggressive.profile(),
            3,
            3,
            Rng::new(11),
        );
        for _ in 0..50 {
            let dest = brain.random_destination();
            assert!(dest.x >= 0 && dest.x < 3 && dest.y >= 0 && dest.y < 3);
        }
    }

    fn actor(
        bus: &Bus,
        brain: MonsterBrain,
        shutdown: Shutdown,
    ) -> (MonsterActor, mpsc::Sender<MonsterFeedback>) {
        let (feedback_tx, feedback) = mpsc::channel(4);
        let actor = MonsterActor {
            brain,
            events: bus.events.clone(),
            player_state: bus.player_state.subscribe(),
            alerts: bus.alerts.subscribe(),
            feedback,
            shutdown,
        };
        (actor, feedback_tx)
    }

    #[tokio::test(start_paused = true)]
    async fn far_monster_keeps_patrolling_across_ticks() {
        let (bus, mut events) = Bus::new(64);
        let (trigger, shutdown) = shutdown_pair();
        let mut brain = make_brain(Position::new(10, 10), MonsterVariant::Stalker);
        brain.destination = Position::new(10, 30);
        let (actor, _feedback) = actor(&bus, brain, shutdown);
        let task = tokio::spawn(actor.run());

        bus.player_state.post(PlayerState {
            at: Position::new(40, 10),
        });
        time::sleep(Duration::from_millis(550)).await;
        trigger.trigger();
        task.await.unwrap();

        let mut proposals = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                GameEvent::MonsterMove { .. } => proposals += 1,
                GameEvent::MonsterModeChanged { .. } => panic!("mode changed: {event:?}"),
                _ => {}
            }
        }
        assert!(proposals >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn close_player_triggers_hunt_event() {
        let (bus, mut events) = Bus::new(64);
        let (trigger, shutdown) = shutdown_pair();
        let brain = make_brain(Position::new(10, 10), MonsterVariant::Stalker);
        let (actor, _feedback) = actor(&bus, brain, shutdown);
        let task = tokio::spawn(actor.run());

        time::sleep(Duration::from_millis(10)).await;
        bus.player_state.post(PlayerState {
            at: Position::new(15, 10),
        });
        time::sleep(Duration::from_millis(150)).await;
        trigger.trigger();
        task.await.unwrap();

        let mut hunted = false;
        while let Ok(event) = events.try_recv() {
            if let GameEvent::MonsterModeChanged { mode, .. } = event {
                hunted |= mode == MonsterMode::Hunting;
            }
        }
        assert!(hunted);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_emits_one_timeout_notice() {
        let (bus, mut events) = Bus::new(256);
        let (trigger, shutdown) = shutdown_pair();
        let brain = make_brain(Position::new(10, 10), MonsterVariant::Stalker);
        let (actor, _feedback) = actor(&bus, brain, shutdown);
        let task = tokio::spawn(actor.run());

        let mut timeouts = 0;
        for _ in 0..80 {
            time::sleep(Duration::from_millis(100)).await;
            while let Ok(event) = events.try_recv() {
                if matches!(event, GameEvent::MonsterTimeout { .. }) {
                    timeouts += 1;
                }
            }
        }
        trigger.trigger();
        task.await.unwrap();
        assert_eq!(timeouts, 1);
    }
}
