//! Star bonus: a collectible with a life of its own.
//!
//! A star cycles between shown and hidden, pulses when the player comes
//! close, charges energy when left alone, and talks to the other stars over
//! the shared command channel. It can only be picked up while shown, and the
//! bonus depends on what it was doing at that moment.

use std::pin::pin;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, warn};

use crate::bus::{delivery, Delivery, Fanout, Outbox, Shutdown};
use crate::constants::{
    STAR_BURST_ENERGY, STAR_CHARGE_DURATION, STAR_CHARGE_ENERGY, STAR_HIDDEN_DURATION,
    STAR_IDLE_TIMEOUT, STAR_POWER_VALUE, STAR_PULSES_PER_CYCLE, STAR_PULSE_DURATION,
    STAR_SCORE_BASE, STAR_SCORE_PER_ENERGY, STAR_VISIBLE_DURATION,
};
use crate::events::{GameEvent, PlayerCollect, PlayerState, StarCommand};
use crate::gate::MapGate;
use crate::rng::Rng;
use crate::types::{EntityId, Position};
use crate::world::{Cell, GlyphTable};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StarState {
    Visible,
    Invisible,
    Pulsing,
    Charging,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StarAction {
    Charge,
    Pulse,
    Hide,
    EnergyBurst,
}

impl StarState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Invisible => "hidden",
            Self::Pulsing => "pulsing",
            Self::Charging => "charging",
        }
    }
}

impl StarAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Charge => "charge",
            Self::Pulse => "pulse",
            Self::Hide => "hide",
            Self::EnergyBurst => "burst with energy",
        }
    }
}

const IDLE_ACTIONS: [StarAction; 4] = [
    StarAction::Charge,
    StarAction::Pulse,
    StarAction::Hide,
    StarAction::EnergyBurst,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusKind {
    Score,
    Power,
    Life,
}

impl BonusKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::Power => "power",
            Self::Life => "life",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StarBonus {
    pub kind: BonusKind,
    pub value: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StarMessage {
    SyncPulse,
    ShareEnergy(u32),
    Warning,
}

impl StarMessage {
    pub fn label(self) -> String {
        match self {
            Self::SyncPulse => "sync pulse".to_string(),
            Self::ShareEnergy(amount) => format!("share {amount} energy"),
            Self::Warning => "warning".to_string(),
        }
    }
}

/// What one stimulus made the star say: events for the coordinator, and
/// optionally a message for every other star.
#[derive(Debug, Default)]
pub struct Reaction {
    pub events: Vec<GameEvent>,
    pub shout: Option<StarMessage>,
}

#[derive(Clone, Debug)]
pub struct StarBrain {
    id: EntityId,
    at: Position,
    state: StarState,
    visible: bool,
    energy: u32,
    pulses: u32,
    rng: Rng,
}

impl StarBrain {
    pub fn new(id: EntityId, at: Position, rng: Rng) -> Self {
        Self {
            id,
            at,
            state: StarState::Visible,
            visible: true,
            energy: 0,
            pulses: 0,
            rng,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn at(&self) -> Position {
        self.at
    }

    pub fn state(&self) -> StarState {
        self.state
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn energy(&self) -> u32 {
        self.energy
    }

    pub fn look(&self, glyphs: &GlyphTable) -> Cell {
        if !self.visible {
            return glyphs.star_hidden;
        }
        match self.state {
            StarState::Pulsing => glyphs.star_pulsing,
            StarState::Charging => glyphs.star_charging,
            StarState::Visible | StarState::Invisible => glyphs.star_visible,
        }
    }

    /// How long until the shown/hidden cycle flips again.
    pub fn visibility_period(&self) -> Duration {
        if self.visible {
            STAR_VISIBLE_DURATION
        } else {
            STAR_HIDDEN_DURATION
        }
    }

    fn change_state(&mut self, to: StarState, out: &mut Reaction) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        match to {
            StarState::Visible | StarState::Charging => self.visible = true,
            StarState::Invisible => self.visible = false,
            StarState::Pulsing => self.pulses = 0,
        }
        out.events.push(GameEvent::StarStateChanged {
            id: self.id,
            at: self.at,
            from,
            to,
        });
    }

    pub fn observe_player(&mut self, player: Position) -> Reaction {
        let mut out = Reaction::default();
        let distance = self.at.manhattan(player);
        if distance <= 1 {
            self.change_state(StarState::Pulsing, &mut out);
        } else if distance > 3 && self.state == StarState::Pulsing {
            self.change_state(StarState::Visible, &mut out);
        }
        out
    }

    pub fn visibility_elapsed(&mut self) -> Reaction {
        let mut out = Reaction::default();
        match self.state {
            StarState::Visible => self.change_state(StarState::Invisible, &mut out),
            StarState::Invisible => self.change_state(StarState::Visible, &mut out),
            StarState::Pulsing | StarState::Charging => {}
        }
        out
    }

    pub fn pulse(&mut self) -> Reaction {
        let mut out = Reaction::default();
        if self.state != StarState::Pulsing {
            return out;
        }
        self.visible = !self.visible;
        self.pulses += 1;
        out.events.push(GameEvent::StarPulse {
            id: self.id,
            at: self.at,
            visible: self.visible,
            pulses: self.pulses,
        });
        if self.pulses >= STAR_PULSES_PER_CYCLE {
            self.change_state(StarState::Visible, &mut out);
        }
        out
    }

    pub fn charge_complete(&mut self) -> Reaction {
        let mut out = Reaction::default();
        if self.state != StarState::Charging {
            return out;
        }
        self.energy += STAR_CHARGE_ENERGY;
        out.events.push(self.charged());
        self.change_state(StarState::Visible, &mut out);
        out
    }

    /// Nobody has been around for a while: do something at random.
    pub fn idle(&mut self) -> Reaction {
        let action = IDLE_ACTIONS[self.rng.pick_index(IDLE_ACTIONS.len())];
        self.idle_with(action)
    }

    fn idle_with(&mut self, action: StarAction) -> Reaction {
        let mut out = Reaction::default();
        match action {
            StarAction::Charge => {
                self.change_state(StarState::Charging, &mut out);
                out.shout = Some(StarMessage::Warning);
            }
            StarAction::Pulse => {
                self.change_state(StarState::Pulsing, &mut out);
                out.shout = Some(StarMessage::SyncPulse);
            }
            StarAction::Hide => self.change_state(StarState::Invisible, &mut out),
            StarAction::EnergyBurst => {
                self.energy += STAR_BURST_ENERGY;
                out.events.push(self.charged());
                out.shout = Some(StarMessage::ShareEnergy(self.energy));
            }
        }
        out.events.push(GameEvent::StarTimeout {
            id: self.id,
            at: self.at,
            action,
        });
        out
    }

    /// Another star spoke. A star never reacts to its own messages.
    pub fn command(&mut self, command: StarCommand) -> Reaction {
        let mut out = Reaction::default();
        if command.from == self.id {
            return out;
        }
        match command.message {
            StarMessage::SyncPulse => self.change_state(StarState::Pulsing, &mut out),
            StarMessage::ShareEnergy(amount) => self.energy += amount / 2,
            StarMessage::Warning => self.change_state(StarState::Charging, &mut out),
        }
        out.events.push(GameEvent::StarCommunicated {
            from: command.from,
            message: command.message,
        });
        out
    }

    /// Bonus for a pickup at `at`, or `None` if the star is elsewhere or
    /// currently hidden.
    pub fn collect(&self, at: Position) -> Option<StarBonus> {
        if at != self.at || !self.visible {
            return None;
        }
        Some(match self.state {
            StarState::Pulsing => StarBonus {
                kind: BonusKind::Power,
                value: STAR_POWER_VALUE,
            },
            StarState::Charging => StarBonus {
                kind: BonusKind::Life,
                value: 1,
            },
            StarState::Visible | StarState::Invisible => StarBonus {
                kind: BonusKind::Score,
                value: STAR_SCORE_BASE + self.energy * STAR_SCORE_PER_ENERGY,
            },
        })
    }

    fn charged(&self) -> GameEvent {
        GameEvent::StarCharged {
            id: self.id,
            at: self.at,
            energy: self.energy,
        }
    }
}

pub struct StarActor {
    pub brain: StarBrain,
    pub jumps: u32,
    pub gate: MapGate,
    pub events: Outbox<GameEvent>,
    pub commands: Fanout<StarCommand>,
    pub command_rx: broadcast::Receiver<StarCommand>,
    pub player_state: broadcast::Receiver<PlayerState>,
    pub collects: broadcast::Receiver<PlayerCollect>,
    pub shutdown: Shutdown,
}

impl StarActor {
    pub async fn run(self) {
        let Self {
            mut brain,
            jumps,
            gate,
            events,
            commands,
            mut command_rx,
            mut player_state,
            mut collects,
            mut shutdown,
        } = self;
        let id = brain.id();

        let mut visibility = pin!(time::sleep(brain.visibility_period()));
        let mut pulse = pin!(time::sleep(STAR_PULSE_DURATION));
        let mut charge = pin!(time::sleep(STAR_CHARGE_DURATION));
        let mut idle = pin!(time::sleep(STAR_IDLE_TIMEOUT));

        loop {
            let before = (brain.state(), brain.is_visible());
            let reaction = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = player_state.recv() => match delivery(received) {
                    Delivery::Message(PlayerState { at }) => {
                        idle.as_mut().reset(Instant::now() + STAR_IDLE_TIMEOUT);
                        brain.observe_player(at)
                    }
                    Delivery::Skipped => continue,
                    Delivery::Closed => break,
                },
                received = collects.recv() => match delivery(received) {
                    Delivery::Message(PlayerCollect { at }) => {
                        if let Some(bonus) = brain.collect(at) {
                            events.post(GameEvent::RemoveItem { id, at });
                            events.post(GameEvent::StarCollected { id, at, bonus, jumps });
                            info!(entity = %id, %at, ?bonus, "star collected");
                            return;
                        }
                        continue;
                    }
                    Delivery::Skipped => continue,
                    Delivery::Closed => break,
                },
                received = command_rx.recv() => match delivery(received) {
                    Delivery::Message(command) => brain.command(command),
                    Delivery::Skipped => continue,
                    Delivery::Closed => break,
                },
                () = &mut visibility, if matches!(brain.state(), StarState::Visible | StarState::Invisible) => {
                    brain.visibility_elapsed()
                }
                () = &mut pulse, if brain.state() == StarState::Pulsing => {
                    pulse.as_mut().reset(Instant::now() + STAR_PULSE_DURATION);
                    brain.pulse()
                }
                () = &mut charge, if brain.state() == StarState::Charging => {
                    brain.charge_complete()
                }
                () = &mut idle => {
                    idle.as_mut().reset(Instant::now() + STAR_IDLE_TIMEOUT);
                    brain.idle()
                }
            };

            for event in reaction.events {
                events.post(event);
            }
            if let Some(message) = reaction.shout {
                commands.post(StarCommand {
                    from: id,
                    message,
                });
            }

            let after = (brain.state(), brain.is_visible());
            if after.0 != before.0 {
                let now = Instant::now();
                match after.0 {
                    StarState::Visible | StarState::Invisible => {
                        visibility.as_mut().reset(now + brain.visibility_period())
                    }
                    StarState::Pulsing => pulse.as_mut().reset(now + STAR_PULSE_DURATION),
                    StarState::Charging => charge.as_mut().reset(now + STAR_CHARGE_DURATION),
                }
                debug!(entity = %id, from = ?before.0, to = ?after.0, "star state changed");
            }
            if after != before && !repaint(&gate, &brain).await {
                break;
            }
        }
        debug!(entity = %id, "star retired uncollected");
    }
}

async fn repaint(gate: &MapGate, brain: &StarBrain) -> bool {
    match gate.access().await {
        Ok(mut state) => {
            let look = brain.look(&state.glyphs);
            if !state.paint_star(brain.at(), look) {
                warn!(entity = %brain.id(), at = %brain.at(), "star cell no longer holds the star");
                return false;
            }
            true
        }
        Err(err) => {
            warn!(entity = %brain.id(), %err, "star could not reach the map");
            false
        }
    }
}
