use serde::Serialize;

use crate::entity::monster::MonsterMode;
use crate::entity::star::{StarAction, StarBonus, StarMessage, StarState};
use crate::types::{EntityId, Position};

/// Everything an entity can tell the coordinator. Each variant carries the
/// payload its handler needs, so dispatch is a plain exhaustive match.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum GameEvent {
    MonsterMove {
        id: EntityId,
        from: Position,
        to: Position,
    },
    MonsterModeChanged {
        id: EntityId,
        mode: MonsterMode,
    },
    MonsterTimeout {
        id: EntityId,
        message: String,
    },
    MonsterCollision {
        id: EntityId,
        at: Position,
    },
    RemoveItem {
        id: EntityId,
        at: Position,
    },
    ApplyInvisibility {
        id: EntityId,
        steps: u32,
    },
    StarCollected {
        id: EntityId,
        at: Position,
        bonus: StarBonus,
        jumps: u32,
    },
    StarStateChanged {
        id: EntityId,
        at: Position,
        from: StarState,
        to: StarState,
    },
    StarPulse {
        id: EntityId,
        at: Position,
        visible: bool,
        pulses: u32,
    },
    StarCharged {
        id: EntityId,
        at: Position,
        energy: u32,
    },
    StarTimeout {
        id: EntityId,
        at: Position,
        action: StarAction,
    },
    StarCommunicated {
        from: EntityId,
        message: StarMessage,
    },
    GuardianMet {
        id: EntityId,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerState {
    pub at: Position,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Noise,
    Nearby,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerAlert {
    pub kind: AlertKind,
    pub at: Position,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerCollect {
    pub at: Position,
}

/// Message from one star to every other star on the shared channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StarCommand {
    pub from: EntityId,
    pub message: StarMessage,
}

/// Coordinator verdict on a monster's last move proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonsterFeedback {
    Placed(Position),
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnemyCommand {
    Stop,
}
