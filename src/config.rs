use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CHANNEL_CAPACITY, DESTINATION_ATTEMPTS, IDLE_TICK_MS, INVISIBILITY_STEPS,
    MONSTER_ALERT_TIMEOUT, PATROL_TICK_MS, STAR_JUMP_GRANT,
};
use crate::error::{GameError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    #[default]
    Lock,
    Broker,
}

impl GateKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "lock" => Some(Self::Lock),
            "broker" => Some(Self::Broker),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonsterVariant {
    #[default]
    Stalker,
    Aggressive,
}

impl MonsterVariant {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stalker" => Some(Self::Stalker),
            "aggressive" => Some(Self::Aggressive),
            _ => None,
        }
    }

    pub fn profile(self) -> MonsterProfile {
        match self {
            Self::Stalker => MonsterProfile {
                visibility_radius: 20.0,
                closeness: 1.0,
                patrol_radius: 10,
                tick_ms: 100,
                patrol_ticks_per_step: 2,
                hunt_ticks_per_step: 1,
                diagonal: false,
                alert_timeout_ms: MONSTER_ALERT_TIMEOUT.as_millis() as u64,
                destination_attempts: DESTINATION_ATTEMPTS,
            },
            Self::Aggressive => MonsterProfile {
                visibility_radius: 25.0,
                closeness: 0.5,
                patrol_radius: 15,
                tick_ms: 60,
                patrol_ticks_per_step: 3,
                hunt_ticks_per_step: 1,
                diagonal: true,
                alert_timeout_ms: MONSTER_ALERT_TIMEOUT.as_millis() as u64,
                destination_attempts: DESTINATION_ATTEMPTS,
            },
        }
    }
}

/// Tuning for one hunter monster variant. The ratio between the two
/// ticks-per-step values is what makes a variant easy or hard.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonsterProfile {
    pub visibility_radius: f64,
    pub closeness: f64,
    pub patrol_radius: i32,
    pub tick_ms: u64,
    pub patrol_ticks_per_step: u32,
    pub hunt_ticks_per_step: u32,
    pub diagonal: bool,
    pub alert_timeout_ms: u64,
    pub destination_attempts: u32,
}

impl Default for MonsterProfile {
    fn default() -> Self {
        MonsterVariant::default().profile()
    }
}

impl MonsterProfile {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn alert_timeout(&self) -> Duration {
        Duration::from_millis(self.alert_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub channel_capacity: usize,
    pub gate: GateKind,
    pub monster: MonsterProfile,
    pub idle_tick_ms: u64,
    pub patrol_tick_ms: u64,
    pub lethal_enemies: bool,
    pub invisibility_steps: u32,
    pub star_jump_grant: u32,
    pub seed: Option<u32>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            channel_capacity: CHANNEL_CAPACITY,
            gate: GateKind::default(),
            monster: MonsterProfile::default(),
            idle_tick_ms: IDLE_TICK_MS,
            patrol_tick_ms: PATROL_TICK_MS,
            lethal_enemies: true,
            invisibility_steps: INVISIBILITY_STEPS,
            star_jump_grant: STAR_JUMP_GRANT,
            seed: None,
        }
    }
}

impl GameConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| GameError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| GameError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Command-line overrides on top of whatever the file said.
    pub fn apply_overrides(
        &mut self,
        monster: Option<&str>,
        gate: Option<&str>,
        seed: Option<u32>,
    ) -> Result<()> {
        if let Some(name) = monster {
            let variant = MonsterVariant::parse(name).ok_or_else(|| GameError::UnknownName {
                what: "monster variant",
                name: name.to_string(),
            })?;
            self.monster = variant.profile();
        }
        if let Some(name) = gate {
            self.gate = GateKind::parse(name).ok_or_else(|| GameError::UnknownName {
                what: "gate",
                name: name.to_string(),
            })?;
        }
        if seed.is_some() {
            self.seed = seed;
        }
        Ok(())
    }

    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms.max(1))
    }

    pub fn patrol_tick(&self) -> Duration {
        Duration::from_millis(self.patrol_tick_ms.max(1))
    }
}
