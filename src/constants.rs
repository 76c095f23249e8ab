use std::time::Duration;

pub const CHANNEL_CAPACITY: usize = 10;
pub const COMMAND_CAPACITY: usize = 4;

pub const IDLE_TICK_MS: u64 = 50;
pub const PATROL_TICK_MS: u64 = 300;

pub const INVISIBILITY_STEPS: u32 = 20;
pub const STAR_JUMP_GRANT: u32 = 2;
pub const INTERACT_RADIUS: f64 = 2.0;

pub const MONSTER_ALERT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DESTINATION_ATTEMPTS: u32 = 10;

pub const STAR_VISIBLE_DURATION: Duration = Duration::from_secs(8);
pub const STAR_HIDDEN_DURATION: Duration = Duration::from_secs(4);
pub const STAR_PULSE_DURATION: Duration = Duration::from_secs(2);
pub const STAR_CHARGE_DURATION: Duration = Duration::from_secs(10);
pub const STAR_IDLE_TIMEOUT: Duration = Duration::from_secs(15);
pub const STAR_PULSES_PER_CYCLE: u32 = 10;
pub const STAR_BURST_ENERGY: u32 = 50;
pub const STAR_CHARGE_ENERGY: u32 = 100;

pub const STAR_SCORE_BASE: u32 = 100;
pub const STAR_SCORE_PER_ENERGY: u32 = 10;
pub const STAR_POWER_VALUE: u32 = 300;
