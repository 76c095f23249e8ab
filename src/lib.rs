pub mod bus;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod events;
pub mod gate;
pub mod player;
pub mod rng;
pub mod session;
pub mod state;
pub mod types;
pub mod world;
