use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GameError {
    #[error("failed to read map {}", path.display())]
    MapLoad {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("map has no rows")]
    EmptyMap,
    #[error("map has no player start")]
    MissingPlayer,
    #[error("failed to read config {}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown {what}: {name}")]
    UnknownName { what: &'static str, name: String },
    #[error("map gate is closed")]
    GateClosed,
    #[error("failed to draw frame")]
    Render(#[from] io::Error),
}

pub type Result<T, E = GameError> = std::result::Result<T, E>;
