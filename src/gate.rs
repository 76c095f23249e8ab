//! Mutual exclusion for the shared game state.
//!
//! Two interchangeable gates guard the grid: a plain async mutex, and a
//! broker task that owns the state outright and lends it to one requester at
//! a time over a reply channel. Either way, at most one holder exists at any
//! instant and holders must drop their access before the next `.await`.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::config::GateKind;
use crate::error::{GameError, Result};
use crate::state::GameState;

type GrantRequest = oneshot::Sender<MapGrant>;

#[derive(Clone, Debug)]
pub enum MapGate {
    Lock(Arc<Mutex<GameState>>),
    Broker(mpsc::Sender<GrantRequest>),
}

impl MapGate {
    pub fn new(kind: GateKind, state: GameState) -> Self {
        match kind {
            GateKind::Lock => Self::lock(state),
            GateKind::Broker => Self::broker(state),
        }
    }

    pub fn lock(state: GameState) -> Self {
        Self::Lock(Arc::new(Mutex::new(state)))
    }

    /// Spawns the arbiter task. It lives until every gate clone is dropped.
    pub fn broker(state: GameState) -> Self {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(run_broker(state, rx));
        Self::Broker(tx)
    }

    pub async fn access(&self) -> Result<MapAccess> {
        match self {
            Self::Lock(state) => Ok(MapAccess::Lock(state.clone().lock_owned().await)),
            Self::Broker(requests) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                requests
                    .send(reply_tx)
                    .await
                    .map_err(|_| GameError::GateClosed)?;
                let grant = reply_rx.await.map_err(|_| GameError::GateClosed)?;
                Ok(MapAccess::Broker(grant))
            }
        }
    }
}

async fn run_broker(mut state: GameState, mut requests: mpsc::Receiver<GrantRequest>) {
    debug!("map broker started");
    while let Some(reply) = requests.recv().await {
        let (release_tx, release_rx) = oneshot::channel();
        let grant = MapGrant {
            state: Some(state),
            release: Some(release_tx),
        };
        // A requester that gave up hands the grant straight back through
        // its drop, so the release below still resolves.
        let _ = reply.send(grant);
        match release_rx.await {
            Ok(returned) => state = returned,
            Err(_) => {
                warn!("map grant vanished without returning state");
                return;
            }
        }
    }
    debug!("map broker stopped");
}

/// Exclusive loan of the state from the broker; returned on drop.
#[derive(Debug)]
pub struct MapGrant {
    state: Option<GameState>,
    release: Option<oneshot::Sender<GameState>>,
}

impl Drop for MapGrant {
    fn drop(&mut self) {
        if let (Some(state), Some(release)) = (self.state.take(), self.release.take()) {
            let _ = release.send(state);
        }
    }
}

impl Deref for MapGrant {
    type Target = GameState;

    fn deref(&self) -> &GameState {
        self.state.as_ref().expect("grant holds state until dropped")
    }
}

impl DerefMut for MapGrant {
    fn deref_mut(&mut self) -> &mut GameState {
        self.state.as_mut().expect("grant holds state until dropped")
    }
}

#[derive(Debug)]
pub enum MapAccess {
    Lock(OwnedMutexGuard<GameState>),
    Broker(MapGrant),
}

impl Deref for MapAccess {
    type Target = GameState;

    fn deref(&self) -> &GameState {
        match self {
            Self::Lock(guard) => &**guard,
            Self::Broker(grant) => &**grant,
        }
    }
}

impl DerefMut for MapAccess {
    fn deref_mut(&mut self) -> &mut GameState {
        match self {
            Self::Lock(guard) => &mut **guard,
            Self::Broker(grant) => &mut **grant,
        }
    }
}
