use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::trace;

use crate::events::{GameEvent, PlayerAlert, PlayerCollect, PlayerState, StarCommand};

#[derive(Debug, Default)]
pub struct BusStats {
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl BusStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Bounded point-to-point sender that never waits: a full queue drops the
/// message.
#[derive(Debug)]
pub struct Outbox<T> {
    tx: mpsc::Sender<T>,
    stats: Arc<BusStats>,
}

impl<T> Clone for Outbox<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<T> Outbox<T> {
    pub fn new(tx: mpsc::Sender<T>, stats: Arc<BusStats>) -> Self {
        Self { tx, stats }
    }

    pub fn post(&self, message: T) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("queue full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Bounded one-to-many sender. Receivers that fall behind lose the oldest
/// messages instead of slowing the sender.
#[derive(Debug)]
pub struct Fanout<T> {
    tx: broadcast::Sender<T>,
}

impl<T> Clone for Fanout<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone> Fanout<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn post(&self, message: T) {
        // No subscribers is fine: nobody is listening for this kind yet.
        let _ = self.tx.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }
}

/// Outcome of one broadcast receive, with lag folded into "nothing new".
pub enum Delivery<T> {
    Message(T),
    Skipped,
    Closed,
}

pub fn delivery<T>(received: Result<T, RecvError>) -> Delivery<T> {
    match received {
        Ok(message) => Delivery::Message(message),
        Err(RecvError::Lagged(missed)) => {
            trace!(missed, "receiver lagged");
            Delivery::Skipped
        }
        Err(RecvError::Closed) => Delivery::Closed,
    }
}

pub struct Bus {
    pub events: Outbox<GameEvent>,
    pub player_state: Fanout<PlayerState>,
    pub alerts: Fanout<PlayerAlert>,
    pub collects: Fanout<PlayerCollect>,
    pub star_commands: Fanout<StarCommand>,
    pub stats: Arc<BusStats>,
}

impl Bus {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<GameEvent>) {
        let capacity = capacity.max(1);
        let stats = Arc::new(BusStats::default());
        let (tx, rx) = mpsc::channel(capacity);
        let bus = Self {
            events: Outbox::new(tx, stats.clone()),
            player_state: Fanout::new(capacity),
            alerts: Fanout::new(capacity),
            collects: Fanout::new(capacity),
            star_commands: Fanout::new(capacity),
            stats,
        };
        (bus, rx)
    }
}

/// Process-wide cancellation, observed by every actor at each await.
#[derive(Clone, Debug)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

pub fn shutdown_pair() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is triggered or the trigger is dropped.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}
