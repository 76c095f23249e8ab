use tokio::sync::broadcast;
use tracing::debug;

use crate::bus::{delivery, Delivery, Outbox, Shutdown};
use crate::events::{GameEvent, PlayerCollect};
use crate::types::{EntityId, Position};

/// Invisibility pickup. Waits for the player to collect it at its own cell,
/// reports the removal and the effect, then ends.
pub struct InvisibilityActor {
    pub id: EntityId,
    pub at: Position,
    pub steps: u32,
    pub events: Outbox<GameEvent>,
    pub collects: broadcast::Receiver<PlayerCollect>,
    pub shutdown: Shutdown,
}

impl InvisibilityActor {
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                received = self.collects.recv() => match delivery(received) {
                    Delivery::Message(PlayerCollect { at }) if at == self.at => {
                        self.events.post(GameEvent::RemoveItem { id: self.id, at });
                        self.events.post(GameEvent::ApplyInvisibility {
                            id: self.id,
                            steps: self.steps,
                        });
                        debug!(entity = %self.id, %at, "invisibility collected");
                        return;
                    }
                    Delivery::Message(_) | Delivery::Skipped => {}
                    Delivery::Closed => break,
                },
            }
        }
        debug!(entity = %self.id, "invisibility item retired uncollected");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::bus::{shutdown_pair, BusStats, Fanout};
    use crate::types::EntityKind;

    const ID: EntityId = EntityId::new(EntityKind::Invisibility, 0);

    #[tokio::test(start_paused = true)]
    async fn double_collect_yields_one_effect() {
        let (tx, mut rx) = mpsc::channel(10);
        let collects = Fanout::new(10);
        let (_trigger, shutdown) = shutdown_pair();
        let actor = InvisibilityActor {
            id: ID,
            at: Position::new(2, 1),
            steps: 20,
            events: Outbox::new(tx, Arc::new(BusStats::default())),
            collects: collects.subscribe(),
            shutdown,
        };
        collects.post(PlayerCollect { at: Position::new(5, 5) });
        collects.post(PlayerCollect { at: Position::new(2, 1) });
        collects.post(PlayerCollect { at: Position::new(2, 1) });
        actor.run().await;

        assert_eq!(
            rx.recv().await,
            Some(GameEvent::RemoveItem { id: ID, at: Position::new(2, 1) })
        );
        assert_eq!(
            rx.recv().await,
            Some(GameEvent::ApplyInvisibility { id: ID, steps: 20 })
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_item_emits_nothing() {
        let (tx, mut rx) = mpsc::channel(10);
        let collects = Fanout::new(10);
        let (trigger, shutdown) = shutdown_pair();
        let task = tokio::spawn(
            InvisibilityActor {
                id: ID,
                at: Position::new(1, 1),
                steps: 20,
                events: Outbox::new(tx, Arc::new(BusStats::default())),
                collects: collects.subscribe(),
                shutdown,
            }
            .run(),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.trigger();
        task.await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
