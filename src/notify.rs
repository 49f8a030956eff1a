use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::StatusEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Fan-out of status changes, per space type and for all space types.
///
/// Downstream notification delivery (email, push) subscribes here; a slow
/// subscriber lags and loses the oldest events rather than blocking writers.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<StatusEvent>>,
    all: broadcast::Sender<StatusEvent>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to one space type. Creates the channel if needed.
    pub fn subscribe(&self, space_type: &str) -> broadcast::Receiver<StatusEvent> {
        self.channels
            .entry(space_type.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<StatusEvent> {
        self.all.subscribe()
    }

    /// Publish. No-op for channels nobody listens on.
    pub fn send(&self, event: &StatusEvent) {
        if let Some(sender) = self.channels.get(&event.space_type) {
            let _ = sender.send(event.clone());
        }
        let _ = self.all.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CancelReason, ReservationStatus, TransitionReason};
    use chrono::Utc;
    use ulid::Ulid;

    fn event(space: &str) -> StatusEvent {
        StatusEvent {
            reservation_id: Ulid::new(),
            space_type: space.into(),
            from: ReservationStatus::Pending,
            to: ReservationStatus::Cancelled(CancelReason::CreationTimeout),
            reason: Some(TransitionReason::CreationTimeout),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe("coworking");
        let mut all = hub.subscribe_all();

        let e = event("coworking");
        hub.send(&e);

        assert_eq!(rx.recv().await.unwrap(), e);
        assert_eq!(all.recv().await.unwrap(), e);
    }

    #[tokio::test]
    async fn other_space_types_filtered() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe("coworking");
        hub.send(&event("meeting-room"));
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(&event("coworking"));
    }
}
