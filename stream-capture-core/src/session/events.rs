use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use parking_lot::Mutex;

use crate::models::event::SessionEvent;

/// Fan-out of session events to bounded subscriber channels.
///
/// Publishing never blocks: a full subscriber misses the event (counted and
/// logged), a disconnected one is pruned.
pub struct EventBus {
    subscribers: Mutex<Vec<SyncSender<SessionEvent>>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::sync_channel(self.capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: SessionEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 64 == 1 {
                    log::warn!("Event subscriber is full; {} events dropped so far", dropped);
                }
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::state::SessionState;

    fn status(slot: usize) -> SessionEvent {
        SessionEvent::StatusChanged {
            slot,
            state: SessionState::Idle,
            message: "Idle".into(),
        }
    }

    #[test]
    fn every_subscriber_receives_events() {
        let bus = EventBus::new(4);
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(status(1));
        assert_eq!(a.try_recv().unwrap().slot(), 1);
        assert_eq!(b.try_recv().unwrap().slot(), 1);
    }

    #[test]
    fn full_subscriber_drops_without_blocking() {
        let bus = EventBus::new(2);
        let rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(status(i));
        }
        assert_eq!(bus.dropped_events(), 3);
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn disconnected_subscribers_are_pruned() {
        let bus = EventBus::new(2);
        let rx = bus.subscribe();
        drop(rx);
        let _kept = bus.subscribe();
        bus.publish(status(0));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn events_cross_threads() {
        let bus = std::sync::Arc::new(EventBus::new(8));
        let rx = bus.subscribe();
        let publisher = std::sync::Arc::clone(&bus);
        std::thread::spawn(move || publisher.publish(status(7))).join().unwrap();
        assert_eq!(rx.recv().unwrap().slot(), 7);
    }
}
