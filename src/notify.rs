use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-venue broadcast of committed events. Channels are created lazily by
/// the first subscriber.
#[derive(Default)]
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, venue_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(venue_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op when nobody is listening.
    pub fn send(&self, venue_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&venue_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop the venue's channel; open receivers see the stream close.
    pub fn remove(&self, venue_id: &Ulid) {
        self.channels.remove(venue_id);
    }

    /// Drop the venue's channel if it has no receivers left.
    pub fn release(&self, venue_id: &Ulid) {
        self.channels.remove_if(venue_id, |_, sender| sender.receiver_count() == 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
