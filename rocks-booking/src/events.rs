use rocks_shared::OccupancyEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Fire-and-forget fan-out of occupancy changes to live subscribers.
#[derive(Clone)]
pub struct OccupancyFeed {
    tx: broadcast::Sender<OccupancyEvent>,
}

impl OccupancyFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: OccupancyEvent) {
        // No receivers is the normal case outside of open SSE streams.
        if let Err(e) = self.tx.send(event) {
            debug!("Occupancy event dropped: {} ({} subscribers)", e.0.tour_id, self.tx.receiver_count());
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OccupancyEvent> {
        self.tx.subscribe()
    }
}

impl Default for OccupancyFeed {
    fn default() -> Self {
        Self::new(256)
    }
}
