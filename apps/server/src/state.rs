use parlor_store::{ChangeEvent, ChangeOp, Table};
use sqlx::SqlitePool;
use tokio::sync::broadcast;

const FEED_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ChangeEvent>,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Self {
        let (events, _) = broadcast::channel(FEED_CAPACITY);
        Self { db: pool, events }
    }

    /// Broadcasts a change notification after a mutation commits.
    /// No subscribers is fine; the feed is best-effort by contract.
    pub fn notify(&self, table: Table, op: ChangeOp) {
        let _ = self.events.send(ChangeEvent::new(table, op));
    }
}
