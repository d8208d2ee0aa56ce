//! Per-room serialisation.
//!
//! Ensures only one message per room is in flight at a time, so a reply
//! that opens a thread is recorded before the room's next message is
//! classified.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Each room maps to a `Semaphore(1)`; holding the permit gives exclusive
/// access to the room for one routed message.
pub struct RoomLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for RoomLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for the room's permit. It releases on drop.
    pub async fn acquire(&self, room: &str) -> Result<OwnedSemaphorePermit, RoomLockClosed> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(room.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        if let Ok(permit) = sem.clone().try_acquire_owned() {
            return Ok(permit);
        }
        tracing::debug!(room, "waiting for in-flight message in room");
        sem.acquire_owned().await.map_err(|_| RoomLockClosed)
    }

    /// Drop the room's entry unless someone holds or awaits it.
    pub fn release_idle(&self, room: &str) {
        let mut locks = self.locks.lock();
        if locks.get(room).is_some_and(|sem| is_idle(sem)) {
            locks.remove(room);
        }
    }

    /// Number of tracked rooms.
    pub fn room_count(&self) -> usize {
        self.locks.lock().len()
    }
}

fn is_idle(sem: &Arc<Semaphore>) -> bool {
    Arc::strong_count(sem) == 1 && sem.available_permits() == 1
}

#[derive(Debug, thiserror::Error)]
#[error("room lock closed")]
pub struct RoomLockClosed;
