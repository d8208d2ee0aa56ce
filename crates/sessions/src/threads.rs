//! Per-room threads with idle expiry.
//!
//! A room has at most one open thread. Every interactive turn re-arms the
//! room's timer; a non-interactive turn closes the thread. When the timer
//! fires the thread is dropped silently, since the brain keeps its own TTL.
//!
//! Each timer carries the generation it was armed with. Re-arming aborts
//! the previous task and bumps the generation under the same lock, so a
//! stale timer that already woke up finds a newer generation and leaves
//! the refreshed thread alone.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use ra_domain::trace::TraceEvent;
use ra_domain::ReplyMeta;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Snapshot of an open thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub room: String,
    pub token: String,
    pub duration: Duration,
    pub expires_at: Instant,
}

struct Entry {
    token: String,
    duration: Duration,
    expires_at: Instant,
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Table {
    rooms: HashMap<String, Entry>,
    next_generation: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SessionStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Open threads keyed by room. Timers are Tokio tasks, so every mutating
/// call must run inside a runtime.
pub struct SessionStore {
    table: Arc<Mutex<Table>>,
    default_idle: Duration,
}

impl SessionStore {
    pub fn new(default_idle: Duration) -> Self {
        Self {
            table: Arc::new(Mutex::new(Table::default())),
            default_idle,
        }
    }

    /// The open thread's token for `room`, if any.
    pub fn check_thread(&self, room: &str) -> Option<String> {
        self.table.lock().rooms.get(room).map(|e| e.token.clone())
    }

    /// Apply the thread bookkeeping of one processed reply.
    pub fn handle_turn(&self, meta: &ReplyMeta, room: &str) {
        if !meta.interactive {
            self.close(room);
            return;
        }

        let Some(token) = meta.conversation_token.as_deref() else {
            tracing::warn!(room = %room, "interactive reply without a thread id, closing thread");
            self.close(room);
            return;
        };

        let duration = meta.duration.unwrap_or(self.default_idle);
        self.open(room, token, duration);
    }

    /// Create the room's thread or re-arm it. Same token keeps identity;
    /// a different token replaces the thread.
    pub fn open(&self, room: &str, token: &str, duration: Duration) {
        let mut table = self.table.lock();
        table.next_generation += 1;
        let generation = table.next_generation;

        let refreshed = match table.rooms.remove(room) {
            Some(old) => {
                old.timer.abort();
                old.token == token
            }
            None => false,
        };

        let timer = spawn_timer(
            Arc::downgrade(&self.table),
            room.to_owned(),
            generation,
            duration,
        );
        table.rooms.insert(
            room.to_owned(),
            Entry {
                token: token.to_owned(),
                duration,
                expires_at: Instant::now() + duration,
                generation,
                timer,
            },
        );
        drop(table);

        let (room, token, duration_secs) = (room.to_owned(), token.to_owned(), duration.as_secs());
        if refreshed {
            tracing::debug!(room = %room, duration_secs, "thread refreshed");
            TraceEvent::ThreadRefreshed {
                room,
                token,
                duration_secs,
            }
            .emit();
        } else {
            tracing::debug!(room = %room, duration_secs, "thread opened");
            TraceEvent::ThreadOpened {
                room,
                token,
                duration_secs,
            }
            .emit();
        }
    }

    /// Close the room's thread. Returns whether one was open.
    pub fn close(&self, room: &str) -> bool {
        let removed = self.table.lock().rooms.remove(room);
        match removed {
            Some(entry) => {
                entry.timer.abort();
                TraceEvent::ThreadClosed {
                    room: room.to_owned(),
                }
                .emit();
                true
            }
            None => false,
        }
    }

    pub fn list(&self) -> Vec<Thread> {
        let table = self.table.lock();
        let mut threads: Vec<Thread> = table
            .rooms
            .iter()
            .map(|(room, e)| Thread {
                room: room.clone(),
                token: e.token.clone(),
                duration: e.duration,
                expires_at: e.expires_at,
            })
            .collect();
        threads.sort_by(|a, b| a.room.cmp(&b.room));
        threads
    }

    pub fn len(&self) -> usize {
        self.table.lock().rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        for (_, entry) in self.table.lock().rooms.drain() {
            entry.timer.abort();
        }
    }
}

fn spawn_timer(
    table: Weak<Mutex<Table>>,
    room: String,
    generation: u64,
    duration: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        if let Some(table) = table.upgrade() {
            expire(&table, &room, generation);
        }
    })
}

/// Drop the room's thread if it still belongs to `generation`.
fn expire(table: &Mutex<Table>, room: &str, generation: u64) -> bool {
    let mut table = table.lock();
    let current = table.rooms.get(room).map(|e| e.generation);
    if current != Some(generation) {
        return false;
    }
    let Some(entry) = table.rooms.remove(room) else {
        return false;
    };
    drop(table);

    tracing::debug!(room = %room, "thread expired");
    TraceEvent::ThreadExpired {
        room: room.to_owned(),
        token: entry.token,
    }
    .emit();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interactive(token: &str, secs: u64) -> ReplyMeta {
        ReplyMeta {
            conversation_token: Some(token.into()),
            interactive: true,
            duration: Some(Duration::from_secs(secs)),
        }
    }

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(300))
    }

    #[tokio::test(start_paused = true)]
    async fn interactive_turn_opens_thread_until_idle_expiry() {
        let s = store();
        s.handle_turn(&interactive("t1", 60), "R");
        assert_eq!(s.check_thread("R").as_deref(), Some("t1"));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(s.check_thread("R").as_deref(), Some("t1"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(s.check_thread("R").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn non_interactive_turn_closes_any_thread() {
        let s = store();
        s.handle_turn(&ReplyMeta::default(), "empty");
        assert!(s.check_thread("empty").is_none());

        s.handle_turn(&interactive("t1", 60), "R");
        s.handle_turn(&ReplyMeta::default(), "R");
        assert!(s.check_thread("R").is_none());
        assert!(s.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_rearms_timer() {
        let s = store();
        s.handle_turn(&interactive("t1", 60), "R");

        tokio::time::sleep(Duration::from_secs(50)).await;
        s.handle_turn(&interactive("t1", 60), "R");

        // Past the first deadline, inside the second.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(s.check_thread("R").as_deref(), Some("t1"));

        tokio::time::sleep(Duration::from_secs(41)).await;
        assert!(s.check_thread("R").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn new_token_overwrites_thread() {
        let s = store();
        s.handle_turn(&interactive("t1", 60), "R");
        s.handle_turn(&interactive("t2", 30), "R");

        let threads = s.list();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].token, "t2");
        assert_eq!(threads[0].duration, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_duration_uses_default_idle() {
        let s = SessionStore::new(Duration::from_secs(10));
        s.handle_turn(
            &ReplyMeta {
                conversation_token: Some("t1".into()),
                interactive: true,
                duration: None,
            },
            "R",
        );
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(s.check_thread("R").is_some());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(s.check_thread("R").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn interactive_reply_without_token_closes() {
        let s = store();
        s.handle_turn(&interactive("t1", 60), "R");
        s.handle_turn(
            &ReplyMeta {
                conversation_token: None,
                interactive: true,
                duration: None,
            },
            "R",
        );
        assert!(s.check_thread("R").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_generation_does_not_expire_refreshed_thread() {
        let s = store();
        s.open("R", "t1", Duration::from_secs(60));
        let first = s.table.lock().rooms["R"].generation;
        s.open("R", "t1", Duration::from_secs(60));

        assert!(!expire(&s.table, "R", first));
        assert_eq!(s.check_thread("R").as_deref(), Some("t1"));

        let second = s.table.lock().rooms["R"].generation;
        assert!(expire(&s.table, "R", second));
        assert!(s.check_thread("R").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rooms_expire_independently() {
        let s = store();
        s.open("a", "ta", Duration::from_secs(10));
        s.open("b", "tb", Duration::from_secs(100));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(s.check_thread("a").is_none());
        assert_eq!(s.check_thread("b").as_deref(), Some("tb"));
    }

    #[tokio::test]
    async fn close_reports_whether_thread_existed() {
        let s = store();
        assert!(!s.close("R"));
        s.open("R", "t1", Duration::from_secs(60));
        assert!(s.close("R"));
        assert!(!s.close("R"));
    }
}
