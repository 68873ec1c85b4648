//! Process-global server state: the session registry, registration queue,
//! admission semaphore and operator-signal flag, encapsulated in one value
//! owned by the process (there is no multi-server use case).

use crate::session::{RegistrationRecord, Session};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// A fixed-size array of `max_games` slots. A slot is either empty or holds
/// the session currently assigned to it.
pub struct SessionRegistry {
    slots: Mutex<Vec<Option<Arc<Session>>>>,
}

impl SessionRegistry {
    fn new(max_games: usize) -> Self {
        SessionRegistry {
            slots: Mutex::new((0..max_games).map(|_| None).collect()),
        }
    }

    /// Claims the first empty or stale (occupant present but inactive) slot
    /// for `session`. Returns the slot index. Panics if none is free — the
    /// admission semaphore guarantees at most `max_games` concurrent active
    /// sessions, so a full registry here is a programming error, not a
    /// recoverable condition.
    pub async fn install(&self, session: Arc<Session>) -> usize {
        let mut slots = self.slots.lock().await;
        let index = slots
            .iter()
            .position(|slot| slot.as_ref().is_none_or(|s| !s.is_active()))
            .expect("admission semaphore guarantees a free registry slot");
        slots[index] = Some(session);
        index
    }

    pub async fn release(&self, index: usize) {
        let mut slots = self.slots.lock().await;
        slots[index] = None;
    }

    /// Snapshots every slot currently holding an active session, for the
    /// leaderboard generator. Released before any I/O is performed on the
    /// snapshot.
    pub async fn active_snapshot(&self) -> Vec<Arc<Session>> {
        let slots = self.slots.lock().await;
        slots
            .iter()
            .filter_map(|slot| slot.clone())
            .filter(|session| session.is_active())
            .collect()
    }

    /// Whether an active session with this client id already occupies a slot
    /// — used to refuse a duplicate registration before it is admitted.
    pub async fn has_active(&self, client_id: u32) -> bool {
        let slots = self.slots.lock().await;
        slots.iter().flatten().any(|session| session.is_active() && session.client_id == client_id)
    }
}

/// FIFO of accepted but not-yet-assigned registrations.
pub struct RegistrationQueue {
    records: Mutex<VecDeque<RegistrationRecord>>,
}

impl RegistrationQueue {
    fn new() -> Self {
        RegistrationQueue {
            records: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn enqueue(&self, record: RegistrationRecord) {
        self.records.lock().await.push_back(record);
    }

    /// Non-blocking dequeue. Workers that find the queue empty release the
    /// admission semaphore and back off, rather than waiting here.
    pub async fn dequeue(&self) -> Option<RegistrationRecord> {
        self.records.lock().await.pop_front()
    }

    /// Whether a registration with this client id is still waiting in the
    /// queue — used alongside [`SessionRegistry::has_active`] to refuse a
    /// second registration for an id already in flight.
    pub async fn contains_client_id(&self, client_id: u32) -> bool {
        self.records.lock().await.iter().any(|record| record.client_id == client_id)
    }
}

/// Everything the dispatcher, the worker pool, and the leaderboard generator
/// share. One instance per process, held behind an `Arc`.
pub struct ServerState {
    pub level_directory: PathBuf,
    pub max_games: usize,
    pub registry: SessionRegistry,
    pub queue: RegistrationQueue,
    pub admission: Semaphore,
    pub leaderboard_signal: AtomicBool,
}

impl ServerState {
    pub fn new(level_directory: PathBuf, max_games: usize) -> Arc<ServerState> {
        Arc::new(ServerState {
            level_directory,
            max_games,
            registry: SessionRegistry::new(max_games),
            queue: RegistrationQueue::new(),
            admission: Semaphore::new(max_games),
            leaderboard_signal: AtomicBool::new(false),
        })
    }

    /// Atomically clears the operator-signal flag and reports whether it had
    /// been set. Called only from the dispatcher's interval tick.
    pub fn take_leaderboard_signal(&self) -> bool {
        self.leaderboard_signal.swap(false, Ordering::AcqRel)
    }

    pub fn raise_leaderboard_signal(&self) {
        self.leaderboard_signal.store(true, Ordering::Release);
    }
}
