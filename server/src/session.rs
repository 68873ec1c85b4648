//! Per-client session state and the registration queue's FIFO node.

use board::Board;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// The authoritative per-client state, installed into exactly one registry
/// slot for the lifetime of its owning worker's session loop.
///
/// `shutdown`/`error` are lock-free flags so agent tasks can poll them at
/// tempo granularity without contending for `write_half`. `score` is rebound
/// to the current level's [`Board`] each level by the game engine, rather
/// than a raw pointer into it, so the leaderboard never reads a dangling
/// indirection across a level boundary.
pub struct Session {
    pub client_id: u32,
    pub write_half: Mutex<OwnedWriteHalf>,
    pub active: AtomicBool,
    pub shutdown: AtomicBool,
    pub error: AtomicBool,
    score: RwLock<Option<Arc<Board>>>,
    cancel: RwLock<CancellationToken>,
}

impl Session {
    pub fn new(client_id: u32, write_half: OwnedWriteHalf) -> Self {
        Session {
            client_id,
            write_half: Mutex::new(write_half),
            active: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            error: AtomicBool::new(false),
            score: RwLock::new(None),
            cancel: RwLock::new(CancellationToken::new()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, value: bool) {
        self.active.store(value, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn set_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn has_error(&self) -> bool {
        self.error.load(Ordering::Acquire)
    }

    pub fn set_error(&self) {
        self.error.store(true, Ordering::Release);
    }

    /// Rebinds the score indirection to the given level's board.
    pub async fn rebind_score(&self, board: Arc<Board>) {
        *self.score.write().await = Some(board);
    }

    /// Reads the current level's accumulated points, the value the
    /// leaderboard snapshots. Zero before any level has loaded.
    pub async fn points(&self) -> u32 {
        match self.score.read().await.clone() {
            Some(board) => board.points().await,
            None => 0,
        }
    }

    /// Replaces the per-level cancellation token with a fresh one, used by a
    /// ghost task to interrupt the pacman task's in-flight read the instant
    /// it kills pacman. Returns the new token so the caller can hand clones
    /// to the tasks spawned for this level.
    pub async fn reset_cancel(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.write().await = token.clone();
        token
    }

    pub async fn cancel_token(&self) -> CancellationToken {
        self.cancel.read().await.clone()
    }

    pub async fn cancel_current_level(&self) {
        self.cancel.read().await.cancel();
    }
}

/// FIFO node created by the dispatcher and consumed by the worker that
/// dequeues it. The successor link is just `VecDeque`'s own representation;
/// nothing outside the queue observes it.
pub struct RegistrationRecord {
    pub client_id: u32,
    pub socket: tokio::net::UnixStream,
}
