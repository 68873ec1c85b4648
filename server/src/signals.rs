//! Signal plane: SIGUSR1 means "dump the leaderboard now". The handler only
//! sets a flag; all processing happens on the dispatcher's next interval
//! tick. Tokio's signal stream already defers delivery to an async task, so
//! there is no hand-rolled async-signal-safe-handler discipline to write —
//! that's the whole point of using it here instead of `libc::signal`.

use crate::state::ServerState;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

pub fn spawn(state: Arc<ServerState>) -> anyhow::Result<()> {
    let mut stream = signal(SignalKind::user_defined1())?;
    tokio::spawn(async move {
        loop {
            if stream.recv().await.is_none() {
                tracing::warn!("SIGUSR1 stream closed, leaderboard signal no longer observed");
                break;
            }
            state.raise_leaderboard_signal();
        }
    });
    Ok(())
}
