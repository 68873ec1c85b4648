//! Admission / dispatcher task (`Hosting`).
//!
//! Owns the rendezvous `UnixListener`. `accept()` already yields a fresh
//! duplex connection per client, which removes the EOF-reopen dance a
//! single always-open reader on a named pipe would need: there is no
//! "would-block, sleep, retry" loop here because accepting is the natural
//! suspension point. What remains from the original design is the 100 ms
//! cadence for polling the operator-signal flag, modeled as a parallel
//! branch of the same `select!` rather than a separate timer task.

use crate::leaderboard;
use crate::session::RegistrationRecord;
use crate::state::ServerState;
use protocol::{read_exact_framed, OpCode, Registration};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::time::interval;

pub async fn run(state: Arc<ServerState>, listener: UnixListener) {
    let mut signal_tick = interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, _addr)) => {
                        let state = state.clone();
                        tokio::spawn(async move { accept_one(state, socket).await });
                    }
                    Err(error) => {
                        tracing::warn!(?error, "failed to accept rendezvous connection");
                    }
                }
            }
            _ = signal_tick.tick() => {
                if state.take_leaderboard_signal() {
                    leaderboard::generate(&state).await;
                }
            }
        }
    }
}

/// Reads one `Registration` frame off a freshly accepted connection and
/// enqueues it. A malformed or truncated registration is terminal only for
/// this connection — the dispatcher itself never aborts.
async fn accept_one(state: Arc<ServerState>, mut socket: tokio::net::UnixStream) {
    let mut opcode_byte = [0u8; 1];
    if let Err(error) = read_exact_framed(&mut socket, &mut opcode_byte).await {
        tracing::warn!(?error, "registration read failed");
        return;
    }
    let opcode = match OpCode::try_from(opcode_byte[0]) {
        Ok(op) => op,
        Err(error) => {
            tracing::warn!(?error, "unrecognized opcode on rendezvous connection");
            return;
        }
    };
    let mut body = [0u8; Registration::BODY_LEN];
    if let Err(error) = read_exact_framed(&mut socket, &mut body).await {
        tracing::warn!(?error, "registration read failed");
        return;
    }
    let registration = match Registration::decode(opcode, &body) {
        Ok(r) => r,
        Err(error) => {
            tracing::warn!(?error, "malformed registration frame");
            return;
        }
    };
    let Some(client_id) = protocol::parse_client_id(&registration.identity) else {
        tracing::warn!(identity = %registration.identity, "registration with unparseable client id");
        return;
    };

    state
        .queue
        .enqueue(RegistrationRecord { client_id, socket })
        .await;
}
