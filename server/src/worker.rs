//! Session worker pool: a fixed pool of `max_games` identical tasks, each
//! repeatedly dequeuing one registration, running it to completion, and
//! releasing the slot.

use crate::engine::{self, LevelOutcome};
use crate::session::Session;
use crate::state::ServerState;
use protocol::RegistrationResponse;
use std::sync::Arc;
use std::time::Duration;

/// Spawns the fixed worker pool and returns immediately; workers run for the
/// lifetime of the process.
pub fn spawn_pool(state: Arc<ServerState>) {
    for _ in 0..state.max_games {
        let state = state.clone();
        tokio::spawn(async move { worker_loop(state).await });
    }
}

async fn worker_loop(state: Arc<ServerState>) {
    loop {
        let mut permit = Some(state.admission.acquire().await.expect("semaphore never closed"));

        // Late-arriving registrations should still be picked up even if
        // every worker was momentarily starved: release the token and back
        // off rather than block, then retry.
        let record = loop {
            if let Some(record) = state.queue.dequeue().await {
                break record;
            }
            permit.take();
            tokio::time::sleep(Duration::from_millis(100)).await;
            permit = Some(state.admission.acquire().await.expect("semaphore never closed"));
        };

        run_session(&state, permit.take().unwrap(), record).await;
    }
}

async fn run_session(
    state: &Arc<ServerState>,
    permit: tokio::sync::SemaphorePermit<'_>,
    record: crate::session::RegistrationRecord,
) {
    // Refuse a client id that is already active or still waiting in the
    // queue under another registration — admission-policy refusal, not a
    // read/write failure, so the connection is simply closed after the
    // refusal response rather than routed through `session.error`.
    if state.registry.has_active(record.client_id).await
        || state.queue.contains_client_id(record.client_id).await
    {
        tracing::info!(client_id = record.client_id, "refusing duplicate registration");
        let response = RegistrationResponse { accepted: false }.encode();
        let mut socket = record.socket;
        let _ = protocol::write_all_framed(&mut socket, &response).await;
        return;
    }

    let (read_half, write_half) = record.socket.into_split();
    let session = Arc::new(Session::new(record.client_id, write_half));

    {
        let response = RegistrationResponse { accepted: true }.encode();
        let mut write_half = session.write_half.lock().await;
        if let Err(error) = protocol::write_all_framed(&mut *write_half, &response).await {
            tracing::warn!(?error, client_id = record.client_id, "failed to send registration response");
            return;
        }
    }

    session.set_active(true);
    let slot = state.registry.install(session.clone()).await;

    let outcome = play_session(state, &session, read_half).await;

    session.set_active(false);
    state.registry.release(slot).await;
    drop(permit);

    tracing::info!(client_id = record.client_id, ?outcome, "session finished");
}

#[derive(Debug)]
enum SessionOutcome {
    Completed,
    Aborted,
}

async fn play_session(
    state: &Arc<ServerState>,
    session: &Arc<Session>,
    mut read_half: tokio::net::unix::OwnedReadHalf,
) -> SessionOutcome {
    let levels = match engine::list_levels(&state.level_directory).await {
        Ok(levels) => levels,
        Err(error) => {
            tracing::warn!(?error, client_id = session.client_id, "failed to open level directory");
            session.set_error();
            engine::finish_session(session, read_half).await;
            return SessionOutcome::Aborted;
        }
    };

    let mut accumulated_points = 0u32;
    for level_name in levels {
        let board = match board::load_level(&state.level_directory, &level_name, accumulated_points).await {
            Ok(board) => Arc::new(board),
            Err(error) => {
                tracing::warn!(?error, client_id = session.client_id, level = %level_name, "failed to load level");
                session.set_error();
                engine::finish_session(session, read_half).await;
                return SessionOutcome::Aborted;
            }
        };
        session.rebind_score(board.clone()).await;

        let (returned_read_half, outcome) = engine::run_level(session, read_half, board.clone()).await;
        read_half = returned_read_half;

        match outcome {
            LevelOutcome::Abort => return SessionOutcome::Aborted,
            LevelOutcome::QuitGame => {
                engine::finish_session(session, read_half).await;
                return SessionOutcome::Completed;
            }
            LevelOutcome::NextLevel => {
                accumulated_points = board.points().await;
            }
        }
    }

    engine::finish_session(session, read_half).await;
    SessionOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RegistrationRecord;
    use protocol::{encode_disconnect, Play};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixStream;

    async fn read_response(stream: &mut UnixStream) -> RegistrationResponse {
        let mut opcode_byte = [0u8; 1];
        stream.read_exact(&mut opcode_byte).await.unwrap();
        let mut body = [0u8; RegistrationResponse::BODY_LEN];
        stream.read_exact(&mut body).await.unwrap();
        RegistrationResponse::decode(protocol::OpCode::Connect, &body).unwrap()
    }

    /// A second registration for a client id that is already occupying the
    /// only slot is queued but never answered until the first session
    /// releases it (spec.md §8 scenario 2: admission queueing).
    #[tokio::test]
    async fn a_queued_registration_is_served_only_after_the_slot_is_released() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.lvl"), "WWW\nWPW\nWWW\n\ntempo 20\n").unwrap();
        let state = ServerState::new(dir.path().to_path_buf(), 1);
        spawn_pool(state.clone());

        let (mut client_a, server_a) = UnixStream::pair().unwrap();
        state
            .queue
            .enqueue(RegistrationRecord {
                client_id: 1,
                socket: server_a,
            })
            .await;
        let response_a = read_response(&mut client_a).await;
        assert!(response_a.accepted);

        // Drain A's board-update frames in the background so the server's
        // writes never stall on an unread socket while A idles in-game.
        let (mut client_a_read, mut client_a_write) = client_a.into_split();
        let _drain_a = tokio::spawn(async move {
            let mut sink = [0u8; 4096];
            while client_a_read.read(&mut sink).await.unwrap_or(0) > 0 {}
        });

        let (mut client_b, server_b) = UnixStream::pair().unwrap();
        state
            .queue
            .enqueue(RegistrationRecord {
                client_id: 2,
                socket: server_b,
            })
            .await;

        // The single worker is still busy with client A, so B gets no
        // response at all yet.
        let mut probe = [0u8; 1];
        let premature = tokio::time::timeout(Duration::from_millis(150), client_b.read(&mut probe)).await;
        assert!(premature.is_err(), "client B must not be answered while A holds the only slot");

        // A disconnects, releasing the slot; B is then picked up off the queue.
        client_a_write.write_all(&encode_disconnect()).await.unwrap();
        drop(client_a_write);

        let response_b = tokio::time::timeout(Duration::from_secs(2), read_response(&mut client_b))
            .await
            .expect("client B should be served once the slot frees up");
        assert!(response_b.accepted);
    }

    /// A second registration carrying a client id already active is refused
    /// outright (spec.md §8 scenario 3: refused duplicate identity).
    #[tokio::test]
    async fn duplicate_client_id_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        // A long tempo means client A's session only ever emits the single
        // initial DEFAULT frame within this test's lifetime, so there is
        // nothing to drain on its connection.
        std::fs::write(dir.path().join("one.lvl"), "WWW\nWPW\nWWW\n\ntempo 100000\n").unwrap();
        let state = ServerState::new(dir.path().to_path_buf(), 2);
        spawn_pool(state.clone());

        let (mut client_a, server_a) = UnixStream::pair().unwrap();
        state
            .queue
            .enqueue(RegistrationRecord {
                client_id: 1,
                socket: server_a,
            })
            .await;
        let response_a = read_response(&mut client_a).await;
        assert!(response_a.accepted);

        let (mut client_dup, server_dup) = UnixStream::pair().unwrap();
        state
            .queue
            .enqueue(RegistrationRecord {
                client_id: 1,
                socket: server_dup,
            })
            .await;
        let response_dup = tokio::time::timeout(Duration::from_secs(2), read_response(&mut client_dup))
            .await
            .expect("duplicate registration should be answered promptly");
        assert!(!response_dup.accepted);
    }

    /// Points accumulated in one level carry forward as the starting score of
    /// the next (spec.md §4.7: `UnloadLevel`/`LoadLevel` carry `points`).
    #[tokio::test]
    async fn points_carry_forward_across_levels() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.lvl"), "WWWW\nWP.@\nWWWW\n\ntempo 10\n").unwrap();
        std::fs::write(dir.path().join("two.lvl"), "WWW\nWPW\nWWW\n\ntempo 10\n").unwrap();
        let state = ServerState::new(dir.path().to_path_buf(), 1);

        let (client, server) = UnixStream::pair().unwrap();
        let (mut client_read, mut client_write) = client.into_split();
        let (server_read, server_write) = server.into_split();
        let session = Arc::new(Session::new(1, server_write));

        // Collect the dot, reach the portal to finish level one, then quit
        // immediately once level two starts.
        client_write.write_all(&Play { command: b'R' }.encode()).await.unwrap();
        client_write.write_all(&Play { command: b'R' }.encode()).await.unwrap();
        client_write.write_all(&Play { command: b'Q' }.encode()).await.unwrap();
        drop(client_write);

        // Not joined: the drain only reaches EOF once `session`'s write half
        // is dropped, which happens after this test function returns.
        let _drain = tokio::spawn(async move {
            let mut sink = [0u8; 4096];
            while client_read.read(&mut sink).await.unwrap_or(0) > 0 {}
        });

        let outcome = play_session(&state, &session, server_read).await;
        assert!(matches!(outcome, SessionOutcome::Completed));
        assert_eq!(session.points().await, 1);
    }

    /// An empty level directory emits an immediate ENDGAME frame and then
    /// waits for DISCONNECT (spec.md §8 Boundary: empty level directory).
    #[tokio::test]
    async fn empty_level_directory_ends_the_game_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let state = ServerState::new(dir.path().to_path_buf(), 1);

        let (client, server) = UnixStream::pair().unwrap();
        let (mut client_read, mut client_write) = client.into_split();
        let (server_read, server_write) = server.into_split();
        let session = Arc::new(Session::new(1, server_write));

        client_write.write_all(&encode_disconnect()).await.unwrap();
        drop(client_write);

        let outcome = play_session(&state, &session, server_read).await;
        assert!(matches!(outcome, SessionOutcome::Completed));

        let mut opcode_byte = [0u8; 1];
        client_read.read_exact(&mut opcode_byte).await.unwrap();
        assert_eq!(opcode_byte[0], protocol::OpCode::Board as u8);
        let mut body = [0u8; protocol::BoardUpdateHeader::BODY_LEN];
        client_read.read_exact(&mut body).await.unwrap();
        let header = protocol::BoardUpdateHeader::decode(protocol::OpCode::Board, &body).unwrap();
        assert_eq!(header.game_over, protocol::GameOver::EndGame);
        assert_eq!(header.payload_len(), None);
    }
}
