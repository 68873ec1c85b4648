//! Per-session game engine: for each level, spawns the pacman, ghost and
//! broadcaster tasks, joins them, and reacts to the outcome.

use crate::session::Session;
use board::{Board, BoardState, MoveResult};
use protocol::{read_exact_framed, write_all_framed, GameOver, OpCode, Play};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::unix::OwnedReadHalf;
use tokio::time::{interval, sleep};

pub enum LevelOutcome {
    /// `session.error` was set; the worker must release the session without
    /// advancing further levels.
    Abort,
    NextLevel,
    QuitGame,
}

/// Enumerates the level directory, returning `.lvl` files in sorted order.
/// Non-dotfiles only, matching the suffix/dotfile filter; sorting by name
/// gives a deterministic order where the original relies on unspecified
/// `readdir` order.
pub async fn list_levels(directory: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(directory).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with('.') || !name.ends_with(".lvl") {
            continue;
        }
        names.push(name.to_string());
    }
    names.sort();
    Ok(names)
}

/// Runs one level to completion, self-healing if the board is left in
/// `ContinuePlay` after the pacman task exits (a race that should not occur
/// in normal play; the original leaves this possibility open).
pub async fn run_level(
    session: &Arc<Session>,
    mut read_half: OwnedReadHalf,
    board: Arc<Board>,
) -> (OwnedReadHalf, LevelOutcome) {
    loop {
        board.set_state(BoardState::ContinuePlay).await;
        if let Err(error) = send_board_update(session, &board, GameOver::No, false).await {
            tracing::warn!(?error, client_id = session.client_id, "failed to send default frame");
        }

        session.shutdown.store(false, Ordering::Release);
        let cancel = session.reset_cancel().await;

        let ghost_count = board.ghost_count().await;
        let mut ghost_handles = Vec::with_capacity(ghost_count);
        for index in 0..ghost_count {
            let ghost_board = board.clone();
            let ghost_session = session.clone();
            let ghost_cancel = cancel.clone();
            ghost_handles.push(tokio::spawn(async move {
                ghost_task(index, ghost_board, ghost_session, ghost_cancel).await
            }));
        }

        let broadcaster_handle = {
            let broadcaster_board = board.clone();
            let broadcaster_session = session.clone();
            tokio::spawn(async move { broadcaster_task(broadcaster_board, broadcaster_session).await })
        };

        read_half = pacman_task(read_half, board.clone(), session.clone(), cancel).await;

        if session.has_error() {
            for handle in ghost_handles {
                handle.abort();
            }
            broadcaster_handle.abort();
            return (read_half, LevelOutcome::Abort);
        }

        session.set_shutdown();
        for handle in ghost_handles {
            let _ = handle.await;
        }
        let _ = broadcaster_handle.await;

        match board.state().await {
            BoardState::NextLevel => {
                if let Err(error) = send_board_update(session, &board, GameOver::No, true).await {
                    tracing::warn!(?error, client_id = session.client_id, "failed to send victory frame");
                }
                sleep(Duration::from_millis(board.tempo_ms as u64)).await;
                return (read_half, LevelOutcome::NextLevel);
            }
            BoardState::QuitGame => {
                if let Err(error) = send_board_update(session, &board, GameOver::Yes, false).await {
                    tracing::warn!(?error, client_id = session.client_id, "failed to send gameover frame");
                }
                sleep(Duration::from_millis(board.tempo_ms as u64)).await;
                return (read_half, LevelOutcome::QuitGame);
            }
            BoardState::ContinuePlay => {
                tracing::warn!(
                    client_id = session.client_id,
                    "board left in ContinuePlay after pacman exit, restarting level tasks"
                );
                continue;
            }
        }
    }
}

/// Reads `Play` commands from the client, applying each to the board, until
/// pacman dies, wins, quits, disconnects, or the read fails. Its in-flight
/// read is cancelled the instant a ghost kills pacman so it never blocks on
/// a client that will not send another command.
async fn pacman_task(
    mut read_half: OwnedReadHalf,
    board: Arc<Board>,
    session: Arc<Session>,
    cancel: tokio_util::sync::CancellationToken,
) -> OwnedReadHalf {
    loop {
        let mut opcode_byte = [0u8; 1];
        let read_result = tokio::select! {
            result = read_exact_framed(&mut read_half, &mut opcode_byte) => result,
            _ = cancel.cancelled() => break,
        };

        if let Err(error) = read_result {
            tracing::info!(?error, client_id = session.client_id, "pacman channel read failed");
            session.set_error();
            session.set_shutdown();
            board.set_state(BoardState::QuitGame).await;
            break;
        }

        // The disconnect message is the ASCII digit `'2'`, not the numeric
        // `OpCode::Disconnect` discriminant, so it is checked before opcode
        // decoding rather than as a match arm on `OpCode`.
        if opcode_byte[0] == protocol::DISCONNECT_BYTE {
            session.set_error();
            session.set_shutdown();
            board.set_state(BoardState::QuitGame).await;
            break;
        }

        let opcode = match OpCode::try_from(opcode_byte[0]) {
            Ok(opcode) => opcode,
            Err(error) => {
                tracing::info!(?error, client_id = session.client_id, "pacman channel read failed");
                session.set_error();
                session.set_shutdown();
                board.set_state(BoardState::QuitGame).await;
                break;
            }
        };

        match opcode {
            OpCode::Disconnect => {
                tracing::warn!(client_id = session.client_id, "protocol violation on session channel");
                session.set_error();
                session.set_shutdown();
                board.set_state(BoardState::QuitGame).await;
                break;
            }
            OpCode::Play => {
                let mut body = [0u8; Play::BODY_LEN];
                if read_exact_framed(&mut read_half, &mut body).await.is_err() {
                    session.set_error();
                    session.set_shutdown();
                    board.set_state(BoardState::QuitGame).await;
                    break;
                }
                let Ok(play) = Play::decode(opcode, &body) else {
                    continue;
                };
                if play.command == b'Q' {
                    board.set_state(BoardState::QuitGame).await;
                    break;
                }
                match board.move_pacman(play.command).await {
                    MoveResult::ReachedPortal => {
                        board.set_state(BoardState::NextLevel).await;
                        break;
                    }
                    MoveResult::DeadPacman => {
                        board.set_state(BoardState::QuitGame).await;
                        break;
                    }
                    MoveResult::Continue | MoveResult::KilledPacman => {}
                }
            }
            OpCode::Connect | OpCode::Board => {
                tracing::warn!(client_id = session.client_id, "protocol violation on session channel");
                session.set_error();
                session.set_shutdown();
                board.set_state(BoardState::QuitGame).await;
                break;
            }
        }
    }
    read_half
}

/// Wakes every `tempo * (1 + index)` ms, attempting one move. A move that
/// kills pacman ends the level and cancels the pacman task's read directly.
async fn ghost_task(
    index: usize,
    board: Arc<Board>,
    session: Arc<Session>,
    cancel: tokio_util::sync::CancellationToken,
) {
    let period = Duration::from_millis(board.tempo_ms as u64 * (1 + index as u64));
    let mut ticker = interval(period);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if session.is_shutdown() || board.state().await != BoardState::ContinuePlay {
            break;
        }
        if board.move_ghost(index).await == MoveResult::KilledPacman {
            board.set_state(BoardState::QuitGame).await;
            cancel.cancel();
            break;
        }
    }
}

/// Emits a DEFAULT frame every `tempo` ms, after an initial half-tempo
/// offset so broadcasters for different ghosts don't all wake in lockstep.
async fn broadcaster_task(board: Arc<Board>, session: Arc<Session>) {
    let tempo = Duration::from_millis(board.tempo_ms as u64);
    sleep(tempo / 2).await;
    let mut ticker = interval(tempo);
    loop {
        ticker.tick().await;
        if session.is_shutdown() {
            break;
        }
        if let Err(error) = send_board_update(&session, &board, GameOver::No, false).await {
            tracing::warn!(?error, client_id = session.client_id, "broadcaster write failed");
            session.set_error();
            session.set_shutdown();
            break;
        }
    }
}

/// Sends one BoardUpdate frame (header, then tile payload unless the game is
/// ending). Both pieces go out under the same write-half lock acquisition so
/// a frame is never interleaved with another writer's bytes on this channel.
async fn send_board_update(
    session: &Session,
    board: &Board,
    game_over: GameOver,
    victory: bool,
) -> std::io::Result<()> {
    // Points and glyphs come from one reader-lock acquisition (`Board::
    // snapshot`) rather than separate `points()`/`to_glyphs()` calls, so a
    // concurrent writer-locked `move_pacman`/`move_ghost` can't land in the
    // gap between them and desync the header's points from the rendered grid.
    let (points, glyphs) = board.snapshot().await;
    let header = protocol::BoardUpdateHeader {
        width: board.width,
        height: board.height,
        tempo_ms: board.tempo_ms,
        victory,
        game_over,
        points,
    };
    let payload = header.payload_len().is_some().then_some(glyphs);

    let mut write_half = session.write_half.lock().await;
    write_all_framed(&mut *write_half, &header.encode())
        .await
        .map_err(protocol_err_to_io)?;
    if let Some(payload) = payload {
        write_all_framed(&mut *write_half, &payload)
            .await
            .map_err(protocol_err_to_io)?;
    }
    Ok(())
}

fn protocol_err_to_io(error: protocol::ProtocolError) -> std::io::Error {
    std::io::Error::other(error.to_string())
}

/// Sends the ENDGAME marker (no payload), then drains one-byte messages
/// until the DISCONNECT byte (`protocol::DISCONNECT_BYTE`) or EOF is observed.
pub async fn finish_session(session: &Arc<Session>, mut read_half: OwnedReadHalf) {
    let header = protocol::BoardUpdateHeader {
        width: 0,
        height: 0,
        tempo_ms: 0,
        victory: false,
        game_over: GameOver::EndGame,
        points: session.points().await,
    };
    {
        let mut write_half = session.write_half.lock().await;
        if let Err(error) = write_all_framed(&mut *write_half, &header.encode()).await {
            tracing::info!(?error, client_id = session.client_id, "failed to send endgame frame");
            return;
        }
    }

    loop {
        let mut opcode_byte = [0u8; 1];
        match read_exact_framed(&mut read_half, &mut opcode_byte).await {
            Ok(()) => {
                if opcode_byte[0] == protocol::DISCONNECT_BYTE {
                    break;
                }
                // Any further byte before disconnect is ignored, per the
                // "DISCONNECT after the first is ignored" idempotence rule.
            }
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use protocol::OpCode as Op;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn read_frame(
        stream: &mut (impl tokio::io::AsyncRead + Unpin),
    ) -> protocol::BoardUpdateHeader {
        let mut opcode_byte = [0u8; 1];
        read_exact_framed(stream, &mut opcode_byte).await.unwrap();
        assert_eq!(opcode_byte[0], Op::Board as u8);
        let mut body = [0u8; protocol::BoardUpdateHeader::BODY_LEN];
        read_exact_framed(stream, &mut body).await.unwrap();
        let header = protocol::BoardUpdateHeader::decode(Op::Board, &body).unwrap();
        if let Some(len) = header.payload_len() {
            let mut payload = vec![0u8; len];
            read_exact_framed(stream, &mut payload).await.unwrap();
        }
        header
    }

    #[tokio::test]
    async fn reaching_the_portal_sends_victory_and_advances_level() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.lvl"), "WWW\nWP@\nWWW\n\ntempo 10\n").unwrap();
        let board = Arc::new(board::load_level(dir.path(), "one.lvl", 0).await.unwrap());

        let (client, server) = tokio::net::UnixStream::pair().unwrap();
        let (mut client_read, mut client_write) = client.into_split();
        let (server_read, server_write) = server.into_split();
        let session = Arc::new(Session::new(1, server_write));

        client_write.write_all(&Play { command: b'R' }.encode()).await.unwrap();

        let level_task = tokio::spawn(async move { run_level(&session, server_read, board).await });

        let default_frame = read_frame(&mut client_read).await;
        assert_eq!(default_frame.game_over, GameOver::No);
        assert!(!default_frame.victory);

        let victory_frame = read_frame(&mut client_read).await;
        assert!(victory_frame.victory);

        let (_read_half, outcome) = level_task.await.unwrap();
        assert!(matches!(outcome, LevelOutcome::NextLevel));
    }

    #[tokio::test]
    async fn disconnect_during_play_aborts_the_session_without_a_gameover_frame() {
        // A long tempo keeps the broadcaster's first tick well outside this
        // test's lifetime, so the only frame the client ever sees is the
        // initial DEFAULT one sent before the pacman task starts reading.
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.lvl"), "WWW\nWPW\nWWW\n\ntempo 100000\n").unwrap();
        let board = Arc::new(board::load_level(dir.path(), "one.lvl", 0).await.unwrap());

        let (client, server) = tokio::net::UnixStream::pair().unwrap();
        let (mut client_read, mut client_write) = client.into_split();
        let (server_read, server_write) = server.into_split();
        let session = Arc::new(Session::new(1, server_write));

        client_write
            .write_all(&protocol::encode_disconnect())
            .await
            .unwrap();

        let level_task = tokio::spawn(async move { run_level(&session, server_read, board).await });

        let _default_frame = read_frame(&mut client_read).await;

        let (_read_half, outcome) = level_task.await.unwrap();
        assert!(matches!(outcome, LevelOutcome::Abort));

        // No GAMEOVER (or any other) frame follows a disconnect-triggered abort.
        let mut trailing_byte = [0u8; 1];
        let read = tokio::time::timeout(
            Duration::from_millis(50),
            client_read.read_exact(&mut trailing_byte),
        )
        .await;
        assert!(read.is_err(), "abort must not send a further frame");
    }

    #[tokio::test]
    async fn ghost_moving_onto_pacman_ends_the_level_with_gameover() {
        // The ghost starts next to pacman and its one scripted move steps it
        // onto pacman's tile on its very first tick; the client never sends a
        // Play command, so the only way the level ends is the ghost's move.
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.lvl"), "WWWW\nWPMW\nWWWW\n\ntempo 20\nghost 0 L\n").unwrap();
        let board = Arc::new(board::load_level(dir.path(), "one.lvl", 0).await.unwrap());

        let (client, server) = tokio::net::UnixStream::pair().unwrap();
        let (mut client_read, _client_write) = client.into_split();
        let (server_read, server_write) = server.into_split();
        let session = Arc::new(Session::new(1, server_write));

        let level_task = tokio::spawn(async move { run_level(&session, server_read, board).await });

        let default_frame = read_frame(&mut client_read).await;
        assert_eq!(default_frame.game_over, GameOver::No);

        let gameover_frame = read_frame(&mut client_read).await;
        assert_eq!(gameover_frame.game_over, GameOver::Yes);

        let (_read_half, outcome) = level_task.await.unwrap();
        assert!(matches!(outcome, LevelOutcome::QuitGame));
    }
}
