//! Client-side session library: connection establishment, play submission,
//! disconnect, and frame reception. Implemented over a single `UnixStream`
//! rather than three named pipes — the rendezvous/request/notification
//! distinction collapses to one connection, opened once.

use protocol::{
    encode_disconnect, identity_for, notif_identity_for, read_exact_framed, write_all_framed,
    BoardUpdateHeader, GameOver, OpCode, Play, ProtocolError, Registration, RegistrationResponse,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("registration was refused by the server")]
    Refused,
}

/// One received board frame: the header plus its tile payload, unless the
/// game has ended (`game_over == EndGame`), in which case there is none.
pub struct BoardFrame {
    pub header: BoardUpdateHeader,
    pub tiles: Option<Vec<u8>>,
}

impl BoardFrame {
    pub fn is_end_game(&self) -> bool {
        self.header.game_over == GameOver::EndGame
    }
}

pub struct ClientSession {
    pub client_id: u32,
    write_half: Mutex<OwnedWriteHalf>,
    read_half: Mutex<OwnedReadHalf>,
}

impl ClientSession {
    /// Connects to the rendezvous socket (retrying on `NotFound` with a
    /// 100 ms back-off, since the server may not have bound it yet), sends
    /// a `Registration`, and waits for the server's admission decision.
    pub async fn connect(client_id: u32, rendezvous_path: &Path) -> Result<Arc<ClientSession>, ClientError> {
        let stream = connect_with_backoff(rendezvous_path).await?;
        Self::handshake(client_id, stream).await
    }

    async fn handshake(client_id: u32, stream: UnixStream) -> Result<Arc<ClientSession>, ClientError> {
        let (read_half, mut write_half) = stream.into_split();

        let registration = Registration {
            identity: identity_for(client_id),
            notif_identity: notif_identity_for(client_id),
        };
        write_all_framed(&mut write_half, &registration.encode()?).await?;

        let mut read_half = read_half;
        let mut opcode_byte = [0u8; 1];
        read_exact_framed(&mut read_half, &mut opcode_byte).await?;
        let opcode = OpCode::try_from(opcode_byte[0])?;
        let mut body = [0u8; RegistrationResponse::BODY_LEN];
        read_exact_framed(&mut read_half, &mut body).await?;
        let response = RegistrationResponse::decode(opcode, &body)?;
        if !response.accepted {
            return Err(ClientError::Refused);
        }

        Ok(Arc::new(ClientSession {
            client_id,
            write_half: Mutex::new(write_half),
            read_half: Mutex::new(read_half),
        }))
    }

    pub async fn play(&self, command: u8) -> Result<(), ClientError> {
        let mut write_half = self.write_half.lock().await;
        write_all_framed(&mut *write_half, &Play { command }.encode()).await?;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let mut write_half = self.write_half.lock().await;
        write_all_framed(&mut *write_half, &encode_disconnect()).await?;
        Ok(())
    }

    /// Reads one `BoardUpdate`, discarding any non-BOARD opcode first (there
    /// should not be any on this channel, but the original interface is
    /// specified to tolerate them).
    pub async fn receive_board_update(&self) -> Result<BoardFrame, ClientError> {
        let mut read_half = self.read_half.lock().await;
        loop {
            let mut opcode_byte = [0u8; 1];
            read_exact_framed(&mut *read_half, &mut opcode_byte).await?;
            let opcode = match OpCode::try_from(opcode_byte[0]) {
                Ok(opcode) => opcode,
                Err(_) => continue,
            };
            if opcode != OpCode::Board {
                continue;
            }

            let mut body = [0u8; BoardUpdateHeader::BODY_LEN];
            read_exact_framed(&mut *read_half, &mut body).await?;
            let header = BoardUpdateHeader::decode(opcode, &body)?;

            let tiles = match header.payload_len() {
                Some(len) => {
                    let mut buf = vec![0u8; len];
                    read_exact_framed(&mut *read_half, &mut buf).await?;
                    Some(buf)
                }
                None => None,
            };

            return Ok(BoardFrame { header, tiles });
        }
    }
}

async fn connect_with_backoff(path: &Path) -> std::io::Result<UnixStream> {
    loop {
        match UnixStream::connect(path).await {
            Ok(stream) => return Ok(stream),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handshake_fails_when_server_refuses() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let (mut their_read, mut their_write) = theirs.into_split();
        tokio::spawn(async move {
            let mut opcode = [0u8; 1];
            read_exact_framed(&mut their_read, &mut opcode).await.unwrap();
            let mut body = [0u8; Registration::BODY_LEN];
            read_exact_framed(&mut their_read, &mut body).await.unwrap();
            write_all_framed(&mut their_write, &RegistrationResponse { accepted: false }.encode())
                .await
                .unwrap();
        });

        let result = ClientSession::handshake(1, ours).await;
        assert!(matches!(result, Err(ClientError::Refused)));
    }

    #[tokio::test]
    async fn handshake_succeeds_and_receive_board_update_skips_non_board_opcodes() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let (mut their_read, mut their_write) = theirs.into_split();
        tokio::spawn(async move {
            let mut opcode = [0u8; 1];
            read_exact_framed(&mut their_read, &mut opcode).await.unwrap();
            let mut body = [0u8; Registration::BODY_LEN];
            read_exact_framed(&mut their_read, &mut body).await.unwrap();
            write_all_framed(&mut their_write, &RegistrationResponse { accepted: true }.encode())
                .await
                .unwrap();

            // A stray Disconnect opcode first; receive_board_update must skip it.
            write_all_framed(&mut their_write, &encode_disconnect()).await.unwrap();

            let header = BoardUpdateHeader {
                width: 2,
                height: 1,
                tempo_ms: 150,
                victory: false,
                game_over: GameOver::No,
                points: 5,
            };
            write_all_framed(&mut their_write, &header.encode()).await.unwrap();
            write_all_framed(&mut their_write, &[b'#', b'.']).await.unwrap();
        });

        let session = ClientSession::handshake(1, ours).await.unwrap();
        let frame = session.receive_board_update().await.unwrap();
        assert_eq!(frame.header.points, 5);
        assert_eq!(frame.tiles, Some(vec![b'#', b'.']));
        assert!(!frame.is_end_game());
    }
}
