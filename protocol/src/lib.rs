//! Wire protocol for the game session server.
//!
//! Four message kinds travel over the duplex session socket: [`Registration`]
//! (client → server, on the rendezvous connection), [`RegistrationResponse`]
//! (server → client), [`Play`] (client → server) and [`BoardUpdateHeader`]
//! (server → client, optionally followed by a tile payload). A
//! [`Disconnect`](encode_disconnect) is a single byte with no body — not the
//! numeric `OpCode::Disconnect` discriminant, but the ASCII digit `'2'`
//! ([`DISCONNECT_BYTE`]), exactly as the original wire format sends it.
//! All multi-byte integers are little-endian; this is the one canonical
//! encoding a portable reimplementation needs.

mod io;

pub use io::{read_exact_framed, write_all_framed};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum length of the zero-padded identity string carried in a
/// [`Registration`] frame (mirrors the original `MAX_PIPE_PATH_LENGTH`).
pub const MAX_IDENTITY_LEN: usize = 40;

/// The lone byte a [`Disconnect`](encode_disconnect) message puts on the
/// wire: the ASCII digit `'2'`, not the numeric `OpCode::Disconnect`
/// discriminant. This mismatch is the original protocol's own quirk (see
/// `examples/original_source/src/game.c`'s `disconnect_message != '2'` check
/// and `src/client/api.c`'s `strcmp(notif_reader, "2")`), carried over here
/// verbatim rather than "fixed", since spec.md documents it as the wire
/// format.
pub const DISCONNECT_BYTE: u8 = b'2';

/// Opcode byte values, identical across every message kind that encodes its
/// opcode numerically. [`OpCode::Disconnect`] names the opcode conceptually
/// (per spec.md's `{CONNECT=1, DISCONNECT=2, PLAY=3, BOARD=4}` set) but is
/// never itself the byte a disconnect message carries on the wire — that's
/// [`DISCONNECT_BYTE`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Connect = 1,
    Disconnect = 2,
    Play = 3,
    Board = 4,
}

impl TryFrom<u8> for OpCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OpCode::Connect),
            2 => Ok(OpCode::Disconnect),
            3 => Ok(OpCode::Play),
            4 => Ok(OpCode::Board),
            other => Err(ProtocolError::UnknownOpCode(other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("peer closed the connection with bytes still outstanding")]
    Eof,
    #[error("unknown opcode {0}")]
    UnknownOpCode(u8),
    #[error("identity string longer than {MAX_IDENTITY_LEN} bytes")]
    IdentityTooLong,
    #[error("malformed {0} frame")]
    Malformed(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// `game_over` field of a [`BoardUpdateHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOver {
    No,
    Yes,
    EndGame,
}

impl GameOver {
    fn to_wire(self) -> u8 {
        match self {
            GameOver::No => 0,
            GameOver::Yes => 1,
            GameOver::EndGame => 2,
        }
    }

    fn from_wire(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(GameOver::No),
            1 => Ok(GameOver::Yes),
            2 => Ok(GameOver::EndGame),
            _ => Err(ProtocolError::Malformed("BoardUpdate.game_over")),
        }
    }
}

/// Client→server registration sent once on the rendezvous connection.
///
/// `identity` takes the place of the original `req_pipe_path`: it is a
/// zero-padded, ≤40-byte string of the form `/tmp/<id>_request` from which
/// the server extracts the numeric client id (§4.5 step 4). `notif_identity`
/// is carried for wire fidelity with the original protocol but is otherwise
/// unused now that a single duplex socket serves both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub identity: String,
    pub notif_identity: String,
}

const IDENTITY_FIELD_LEN: usize = MAX_IDENTITY_LEN + 1;
const REGISTRATION_BODY_LEN: usize = IDENTITY_FIELD_LEN * 2;

impl Registration {
    pub const BODY_LEN: usize = REGISTRATION_BODY_LEN;

    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(1 + REGISTRATION_BODY_LEN);
        buf.put_u8(OpCode::Connect as u8);
        put_padded_string(&mut buf, &self.identity)?;
        put_padded_string(&mut buf, &self.notif_identity)?;
        Ok(buf.freeze())
    }

    pub fn decode(opcode: OpCode, body: &[u8]) -> Result<Self, ProtocolError> {
        if opcode != OpCode::Connect {
            return Err(ProtocolError::Malformed("Registration"));
        }
        if body.len() != REGISTRATION_BODY_LEN {
            return Err(ProtocolError::Malformed("Registration"));
        }
        let identity = read_padded_string(&body[..IDENTITY_FIELD_LEN])?;
        let notif_identity = read_padded_string(&body[IDENTITY_FIELD_LEN..])?;
        Ok(Registration {
            identity,
            notif_identity,
        })
    }
}

/// Server→client admission result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationResponse {
    pub accepted: bool,
}

impl RegistrationResponse {
    pub const BODY_LEN: usize = 1;

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2);
        buf.put_u8(OpCode::Connect as u8);
        buf.put_u8(if self.accepted { 0 } else { 1 });
        buf.freeze()
    }

    pub fn decode(opcode: OpCode, body: &[u8]) -> Result<Self, ProtocolError> {
        if opcode != OpCode::Connect || body.len() != 1 {
            return Err(ProtocolError::Malformed("RegistrationResponse"));
        }
        Ok(RegistrationResponse {
            accepted: body[0] == 0,
        })
    }
}

/// Client→server play command: a single command byte (`'U'`, `'D'`, `'L'`,
/// `'R'`, `'Q'`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Play {
    pub command: u8,
}

impl Play {
    pub const BODY_LEN: usize = 1;

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2);
        buf.put_u8(OpCode::Play as u8);
        buf.put_u8(self.command);
        buf.freeze()
    }

    pub fn decode(opcode: OpCode, body: &[u8]) -> Result<Self, ProtocolError> {
        if opcode != OpCode::Play || body.len() != 1 {
            return Err(ProtocolError::Malformed("Play"));
        }
        Ok(Play { command: body[0] })
    }
}

/// Server→client board update header. When `game_over` is
/// [`GameOver::EndGame`] no tile payload follows; otherwise exactly
/// `width * height` glyph bytes follow this header on the same connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardUpdateHeader {
    pub width: u32,
    pub height: u32,
    pub tempo_ms: u32,
    pub victory: bool,
    pub game_over: GameOver,
    pub points: u32,
}

impl BoardUpdateHeader {
    pub const BODY_LEN: usize = 4 * 6;

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + Self::BODY_LEN);
        buf.put_u8(OpCode::Board as u8);
        buf.put_u32_le(self.width);
        buf.put_u32_le(self.height);
        buf.put_u32_le(self.tempo_ms);
        buf.put_u32_le(if self.victory { 1 } else { 0 });
        buf.put_u32_le(self.game_over.to_wire() as u32);
        buf.put_u32_le(self.points);
        buf.freeze()
    }

    pub fn decode(opcode: OpCode, mut body: &[u8]) -> Result<Self, ProtocolError> {
        if opcode != OpCode::Board || body.len() != Self::BODY_LEN {
            return Err(ProtocolError::Malformed("BoardUpdate"));
        }
        let width = body.get_u32_le();
        let height = body.get_u32_le();
        let tempo_ms = body.get_u32_le();
        let victory = body.get_u32_le() != 0;
        let game_over = GameOver::from_wire(body.get_u32_le() as u8)?;
        let points = body.get_u32_le();
        Ok(BoardUpdateHeader {
            width,
            height,
            tempo_ms,
            victory,
            game_over,
            points,
        })
    }

    /// Number of tile payload bytes that must follow this header, or `None`
    /// when `game_over == EndGame` (payload elided).
    pub fn payload_len(&self) -> Option<usize> {
        if self.game_over == GameOver::EndGame {
            None
        } else {
            Some((self.width * self.height) as usize)
        }
    }
}

/// The disconnect message is a single byte, no body: the ASCII digit `'2'`
/// ([`DISCONNECT_BYTE`]), not the numeric `OpCode::Disconnect` discriminant.
pub fn encode_disconnect() -> Bytes {
    Bytes::from_static(&[DISCONNECT_BYTE])
}

fn put_padded_string(buf: &mut BytesMut, s: &str) -> Result<(), ProtocolError> {
    if s.len() > MAX_IDENTITY_LEN {
        return Err(ProtocolError::IdentityTooLong);
    }
    let start = buf.len();
    buf.put_slice(s.as_bytes());
    buf.resize(start + IDENTITY_FIELD_LEN, 0);
    Ok(())
}

fn read_padded_string(field: &[u8]) -> Result<String, ProtocolError> {
    let nul = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8(field[..nul].to_vec()).map_err(|_| ProtocolError::Malformed("identity"))
}

/// Parses the numeric client id out of an identity string of the form
/// `/tmp/<id>_request`.
pub fn parse_client_id(identity: &str) -> Option<u32> {
    let name = identity.rsplit('/').next()?;
    let digits = name.strip_suffix("_request")?;
    digits.parse().ok()
}

/// Builds the canonical identity string for a client id.
pub fn identity_for(client_id: u32) -> String {
    format!("/tmp/{client_id}_request")
}

/// Builds the canonical notification-identity string for a client id.
pub fn notif_identity_for(client_id: u32) -> String {
    format!("/tmp/{client_id}_notification")
}
