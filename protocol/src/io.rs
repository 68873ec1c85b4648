//! Framed channel I/O.
//!
//! Tokio's `read_exact`/`write_all` already loop to completion over partial
//! transfers and retry transient interruption internally; what the original
//! `WriteAll`/`ReadAll` contract adds on top is the EOF-with-bytes-outstanding
//! distinction, which these wrappers translate into [`ProtocolError`].

use crate::ProtocolError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Writes the whole buffer or fails. A zero-progress write (the original's
/// "channel closed by peer" case) surfaces through the same I/O error path
/// Tokio already raises for a broken pipe.
pub async fn write_all_framed<W: AsyncWrite + Unpin>(
    writer: &mut W,
    buf: &[u8],
) -> Result<(), ProtocolError> {
    writer.write_all(buf).await?;
    Ok(())
}

/// Reads exactly `buf.len()` bytes or fails. EOF with bytes still outstanding
/// is reported as [`ProtocolError::Eof`] rather than a raw I/O error, so
/// callers can distinguish "peer disconnected cleanly" from other failures.
pub async fn read_exact_framed<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<(), ProtocolError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ProtocolError::Eof),
        Err(e) => Err(ProtocolError::Io(e)),
    }
}
