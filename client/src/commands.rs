//! Sources play commands either from a file (paced by the last observed
//! tempo, looping back to the start on exhaustion) or interactively from
//! stdin, one line at a time.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Shared with the frame-receiver task, which updates it from every
/// `BoardUpdate`'s `tempo_ms` field.
pub struct Tempo(AtomicU32);

impl Tempo {
    pub fn new() -> Arc<Tempo> {
        Arc::new(Tempo(AtomicU32::new(200)))
    }

    pub fn set(&self, tempo_ms: u32) {
        self.0.store(tempo_ms, Ordering::Relaxed);
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Commands valid on the wire; everything else read from the source is
/// skipped.
fn is_command_byte(byte: u8) -> bool {
    matches!(byte.to_ascii_uppercase(), b'U' | b'D' | b'L' | b'R' | b'Q')
}

/// Reads the whole file up front and replays its command bytes forever,
/// sleeping one tempo interval between each, skipping CR/LF/NUL and any
/// other byte that isn't a recognised command.
pub async fn play_from_file(session: Arc<crate::session::ClientSession>, path: &Path, tempo: Arc<Tempo>) {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!(?error, path = %path.display(), "failed to read commands file");
            return;
        }
    };
    let commands: Vec<u8> = bytes
        .iter()
        .copied()
        .map(|b| b.to_ascii_uppercase())
        .filter(|&b| is_command_byte(b))
        .collect();

    if commands.is_empty() {
        tracing::warn!(path = %path.display(), "commands file has no recognised commands");
        return;
    }

    loop {
        for &command in &commands {
            if session.play(command).await.is_err() {
                return;
            }
            if command == b'Q' {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(tempo.get() as u64)).await;
        }
    }
}

/// Reads one line from stdin at a time, sends the first recognised command
/// byte on it. Runs until stdin is closed or a quit command is sent.
pub async fn play_interactive(session: Arc<crate::session::ClientSession>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(error) => {
                tracing::error!(?error, "failed to read from stdin");
                return;
            }
        };
        let Some(command) = line.trim().bytes().next().map(|b| b.to_ascii_uppercase()) else {
            continue;
        };
        if !is_command_byte(command) {
            continue;
        }
        if session.play(command).await.is_err() {
            return;
        }
        if command == b'Q' {
            return;
        }
    }
}
