//! Leaderboard generator, invoked only from the dispatcher's signal-poll tick.

use crate::state::ServerState;
use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;

const LEADERBOARD_PATH: &str = "topPlayers.txt";
const LEADERBOARD_LIMIT: usize = 5;

pub async fn generate(state: &ServerState) {
    generate_at(state, Path::new(LEADERBOARD_PATH)).await
}

async fn generate_at(state: &ServerState, path: &Path) {
    let snapshot = state.registry.active_snapshot().await;

    let mut rows = Vec::with_capacity(snapshot.len());
    for session in &snapshot {
        rows.push((session.client_id, session.points().await));
    }
    // Descending points, ascending id as tie-break; the live pointer-indirected
    // reads above are individually consistent but not mutually atomic — a
    // slight inconsistency between rows is acceptable for an advisory file.
    rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    rows.truncate(LEADERBOARD_LIMIT);

    let mut contents = String::new();
    for (id, points) in &rows {
        contents.push_str(&format!("ID: {id}, Pontos: {points}\n"));
    }

    if let Err(error) = write_leaderboard(path, &contents).await {
        tracing::warn!(?error, "failed to write leaderboard file");
    }
}

async fn write_leaderboard(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await?;
    file.set_permissions(Permissions::from_mode(0o644)).await?;
    file.write_all(contents.as_bytes()).await
}
