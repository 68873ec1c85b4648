mod dispatcher;
mod engine;
mod leaderboard;
mod session;
mod signals;
mod state;
mod worker;

use crate::state::ServerState;
use clap::Parser;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tokio::net::UnixListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Multi-client Pac-Man session server.
#[derive(Parser)]
struct Cli {
    /// Directory of `.lvl` files, enumerated in sorted order for every session.
    level_directory: PathBuf,
    /// Maximum number of concurrent games; also the worker pool size.
    max_games: usize,
    /// Filesystem path for the rendezvous Unix domain socket.
    rendezvous_socket_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let cli = Cli::parse();

    if cli.max_games == 0 {
        anyhow::bail!("max_games must be at least 1");
    }

    if cli.rendezvous_socket_path.exists() {
        std::fs::remove_file(&cli.rendezvous_socket_path)?;
    }
    let listener = UnixListener::bind(&cli.rendezvous_socket_path)?;
    std::fs::set_permissions(
        &cli.rendezvous_socket_path,
        std::fs::Permissions::from_mode(0o640),
    )?;
    tracing::info!(
        path = %cli.rendezvous_socket_path.display(),
        max_games = cli.max_games,
        "rendezvous socket bound"
    );

    let state = ServerState::new(cli.level_directory, cli.max_games);

    signals::spawn(state.clone())?;
    worker::spawn_pool(state.clone());

    dispatcher::run(state, listener).await;
    Ok(())
}
