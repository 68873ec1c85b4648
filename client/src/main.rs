mod commands;
mod session;

use crate::commands::Tempo;
use crate::session::ClientSession;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Terminal client for the Pac-Man session server. Rendering is a plain
/// text dump of the tile grid; a graphical front end would replace only
/// this binary, not the session library it links against.
#[derive(Parser)]
struct Cli {
    client_id: u32,
    rendezvous_socket_path: PathBuf,
    /// Optional file of play commands, paced by the server's reported tempo
    /// and replayed from the start once exhausted. Omit for interactive
    /// stdin control.
    commands_file: Option<PathBuf>,
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

    let session = ClientSession::connect(cli.client_id, &cli.rendezvous_socket_path).await?;
    tracing::info!(client_id = cli.client_id, "registered with server");

    let tempo = Tempo::new();

    let command_task = {
        let session = session.clone();
        let tempo = tempo.clone();
        match cli.commands_file {
            Some(path) => tokio::spawn(async move { commands::play_from_file(session, &path, tempo).await }),
            None => tokio::spawn(async move { commands::play_interactive(session).await }),
        }
    };

    let sigint_session = session.clone();
    let sigint_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = sigint_session.disconnect().await;
        }
    });

    let render_result = render_loop(session, tempo).await;
    command_task.abort();
    sigint_task.abort();
    render_result
}

async fn render_loop(session: Arc<ClientSession>, tempo: Arc<Tempo>) -> anyhow::Result<()> {
    loop {
        let frame = session.receive_board_update().await?;
        if frame.is_end_game() {
            println!("game over");
            let _ = session.disconnect().await;
            return Ok(());
        }
        tempo.set(frame.header.tempo_ms);
        print_frame(&frame);
    }
}

fn print_frame(frame: &session::BoardFrame) {
    let header = &frame.header;
    println!(
        "points={} victory={} game_over={:?}",
        header.points, header.victory, header.game_over
    );
    if let Some(tiles) = &frame.tiles {
        let width = header.width as usize;
        for row in tiles.chunks(width) {
            let line: String = row.iter().map(|&b| b as char).collect();
            println!("{line}");
        }
    }
}
