//! The board: a deliberately small level engine. It exists only so the
//! session engine in the `server` crate has something real to drive — level
//! parsing and movement rules are not the hard part this workspace is about.
//!
//! Mutation is promoted to the writer side of the `RwLock` throughout. The
//! original C engine this was ported from took only a reader lock around
//! state writes; `DESIGN.md` records the promotion as a deliberate
//! correction.

mod glyphs;
mod level;
mod movement;

pub use level::{load_level, LoadError};
pub use movement::MoveResult;

use tokio::sync::RwLock;

/// Inter-task signal carried on [`Board`], checked by every agent task at
/// tempo granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardState {
    ContinuePlay,
    NextLevel,
    QuitGame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn from_byte(b: u8) -> Option<Direction> {
        match b {
            b'U' => Some(Direction::Up),
            b'D' => Some(Direction::Down),
            b'L' => Some(Direction::Left),
            b'R' => Some(Direction::Right),
            _ => None,
        }
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileContent {
    Wall,
    Floor,
}

#[derive(Debug, Clone, Copy)]
pub struct Tile {
    pub content: TileContent,
    pub has_portal: bool,
    pub has_dot: bool,
}

#[derive(Debug, Clone)]
pub struct Ghost {
    pub pos: Position,
    pub charged: bool,
    pub moves: Vec<Direction>,
    pub current_move: usize,
}

#[derive(Debug, Clone)]
pub struct Pacman {
    pub pos: Position,
    pub alive: bool,
    pub points: u32,
}

struct BoardInner {
    tiles: Vec<Tile>,
    ghosts: Vec<Ghost>,
    pacmans: Vec<Pacman>,
    state: BoardState,
}

/// The shared per-level board. Lifetime is one level per session; a fresh
/// `Board` is produced by [`load_level`] and simply dropped at level end —
/// there are no external resources to release.
pub struct Board {
    pub width: u32,
    pub height: u32,
    pub tempo_ms: u32,
    inner: RwLock<BoardInner>,
}

impl Board {
    pub async fn state(&self) -> BoardState {
        self.inner.read().await.state
    }

    pub async fn set_state(&self, state: BoardState) {
        self.inner.write().await.state = state;
    }

    pub async fn points(&self) -> u32 {
        self.inner.read().await.pacmans[0].points
    }

    pub async fn pacman_alive(&self) -> bool {
        self.inner.read().await.pacmans[0].alive
    }

    pub async fn ghost_count(&self) -> usize {
        self.inner.read().await.ghosts.len()
    }

    pub async fn to_glyphs(&self) -> Vec<u8> {
        let inner = self.inner.read().await;
        glyphs::render(self.width, self.height, &inner.tiles, &inner.ghosts, &inner.pacmans)
    }

    /// Points and glyph grid read under a single reader-lock acquisition, so
    /// the two values describe the same instant of the board. Callers that
    /// need both — a BoardUpdate frame's header and payload — must use this
    /// instead of separate `points()`/`to_glyphs()` calls, which would let a
    /// concurrent writer-locked move land in the gap between them.
    pub async fn snapshot(&self) -> (u32, Vec<u8>) {
        let inner = self.inner.read().await;
        let points = inner.pacmans[0].points;
        let glyphs = glyphs::render(self.width, self.height, &inner.tiles, &inner.ghosts, &inner.pacmans);
        (points, glyphs)
    }

    /// Applies one pacman command. Takes the writer side of the board lock
    /// for the whole move, matching the broadcaster's serialization lock.
    pub async fn move_pacman(&self, command: u8) -> MoveResult {
        let mut inner = self.inner.write().await;
        movement::move_pacman(self.width, self.height, &mut inner.tiles, &mut inner.pacmans, &inner.ghosts, command)
    }

    /// Advances one ghost by its next preset move, cyclic over
    /// `moves[current_move % n_moves]`.
    pub async fn move_ghost(&self, ghost_index: usize) -> MoveResult {
        let mut inner = self.inner.write().await;
        movement::move_ghost(self.width, self.height, &mut inner.tiles, &mut inner.ghosts, &mut inner.pacmans, ghost_index)
    }
}
