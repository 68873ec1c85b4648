//! Level loading: parses a `.lvl` file into a playable [`Board`].
//!
//! A `.lvl` file is a rectangular grid of glyphs (`W` wall, `' '` floor,
//! `.` dot, `@` portal, `P` pacman start, `M` ghost start, in row-major scan
//! order), a blank separator line, then a `tempo <ms>` line and zero or more
//! `ghost <index> <letters>` lines assigning a cyclic `U`/`D`/`L`/`R` move
//! list to the ghost found at that scan-order index.

use crate::{Board, BoardInner, BoardState, Direction, Ghost, Pacman, Position, Tile, TileContent};
use std::path::Path;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read level file: {0}")]
    Io(#[from] std::io::Error),
    #[error("level grid is empty")]
    EmptyGrid,
    #[error("level rows are not all the same width")]
    RaggedGrid,
    #[error("level has no pacman start tile")]
    NoPacmanStart,
    #[error("ghost trailer line references unknown ghost index {0}")]
    UnknownGhost(usize),
    #[error("malformed trailer line: {0}")]
    BadTrailer(String),
}

/// Loads a level by file name out of `directory`, carrying `accumulated_points`
/// forward as the new board's starting score.
pub async fn load_level(
    directory: &Path,
    file_name: &str,
    accumulated_points: u32,
) -> Result<Board, LoadError> {
    let path = directory.join(file_name);
    let text = tokio::fs::read_to_string(&path).await?;
    parse_level(&text, accumulated_points)
}

fn parse_level(text: &str, accumulated_points: u32) -> Result<Board, LoadError> {
    let mut lines = text.lines();
    let mut grid_lines = Vec::new();
    for line in &mut lines {
        if line.is_empty() {
            break;
        }
        grid_lines.push(line);
    }
    if grid_lines.is_empty() {
        return Err(LoadError::EmptyGrid);
    }
    let width = grid_lines[0].chars().count();
    if grid_lines.iter().any(|l| l.chars().count() != width) {
        return Err(LoadError::RaggedGrid);
    }
    let height = grid_lines.len();

    let mut tiles = Vec::with_capacity(width * height);
    let mut ghosts = Vec::new();
    let mut pacman_pos = None;

    for (y, line) in grid_lines.iter().enumerate() {
        for (x, ch) in line.chars().enumerate() {
            let pos = Position {
                x: x as u32,
                y: y as u32,
            };
            let tile = match ch {
                'W' => Tile {
                    content: TileContent::Wall,
                    has_portal: false,
                    has_dot: false,
                },
                '@' => Tile {
                    content: TileContent::Floor,
                    has_portal: true,
                    has_dot: false,
                },
                '.' => Tile {
                    content: TileContent::Floor,
                    has_portal: false,
                    has_dot: true,
                },
                'P' => {
                    pacman_pos = Some(pos);
                    Tile {
                        content: TileContent::Floor,
                        has_portal: false,
                        has_dot: false,
                    }
                }
                'M' => {
                    ghosts.push(Ghost {
                        pos,
                        charged: false,
                        moves: Vec::new(),
                        current_move: 0,
                    });
                    Tile {
                        content: TileContent::Floor,
                        has_portal: false,
                        has_dot: false,
                    }
                }
                _ => Tile {
                    content: TileContent::Floor,
                    has_portal: false,
                    has_dot: false,
                },
            };
            tiles.push(tile);
        }
    }

    let pacman_pos = pacman_pos.ok_or(LoadError::NoPacmanStart)?;

    let mut tempo_ms = 200u32;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("tempo") => {
                let value = parts
                    .next()
                    .ok_or_else(|| LoadError::BadTrailer(line.to_string()))?;
                tempo_ms = value
                    .parse()
                    .map_err(|_| LoadError::BadTrailer(line.to_string()))?;
            }
            Some("ghost") => {
                let index: usize = parts
                    .next()
                    .ok_or_else(|| LoadError::BadTrailer(line.to_string()))?
                    .parse()
                    .map_err(|_| LoadError::BadTrailer(line.to_string()))?;
                let ghost = ghosts.get_mut(index).ok_or(LoadError::UnknownGhost(index))?;
                for token in parts {
                    for ch in token.chars() {
                        if let Some(dir) = Direction::from_byte(ch as u8) {
                            ghost.moves.push(dir);
                        }
                    }
                }
            }
            _ => return Err(LoadError::BadTrailer(line.to_string())),
        }
    }

    let pacmans = vec![Pacman {
        pos: pacman_pos,
        alive: true,
        points: accumulated_points,
    }];

    Ok(Board {
        width: width as u32,
        height: height as u32,
        tempo_ms,
        inner: RwLock::new(BoardInner {
            tiles,
            ghosts,
            pacmans,
            state: BoardState::ContinuePlay,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_LEVEL: &str = "WWWW\nWP.W\nW MW\nW  @\nWWWW\n\ntempo 150\nghost 0 R L\n";

    #[tokio::test]
    async fn parses_grid_tempo_and_ghost_moves() {
        let board = parse_level(SIMPLE_LEVEL, 0).unwrap();
        assert_eq!(board.width, 4);
        assert_eq!(board.height, 5);
        assert_eq!(board.tempo_ms, 150);
        assert_eq!(board.ghost_count().await, 1);
        assert_eq!(board.points().await, 0);
    }

    #[test]
    fn rejects_grid_without_pacman() {
        let err = parse_level("WWW\nW W\nWWW\n", 0).unwrap_err();
        assert!(matches!(err, LoadError::NoPacmanStart));
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = parse_level("WWW\nW W\nW\n", 0).unwrap_err();
        assert!(matches!(err, LoadError::RaggedGrid) || matches!(err, LoadError::NoPacmanStart));
    }
}
