//! Board serializer: converts the shared board into the wire-format glyph
//! grid. Mirrors a C engine's `board_to_char` switch: `W`→`#`, `P`→`C`,
//! `M`→`M`/`G` (charged), space→`@` (portal) / `.` (dot) / space.

use crate::{Ghost, Pacman, Tile, TileContent};

pub const WALL: u8 = b'#';
pub const PACMAN: u8 = b'C';
pub const GHOST: u8 = b'M';
pub const GHOST_CHARGED: u8 = b'G';
pub const PORTAL: u8 = b'@';
pub const DOT: u8 = b'.';
pub const EMPTY: u8 = b' ';

pub fn render(width: u32, height: u32, tiles: &[Tile], ghosts: &[Ghost], pacmans: &[Pacman]) -> Vec<u8> {
    let mut out = vec![EMPTY; (width * height) as usize];

    for (idx, tile) in tiles.iter().enumerate() {
        out[idx] = match tile.content {
            TileContent::Wall => WALL,
            TileContent::Floor if tile.has_portal => PORTAL,
            TileContent::Floor if tile.has_dot => DOT,
            TileContent::Floor => EMPTY,
        };
    }

    for ghost in ghosts {
        let idx = (ghost.pos.y * width + ghost.pos.x) as usize;
        out[idx] = if ghost.charged { GHOST_CHARGED } else { GHOST };
    }

    for pacman in pacmans {
        if pacman.alive {
            let idx = (pacman.pos.y * width + pacman.pos.x) as usize;
            out[idx] = PACMAN;
        }
    }

    out
}
