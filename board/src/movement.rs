//! Movement rules and collision outcomes. Deliberately simple: walls block
//! movement, dots are picked up for a point each, the portal ends the level,
//! and any overlap between pacman and a ghost kills pacman.

use crate::{Direction, Ghost, Pacman, Position, Tile, TileContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResult {
    Continue,
    ReachedPortal,
    DeadPacman,
    KilledPacman,
}

fn tile_at(width: u32, tiles: &[Tile], pos: Position) -> &Tile {
    &tiles[(pos.y * width + pos.x) as usize]
}

fn tile_at_mut(width: u32, tiles: &mut [Tile], pos: Position) -> &mut Tile {
    &mut tiles[(pos.y * width + pos.x) as usize]
}

fn step(width: u32, height: u32, pos: Position, dir: Direction) -> Option<Position> {
    let (dx, dy) = match dir {
        Direction::Up => (0i32, -1i32),
        Direction::Down => (0, 1),
        Direction::Left => (-1, 0),
        Direction::Right => (1, 0),
    };
    let nx = pos.x as i32 + dx;
    let ny = pos.y as i32 + dy;
    if nx < 0 || ny < 0 || nx as u32 >= width || ny as u32 >= height {
        return None;
    }
    Some(Position {
        x: nx as u32,
        y: ny as u32,
    })
}

pub fn move_pacman(
    width: u32,
    height: u32,
    tiles: &mut [Tile],
    pacmans: &mut [Pacman],
    ghosts: &[Ghost],
    command: u8,
) -> MoveResult {
    let pacman = &mut pacmans[0];
    if !pacman.alive {
        return MoveResult::DeadPacman;
    }
    let Some(dir) = Direction::from_byte(command) else {
        return MoveResult::Continue;
    };
    let Some(target) = step(width, height, pacman.pos, dir) else {
        return MoveResult::Continue;
    };
    if tile_at(width, tiles, target).content == TileContent::Wall {
        return MoveResult::Continue;
    }

    pacman.pos = target;

    if ghosts.iter().any(|g| g.pos == target) {
        pacman.alive = false;
        return MoveResult::DeadPacman;
    }

    let tile = tile_at_mut(width, tiles, target);
    if tile.has_portal {
        return MoveResult::ReachedPortal;
    }
    if tile.has_dot {
        tile.has_dot = false;
        pacman.points += 1;
    }
    MoveResult::Continue
}

pub fn move_ghost(
    width: u32,
    height: u32,
    tiles: &[Tile],
    ghosts: &mut [Ghost],
    pacmans: &mut [Pacman],
    ghost_index: usize,
) -> MoveResult {
    let ghost = &mut ghosts[ghost_index];
    if ghost.moves.is_empty() {
        return MoveResult::Continue;
    }
    let dir = ghost.moves[ghost.current_move % ghost.moves.len()];
    ghost.current_move += 1;

    if let Some(target) = step(width, height, ghost.pos, dir) {
        if tile_at(width, tiles, target).content != TileContent::Wall {
            ghost.pos = target;
        }
    }

    let pacman = &mut pacmans[0];
    if pacman.alive && pacman.pos == ghost.pos {
        pacman.alive = false;
        return MoveResult::KilledPacman;
    }
    MoveResult::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor() -> Tile {
        Tile {
            content: TileContent::Floor,
            has_portal: false,
            has_dot: false,
        }
    }

    fn wall() -> Tile {
        Tile {
            content: TileContent::Wall,
            has_portal: false,
            has_dot: false,
        }
    }

    #[test]
    fn pacman_is_blocked_by_a_wall() {
        let mut tiles = vec![floor(), wall(), floor()];
        let mut pacmans = vec![Pacman {
            pos: Position { x: 0, y: 0 },
            alive: true,
            points: 0,
        }];
        let result = move_pacman(3, 1, &mut tiles, &mut pacmans, &[], b'R');
        assert_eq!(result, MoveResult::Continue);
        assert_eq!(pacmans[0].pos, Position { x: 0, y: 0 });
    }

    #[test]
    fn pacman_collects_a_dot() {
        let mut tiles = vec![
            floor(),
            Tile {
                has_dot: true,
                ..floor()
            },
        ];
        let mut pacmans = vec![Pacman {
            pos: Position { x: 0, y: 0 },
            alive: true,
            points: 0,
        }];
        move_pacman(2, 1, &mut tiles, &mut pacmans, &[], b'R');
        assert_eq!(pacmans[0].points, 1);
        assert!(!tiles[1].has_dot);
    }

    #[test]
    fn pacman_reaches_portal() {
        let mut tiles = vec![
            floor(),
            Tile {
                has_portal: true,
                ..floor()
            },
        ];
        let mut pacmans = vec![Pacman {
            pos: Position { x: 0, y: 0 },
            alive: true,
            points: 0,
        }];
        let result = move_pacman(2, 1, &mut tiles, &mut pacmans, &[], b'R');
        assert_eq!(result, MoveResult::ReachedPortal);
    }

    #[test]
    fn ghost_kills_pacman_on_overlap() {
        let tiles = vec![floor(), floor()];
        let mut ghosts = vec![Ghost {
            pos: Position { x: 0, y: 0 },
            charged: false,
            moves: vec![Direction::Right],
            current_move: 0,
        }];
        let mut pacmans = vec![Pacman {
            pos: Position { x: 1, y: 0 },
            alive: true,
            points: 0,
        }];
        let result = move_ghost(2, 1, &tiles, &mut ghosts, &mut pacmans, 0);
        assert_eq!(result, MoveResult::KilledPacman);
        assert!(!pacmans[0].alive);
    }

    #[test]
    fn ghost_move_cycles_through_its_list() {
        let tiles = vec![floor(), floor(), floor()];
        let mut ghosts = vec![Ghost {
            pos: Position { x: 0, y: 0 },
            charged: false,
            moves: vec![Direction::Right, Direction::Left],
            current_move: 0,
        }];
        let mut pacmans = vec![Pacman {
            pos: Position { x: 2, y: 0 },
            alive: true,
            points: 0,
        }];
        move_ghost(3, 1, &tiles, &mut ghosts, &mut pacmans, 0);
        assert_eq!(ghosts[0].pos, Position { x: 1, y: 0 });
        assert_eq!(ghosts[0].current_move, 1);
        move_ghost(3, 1, &tiles, &mut ghosts, &mut pacmans, 0);
        assert_eq!(ghosts[0].pos, Position { x: 0, y: 0 });
    }

    #[test]
    fn dead_pacman_short_circuits() {
        let mut tiles = vec![floor()];
        let mut pacmans = vec![Pacman {
            pos: Position { x: 0, y: 0 },
            alive: false,
            points: 0,
        }];
        let result = move_pacman(1, 1, &mut tiles, &mut pacmans, &[], b'R');
        assert_eq!(result, MoveResult::DeadPacman);
    }
}
