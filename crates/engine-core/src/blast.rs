//! Blast-area resolution: which cells a detonation reaches, chained bombs
//! included. An explicit worklist with a visited set keeps mutually
//! overlapping chains from recursing forever.

use std::collections::BTreeSet;

use contracts::{Coord, Direction};

use crate::world::Board;

/// All cells affected by detonating the bomb at `origin`, including the full
/// areas of every bomb the blast chains into (each expanding with its own
/// diameter). The origin is always part of the result.
pub fn blast_area(board: &Board, origin: Coord) -> BTreeSet<Coord> {
    blast_area_with(board, origin, None)
}

/// Like [`blast_area`], but with an explicit diameter for the origin, used
/// when hypothesizing a bomb that is not on the board yet.
pub fn blast_area_with(
    board: &Board,
    origin: Coord,
    origin_diameter: Option<u32>,
) -> BTreeSet<Coord> {
    let mut area = BTreeSet::new();
    let mut visited = BTreeSet::new();
    let mut worklist = vec![origin];

    while let Some(bomb_coord) = worklist.pop() {
        if !visited.insert(bomb_coord) {
            continue;
        }
        area.insert(bomb_coord);

        let on_cell = board.cell(bomb_coord).bomb.map(|bomb| bomb.diameter);
        let diameter = if bomb_coord == origin {
            origin_diameter.or(on_cell)
        } else {
            on_cell
        };
        let Some(diameter) = diameter else {
            continue;
        };

        for direction in Direction::ALL {
            let mut cursor = bomb_coord;
            for _ in 0..diameter / 2 {
                let Some(next) = board.neighbor(cursor, direction) else {
                    break;
                };
                cursor = next;
                let cell = board.cell(cursor);
                if cell.terrain.is_wall() {
                    break; // walls absorb the blast, excluded
                }
                area.insert(cursor);
                if cell.terrain.is_box() {
                    break; // boxes take the hit, included
                }
                if cell.powerup.is_some() {
                    break; // power-up tiles block further spread, included
                }
                if cell.bomb.is_some() {
                    worklist.push(cursor); // chain; the ray keeps going
                }
            }
        }
    }

    area
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::tests::{board_from_entities, entity, unit_entry};
    use contracts::EntityKind;

    #[test]
    fn area_contains_origin_and_reaches_the_radius() {
        let board = board_from_entities(
            7,
            vec![unit_entry("c", "a", (3, 3))],
            vec![entity(EntityKind::Bomb, (3, 3), |e| {
                e.blast_diameter = Some(5);
                e.unit_id = Some("c".to_string());
                e.expires = Some(40);
            })],
        );

        let area = blast_area(&board, Coord::new(3, 3));
        assert!(area.contains(&Coord::new(3, 3)));
        assert!(area.contains(&Coord::new(1, 3)));
        assert!(area.contains(&Coord::new(5, 3)));
        assert!(area.contains(&Coord::new(3, 1)));
        assert!(area.contains(&Coord::new(3, 5)));
        assert_eq!(area.len(), 9);
    }

    #[test]
    fn walls_are_excluded_and_boxes_are_included() {
        let board = board_from_entities(
            7,
            vec![unit_entry("c", "a", (0, 0))],
            vec![
                entity(EntityKind::Bomb, (3, 3), |e| {
                    e.blast_diameter = Some(5);
                    e.unit_id = Some("c".to_string());
                    e.expires = Some(40);
                }),
                entity(EntityKind::Wall, (4, 3), |_| {}),
                entity(EntityKind::WoodBox, (3, 4), |e| e.hp = Some(1)),
            ],
        );

        let area = blast_area(&board, Coord::new(3, 3));
        assert!(!area.contains(&Coord::new(4, 3)), "wall stops the ray exclusively");
        assert!(!area.contains(&Coord::new(5, 3)), "nothing reaches past a wall");
        assert!(area.contains(&Coord::new(3, 4)), "box is hit and included");
        assert!(!area.contains(&Coord::new(3, 5)), "nothing reaches past a box");
    }

    #[test]
    fn powerup_tiles_block_spread_but_are_included() {
        let board = board_from_entities(
            7,
            vec![unit_entry("c", "a", (0, 0))],
            vec![
                entity(EntityKind::Bomb, (1, 1), |e| {
                    e.blast_diameter = Some(7);
                    e.unit_id = Some("c".to_string());
                    e.expires = Some(40);
                }),
                entity(EntityKind::BlastPowerup, (3, 1), |_| {}),
            ],
        );

        let area = blast_area(&board, Coord::new(1, 1));
        assert!(area.contains(&Coord::new(3, 1)));
        assert!(!area.contains(&Coord::new(4, 1)));
    }

    #[test]
    fn mutually_overlapping_chains_terminate_and_union() {
        let board = board_from_entities(
            9,
            vec![unit_entry("c", "a", (0, 0)), unit_entry("d", "b", (8, 8))],
            vec![
                entity(EntityKind::Bomb, (2, 4), |e| {
                    e.blast_diameter = Some(5);
                    e.unit_id = Some("c".to_string());
                    e.expires = Some(40);
                }),
                entity(EntityKind::Bomb, (4, 4), |e| {
                    e.blast_diameter = Some(5);
                    e.unit_id = Some("d".to_string());
                    e.expires = Some(40);
                }),
            ],
        );

        // Each bomb sits inside the other's radius; the union must cover both
        // full crosses exactly once.
        let from_left = blast_area(&board, Coord::new(2, 4));
        let from_right = blast_area(&board, Coord::new(4, 4));
        assert_eq!(from_left, from_right);
        assert!(from_left.contains(&Coord::new(0, 4)));
        assert!(from_left.contains(&Coord::new(6, 4)));
        assert!(from_left.contains(&Coord::new(2, 2)));
        assert!(from_left.contains(&Coord::new(4, 6)));
    }

    #[test]
    fn hypothesized_diameter_overrides_an_empty_origin() {
        let board = board_from_entities(7, vec![unit_entry("c", "a", (3, 3))], vec![]);
        let area = blast_area_with(&board, Coord::new(3, 3), Some(3));
        assert_eq!(area.len(), 5);
        assert!(area.contains(&Coord::new(2, 3)));
        assert!(area.contains(&Coord::new(3, 2)));
    }
}
