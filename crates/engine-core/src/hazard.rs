//! Hazard propagation: per-cell, per-player forecasts of future fire.
//!
//! Every armed bomb seeds one blast-area resolution; each cell the blast
//! reaches records the window `[created + arm, expires + fire_duration)`
//! attributed to the bomb owner's player. A bomb caught in another bomb's
//! blast inherits the seed's window and attribution through the resolver's
//! chain expansion, and overlapping windows keep the conservative bound on
//! both ends, so a cell never looks safer than its worst-case threat.

use std::collections::BTreeSet;

use contracts::{Coord, PlayerId};

use crate::blast::blast_area;
use crate::world::{Board, ForecastWindow, PerPlayer, BOMB_ARM_TICKS, FIRE_DURATION_TICKS};

/// Rebuild every cell's forecast from the currently armed bombs.
pub(crate) fn recompute_forecasts(board: &mut Board) {
    let mut passes: Vec<(PlayerId, ForecastWindow, BTreeSet<Coord>)> = Vec::new();
    for index in 0..board.cell_count() {
        let coord = board.coord_of(index);
        let Some(bomb) = board.cell(coord).bomb else {
            continue;
        };
        let window = ForecastWindow {
            start: bomb.created + BOMB_ARM_TICKS,
            end: bomb.expires + FIRE_DURATION_TICKS,
        };
        let owner_player = board.unit(bomb.owner).player;
        passes.push((owner_player, window, blast_area(board, coord)));
    }

    for index in 0..board.cell_count() {
        let coord = board.coord_of(index);
        board.cell_mut(coord).forecast = PerPlayer::default();
    }
    for (player, window, area) in passes {
        for coord in area {
            let slot = board.cell_mut(coord).forecast.get_mut(player);
            *slot = Some(match *slot {
                Some(existing) => existing.merge_conservative(window),
                None => window,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::tests::{board_from_entities, entity, unit_entry};
    use contracts::EntityKind;

    fn bomb(at: (u32, u32), owner: &str, created: u64, expires: u64, diameter: u32) -> contracts::EntityPayload {
        entity(EntityKind::Bomb, at, |e| {
            e.created = created;
            e.expires = Some(expires);
            e.blast_diameter = Some(diameter);
            e.unit_id = Some(owner.to_string());
        })
    }

    #[test]
    fn forecast_covers_arm_through_burnout() {
        let board = board_from_entities(
            7,
            vec![unit_entry("c", "a", (0, 0))],
            vec![bomb((3, 3), "c", 10, 50, 3)],
        );

        let window = board
            .cell(Coord::new(3, 3))
            .forecast
            .get(PlayerId::A)
            .expect("origin carries a forecast");
        assert_eq!(window.start, 10 + BOMB_ARM_TICKS);
        assert_eq!(window.end, 50 + FIRE_DURATION_TICKS);
        assert!(board
            .cell(Coord::new(2, 3))
            .forecast
            .get(PlayerId::A)
            .is_some());
        assert!(board
            .cell(Coord::new(3, 3))
            .forecast
            .get(PlayerId::B)
            .is_none());
    }

    #[test]
    fn overlapping_windows_keep_the_conservative_bound() {
        let board = board_from_entities(
            7,
            vec![unit_entry("c", "a", (0, 0))],
            vec![bomb((1, 3), "c", 10, 50, 5), bomb((5, 3), "c", 20, 30, 5)],
        );

        // (3,3) is reached by both bombs: start of the earlier, end of the
        // shorter-lived one.
        let window = board
            .cell(Coord::new(3, 3))
            .forecast
            .get(PlayerId::A)
            .expect("overlap cell carries a forecast");
        assert_eq!(window.start, 15);
        assert_eq!(window.end, 35);
    }

    #[test]
    fn chained_bomb_cells_inherit_the_seed_attribution() {
        let board = board_from_entities(
            9,
            vec![unit_entry("c", "a", (0, 0)), unit_entry("d", "b", (8, 8))],
            vec![bomb((2, 4), "c", 10, 50, 5), bomb((4, 4), "d", 30, 60, 5)],
        );

        // The right bomb's far side is inside the left bomb's chain, so it
        // carries windows for both owners.
        let cell = board.cell(Coord::new(6, 4));
        let a_window = cell.forecast.get(PlayerId::A).expect("chained A window");
        let b_window = cell.forecast.get(PlayerId::B).expect("own B window");
        assert_eq!(a_window.start, 15);
        assert_eq!(a_window.end, 55);
        assert_eq!(b_window.start, 35);
        assert_eq!(b_window.end, 65);
    }

    #[test]
    fn recomputation_is_idempotent() {
        let mut board = board_from_entities(
            9,
            vec![unit_entry("c", "a", (0, 0)), unit_entry("d", "b", (8, 8))],
            vec![bomb((2, 4), "c", 10, 50, 5), bomb((4, 4), "d", 30, 60, 5)],
        );

        let first = board.clone();
        board.recompute_derived();
        assert_eq!(first, board);
    }
}
