//! Board evaluation: the diffused cell-safety map, the mining-target value
//! map, and the weighted sub-scores the forward-model evaluator sums.
//!
//! Every sub-score is computed per player on absolute scale; the evaluator
//! returns `score(a) - score(b)`, negated for perspective `b`, so "higher is
//! better" holds for whichever player is asking.

use std::collections::BTreeMap;

use contracts::{Direction, EvalWeights, PlayerId};

use crate::search::safe_turns;
use crate::world::{
    Board, PerPlayer, Powerup, Terrain, UnitId, BOMB_ARM_TICKS, FIRE_DURATION_TICKS,
    MAX_ARMED_BOMBS, TARGET_RANGE_LEN, UNREACHABLE,
};

// ---------------------------------------------------------------------------
// Derived maps
// ---------------------------------------------------------------------------

/// Per-player safety values in [0, 1]: blocked or burning cells are 0, open
/// cells start at 1 and lose value under forecasts (a little under your own,
/// a lot under the opponent's, more once a threat has been standing ten or
/// more ticks). Three in-place relaxation sweeps then blur each value toward
/// its neighborhood, so safety gradients extend a few cells outward.
pub(crate) fn compute_safety_maps(board: &Board) -> PerPlayer<Vec<f64>> {
    let cell_count = board.cell_count();
    let tick = board.tick;
    let mut maps = PerPlayer {
        a: vec![0.0; cell_count],
        b: vec![0.0; cell_count],
    };
    let mut open = vec![false; cell_count];

    for index in 0..cell_count {
        let cell = &board.cells()[index];
        let blocked_occupant = cell
            .occupant
            .map(|id| {
                let unit = board.unit(id);
                !unit.is_alive() || unit.is_stunned_at(tick + 1)
            })
            .unwrap_or(false);
        if cell.fire.is_some() || !cell.terrain.is_open() || cell.bomb.is_some() || blocked_occupant
        {
            continue;
        }
        open[index] = true;

        let mut a = 1.0;
        let mut b = 1.0;
        if let Some(window) = *cell.forecast.get(PlayerId::A) {
            a -= 0.1;
            b -= 0.5;
            if window.start + 10 < tick + 1 {
                a -= 0.4;
            }
        }
        if let Some(window) = *cell.forecast.get(PlayerId::B) {
            b -= 0.1;
            a -= 0.5;
            if window.start + 10 < tick + 1 {
                b -= 0.4;
            }
        }
        maps.a[index] = a;
        maps.b[index] = b;
    }

    for _ in 0..3 {
        for index in 0..cell_count {
            if !open[index] {
                continue;
            }
            let coord = board.coord_of(index);
            let mut sum_a = 0.0;
            let mut sum_b = 0.0;
            for neighbor in board.neighbors(coord) {
                let neighbor_index = board.index(neighbor);
                sum_a += maps.a[neighbor_index];
                sum_b += maps.b[neighbor_index];
            }
            maps.a[index] = 0.6 * maps.a[index] + 0.1 * sum_a;
            maps.b[index] = 0.6 * maps.b[index] + 0.1 * sum_b;
        }
    }

    maps
}

/// Signed mining value per cell and blast radius: what a bomb of radius
/// `i + 1` placed on this cell would reach, walking each axis until a wall or
/// power-up stops it. A box adds value scaled down by its remaining hits; a
/// unit that would still be stunned when a bomb placed now could detonate
/// adds a large bounty. Positive favors player `a`; the sign per box follows
/// whichever side can reach it sooner by safe distance.
pub(crate) fn compute_target_values(board: &Board) -> Vec<[f64; TARGET_RANGE_LEN]> {
    let cell_count = board.cell_count();
    let tick = board.tick;
    let mut values = vec![[0.0; TARGET_RANGE_LEN]; cell_count];

    for index in 0..cell_count {
        let coord = board.coord_of(index);
        if !board.cells()[index].terrain.is_open() {
            continue;
        }
        for direction in Direction::ALL {
            let mut cursor = coord;
            for dist in 0..TARGET_RANGE_LEN {
                let Some(next) = board.neighbor(cursor, direction) else {
                    break;
                };
                cursor = next;
                let cell = board.cell(cursor);
                if cell.terrain.is_wall() || cell.powerup.is_some() {
                    break;
                }
                if let Terrain::Box { hp } = cell.terrain {
                    let mut min_dist = PerPlayer {
                        a: UNREACHABLE,
                        b: UNREACHABLE,
                    };
                    for unit in board.units() {
                        let d = board.safe_field(unit.id).distance(cursor);
                        if d < *min_dist.get(unit.player) {
                            *min_dist.get_mut(unit.player) = d;
                        }
                    }
                    let multiplier = if min_dist.a < min_dist.b {
                        1.0
                    } else if min_dist.a > min_dist.b {
                        -1.0
                    } else {
                        0.0
                    };
                    if multiplier != 0.0 {
                        let value = multiplier / 10f64.powi(hp as i32 - 1);
                        for slot in dist..TARGET_RANGE_LEN {
                            values[index][slot] += value;
                        }
                    }
                    break;
                }
                if let Some(id) = cell.occupant {
                    let unit = board.unit(id);
                    if unit.is_alive() && unit.stunned_until >= tick + 1 + BOMB_ARM_TICKS {
                        let multiplier = if unit.player == PlayerId::B { 1.0 } else { -1.0 };
                        for slot in dist..TARGET_RANGE_LEN {
                            values[index][slot] += multiplier * 20.0;
                        }
                    }
                }
            }
        }
    }

    values
}

// ---------------------------------------------------------------------------
// Sub-scores
// ---------------------------------------------------------------------------

fn live_units(board: &Board, player: PlayerId) -> Vec<UnitId> {
    board
        .player(player)
        .units
        .iter()
        .copied()
        .filter(|&id| board.unit(id).is_alive())
        .collect()
}

/// Roster health in [0, 1]; losing the first hit point costs less than the
/// last.
fn hp_score(board: &Board, player: PlayerId) -> f64 {
    let mut score = 0.0;
    for &id in &board.player(player).units {
        score += match board.unit(id).hp {
            hp if hp >= 3 => 1.0,
            2 => 0.75,
            1 => 0.45,
            _ => 0.0,
        };
    }
    score / 3.0
}

/// 1 per unit with breathing room, scaled down sharply once fewer than four
/// safe turns remain, and zeroed when a stun would pin the unit inside a
/// forecast window.
fn imminent_danger_score(board: &Board, player: PlayerId) -> f64 {
    let units = live_units(board, player);
    if units.is_empty() {
        return 0.0;
    }
    let mut score = 0.0;
    for &id in &units {
        let unit = board.unit(id);
        let turns = safe_turns(board, unit.pos, player, unit.invulnerable_until);
        if turns < 4 {
            score += 0.1 * turns as f64;
            continue;
        }
        let cell = board.cell(unit.pos);
        if let Some(window) = *cell.forecast.get(player) {
            if window.end.saturating_sub(FIRE_DURATION_TICKS) <= unit.stunned_until + 1 {
                continue;
            }
        }
        if let Some(window) = *cell.forecast.get(player.opponent()) {
            if window.start <= unit.stunned_until + 1 {
                continue;
            }
        }
        score += 1.0;
    }
    score / units.len() as f64
}

fn opponent_stun_score(board: &Board, player: PlayerId) -> f64 {
    let opponents = live_units(board, player.opponent());
    if opponents.is_empty() {
        return 0.0;
    }
    let stunned = opponents
        .iter()
        .filter(|&&id| {
            let unit = board.unit(id);
            unit.stunned_until > unit.invulnerable_until
        })
        .count();
    stunned as f64 / opponents.len() as f64
}

fn cell_safety_score(board: &Board, player: PlayerId) -> f64 {
    let units = live_units(board, player);
    if units.is_empty() {
        return 0.0;
    }
    let total: f64 = units
        .iter()
        .map(|&id| board.safety_value(player, board.unit(id).pos))
        .sum();
    total / units.len() as f64
}

/// Credit for being the closest claimant of unclaimed power-ups of `kind`,
/// counted only when the globally nearest unit is ours.
fn powerup_proximity_score(
    board: &Board,
    player: PlayerId,
    kind: Powerup,
    denominator: f64,
) -> f64 {
    let units = live_units(board, player);
    if units.is_empty() {
        return 0.0;
    }

    let mut closest_ours: BTreeMap<UnitId, u32> = BTreeMap::new();
    for index in 0..board.cell_count() {
        let cell = &board.cells()[index];
        if cell.powerup != Some(kind) || cell.occupant.is_some() {
            continue;
        }
        let coord = board.coord_of(index);
        let mut best: Option<(UnitId, u32)> = None;
        for unit in board.units() {
            let d = board.safe_field(unit.id).distance(coord);
            if d < best.map(|(_, dist)| dist).unwrap_or(UNREACHABLE) {
                best = Some((unit.id, d));
            }
        }
        let Some((winner, dist)) = best else {
            continue;
        };
        if board.unit(winner).player == player {
            let entry = closest_ours.entry(winner).or_insert(dist);
            *entry = (*entry).min(dist);
        }
    }

    let total: f64 = closest_ours
        .values()
        .map(|&dist| (10.0 - dist as f64).max(0.0))
        .sum();
    total / (denominator * units.len() as f64)
}

fn blast_diameter_score(board: &Board, player: PlayerId) -> f64 {
    let units = live_units(board, player);
    if units.is_empty() {
        return 0.0;
    }
    let total: f64 = units
        .iter()
        .map(|&id| {
            let upgrades = (board.unit(id).blast_diameter / 2).saturating_sub(1);
            upgrades.min(10) as f64
        })
        .sum();
    total / (10.0 * units.len() as f64)
}

/// Value of the bombs currently armed: a bomb is worth what its cell's
/// target value says it can hit, halved while its owner is still standing on
/// it (the fuse is wasted until they step off).
fn armed_bomb_score(board: &Board, player: PlayerId) -> f64 {
    let mut score = 0.0;
    for &bomb_coord in &board.player(player).bombs {
        let cell = board.cell(bomb_coord);
        let Some(bomb) = cell.bomb else {
            continue;
        };
        let radius_index = ((bomb.diameter / 2).saturating_sub(1) as usize).min(TARGET_RANGE_LEN - 1);
        let signed = board.target_value(bomb_coord, radius_index);
        let signed = if player == PlayerId::A { signed } else { -signed };
        let value = signed.clamp(0.0, 2.0);
        score += if cell.occupant.is_some() {
            value / 2.0
        } else {
            value
        };
    }
    score / (2.0 * MAX_ARMED_BOMBS as f64)
}

/// Per unit: how close it is to the most attractive reachable bombing spot,
/// where attraction is target value discounted by travel distance (boxes are
/// traversable here, at a price).
fn mining_goal_score(board: &Board, player: PlayerId) -> f64 {
    let units = live_units(board, player);
    if units.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;
    for &id in &units {
        let unit = board.unit(id);
        let radius_index =
            ((unit.blast_diameter / 2).saturating_sub(1) as usize).min(TARGET_RANGE_LEN - 1);
        let field = board.mining_field(id);

        let mut best: Option<(f64, u32)> = None;
        for index in 0..board.cell_count() {
            let cell = &board.cells()[index];
            if !cell.terrain.is_open() || cell.bomb.is_some() {
                continue;
            }
            let coord = board.coord_of(index);
            let signed = board.target_value(coord, radius_index);
            let signed = if player == PlayerId::A { signed } else { -signed };
            if signed < 0.02 {
                continue; // not worth a bomb
            }
            let dist = field.distance(coord);
            if dist >= UNREACHABLE {
                continue;
            }
            let ratio = signed / (dist as f64 + 6.0);
            if best.map(|(r, _)| ratio > r).unwrap_or(true) {
                best = Some((ratio, dist));
            }
        }
        if let Some((_, dist)) = best {
            score += (10.0 - dist as f64).max(0.0);
        }
    }
    score / (10.0 * units.len() as f64)
}

// ---------------------------------------------------------------------------
// Weighted evaluation
// ---------------------------------------------------------------------------

pub fn player_score(board: &Board, player: PlayerId, weights: &EvalWeights) -> f64 {
    weights.health * hp_score(board, player)
        + weights.imminent_danger * imminent_danger_score(board, player)
        + weights.opponent_stun * opponent_stun_score(board, player)
        + weights.cell_safety * cell_safety_score(board, player)
        + weights.freeze_powerup * powerup_proximity_score(board, player, Powerup::Freeze, 20.0)
        + weights.blast_diameter * blast_diameter_score(board, player)
        + weights.armed_bomb * armed_bomb_score(board, player)
        + weights.blast_powerup * powerup_proximity_score(board, player, Powerup::Blast, 10.0)
        + weights.mining * mining_goal_score(board, player)
}

/// The evaluator's verdict on a board: positive is good for `perspective`.
pub fn evaluate(board: &Board, perspective: PlayerId, weights: &EvalWeights) -> f64 {
    let a = player_score(board, PlayerId::A, weights);
    let b = player_score(board, PlayerId::B, weights);
    match perspective {
        PlayerId::A => a - b,
        PlayerId::B => b - a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::tests::{board_from_entities, entity, unit_entry};
    use contracts::{Coord, EntityKind};

    #[test]
    fn evaluation_is_antisymmetric_between_perspectives() {
        let board = board_from_entities(
            7,
            vec![unit_entry("c", "a", (1, 1)), unit_entry("d", "b", (5, 5))],
            vec![entity(EntityKind::WoodBox, (3, 1), |e| e.hp = Some(1))],
        );
        let weights = EvalWeights::default();
        let a_view = evaluate(&board, PlayerId::A, &weights);
        let b_view = evaluate(&board, PlayerId::B, &weights);
        assert_eq!(a_view, -b_view);
    }

    #[test]
    fn clone_scores_identically_with_no_action() {
        let board = board_from_entities(
            7,
            vec![unit_entry("c", "a", (1, 1)), unit_entry("d", "b", (5, 5))],
            vec![
                entity(EntityKind::WoodBox, (3, 1), |e| e.hp = Some(1)),
                entity(EntityKind::Bomb, (1, 3), |e| {
                    e.blast_diameter = Some(3);
                    e.unit_id = Some("c".to_string());
                    e.created = 0;
                    e.expires = Some(40);
                }),
            ],
        );
        let weights = EvalWeights::default();
        let clone = board.clone();
        assert_eq!(
            evaluate(&board, PlayerId::A, &weights),
            evaluate(&clone, PlayerId::A, &weights)
        );
    }

    #[test]
    fn hp_bins_reward_keeping_the_last_hit_hardest() {
        let mut board = board_from_entities(
            7,
            vec![unit_entry("c", "a", (1, 1)), unit_entry("d", "b", (5, 5))],
            vec![],
        );
        assert_eq!(hp_score(&board, PlayerId::A), 1.0 / 3.0);

        let id = board.unit_by_name("c").unwrap();
        board.unit_mut(id).hp = 1;
        board.recompute_derived();
        assert_eq!(hp_score(&board, PlayerId::A), 0.45 / 3.0);
    }

    #[test]
    fn nearer_side_owns_the_box_sign() {
        // Player a's unit is adjacent to the box; player b's is far away.
        let board = board_from_entities(
            9,
            vec![unit_entry("c", "a", (1, 1)), unit_entry("d", "b", (7, 7))],
            vec![entity(EntityKind::WoodBox, (3, 1), |e| e.hp = Some(1))],
        );
        // (2,1) is one step from the box: positive value for player a.
        assert!(board.target_value(Coord::new(2, 1), 0) > 0.0);
        // From b's side of the sign convention that same cell is a liability.
        let b_view = -board.target_value(Coord::new(2, 1), 0);
        assert!(b_view < 0.0);
    }

    #[test]
    fn safety_map_zeroes_blocked_cells_and_discounts_threats() {
        let board = board_from_entities(
            7,
            vec![unit_entry("c", "a", (1, 1)), unit_entry("d", "b", (5, 5))],
            vec![
                entity(EntityKind::Wall, (3, 3), |_| {}),
                entity(EntityKind::Bomb, (1, 3), |e| {
                    e.blast_diameter = Some(3);
                    e.unit_id = Some("d".to_string());
                    e.created = 0;
                    e.expires = Some(40);
                }),
            ],
        );
        assert_eq!(board.safety_value(PlayerId::A, Coord::new(3, 3)), 0.0);
        // The bomb cell itself is blocked; its blast arm carries b's
        // forecast, so it is worth less to player a than a quiet corner.
        assert!(
            board.safety_value(PlayerId::A, Coord::new(0, 3))
                < board.safety_value(PlayerId::A, Coord::new(6, 0))
        );
    }

    #[test]
    fn stunned_opponents_raise_the_stun_score() {
        let mut board = board_from_entities(
            7,
            vec![unit_entry("c", "a", (1, 1)), unit_entry("d", "b", (5, 5))],
            vec![],
        );
        assert_eq!(opponent_stun_score(&board, PlayerId::A), 0.0);
        let id = board.unit_by_name("d").unwrap();
        board.unit_mut(id).stunned_until = 12;
        board.recompute_derived();
        assert_eq!(opponent_stun_score(&board, PlayerId::A), 1.0);
    }
}
