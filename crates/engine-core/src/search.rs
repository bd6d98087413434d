//! Safety-aware shortest paths over the grid.
//!
//! A Dijkstra variant where arriving at a cell at tick `T` is gated by that
//! cell's hazard forecast: an unsafe arrival can sometimes be repaired by
//! waiting out the fire, but only when the predecessor cell stays safe for
//! the whole wait. Ties in the queue break on a deterministic hash so equal
//! costs carry no positional bias.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use contracts::{Coord, PlayerId};

use crate::world::{Board, Cell, UnitId, FIRE_DURATION_TICKS, UNREACHABLE};

/// Horizon (in ticks) tracked by the safety frontier.
pub const SAFE_HORIZON_TICKS: usize = 6;
/// Extra cost per box hit point when a search is allowed to path through
/// destructible terrain.
pub const BOX_STEP_PENALTY: u32 = 14;

// ---------------------------------------------------------------------------
// Deterministic tie-breaking
// ---------------------------------------------------------------------------

/// SplitMix64 finalizer; also used wherever the engine needs a deterministic
/// stand-in for a random draw.
pub(crate) fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

fn tie_break(tick: u64, coord: Coord) -> u64 {
    splitmix64(
        tick.wrapping_mul(0x9e3779b97f4a7c15)
            ^ ((u64::from(coord.x) << 32) | u64::from(coord.y)),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    dist: u32,
    tie: u64,
    coord: Coord,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .cmp(&other.dist)
            .then_with(|| self.tie.cmp(&other.tie))
            .then_with(|| self.coord.cmp(&other.coord))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Distance fields
// ---------------------------------------------------------------------------

/// Dense per-cell `(distance, predecessor)` result of one search.
/// Distances default to [`UNREACHABLE`].
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceField {
    width: u32,
    dist: Vec<u32>,
    prev: Vec<Option<Coord>>,
}

impl DistanceField {
    pub(crate) fn unreachable(width: u32, height: u32) -> Self {
        let cell_count = (width * height) as usize;
        Self {
            width,
            dist: vec![UNREACHABLE; cell_count],
            prev: vec![None; cell_count],
        }
    }

    fn index(&self, coord: Coord) -> usize {
        (coord.y * self.width + coord.x) as usize
    }

    pub fn distance(&self, coord: Coord) -> u32 {
        self.dist[self.index(coord)]
    }

    pub fn predecessor(&self, coord: Coord) -> Option<Coord> {
        self.prev[self.index(coord)]
    }

    pub fn is_reachable(&self, coord: Coord) -> bool {
        self.distance(coord) < UNREACHABLE
    }

    fn set(&mut self, coord: Coord, dist: u32, prev: Option<Coord>) {
        let index = self.index(coord);
        self.dist[index] = dist;
        self.prev[index] = prev;
    }
}

// ---------------------------------------------------------------------------
// Arrival feasibility
// ---------------------------------------------------------------------------

/// Outcome of asking "can this unit be standing on this cell at this tick".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arrival {
    /// The cell can never be entered by this unit (terrain, bomb, hostile or
    /// dead occupant).
    Blocked,
    /// Enterable; `wait` extra ticks must be spent before arriving, possibly
    /// zero.
    Safe { wait: u64 },
}

/// The intervals during which this cell burns or is forecast to burn, from
/// `player`'s point of view: active fire as-is, the opponent's forecast in
/// full, and the player's own forecast only over its final fire span (our own
/// bomb hurts us only if we overstay into its burnout).
fn danger_ranges(cell: &Cell, player: PlayerId) -> Vec<(u64, u64)> {
    let mut ranges = Vec::with_capacity(3);
    if let Some(fire) = cell.fire {
        ranges.push((fire.created, fire.expires));
    }
    if let Some(window) = *cell.forecast.get(player.opponent()) {
        ranges.push((window.start, window.end));
    }
    if let Some(window) = *cell.forecast.get(player) {
        ranges.push((window.end.saturating_sub(FIRE_DURATION_TICKS), window.end));
    }
    ranges
}

pub(crate) fn is_safe_arrival(
    board: &Board,
    coord: Coord,
    player: PlayerId,
    arrival_tick: u64,
    invulnerable_until: u64,
) -> Arrival {
    let cell = board.cell(coord);
    if cell.is_hard_blocked() {
        return Arrival::Blocked;
    }
    if let Some(id) = cell.occupant {
        let unit = board.unit(id);
        if !unit.is_alive() || unit.player != player {
            return Arrival::Blocked;
        }
    }

    let ranges = danger_ranges(cell, player);
    let mut wait = 0u64;
    let mut adjusted = true;
    while adjusted {
        adjusted = false;
        for &(start, end) in &ranges {
            // Fire ends right after arrival: surviving the arrival tick
            // itself is the only requirement.
            if wait + arrival_tick + 1 == end && invulnerable_until < wait + arrival_tick {
                wait = end - arrival_tick;
                adjusted = true;
                break;
            }
            // Otherwise both the arrival tick and the departure tick must
            // clear the window.
            if start <= wait + arrival_tick + 1
                && wait + arrival_tick + 1 < end
                && invulnerable_until < wait + arrival_tick + 1
            {
                wait = end - arrival_tick;
                adjusted = true;
                break;
            }
        }
    }
    Arrival::Safe { wait }
}

/// Ticks until this cell first becomes dangerous for `player`, `0` when the
/// next tick is already inside a danger window, and a large value when no
/// window threatens it.
pub fn safe_turns(board: &Board, coord: Coord, player: PlayerId, invulnerable_until: u64) -> u64 {
    let tick = board.tick;
    let ranges = danger_ranges(board.cell(coord), player);
    let mut min_start = u64::from(UNREACHABLE);
    for (start, end) in ranges {
        let start = start.max(invulnerable_until + 1);
        if start <= tick + 1 && tick + 1 < end {
            return 0;
        }
        if tick + 1 < end && start < min_start {
            min_start = start;
        }
    }
    min_start.saturating_sub(tick + 1)
}

// ---------------------------------------------------------------------------
// Searches
// ---------------------------------------------------------------------------

/// Neighbors a unit of `player` may route through: no walls, no dead units,
/// no hostile units. Boxes and bombs are admitted here and rejected by the
/// arrival check, which also assigns them a distance ("ticks to stand next
/// to it") that the target-value map reads.
fn search_neighbors<'a>(
    board: &'a Board,
    coord: Coord,
    player: PlayerId,
) -> impl Iterator<Item = Coord> + 'a {
    board.neighbors(coord).filter(move |&next| {
        let cell = board.cell(next);
        if cell.terrain.is_wall() {
            return false;
        }
        match cell.occupant {
            Some(id) => {
                let unit = board.unit(id);
                unit.is_alive() && unit.player == player
            }
            None => true,
        }
    })
}

/// A required wait at `coord` is only usable when the predecessor on the
/// recorded path stays safe (with no wait of its own) for every tick of it.
fn wait_is_feasible(
    board: &Board,
    field: &DistanceField,
    coord: Coord,
    start: Coord,
    player: PlayerId,
    arrival_tick: u64,
    wait: u64,
    invulnerable_until: u64,
) -> bool {
    let Some(prev) = field.predecessor(coord) else {
        return false;
    };
    for offset in 0..wait {
        match is_safe_arrival(board, prev, player, arrival_tick + offset, invulnerable_until) {
            // The start cell never passes the arrival check (the unit may be
            // standing on its own bomb); waiting there is allowed regardless.
            Arrival::Blocked => {
                if prev != start {
                    return false;
                }
            }
            Arrival::Safe { wait } => {
                if wait != 0 {
                    return false;
                }
            }
        }
    }
    true
}

/// Safety-aware distances from a unit's cell to every reachable cell,
/// including any forced waits along the way. A stunned unit starts late; a
/// dead unit reaches nothing.
pub fn safe_distances(board: &Board, unit_id: UnitId) -> DistanceField {
    let unit = board.unit(unit_id);
    let mut field = DistanceField::unreachable(board.width(), board.height());
    if !unit.is_alive() {
        return field;
    }

    let player = unit.player;
    let invulnerable = unit.invulnerable_until;
    let start = unit.pos;
    let init_dist = u32::try_from(unit.stunned_until.saturating_sub(board.tick)).unwrap_or(0);

    field.set(start, 0, None);
    let mut heap = BinaryHeap::new();
    heap.push(Reverse(QueueEntry {
        dist: init_dist,
        tie: tie_break(board.tick, start),
        coord: start,
    }));

    while let Some(Reverse(QueueEntry { dist, coord, .. })) = heap.pop() {
        let mut wait = 0u64;
        if dist > init_dist {
            // The start pop is exempt: the present cannot be re-decided.
            match is_safe_arrival(board, coord, player, board.tick + u64::from(dist), invulnerable)
            {
                Arrival::Blocked => continue,
                Arrival::Safe { wait: needed } => wait = needed,
            }
            if wait > 0
                && !wait_is_feasible(
                    board,
                    &field,
                    coord,
                    start,
                    player,
                    board.tick + u64::from(dist),
                    wait,
                    invulnerable,
                )
            {
                continue;
            }
        }

        let next_dist = dist + wait as u32 + 1;
        for next in search_neighbors(board, coord, player) {
            if next_dist < field.distance(next) {
                field.set(next, next_dist, Some(coord));
                heap.push(Reverse(QueueEntry {
                    dist: next_dist,
                    tie: tie_break(board.tick, next),
                    coord: next,
                }));
            }
        }
    }

    field
}

/// The safety frontier: for each horizon `h` in `0..=SAFE_HORIZON_TICKS`, the
/// cells this unit can be standing on, safely, exactly `h` ticks from now
/// (waits included). Planning uses it to put distance between a unit and
/// incoming fire when full evaluation is off the table.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyFrontier {
    pub horizons: Vec<Vec<Coord>>,
    pub field: DistanceField,
}

pub fn safety_frontier(board: &Board, unit_id: UnitId) -> SafetyFrontier {
    let unit = board.unit(unit_id);
    let mut field = DistanceField::unreachable(board.width(), board.height());
    let mut horizons = vec![Vec::new(); SAFE_HORIZON_TICKS + 1];
    if !unit.is_alive() {
        return SafetyFrontier { horizons, field };
    }

    let player = unit.player;
    let invulnerable = unit.invulnerable_until;
    let start = unit.pos;

    field.set(start, 0, None);
    let mut heap = BinaryHeap::new();
    heap.push(Reverse(QueueEntry {
        dist: 0,
        tie: tie_break(board.tick, start),
        coord: start,
    }));

    while let Some(Reverse(QueueEntry { dist, coord, .. })) = heap.pop() {
        if dist as usize >= horizons.len() {
            continue;
        }

        let mut wait = 0u64;
        if dist > 0 {
            match is_safe_arrival(board, coord, player, board.tick + u64::from(dist), invulnerable)
            {
                Arrival::Blocked => continue,
                Arrival::Safe { wait: needed } => wait = needed,
            }
        }
        if dist as usize + wait as usize >= horizons.len() {
            continue;
        }
        if wait > 0
            && !wait_is_feasible(
                board,
                &field,
                coord,
                start,
                player,
                board.tick + u64::from(dist),
                wait,
                invulnerable,
            )
        {
            continue;
        }

        horizons[dist as usize + wait as usize].push(coord);

        let next_dist = dist + wait as u32 + 1;
        for next in search_neighbors(board, coord, player) {
            if next_dist < field.distance(next) {
                field.set(next, next_dist, Some(coord));
                heap.push(Reverse(QueueEntry {
                    dist: next_dist,
                    tie: tie_break(board.tick, next),
                    coord: next,
                }));
            }
        }
    }

    SafetyFrontier { horizons, field }
}

/// The path-through-boxes variant: boxes cost an extra
/// [`BOX_STEP_PENALTY`] per remaining hit point, and arriving inside the
/// opponent's forecast folds the wait-out into the edge cost instead of
/// pruning. Used to rank mining goals, where "how long until I could bomb
/// from there" matters more than strict safety.
pub fn distances_through_boxes(board: &Board, unit_id: UnitId) -> DistanceField {
    let unit = board.unit(unit_id);
    let mut field = DistanceField::unreachable(board.width(), board.height());
    if !unit.is_alive() {
        return field;
    }

    let player = unit.player;
    let opponent = player.opponent();
    let start = unit.pos;

    field.set(start, 0, None);
    let mut heap = BinaryHeap::new();
    heap.push(Reverse(QueueEntry {
        dist: 0,
        tie: tie_break(board.tick, start),
        coord: start,
    }));

    while let Some(Reverse(QueueEntry { dist, coord, .. })) = heap.pop() {
        for next in search_neighbors(board, coord, player) {
            let cell = board.cell(next);
            let mut next_dist = dist + 1;
            if let crate::world::Terrain::Box { hp } = cell.terrain {
                next_dist += BOX_STEP_PENALTY * hp;
            }
            let arrival_tick = board.tick + u64::from(next_dist);
            if let Some(window) = *cell.forecast.get(opponent) {
                if window.start <= arrival_tick && arrival_tick < window.end {
                    next_dist = u32::try_from(window.end - board.tick).unwrap_or(UNREACHABLE);
                }
            }
            if next_dist < field.distance(next) {
                field.set(next, next_dist, Some(coord));
                heap.push(Reverse(QueueEntry {
                    dist: next_dist,
                    tie: tie_break(board.tick, next),
                    coord: next,
                }));
            }
        }
    }

    field
}
