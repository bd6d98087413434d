//! The canonical world model: cells, units, players, and the derived layers
//! (hazard forecasts, distance fields, safety and target maps) recomputed
//! once per tick after the event batch is applied.
//!
//! All cross-references are compact ids into registries, never pointers, so
//! `Clone` on [`Board`] is a structurally correct deep fork, which is the property
//! the forward-model evaluator relies on.

use std::collections::BTreeMap;

use contracts::{Coord, Direction, PlayerId};

use crate::search::DistanceField;

mod events;
mod init;
mod step;


pub use step::UnitAction;

// ---------------------------------------------------------------------------
// Rule constants
// ---------------------------------------------------------------------------

/// Concurrently armed bombs allowed per unit and per player.
pub const MAX_ARMED_BOMBS: usize = 3;
/// Ticks after placement before a bomb can be detonated manually.
pub const BOMB_ARM_TICKS: u64 = 5;
/// Ticks a patch of fire keeps burning.
pub const FIRE_DURATION_TICKS: u64 = 5;
/// Invulnerability granted after losing a hit point.
pub const HIT_INVULNERABLE_TICKS: u64 = 5;
/// Stun inflicted on the freeze power-up's victim.
pub const STUN_DURATION_TICKS: u64 = 15;
/// Blast-diameter gain from a blast power-up.
pub const BLAST_DIAMETER_STEP: u32 = 2;
/// Fuse assumed for bombs the server spawns without an expiry.
pub const DEFAULT_BOMB_FUSE_TICKS: u64 = 40;
/// Pessimistic fuse assumed for bombs placed inside the forward model.
pub const PLACED_BOMB_FUSE_TICKS: u64 = 5;
/// Stand-in expiry for the endgame's closing fire, which never goes out.
pub const ENDLESS_FIRE_EXPIRY: u64 = 2_000;
/// Distance sentinel for cells no search could reach.
pub const UNREACHABLE: u32 = 10_000_000;
/// Blast radii tracked by the mining-target value map (1..=5).
pub const TARGET_RANGE_LEN: usize = 5;

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Compact handle into the board's unit registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub(crate) u8);

impl UnitId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A pair of values, one per player, indexed by [`PlayerId`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerPlayer<T> {
    pub a: T,
    pub b: T,
}

impl<T> PerPlayer<T> {
    pub fn get(&self, id: PlayerId) -> &T {
        match id {
            PlayerId::A => &self.a,
            PlayerId::B => &self.b,
        }
    }

    pub fn get_mut(&mut self, id: PlayerId) -> &mut T {
        match id {
            PlayerId::A => &mut self.a,
            PlayerId::B => &mut self.b,
        }
    }
}

// ---------------------------------------------------------------------------
// Cell state
// ---------------------------------------------------------------------------

/// Static terrain of a cell. A destructible box tracks its remaining hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terrain {
    Open,
    Wall,
    Box { hp: u32 },
}

impl Terrain {
    pub fn is_wall(self) -> bool {
        matches!(self, Terrain::Wall)
    }

    pub fn is_box(self) -> bool {
        matches!(self, Terrain::Box { .. })
    }

    pub fn is_open(self) -> bool {
        matches!(self, Terrain::Open)
    }
}

impl Default for Terrain {
    fn default() -> Self {
        Terrain::Open
    }
}

/// An armed bomb sitting on a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bomb {
    pub diameter: u32,
    pub owner: UnitId,
    pub created: u64,
    pub expires: u64,
}

/// Fire currently burning on a cell; `expires` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireSpan {
    pub created: u64,
    pub expires: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Powerup {
    Blast,
    Freeze,
}

/// Predicted fire interval `[start, end)` for one player's bombs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastWindow {
    pub start: u64,
    pub end: u64,
}

impl ForecastWindow {
    /// Overlapping threats keep the worst-case bound on both ends.
    pub fn merge_conservative(self, other: ForecastWindow) -> ForecastWindow {
        ForecastWindow {
            start: self.start.min(other.start),
            end: self.end.min(other.end),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub terrain: Terrain,
    pub occupant: Option<UnitId>,
    pub bomb: Option<Bomb>,
    pub fire: Option<FireSpan>,
    pub powerup: Option<Powerup>,
    /// Hazard forecast keyed by the owning player of the threatening bombs.
    pub forecast: PerPlayer<Option<ForecastWindow>>,
}

impl Cell {
    /// True when the cell can never be entered: wall, box, or armed bomb.
    pub fn is_hard_blocked(&self) -> bool {
        !self.terrain.is_open() || self.bomb.is_some()
    }
}

// ---------------------------------------------------------------------------
// Units and players
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub name: String,
    pub id: UnitId,
    pub player: PlayerId,
    pub pos: Coord,
    pub hp: i32,
    pub blast_diameter: u32,
    /// Invulnerability lasts through this tick, inclusive.
    pub invulnerable_until: u64,
    /// Stun lasts through this tick, inclusive.
    pub stunned_until: u64,
    /// Cells holding bombs this unit armed; at most [`MAX_ARMED_BOMBS`].
    pub bombs: Vec<Coord>,
}

impl Unit {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn is_stunned_at(&self, tick: u64) -> bool {
        tick <= self.stunned_until
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerState {
    pub units: Vec<UnitId>,
    /// Cells holding bombs armed by any of this player's units.
    pub bombs: Vec<Coord>,
}

// ---------------------------------------------------------------------------
// Derived layers
// ---------------------------------------------------------------------------

/// Per-tick derivations; cleared and rebuilt by [`Board::recompute_derived`].
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Derived {
    /// Safety-aware distance field per unit, indexed by `UnitId`.
    pub safe: Vec<DistanceField>,
    /// Path-through-boxes distance field per unit, for mining-goal ranking.
    pub mining: Vec<DistanceField>,
    /// Diffused cell-safety map per player, row-major.
    pub safety: PerPlayer<Vec<f64>>,
    /// Signed mining-target value per cell and blast radius 1..=5.
    pub target_value: Vec<[f64; TARGET_RANGE_LEN]>,
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// The complete world state plus its derived layers.
///
/// Owned exclusively by the engine; the forward model works on clones that
/// never escape the tick they were made in.
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    pub tick: u64,
    width: u32,
    height: u32,
    cells: Vec<Cell>,
    units: Vec<Unit>,
    unit_lookup: BTreeMap<String, UnitId>,
    pub players: PerPlayer<PlayerState>,
    /// The player this process is planning for.
    pub perspective: PlayerId,
    pub(crate) derived: Derived,
}

impl Board {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn in_bounds(&self, coord: Coord) -> bool {
        coord.x < self.width && coord.y < self.height
    }

    pub fn index(&self, coord: Coord) -> usize {
        debug_assert!(self.in_bounds(coord), "coordinate {coord} out of bounds");
        (coord.y * self.width + coord.x) as usize
    }

    pub fn coord_of(&self, index: usize) -> Coord {
        Coord::new(index as u32 % self.width, index as u32 / self.width)
    }

    /// Panics on out-of-bounds coordinates; feed data must be validated with
    /// [`Board::try_cell`] before it reaches here.
    pub fn cell(&self, coord: Coord) -> &Cell {
        &self.cells[self.index(coord)]
    }

    pub fn cell_mut(&mut self, coord: Coord) -> &mut Cell {
        let index = self.index(coord);
        &mut self.cells[index]
    }

    pub fn try_cell(&self, coord: Coord) -> Option<&Cell> {
        if self.in_bounds(coord) {
            Some(self.cell(coord))
        } else {
            None
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn neighbor(&self, coord: Coord, direction: Direction) -> Option<Coord> {
        coord.step(direction, self.width, self.height)
    }

    pub fn neighbors(&self, coord: Coord) -> impl Iterator<Item = Coord> + '_ {
        Direction::ALL
            .iter()
            .filter_map(move |&direction| self.neighbor(coord, direction))
    }

    pub fn unit(&self, id: UnitId) -> &Unit {
        &self.units[id.index()]
    }

    pub fn unit_mut(&mut self, id: UnitId) -> &mut Unit {
        &mut self.units[id.index()]
    }

    pub fn unit_by_name(&self, name: &str) -> Option<UnitId> {
        self.unit_lookup.get(name).copied()
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter()
    }

    pub fn player(&self, id: PlayerId) -> &PlayerState {
        self.players.get(id)
    }

    /// Safety-aware distance field for a unit, as of the last recompute.
    pub fn safe_field(&self, id: UnitId) -> &DistanceField {
        &self.derived.safe[id.index()]
    }

    /// Path-through-boxes distance field for a unit, as of the last
    /// recompute.
    pub fn mining_field(&self, id: UnitId) -> &DistanceField {
        &self.derived.mining[id.index()]
    }

    /// Diffused safety value of a cell for a player.
    pub fn safety_value(&self, player: PlayerId, coord: Coord) -> f64 {
        self.derived.safety.get(player)[self.index(coord)]
    }

    /// Signed mining value of a cell for the given blast radius index.
    pub fn target_value(&self, coord: Coord, radius_index: usize) -> f64 {
        self.derived.target_value[self.index(coord)][radius_index.min(TARGET_RANGE_LEN - 1)]
    }

    /// Rebuild every derived layer. Must run exactly once after a batch of
    /// mutations (events or forward-model actions) and before any of the
    /// layers are read; the order matters because distances depend on the
    /// forecasts and the target map depends on the distances.
    pub fn recompute_derived(&mut self) {
        crate::hazard::recompute_forecasts(self);

        let safe: Vec<DistanceField> = self
            .units
            .iter()
            .map(|unit| crate::search::safe_distances(self, unit.id))
            .collect();
        self.derived.safe = safe;
        let mining: Vec<DistanceField> = self
            .units
            .iter()
            .map(|unit| crate::search::distances_through_boxes(self, unit.id))
            .collect();
        self.derived.mining = mining;

        self.derived.safety = crate::score::compute_safety_maps(self);
        self.derived.target_value = crate::score::compute_target_values(self);
    }

    /// Referential-consistency check; corruption here would make every plan
    /// derived from this board unsound, so it is fatal.
    pub fn validate(&self) {
        for (index, cell) in self.cells.iter().enumerate() {
            let coord = self.coord_of(index);
            if let Some(id) = cell.occupant {
                let unit = self.unit(id);
                assert!(
                    unit.pos == coord,
                    "cell {coord} claims occupant {} which is at {}",
                    unit.name,
                    unit.pos
                );
            }
            if let Some(bomb) = cell.bomb {
                assert!(
                    cell.terrain.is_open(),
                    "cell {coord} holds both terrain {:?} and a bomb",
                    cell.terrain
                );
                let owner = self.unit(bomb.owner);
                assert!(
                    owner.bombs.contains(&coord),
                    "bomb at {coord} missing from owner {}'s set",
                    owner.name
                );
                assert!(
                    self.players.get(owner.player).bombs.contains(&coord),
                    "bomb at {coord} missing from player {}'s set",
                    owner.player
                );
            }
        }

        for unit in &self.units {
            assert!(
                unit.bombs.len() <= MAX_ARMED_BOMBS,
                "unit {} holds {} armed bombs",
                unit.name,
                unit.bombs.len()
            );
            for &coord in &unit.bombs {
                let bomb = self.cell(coord).bomb;
                assert!(
                    bomb.map(|b| b.owner) == Some(unit.id),
                    "unit {} lists a bomb at {coord} the cell does not hold",
                    unit.name
                );
            }
        }
    }
}
