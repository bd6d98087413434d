use std::collections::{BTreeMap, BTreeSet};

use super::*;
use crate::search::splitmix64;

/// A hypothesized single-unit action for the forward model. "Stay" is the
/// absence of an action; it needs no simulation of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitAction {
    Move { unit: UnitId, to: Coord },
    PlaceBomb { unit: UnitId },
    Detonate { unit: UnitId, at: Coord },
}

impl Board {
    /// Advance the board one tick under the given action set, in fixed
    /// precedence order: detonations (chaining through coinciding fuses),
    /// then placements, then simultaneous moves, then end-of-tick fire
    /// damage and power-up pickups, then a derived-layer rebuild.
    ///
    /// This is the forward model's step; it is also exercised directly by
    /// tests. It must only ever run on clones of the canonical board or on
    /// boards owned by a test.
    pub fn apply_actions(&mut self, actions: &[UnitAction]) {
        self.tick += 1;
        let tick = self.tick;

        for cell in &mut self.cells {
            if cell.fire.map(|fire| fire.expires) == Some(tick) {
                cell.fire = None;
            }
        }

        self.apply_detonations(actions, tick);
        self.apply_placements(actions, tick);
        self.apply_moves(actions);
        self.resolve_unit_cell_effects(tick);

        self.recompute_derived();
        #[cfg(debug_assertions)]
        self.validate();
    }

    fn apply_detonations(&mut self, actions: &[UnitAction], tick: u64) {
        let mut pending: Vec<Coord> = actions
            .iter()
            .filter_map(|action| match *action {
                UnitAction::Detonate { unit, at } => {
                    let owned = self
                        .try_cell(at)
                        .and_then(|cell| cell.bomb)
                        .map(|bomb| bomb.owner == unit)
                        .unwrap_or(false);
                    owned.then_some(at)
                }
                _ => None,
            })
            .collect();

        while !pending.is_empty() {
            for origin in std::mem::take(&mut pending) {
                if self.cell(origin).bomb.is_none() {
                    continue; // consumed by an earlier chain this tick
                }
                for coord in crate::blast::blast_area(self, origin) {
                    self.apply_detonation(coord, tick);
                }
            }
            for index in 0..self.cells.len() {
                if let Some(bomb) = self.cells[index].bomb {
                    if bomb.expires == tick {
                        pending.push(self.coord_of(index));
                    }
                }
            }
        }
    }

    /// The effect of a blast reaching one cell: power-ups burn, boxes lose a
    /// hit (dropping a power-up when destroyed), bombs are consumed, and fire
    /// starts on anything left standing open. Unit damage is resolved later,
    /// in the end-of-tick pass.
    fn apply_detonation(&mut self, coord: Coord, tick: u64) {
        let index = self.index(coord);
        self.cells[index].powerup = None;
        match self.cells[index].terrain {
            Terrain::Wall => return,
            Terrain::Box { hp } => {
                if hp <= 1 {
                    self.cells[index].terrain = Terrain::Open;
                    self.cells[index].powerup = Some(Powerup::Blast);
                } else {
                    self.cells[index].terrain = Terrain::Box { hp: hp - 1 };
                }
                return;
            }
            Terrain::Open => {}
        }
        if let Some(bomb) = self.cells[index].bomb.take() {
            self.remove_bomb_bookkeeping(coord, bomb.owner);
        }
        self.cells[index].fire = Some(FireSpan {
            created: tick,
            expires: tick + FIRE_DURATION_TICKS,
        });
    }

    fn apply_placements(&mut self, actions: &[UnitAction], tick: u64) {
        for action in actions {
            let UnitAction::PlaceBomb { unit } = *action else {
                continue;
            };
            let (pos, diameter, player, unit_armed) = {
                let u = self.unit(unit);
                (u.pos, u.blast_diameter, u.player, u.bombs.len())
            };
            if unit_armed >= MAX_ARMED_BOMBS
                || self.players.get(player).bombs.len() >= MAX_ARMED_BOMBS
                || self.cell(pos).bomb.is_some()
            {
                continue; // rejected, no effect
            }

            self.cell_mut(pos).bomb = Some(Bomb {
                diameter,
                owner: unit,
                created: tick,
                expires: tick + PLACED_BOMB_FUSE_TICKS,
            });
            self.unit_mut(unit).bombs.push(pos);
            self.players.get_mut(player).bombs.push(pos);

            // Placing onto burning fire detonates immediately.
            if self.cell(pos).fire.is_some() {
                for coord in crate::blast::blast_area(self, pos) {
                    self.apply_detonation(coord, tick);
                }
            }
        }
    }

    /// Moves are simultaneous: two units targeting the same destination
    /// cancel each other, and a fixed-point pass drops moves into cells that
    /// stay blocked (walls, boxes, bombs, units that are not moving away).
    fn apply_moves(&mut self, actions: &[UnitAction]) {
        let mut moves: Vec<(UnitId, Coord)> = actions
            .iter()
            .filter_map(|action| match *action {
                UnitAction::Move { unit, to } => Some((unit, to)),
                _ => None,
            })
            .collect();

        let mut destination_count: BTreeMap<Coord, u32> = BTreeMap::new();
        for &(_, to) in &moves {
            *destination_count.entry(to).or_insert(0) += 1;
        }
        moves.retain(|&(_, to)| destination_count[&to] == 1);

        loop {
            let moving: BTreeSet<UnitId> = moves.iter().map(|&(unit, _)| unit).collect();
            let before = moves.len();
            moves.retain(|&(_, to)| {
                let cell = self.cell(to);
                if cell.is_hard_blocked() {
                    return false;
                }
                match cell.occupant {
                    Some(other) => moving.contains(&other),
                    None => true,
                }
            });
            if moves.len() == before {
                break;
            }
        }

        for (unit, to) in moves {
            let from = self.unit(unit).pos;
            if self.cell(from).occupant == Some(unit) {
                self.cell_mut(from).occupant = None;
            }
            self.unit_mut(unit).pos = to;
            self.cell_mut(to).occupant = Some(unit);
        }
    }

    /// End-of-tick resolution: a vulnerable unit on burning fire loses one
    /// hit point and gains an invulnerability window; otherwise a unit on a
    /// power-up picks it up.
    fn resolve_unit_cell_effects(&mut self, tick: u64) {
        for index in 0..self.units.len() {
            let (id, pos, alive, invulnerable_until, player) = {
                let u = &self.units[index];
                (u.id, u.pos, u.is_alive(), u.invulnerable_until, u.player)
            };
            if !alive {
                continue;
            }

            let cell_index = self.index(pos);
            if self.cells[cell_index].fire.is_some() {
                if invulnerable_until < tick {
                    let unit = self.unit_mut(id);
                    unit.hp -= 1;
                    unit.invulnerable_until = tick + HIT_INVULNERABLE_TICKS;
                }
            } else if let Some(powerup) = self.cells[cell_index].powerup {
                self.cells[cell_index].powerup = None;
                match powerup {
                    Powerup::Blast => self.unit_mut(id).blast_diameter += BLAST_DIAMETER_STEP,
                    Powerup::Freeze => self.stun_opponent_unit(player, tick, pos),
                }
            }
        }
    }

    /// The freeze power-up stuns one live, unstunned opposing unit, chosen by
    /// a deterministic hash of the pickup tick and cell.
    fn stun_opponent_unit(&mut self, player: PlayerId, tick: u64, at: Coord) {
        let candidates: Vec<UnitId> = self
            .players
            .get(player.opponent())
            .units
            .iter()
            .copied()
            .filter(|&id| {
                let u = self.unit(id);
                u.is_alive() && u.stunned_until < tick + 1
            })
            .collect();
        if candidates.is_empty() {
            return;
        }

        let roll = splitmix64(
            tick ^ ((u64::from(at.x) << 32) | u64::from(at.y)),
        ) as usize;
        let victim = candidates[roll % candidates.len()];
        self.unit_mut(victim).stunned_until = tick + STUN_DURATION_TICKS;
    }
}
