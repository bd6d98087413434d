use contracts::{EntityKind, EntityPayload, GameEvent, UnitActionPayload, UnitPayload};
use serde_json::Value;
use tracing::warn;

use super::*;

impl Board {
    /// Apply one tick's event batch, then rebuild the derived layers once.
    ///
    /// Items that fail to parse (unknown event kinds) and items referencing
    /// unknown units or out-of-bounds cells are dropped with a warning; the
    /// rest of the batch still applies.
    pub fn apply_tick_events(&mut self, tick: u64, events: &[Value]) {
        self.tick = tick;
        for raw in events {
            match GameEvent::parse(raw) {
                Ok(event) => self.apply_event(&event),
                Err(err) => warn!(%err, "dropping unrecognized event"),
            }
        }
        self.recompute_derived();
        self.validate();
    }

    /// Apply a single event. Mutates exactly the entities the event names;
    /// derived layers are stale afterwards until the caller recomputes them.
    pub fn apply_event(&mut self, event: &GameEvent) {
        match event {
            GameEvent::EntitySpawned { data } => self.apply_entity_spawned(data),
            GameEvent::EntityExpired { data } => self.apply_entity_expired(*data),
            GameEvent::UnitState { data } => self.apply_unit_state(data),
            GameEvent::EntityState {
                coordinates,
                updated_entity,
            } => {
                self.apply_entity_expired(*coordinates);
                self.apply_entity_spawned(updated_entity);
            }
            GameEvent::Unit { data } => match data {
                UnitActionPayload::Move { unit_id, direction } => {
                    self.apply_unit_moved(unit_id, *direction)
                }
                // Bomb and detonate echoes carry nothing the entity events
                // do not already deliver.
                UnitActionPayload::Bomb { .. } | UnitActionPayload::Detonate { .. } => {}
            },
        }
    }

    pub(super) fn apply_entity_spawned(&mut self, data: &EntityPayload) {
        let coord = data.coord();
        if !self.in_bounds(coord) {
            warn!(%coord, "dropping entity spawn outside the board");
            return;
        }

        match data.kind {
            EntityKind::Bomb => {
                let Some(owner_name) = data.unit_id.as_deref() else {
                    warn!(%coord, "dropping bomb spawn without an owner");
                    return;
                };
                let Some(owner) = self.unit_by_name(owner_name) else {
                    warn!(unit = owner_name, %coord, "dropping bomb spawn for unknown unit");
                    return;
                };
                // A respawn on an occupied slot replaces the stale bomb.
                if let Some(stale) = self.cell(coord).bomb {
                    self.remove_bomb_bookkeeping(coord, stale.owner);
                }
                let bomb = Bomb {
                    diameter: data.blast_diameter.unwrap_or(3),
                    owner,
                    created: data.created,
                    expires: data
                        .expires
                        .unwrap_or(data.created + DEFAULT_BOMB_FUSE_TICKS),
                };
                self.cell_mut(coord).bomb = Some(bomb);
                self.unit_mut(owner).bombs.push(coord);
                let player = self.unit(owner).player;
                self.players.get_mut(player).bombs.push(coord);
            }
            EntityKind::Fire => {
                self.cell_mut(coord).fire = Some(FireSpan {
                    created: data.created,
                    // The endgame's closing fire comes without an expiry.
                    expires: data.expires.unwrap_or(ENDLESS_FIRE_EXPIRY),
                });
            }
            EntityKind::BlastPowerup => self.cell_mut(coord).powerup = Some(Powerup::Blast),
            EntityKind::FreezePowerup => self.cell_mut(coord).powerup = Some(Powerup::Freeze),
            EntityKind::Wall => self.cell_mut(coord).terrain = Terrain::Wall,
            EntityKind::WoodBox => {
                self.cell_mut(coord).terrain = Terrain::Box {
                    hp: data.hp.unwrap_or(1).max(1) as u32,
                }
            }
            EntityKind::OreBox => {
                self.cell_mut(coord).terrain = Terrain::Box {
                    hp: data.hp.unwrap_or(3).max(1) as u32,
                }
            }
        }
    }

    pub(super) fn apply_entity_expired(&mut self, coord: Coord) {
        if !self.in_bounds(coord) {
            warn!(%coord, "dropping entity expiry outside the board");
            return;
        }
        if let Some(bomb) = self.cell_mut(coord).bomb.take() {
            self.remove_bomb_bookkeeping(coord, bomb.owner);
        }
        let cell = self.cell_mut(coord);
        cell.terrain = Terrain::Open;
        cell.fire = None;
        cell.powerup = None;
        cell.forecast = PerPlayer::default();
    }

    /// Authoritative resync of a unit. The unit's previous cell is vacated
    /// first if it still references the unit.
    pub(super) fn apply_unit_state(&mut self, data: &UnitPayload) {
        let Some(id) = self.unit_by_name(&data.unit_id) else {
            warn!(unit = %data.unit_id, "dropping state for unknown unit");
            return;
        };
        if !self.in_bounds(data.coordinates) {
            warn!(unit = %data.unit_id, coord = %data.coordinates, "dropping unit state outside the board");
            return;
        }

        let old_pos = self.unit(id).pos;
        if self.cell(old_pos).occupant == Some(id) {
            self.cell_mut(old_pos).occupant = None;
        }

        let unit = self.unit_mut(id);
        if unit.player != data.agent_id {
            warn!(unit = %data.unit_id, "unit state names a different player; keeping roster assignment");
        }
        unit.pos = data.coordinates;
        unit.hp = data.hp;
        unit.blast_diameter = data.blast_diameter;
        unit.invulnerable_until = data.invulnerable;
        unit.stunned_until = data.stunned;

        self.cell_mut(data.coordinates).occupant = Some(id);
    }

    /// Optimistic one-cell shift applied between authoritative resyncs.
    fn apply_unit_moved(&mut self, unit_id: &str, direction: Direction) {
        let Some(id) = self.unit_by_name(unit_id) else {
            warn!(unit = unit_id, "dropping move for unknown unit");
            return;
        };
        let pos = self.unit(id).pos;
        let Some(next) = self.neighbor(pos, direction) else {
            warn!(unit = unit_id, %pos, ?direction, "dropping move off the board");
            return;
        };

        if self.cell(pos).occupant == Some(id) {
            self.cell_mut(pos).occupant = None;
        }
        self.unit_mut(id).pos = next;
        self.cell_mut(next).occupant = Some(id);
    }

    pub(super) fn remove_bomb_bookkeeping(&mut self, coord: Coord, owner: UnitId) {
        self.unit_mut(owner).bombs.retain(|&c| c != coord);
        let player = self.unit(owner).player;
        self.players.get_mut(player).bombs.retain(|&c| c != coord);
    }
}
