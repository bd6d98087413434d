use std::fmt;

use contracts::GameStatePayload;
use tracing::warn;

use super::*;

/// Snapshot problems that leave no board to play on. Anything recoverable is
/// logged and skipped instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    EmptyBoard,
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::EmptyBoard => write!(f, "snapshot describes a zero-sized board"),
        }
    }
}

impl std::error::Error for SnapshotError {}

impl Board {
    /// Build the canonical world from the initial full-state snapshot.
    ///
    /// Malformed items (units outside the board, entities referencing unknown
    /// units) are dropped with a warning; the feed must not be able to take
    /// the agent down mid-handshake.
    pub fn from_snapshot(payload: &GameStatePayload) -> Result<Board, SnapshotError> {
        let width = payload.world.width;
        let height = payload.world.height;
        if width == 0 || height == 0 {
            return Err(SnapshotError::EmptyBoard);
        }

        let mut units = Vec::new();
        let mut unit_lookup = BTreeMap::new();
        let mut players: PerPlayer<PlayerState> = PerPlayer::default();

        for (&player, roster) in &payload.agents {
            for name in &roster.unit_ids {
                let id = UnitId(units.len() as u8);
                units.push(Unit {
                    name: name.clone(),
                    id,
                    player,
                    pos: Coord::new(0, 0),
                    hp: 0,
                    blast_diameter: 3,
                    invulnerable_until: 0,
                    stunned_until: 0,
                    bombs: Vec::new(),
                });
                unit_lookup.insert(name.clone(), id);
                players.get_mut(player).units.push(id);
            }
        }

        let mut board = Board {
            tick: payload.tick,
            width,
            height,
            cells: vec![Cell::default(); (width * height) as usize],
            units,
            unit_lookup,
            players,
            perspective: payload.connection.agent_id,
            derived: Derived::default(),
        };

        for state in payload.unit_state.values() {
            board.apply_unit_state(state);
        }
        for unit in &board.units {
            if board.cell(unit.pos).occupant != Some(unit.id) {
                warn!(unit = %unit.name, "snapshot carried no state for this unit");
            }
        }
        for entity in &payload.entities {
            board.apply_entity_spawned(entity);
        }

        board.recompute_derived();
        board.validate();
        Ok(board)
    }
}
