//! Wire contracts shared by the engine, the transport client, and the CLI.
//!
//! The server speaks JSON packets discriminated by a `"type"` field; every
//! packet and event here is a tagged serde enum so the discriminant never has
//! to be matched by hand. Event batches are delivered as raw values and parsed
//! item by item, so a single unrecognized event kind is dropped without
//! poisoning the rest of the batch.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Board edge length assumed when the snapshot omits world dimensions.
pub const DEFAULT_BOARD_SIZE: u32 = 15;

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// One of the two competing players.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlayerId {
    A,
    B,
}

impl PlayerId {
    pub fn opponent(self) -> PlayerId {
        match self {
            PlayerId::A => PlayerId::B,
            PlayerId::B => PlayerId::A,
        }
    }

    pub fn index(self) -> usize {
        match self {
            PlayerId::A => 0,
            PlayerId::B => 1,
        }
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerId::A => write!(f, "a"),
            PlayerId::B => write!(f, "b"),
        }
    }
}

/// A move direction. `Up` increases `y`; the server's origin is bottom-left.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, 1),
            Direction::Down => (0, -1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// A board coordinate; serialized as the wire's `[x, y]` pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Coord {
    pub x: u32,
    pub y: u32,
}

impl Coord {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// The neighboring coordinate in `direction`, if it stays inside a
    /// `width` x `height` board.
    pub fn step(self, direction: Direction, width: u32, height: u32) -> Option<Coord> {
        let (dx, dy) = direction.delta();
        let x = self.x as i32 + dx;
        let y = self.y as i32 + dy;
        if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
            return None;
        }
        Some(Coord::new(x as u32, y as u32))
    }
}

impl From<(u32, u32)> for Coord {
    fn from((x, y): (u32, u32)) -> Self {
        Coord { x, y }
    }
}

impl From<Coord> for (u32, u32) {
    fn from(coord: Coord) -> Self {
        (coord.x, coord.y)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Entities and unit state
// ---------------------------------------------------------------------------

/// Entity discriminants as they appear on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EntityKind {
    #[serde(rename = "b")]
    Bomb,
    #[serde(rename = "x")]
    Fire,
    #[serde(rename = "bp")]
    BlastPowerup,
    #[serde(rename = "fp")]
    FreezePowerup,
    #[serde(rename = "m")]
    Wall,
    #[serde(rename = "w")]
    WoodBox,
    #[serde(rename = "o")]
    OreBox,
}

/// A spawned entity. Optional fields are present only for the kinds that
/// carry them (`hp` for boxes, `blast_diameter`/`unit_id` for bombs, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityPayload {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub x: u32,
    pub y: u32,
    #[serde(default)]
    pub created: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blast_diameter: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<PlayerId>,
}

impl EntityPayload {
    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

/// Authoritative per-unit state, sent in the snapshot and as resync events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitPayload {
    pub unit_id: String,
    pub agent_id: PlayerId,
    pub coordinates: Coord,
    pub hp: i32,
    pub blast_diameter: u32,
    #[serde(default)]
    pub invulnerable: u64,
    #[serde(default)]
    pub stunned: u64,
}

// ---------------------------------------------------------------------------
// Inbound messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRoster {
    pub agent_id: PlayerId,
    pub unit_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldSize {
    pub width: u32,
    pub height: u32,
}

impl Default for WorldSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_BOARD_SIZE,
            height: DEFAULT_BOARD_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionInfo {
    pub agent_id: PlayerId,
}

/// The full-state snapshot used to initialize the world model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameStatePayload {
    #[serde(default)]
    pub world: WorldSize,
    pub agents: BTreeMap<PlayerId, AgentRoster>,
    pub unit_state: BTreeMap<String, UnitPayload>,
    pub entities: Vec<EntityPayload>,
    #[serde(default)]
    pub tick: u64,
    pub connection: ConnectionInfo,
}

/// A per-tick event batch. Items stay raw so unknown kinds can be dropped
/// one by one; see [`GameEvent::parse`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickPayload {
    pub tick: u64,
    #[serde(default)]
    pub events: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndgamePayload {
    #[serde(default)]
    pub winning_agent_id: Option<PlayerId>,
}

/// Every message the server can push, discriminated by `"type"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Info,
    GameState { payload: GameStatePayload },
    Tick { payload: TickPayload },
    EndgameState { payload: EndgamePayload },
}

impl InboundMessage {
    /// Parse a raw frame. Unknown message kinds surface as errors so the
    /// transport can log and skip them.
    pub fn parse(raw: &str) -> Result<InboundMessage, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

// ---------------------------------------------------------------------------
// Tick events
// ---------------------------------------------------------------------------

/// An action echo inside a `unit` event. Only moves mutate the local model;
/// bombs and detonations arrive separately as entity events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitActionPayload {
    Move {
        unit_id: String,
        #[serde(rename = "move")]
        direction: Direction,
    },
    Bomb {
        unit_id: String,
    },
    Detonate {
        unit_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coordinates: Option<Coord>,
    },
}

/// One item of a tick's event batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    EntitySpawned {
        data: EntityPayload,
    },
    EntityExpired {
        data: Coord,
    },
    UnitState {
        data: UnitPayload,
    },
    EntityState {
        coordinates: Coord,
        updated_entity: EntityPayload,
    },
    Unit {
        data: UnitActionPayload,
    },
}

impl GameEvent {
    /// Parse a single raw batch item; the caller drops failures.
    pub fn parse(value: &Value) -> Result<GameEvent, serde_json::Error> {
        GameEvent::deserialize(value)
    }
}

// ---------------------------------------------------------------------------
// Outbound commands
// ---------------------------------------------------------------------------

/// A command packet for the server. Constructing one has no engine-side
/// effect; the world model changes only when the matching event comes back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundCommand {
    Move {
        #[serde(rename = "move")]
        direction: Direction,
        unit_id: String,
    },
    Bomb {
        unit_id: String,
    },
    Detonate {
        coordinates: Coord,
        unit_id: String,
    },
}

impl OutboundCommand {
    pub fn move_unit(direction: Direction, unit_id: impl Into<String>) -> Self {
        OutboundCommand::Move {
            direction,
            unit_id: unit_id.into(),
        }
    }

    pub fn place_bomb(unit_id: impl Into<String>) -> Self {
        OutboundCommand::Bomb {
            unit_id: unit_id.into(),
        }
    }

    pub fn detonate(coordinates: Coord, unit_id: impl Into<String>) -> Self {
        OutboundCommand::Detonate {
            coordinates,
            unit_id: unit_id.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Agent configuration
// ---------------------------------------------------------------------------

/// Weights for the board evaluation's independent sub-scores. Tunable data,
/// not structure; the defaults are the tournament values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalWeights {
    pub health: f64,
    pub imminent_danger: f64,
    pub opponent_stun: f64,
    pub cell_safety: f64,
    pub freeze_powerup: f64,
    pub armed_bomb: f64,
    pub blast_diameter: f64,
    pub blast_powerup: f64,
    pub mining: f64,
}

impl Default for EvalWeights {
    fn default() -> Self {
        Self {
            health: 1_000_000.0,
            imminent_danger: 10_000.0,
            opponent_stun: 1_000.0,
            cell_safety: 100.0,
            freeze_powerup: 300.0,
            armed_bomb: 300.0,
            blast_diameter: 100.0,
            blast_powerup: 10.0,
            mining: 1.0,
        }
    }
}

/// Process-level configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub connection_string: String,
    pub reconnect_attempts: u32,
    /// Soft wall-clock budget for one tick's planning, in milliseconds.
    pub planner_budget_ms: u64,
    /// Worker threads for candidate evaluation; `0` or `1` disables the pool.
    pub planner_worker_threads: usize,
    #[serde(default)]
    pub weights: EvalWeights,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            connection_string:
                "ws://127.0.0.1:3000/?role=agent&agentId=agentId&name=defaultName".to_string(),
            reconnect_attempts: 10,
            planner_budget_ms: 40,
            planner_worker_threads: 1,
            weights: EvalWeights::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_commands_match_wire_shape() {
        let move_cmd = OutboundCommand::move_unit(Direction::Up, "c");
        assert_eq!(
            serde_json::to_value(&move_cmd).unwrap(),
            json!({"type": "move", "move": "up", "unit_id": "c"})
        );

        let bomb_cmd = OutboundCommand::place_bomb("d");
        assert_eq!(
            serde_json::to_value(&bomb_cmd).unwrap(),
            json!({"type": "bomb", "unit_id": "d"})
        );

        let detonate_cmd = OutboundCommand::detonate(Coord::new(3, 7), "e");
        assert_eq!(
            serde_json::to_value(&detonate_cmd).unwrap(),
            json!({"type": "detonate", "coordinates": [3, 7], "unit_id": "e"})
        );
    }

    #[test]
    fn tick_event_items_parse_individually() {
        let spawned = json!({
            "type": "entity_spawned",
            "data": {
                "type": "b", "x": 4, "y": 9, "created": 12, "expires": 52,
                "blast_diameter": 3, "unit_id": "c", "agent_id": "a"
            }
        });
        match GameEvent::parse(&spawned).unwrap() {
            GameEvent::EntitySpawned { data } => {
                assert_eq!(data.kind, EntityKind::Bomb);
                assert_eq!(data.coord(), Coord::new(4, 9));
                assert_eq!(data.expires, Some(52));
                assert_eq!(data.unit_id.as_deref(), Some("c"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let expired = json!({"type": "entity_expired", "data": [4, 9]});
        assert_eq!(
            GameEvent::parse(&expired).unwrap(),
            GameEvent::EntityExpired {
                data: Coord::new(4, 9)
            }
        );

        let unknown = json!({"type": "entity_phased", "data": [0, 0]});
        assert!(GameEvent::parse(&unknown).is_err());
    }

    #[test]
    fn unit_move_echo_round_trips() {
        let raw = json!({
            "type": "unit",
            "data": {"type": "move", "unit_id": "g", "move": "left"}
        });
        let event = GameEvent::parse(&raw).unwrap();
        assert_eq!(
            event,
            GameEvent::Unit {
                data: UnitActionPayload::Move {
                    unit_id: "g".to_string(),
                    direction: Direction::Left,
                }
            }
        );
        assert_eq!(serde_json::to_value(&event).unwrap(), raw);
    }

    #[test]
    fn snapshot_message_parses() {
        let raw = json!({
            "type": "game_state",
            "payload": {
                "world": {"width": 15, "height": 15},
                "agents": {
                    "a": {"agent_id": "a", "unit_ids": ["c", "e", "g"]},
                    "b": {"agent_id": "b", "unit_ids": ["d", "f", "h"]}
                },
                "unit_state": {
                    "c": {
                        "unit_id": "c", "agent_id": "a", "coordinates": [0, 0],
                        "hp": 3, "blast_diameter": 3, "invulnerable": 0, "stunned": 0
                    }
                },
                "entities": [
                    {"type": "m", "x": 7, "y": 7, "created": 0}
                ],
                "tick": 0,
                "connection": {"agent_id": "a"}
            }
        })
        .to_string();

        match InboundMessage::parse(&raw).unwrap() {
            InboundMessage::GameState { payload } => {
                assert_eq!(payload.connection.agent_id, PlayerId::A);
                assert_eq!(payload.agents[&PlayerId::A].unit_ids.len(), 3);
                assert_eq!(payload.entities[0].kind, EntityKind::Wall);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn config_round_trips_with_default_weights() {
        let config = AgentConfig::default();
        let encoded = serde_json::to_string(&config).unwrap();
        let decoded: AgentConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(config, decoded);
        assert_eq!(decoded.weights.health, 1_000_000.0);
    }

    #[test]
    fn direction_deltas_cover_the_compass() {
        assert_eq!(Direction::Up.delta(), (0, 1));
        assert_eq!(Direction::Down.delta(), (0, -1));
        assert_eq!(Direction::Left.delta(), (-1, 0));
        assert_eq!(Direction::Right.delta(), (1, 0));
        let origin = Coord::new(0, 0);
        assert_eq!(origin.step(Direction::Left, 15, 15), None);
        assert_eq!(origin.step(Direction::Down, 15, 15), None);
        assert_eq!(origin.step(Direction::Up, 15, 15), Some(Coord::new(0, 1)));
    }
}
