//! Greedy per-unit action selection on top of the forward model.
//!
//! Units are planned in roster order; each unit's candidate actions are
//! scored against the actions already locked in for earlier units, and the
//! best one is committed before the next unit plans. That sequential
//! dependency is real data flow and is never parallelized; only the
//! independent candidate evaluations inside one unit may fan out across a
//! worker pool, each against its own clone, merged by max score.

use std::time::{Duration, Instant};

use contracts::{AgentConfig, Coord, Direction, EvalWeights, OutboundCommand};
use rayon::prelude::*;
use tracing::warn;

use crate::score;
use crate::search;
use crate::world::{Board, UnitAction, UnitId};

/// The planner's verdict for one unit. `action: None` is an explicit stay;
/// stays send no command.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    pub unit: UnitId,
    pub action: Option<UnitAction>,
    pub command: Option<OutboundCommand>,
}

pub struct Planner {
    weights: EvalWeights,
    budget: Duration,
    pool: Option<rayon::ThreadPool>,
}

impl Planner {
    pub fn new(config: &AgentConfig) -> Self {
        let pool = if config.planner_worker_threads > 1 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(config.planner_worker_threads)
                .build()
                .ok()
        } else {
            None
        };
        Self {
            weights: config.weights.clone(),
            budget: Duration::from_millis(config.planner_budget_ms),
            pool,
        }
    }

    /// Pick one action per live, unstunned unit of the perspective player.
    ///
    /// The wall-clock budget is soft: once it runs out, remaining units skip
    /// forward simulation and fall back to the safety frontier, so a slow
    /// tick degrades plan quality instead of blocking the loop.
    pub fn plan_tick(&self, board: &Board) -> Vec<PlannedAction> {
        let deadline = Instant::now() + self.budget;
        let me = board.perspective;
        let mut locked: Vec<UnitAction> = Vec::new();
        // The stay baseline for the first unit is the canonical board; after
        // that it is whatever the previous unit's committed choice scored.
        let mut current_score = score::evaluate(board, me, &self.weights);
        let mut planned = Vec::new();
        let mut budget_logged = false;

        let roster = board.player(me).units.clone();
        for unit_id in roster {
            let unit = board.unit(unit_id);
            if !unit.is_alive() || unit.is_stunned_at(board.tick) {
                continue;
            }

            if Instant::now() >= deadline {
                if !budget_logged {
                    warn!(
                        tick = board.tick,
                        "planning budget exhausted; remaining units fall back to the safety frontier"
                    );
                    budget_logged = true;
                }
                let action = self.frontier_fallback(board, unit_id);
                if let Some(action) = action {
                    locked.push(action);
                }
                let command = action.and_then(|action| command_for(board, action));
                planned.push(PlannedAction {
                    unit: unit_id,
                    action,
                    command,
                });
                continue;
            }

            let candidates = candidate_actions(board, unit_id);
            let scored = self.score_candidates(board, &locked, candidates, deadline);
            let mut best: (Option<UnitAction>, f64) = (None, current_score);
            for (action, value) in scored {
                if value > best.1 {
                    best = (Some(action), value);
                }
            }

            if let Some(action) = best.0 {
                locked.push(action);
            }
            current_score = best.1;
            let command = best.0.and_then(|action| command_for(board, action));
            planned.push(PlannedAction {
                unit: unit_id,
                action: best.0,
                command,
            });
        }

        planned
    }

    fn score_candidates(
        &self,
        board: &Board,
        locked: &[UnitAction],
        candidates: Vec<UnitAction>,
        deadline: Instant,
    ) -> Vec<(UnitAction, f64)> {
        let me = board.perspective;
        let evaluate_one = |action: UnitAction| {
            let mut actions = locked.to_vec();
            actions.push(action);
            let mut clone = board.clone();
            clone.apply_actions(&actions);
            (action, score::evaluate(&clone, me, &self.weights))
        };

        match &self.pool {
            Some(pool) if candidates.len() > 1 => {
                pool.install(|| candidates.into_par_iter().map(evaluate_one).collect())
            }
            _ => {
                let mut scored = Vec::with_capacity(candidates.len());
                for action in candidates {
                    // Under pressure, keep whatever is already scored rather
                    // than blowing through the tick.
                    if !scored.is_empty() && Instant::now() >= deadline {
                        break;
                    }
                    scored.push(evaluate_one(action));
                }
                scored
            }
        }
    }

    /// Budget-starved planning: stay if the current cell keeps a comfortable
    /// margin, otherwise step toward the deepest reachable safety-frontier
    /// cell.
    fn frontier_fallback(&self, board: &Board, unit_id: UnitId) -> Option<UnitAction> {
        let unit = board.unit(unit_id);
        if search::safe_turns(board, unit.pos, unit.player, unit.invulnerable_until) >= 4 {
            return None;
        }

        let frontier = search::safety_frontier(board, unit_id);
        let target = frontier
            .horizons
            .iter()
            .rev()
            .find_map(|cells| cells.first().copied())?;
        if target == unit.pos {
            return None;
        }

        let mut cursor = target;
        while let Some(prev) = frontier.field.predecessor(cursor) {
            if prev == unit.pos {
                return Some(UnitAction::Move {
                    unit: unit_id,
                    to: cursor,
                });
            }
            cursor = prev;
        }
        None
    }
}

/// Candidate actions for one unit: every neighbor move the server could
/// accept, detonating each owned bomb, and placing a new one. The forward
/// model is the arbiter of which of these actually do anything.
fn candidate_actions(board: &Board, unit_id: UnitId) -> Vec<UnitAction> {
    let unit = board.unit(unit_id);
    let mut candidates: Vec<UnitAction> = move_neighbors(board, unit.pos)
        .map(|to| UnitAction::Move { unit: unit_id, to })
        .collect();
    for &at in &unit.bombs {
        candidates.push(UnitAction::Detonate { unit: unit_id, at });
    }
    candidates.push(UnitAction::PlaceBomb { unit: unit_id });
    candidates
}

/// Cells a move command might land on: anything that is not a wall and not
/// held by a dead or stunned unit. Boxes and bombs stay in the candidate set
/// on purpose; the simulation prices the rejection.
fn move_neighbors<'a>(board: &'a Board, from: Coord) -> impl Iterator<Item = Coord> + 'a {
    board.neighbors(from).filter(move |&next| {
        let cell = board.cell(next);
        if cell.terrain.is_wall() {
            return false;
        }
        match cell.occupant {
            Some(id) => {
                let unit = board.unit(id);
                unit.is_alive() && !unit.is_stunned_at(board.tick + 1)
            }
            None => true,
        }
    })
}

fn direction_between(from: Coord, to: Coord) -> Option<Direction> {
    if to.x < from.x {
        Some(Direction::Left)
    } else if to.x > from.x {
        Some(Direction::Right)
    } else if to.y < from.y {
        Some(Direction::Down)
    } else if to.y > from.y {
        Some(Direction::Up)
    } else {
        None
    }
}

fn command_for(board: &Board, action: UnitAction) -> Option<OutboundCommand> {
    match action {
        UnitAction::Move { unit, to } => {
            let from = board.unit(unit).pos;
            let direction = direction_between(from, to)?;
            Some(OutboundCommand::move_unit(
                direction,
                board.unit(unit).name.clone(),
            ))
        }
        UnitAction::PlaceBomb { unit } => {
            Some(OutboundCommand::place_bomb(board.unit(unit).name.clone()))
        }
        UnitAction::Detonate { unit, at } => Some(OutboundCommand::detonate(
            at,
            board.unit(unit).name.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::tests::{board_from_entities, entity, unit_entry};
    use contracts::EntityKind;

    fn planner_with_budget(ms: u64) -> Planner {
        let config = AgentConfig {
            planner_budget_ms: ms,
            planner_worker_threads: 1,
            ..AgentConfig::default()
        };
        Planner::new(&config)
    }

    #[test]
    fn quiet_center_unit_stays_put() {
        let board = board_from_entities(
            7,
            vec![unit_entry("c", "a", (3, 3)), unit_entry("d", "b", (0, 0))],
            vec![],
        );
        let planner = planner_with_budget(10_000);
        let planned = planner.plan_tick(&board);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].action, None);
        assert!(planned[0].command.is_none());
    }

    #[test]
    fn unit_steps_out_of_an_opening_fire_window() {
        let mut board = board_from_entities(
            7,
            vec![unit_entry("c", "a", (3, 3)), unit_entry("d", "b", (0, 6))],
            vec![entity(EntityKind::Bomb, (3, 2), |e| {
                e.created = 0;
                e.expires = Some(40);
                e.blast_diameter = Some(3);
                e.unit_id = Some("d".to_string());
            })],
        );
        // Advance to tick 2: the forecast window [5, 45) is now close enough
        // that staying on (3,3) bleeds the imminent-danger score.
        board.apply_tick_events(2, &[]);

        let planner = planner_with_budget(10_000);
        let planned = planner.plan_tick(&board);
        assert_eq!(planned.len(), 1);
        match planned[0].action {
            Some(UnitAction::Move { to, .. }) => {
                // Anywhere off the bomb's cross is fine.
                assert!(to != Coord::new(3, 2) && to != Coord::new(3, 3));
            }
            other => panic!("expected an escape move, got {other:?}"),
        }
        assert!(planned[0].command.is_some());
    }

    #[test]
    fn exhausted_budget_still_yields_an_answer_per_unit() {
        let mut board = board_from_entities(
            7,
            vec![unit_entry("c", "a", (3, 3)), unit_entry("d", "b", (0, 6))],
            vec![entity(EntityKind::Bomb, (3, 2), |e| {
                e.created = 0;
                e.expires = Some(40);
                e.blast_diameter = Some(3);
                e.unit_id = Some("d".to_string());
            })],
        );
        board.apply_tick_events(2, &[]);

        let planner = planner_with_budget(0);
        let planned = planner.plan_tick(&board);
        assert_eq!(planned.len(), 1);
        // The frontier fallback moves the threatened unit somewhere; it never
        // blocks and never panics.
        assert!(matches!(
            planned[0].action,
            Some(UnitAction::Move { .. }) | None
        ));
    }

    #[test]
    fn stunned_and_dead_units_are_never_planned() {
        let mut board = board_from_entities(
            7,
            vec![
                unit_entry("c", "a", (1, 1)),
                unit_entry("e", "a", (5, 1)),
                unit_entry("d", "b", (0, 6)),
            ],
            vec![],
        );
        let stunned = board.unit_by_name("c").unwrap();
        board.unit_mut(stunned).stunned_until = 10;
        let dead = board.unit_by_name("e").unwrap();
        board.unit_mut(dead).hp = 0;
        board.recompute_derived();

        let planner = planner_with_budget(10_000);
        let planned = planner.plan_tick(&board);
        assert!(planned.is_empty());
    }

    #[test]
    fn direction_mapping_matches_the_wire_orientation() {
        assert_eq!(
            direction_between(Coord::new(2, 2), Coord::new(2, 3)),
            Some(Direction::Up)
        );
        assert_eq!(
            direction_between(Coord::new(2, 2), Coord::new(2, 1)),
            Some(Direction::Down)
        );
        assert_eq!(
            direction_between(Coord::new(2, 2), Coord::new(1, 2)),
            Some(Direction::Left)
        );
        assert_eq!(
            direction_between(Coord::new(2, 2), Coord::new(2, 2)),
            None
        );
    }
}
