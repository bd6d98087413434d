//! Tactical decision engine for a two-player, tick-based grid arena.
//!
//! The engine keeps an incrementally updated world model fed by server
//! events, forecasts where and when fire will burn (including chained
//! detonations), searches for paths that stay clear of those forecasts, and
//! picks one action per unit by scoring forward-simulated clones of the
//! world. Everything here is synchronous and single-threaded per tick; the
//! only optional parallelism is candidate evaluation inside the planner,
//! where every worker owns a private clone.

pub mod blast;
pub mod hazard;
pub mod planner;
pub mod score;
pub mod search;
pub mod world;
