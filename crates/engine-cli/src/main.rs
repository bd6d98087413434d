//! Process bootstrap: parse arguments, connect with retry, and drive the
//! per-tick pipeline (apply events, plan, send commands).

use std::env;
use std::thread;

use contracts::{AgentConfig, InboundMessage};
use engine_core::planner::Planner;
use engine_core::world::Board;
use engine_net::{reconnect_backoff, Connection, NetError};
use tracing::{error, info, warn};

fn print_usage() {
    println!("engine-cli <command>");
    println!("commands:");
    println!("  run [url]");
    println!("    connect to the game server and play a match;");
    println!("    url defaults to $GAME_CONNECTION_STRING, then to the local");
    println!("    practice server");
}

fn connection_string(arg: Option<&String>) -> String {
    arg.cloned()
        .or_else(|| {
            env::var("GAME_CONNECTION_STRING")
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
        .unwrap_or_else(|| AgentConfig::default().connection_string)
}

/// One connection's lifetime: initialize the world from the snapshot, then
/// plan and answer every tick until the match ends.
fn play_match(config: &AgentConfig) -> Result<(), NetError> {
    let mut connection = Connection::connect(&config.connection_string)?;
    let planner = Planner::new(config);
    let mut board: Option<Board> = None;

    loop {
        match connection.next_message()? {
            InboundMessage::Info => {}
            InboundMessage::GameState { payload } => match Board::from_snapshot(&payload) {
                Ok(fresh) => {
                    info!(tick = fresh.tick, "world initialized from snapshot");
                    board = Some(fresh);
                }
                Err(err) => error!(%err, "unusable snapshot"),
            },
            InboundMessage::Tick { payload } => {
                let Some(board) = board.as_mut() else {
                    warn!("tick received before any snapshot; ignoring");
                    continue;
                };
                board.apply_tick_events(payload.tick, &payload.events);
                for planned in planner.plan_tick(board) {
                    if let Some(command) = planned.command {
                        connection.send(&command)?;
                    }
                }
            }
            InboundMessage::EndgameState { payload } => {
                match payload.winning_agent_id {
                    Some(winner) => info!(%winner, "match over"),
                    None => info!("match over with no winner"),
                }
                return Ok(());
            }
        }
    }
}

fn run(config: AgentConfig) {
    let mut attempt = 0;
    loop {
        match play_match(&config) {
            Ok(()) => return,
            Err(err) => {
                attempt += 1;
                if attempt > config.reconnect_attempts {
                    error!(%err, attempt, "giving up on the server");
                    return;
                }
                let delay = reconnect_backoff(attempt);
                warn!(
                    %err,
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    "connection lost; retrying"
                );
                thread::sleep(delay);
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        None | Some("run") => {
            let config = AgentConfig {
                connection_string: connection_string(args.get(2)),
                ..AgentConfig::default()
            };
            run(config);
        }
        Some("help") | Some("--help") | Some("-h") => print_usage(),
        Some(other) => {
            eprintln!("unknown command: {other}");
            print_usage();
            std::process::exit(2);
        }
    }
}
