//! Blocking WebSocket transport for the game server.
//!
//! The engine's computation is synchronous; the socket read is the only
//! place the process waits. Frames that fail to parse are logged and
//! skipped, so an unknown message kind degrades to a no-op instead of
//! tearing the connection down.

use std::fmt;
use std::net::TcpStream;
use std::time::Duration;

use contracts::{InboundMessage, OutboundCommand};
use tracing::{debug, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

const RECONNECT_BACKOFF_BASE_SECS: f64 = 1.0;
const RECONNECT_BACKOFF_MAX_SECS: f64 = 30.0;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum NetError {
    /// The underlying socket failed or refused to connect.
    Socket(tungstenite::Error),
    /// A command could not be encoded for the wire.
    Encode(serde_json::Error),
    /// The server closed the connection.
    Closed,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Socket(err) => write!(f, "websocket error: {err}"),
            NetError::Encode(err) => write!(f, "failed to encode command: {err}"),
            NetError::Closed => write!(f, "connection closed by the server"),
        }
    }
}

impl std::error::Error for NetError {}

impl From<tungstenite::Error> for NetError {
    fn from(err: tungstenite::Error) -> Self {
        NetError::Socket(err)
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// An ordered stream of typed server messages plus the outbound command
/// channel. Sending a command changes nothing locally; the world model only
/// moves when the matching event comes back.
pub struct Connection {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl Connection {
    pub fn connect(url: &str) -> Result<Self, NetError> {
        let (socket, response) = tungstenite::connect(url)?;
        debug!(status = %response.status(), "connected to game server");
        Ok(Self { socket })
    }

    /// Block until the next well-formed message arrives. Unparseable frames
    /// are dropped with a warning; binary and control frames are ignored.
    pub fn next_message(&mut self) -> Result<InboundMessage, NetError> {
        loop {
            match self.socket.read()? {
                Message::Text(raw) => match InboundMessage::parse(&raw) {
                    Ok(message) => return Ok(message),
                    Err(err) => warn!(%err, "dropping unrecognized message"),
                },
                Message::Close(_) => return Err(NetError::Closed),
                _ => {}
            }
        }
    }

    pub fn send(&mut self, command: &OutboundCommand) -> Result<(), NetError> {
        let raw = serde_json::to_string(command).map_err(NetError::Encode)?;
        self.socket.send(Message::Text(raw))?;
        Ok(())
    }
}

/// Exponential backoff for reconnect attempts, capped after a few doublings.
pub fn reconnect_backoff(attempt: u32) -> Duration {
    let exponential = 2_f64.powi(attempt.saturating_sub(1).min(4) as i32);
    Duration::from_secs_f64((RECONNECT_BACKOFF_BASE_SECS * exponential).min(RECONNECT_BACKOFF_MAX_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(reconnect_backoff(1), Duration::from_secs_f64(1.0));
        assert_eq!(reconnect_backoff(2), Duration::from_secs_f64(2.0));
        assert_eq!(reconnect_backoff(3), Duration::from_secs_f64(4.0));
        assert_eq!(reconnect_backoff(5), Duration::from_secs_f64(16.0));
        // Further attempts stay at the 2^4 plateau.
        assert_eq!(reconnect_backoff(12), Duration::from_secs_f64(16.0));
    }
}
