pub mod client;
pub mod hub;
pub mod supervisor;

use crate::protocol::ServerMessage;

/// Sink for realtime events. Publishing never fails and never blocks.
pub trait FanOut: Send + Sync {
    fn broadcast(&self, msg: ServerMessage);
}
