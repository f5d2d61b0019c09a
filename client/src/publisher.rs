//! Local state publisher
//!
//! Builds the state message sent at the start of every publish cycle. Each
//! one is a complete snapshot of the local pilot; nothing is buffered or
//! delta-encoded between cycles.

use crate::game::LocalPilot;
use shared::{Message, StateMessage};

#[derive(Debug, Default)]
pub struct StatePublisher {
    cycles: u64,
}

impl StatePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&mut self, pilot: &LocalPilot) -> Message {
        self.cycles += 1;
        Message::State(StateMessage::from(&pilot.state()))
    }

    /// Snapshots produced so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
