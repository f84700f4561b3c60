/*!
Connection state machine with edge-triggered notifications.

Each concrete client drives its own transitions; this module only decides
which transitions are edges worth announcing. Entering `Connected` from any
other state announces [`ConnectionEvent::Established`], leaving `Connected`
announces [`ConnectionEvent::Lost`]. Staying in a state announces nothing.
*/

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable link state of a telescope client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Link dropped while connected; waiting before the next attempt
    Lost,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Lost => "lost",
        };
        f.write_str(label)
    }
}

/// Notification fired on connectivity edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionEvent {
    Established,
    Lost,
}

/// Link state plus the subscribers interested in its edges
#[derive(Debug, Default)]
pub struct LinkStateMachine {
    state: LinkState,
    observers: Vec<Sender<ConnectionEvent>>,
    established_count: u64,
    lost_count: u64,
}

impl LinkStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Register an observer; every later edge is delivered to the returned receiver
    pub fn subscribe(&mut self) -> Receiver<ConnectionEvent> {
        let (tx, rx) = unbounded();
        self.observers.push(tx);
        rx
    }

    /// Move to `next`, returning the event fired if this was an edge
    pub fn transition(&mut self, next: LinkState) -> Option<ConnectionEvent> {
        let was_connected = self.is_connected();
        self.state = next;

        let event = match (was_connected, self.is_connected()) {
            (false, true) => Some(ConnectionEvent::Established),
            (true, false) => Some(ConnectionEvent::Lost),
            _ => None,
        };

        if let Some(event) = event {
            match event {
                ConnectionEvent::Established => self.established_count += 1,
                ConnectionEvent::Lost => self.lost_count += 1,
            }
            // Receivers that were dropped are pruned here
            self.observers.retain(|tx| tx.send(event).is_ok());
        }

        event
    }

    /// Get statistics: (established edges, lost edges)
    pub fn stats(&self) -> (u64, u64) {
        (self.established_count, self.lost_count)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}
