//! # Link State Machine
//!
//! ```text
//!                AttemptStarted            LinkUp
//! Disconnected ----------------> Connecting -------> Connected
//!      ^   |                                            |
//!      |   +-------------------- LinkUp ---------------->|
//!      +------------------------ LinkDown --------------+
//! ```
//!
//! `Connecting` exists exactly while a connect loop is alive. Because the
//! loop is the only thing that leaves `Connecting` (by seeing `LinkUp`), a
//! second `AttemptStarted` is rejected and a `LinkDown` during an attempt
//! leaves the state where it is.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connect loop wants to begin.
    AttemptStarted,
    /// The adapter reported `connected = true`.
    LinkUp,
    /// The adapter reported `connected = false`.
    LinkDown,
}

impl ConnectionState {
    /// Looks up `event` in the transition table. `None` means the event is
    /// not accepted in this state and nothing changes.
    pub fn on(self, event: LinkEvent) -> Option<ConnectionState> {
        use ConnectionState::*;
        use LinkEvent::*;

        match (self, event) {
            (Disconnected, AttemptStarted) => Some(Connecting),
            (Connecting | Connected, AttemptStarted) => None,

            (_, LinkUp) => Some(Connected),

            (Connected, LinkDown) => Some(Disconnected),
            (Disconnected, LinkDown) => Some(Disconnected),
            (Connecting, LinkDown) => Some(Connecting),
        }
    }

    /// True while a connect loop owns the link.
    pub fn is_attempting(self) -> bool {
        self == ConnectionState::Connecting
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}
