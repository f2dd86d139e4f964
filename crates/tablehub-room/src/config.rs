//! Driver seating rules and the room lifecycle.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DriverConfig
// ---------------------------------------------------------------------------

/// Seating rules a game declares for its rooms.
///
/// Read once when the room is created; see `Driver::config()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Members required before `start-game` is accepted.
    pub min_players: usize,

    /// Seats in the room. `join-room` past this is `room-full`.
    pub max_players: usize,

    /// Start the game as soon as `min_players` have joined.
    pub auto_start: bool,

    /// Accept joins after the game has started. The driver is told via
    /// `Driver::add_player`.
    pub late_join: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 8,
            auto_start: false,
            late_join: false,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
/// Created ──→ Started ──→ Destroyed
///    └───────────────────────↑
/// ```
///
/// - **Created**: accepting joins; the idle timer is running.
/// - **Started**: the driver has started the game. The timer is gone and
///   the room never goes back.
/// - **Destroyed**: members have been notified and detached. The hub
///   drops the room right after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Created,
    Started,
    Destroyed,
}

impl RoomState {
    /// Returns `true` if the room is accepting new players regardless of
    /// the driver's late-join rule.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Created)
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }

    /// Returns `true` if transitioning to `target` is valid.
    ///
    /// `started` is monotonic: nothing leads back to `Created`, and
    /// `Destroyed` is terminal.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Started)
                | (Self::Created, Self::Destroyed)
                | (Self::Started, Self::Destroyed)
        )
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Started => write!(f, "Started"),
            Self::Destroyed => write!(f, "Destroyed"),
        }
    }
}
