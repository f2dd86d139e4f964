//! The `Driver` trait: the extension point for game implementers.
//!
//! A driver owns the game rules and nothing else. The room tells it who
//! is seated, forwards the commands it doesn't recognize, and asks it for
//! state to broadcast. Drivers never see clients, sockets, or the hub.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use tablehub_client::Client;

use crate::DriverConfig;

/// A seated player as the driver sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub name: String,
    pub bot: bool,
}

impl Seat {
    pub fn of(client: &dyn Client) -> Self {
        Self {
            name: client.name().to_string(),
            bot: client.is_bot(),
        }
    }
}

/// A command the game rejected. The text is shown to the author.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DriverError(String);

impl DriverError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn reason(&self) -> &str {
        &self.0
    }
}

/// Game rules for one room.
///
/// Seats are indices into the room's membership list in join order, the
/// same numbers clients use as `playerNumber`.
///
/// Every method is called from the hub task. A panic here takes down the
/// command being processed, not the server: the hub isolates each room
/// dispatch and logs the fault.
pub trait Driver: Send + 'static {
    /// Seating rules. Read once when the room is created.
    fn config(&self) -> DriverConfig {
        DriverConfig::default()
    }

    /// Starts the game for the given seats.
    ///
    /// After this returns `Ok`, [`started`](Driver::started) normally
    /// reports `true`. A driver that wants more setup first (a ready
    /// check, say) may leave it `false` and flip it from a later command.
    fn start(&mut self, players: &[Seat]) -> Result<(), DriverError>;

    /// Applies a game command from `seat`.
    fn parse(
        &mut self,
        seat: usize,
        command: &str,
        params: &Value,
    ) -> Result<(), DriverError>;

    fn started(&self) -> bool;

    /// The seat whose turn it is, if any.
    fn current_actor(&self) -> Option<usize>;

    /// `true` once the game has reached a final state. The room is then
    /// destroyed with reason `game-over`.
    fn is_over(&self) -> bool {
        false
    }

    /// State every member sees.
    fn common_state(&self) -> Value;

    /// State only `seat` sees. `Value::Null` means nothing private.
    fn player_state(&self, _seat: usize) -> Value {
        Value::Null
    }

    /// Seats a late joiner. Only called when
    /// [`DriverConfig::late_join`] is set and the game has started.
    fn add_player(&mut self, _player: &Seat) -> Result<(), DriverError> {
        Err(DriverError::new("this game doesn't accept late joiners"))
    }

    /// A member left a started game. Later seats shift down by one.
    fn remove_player(&mut self, _seat: usize) {}
}

// ---------------------------------------------------------------------------
// DriverRegistry
// ---------------------------------------------------------------------------

type Factory = Box<dyn Fn() -> Box<dyn Driver> + Send + Sync>;

/// Drivers selectable by name in `create-room`.
#[derive(Default)]
pub struct DriverRegistry {
    factories: HashMap<String, Factory>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver under `name`, replacing any previous one.
    pub fn register<F, D>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> D + Send + Sync + 'static,
        D: Driver,
    {
        self.factories.insert(
            name.into(),
            Box::new(move || Box::new(factory()) as Box<dyn Driver>),
        );
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F, D>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> D + Send + Sync + 'static,
        D: Driver,
    {
        self.register(name, factory);
        self
    }

    /// Builds a fresh driver instance, or `None` if `name` is unknown.
    pub fn create(&self, name: &str) -> Option<Box<dyn Driver>> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> =
            self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}
