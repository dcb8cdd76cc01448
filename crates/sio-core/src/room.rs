use std::collections::HashSet;
use std::time::Duration;

/// A named group of sockets, unique within its namespace. Every socket is implicitly a
/// member of a room named after its own socket id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Room(pub String);

impl Room {
    pub fn new(name: impl Into<String>) -> Self {
        Room(name.into())
    }
}

impl From<&str> for Room {
    fn from(s: &str) -> Self {
        Room(s.to_owned())
    }
}

impl From<String> for Room {
    fn from(s: String) -> Self {
        Room(s)
    }
}

impl std::fmt::Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fan-out modifiers carried by a `BroadcastOptions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastFlags {
    pub volatile: bool,
    pub local: bool,
    pub compress: bool,
    pub broadcast: bool,
    pub binary: bool,
    pub timeout: Option<Duration>,
    pub expect_single_response: bool,
}

/// The resolved selector a fan-out emission carries to the adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastOptions {
    pub rooms: HashSet<Room>,
    pub except: HashSet<Room>,
    pub flags: BroadcastFlags,
}

impl BroadcastOptions {
    pub fn new() -> Self {
        Self::default()
    }
}
