//! Identifier newtypes. All are backed by `uuid::Uuid::new_v4`, matching the reference
//! server's `session_id`/`device_id` generation in its mock handshake handler — uniqueness,
//! not shortness, is the only invariant spec.md asks for.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

uuid_id!(SocketId);
uuid_id!(Sid);
uuid_id!(PrivateSessionId);
uuid_id!(ServerId);

/// Opaque, lexicographically-ordered token for persisted-packet replay ordering.
/// Strictly increasing within one server boot: a fixed-width boot id followed by a
/// zero-padded monotonic counter compares correctly under plain string `Ord`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Offset(pub String);

pub struct OffsetGenerator {
    boot_id: String,
    counter: AtomicU64,
}

impl OffsetGenerator {
    pub fn new() -> Self {
        OffsetGenerator {
            boot_id: uuid::Uuid::new_v4().simple().to_string(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> Offset {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Offset(format!("{}-{:020}", self.boot_id, n))
    }
}

impl Default for OffsetGenerator {
    fn default() -> Self {
        Self::new()
    }
}
