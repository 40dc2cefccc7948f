//! Session identifiers. The original source represents a `SessionID` as a
//! fixed-size POD compared via `memcmp`; §1 places id *generation* out of
//! core scope, delegating it to `uuid::Uuid::new_v4()` (already pinned in the
//! ambient stack) while the core only ever consumes the resulting opaque
//! bytes.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; 16]);

impl SessionId {
    pub fn new_random() -> Self {
        SessionId(*uuid::Uuid::new_v4().as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        SessionId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", uuid::Uuid::from_bytes(self.0))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_bytes(self.0))
    }
}
