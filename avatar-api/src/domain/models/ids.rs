use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated user identifier.
///
/// Wraps i32 to match the database SERIAL type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, PartialOrd, Ord,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(i32);

impl UserId {
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for UserId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl From<UserId> for i32 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// An avatar record identifier (database SERIAL).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, PartialOrd, Ord,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct AvatarId(i32);

impl AvatarId {
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Extract the raw i32 value (consistent with `UserId::as_i32()`).
    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for AvatarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for AvatarId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl From<AvatarId> for i32 {
    fn from(id: AvatarId) -> Self {
        id.0
    }
}
