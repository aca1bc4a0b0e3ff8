//! Caller identity as seen by the job store.
//!
//! Authentication happens upstream; the store only consumes an already
//! resolved actor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity on whose behalf an operation executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Actor {
    /// Scoped end user; may only create, view and cancel its own jobs.
    User { id: UserId },
    /// Internal/administrative caller (the worker subsystem); unrestricted.
    Internal,
}

impl Actor {
    pub fn user(id: i64) -> Self {
        Actor::User { id: UserId(id) }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Actor::User { id } => Some(*id),
            Actor::Internal => None,
        }
    }

    /// Whether this actor may see a job created by `initiator`.
    pub fn can_access(&self, initiator: UserId) -> bool {
        match self {
            Actor::Internal => true,
            Actor::User { id } => *id == initiator,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::User { id } => write!(f, "user:{}", id),
            Actor::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_actor_sees_everything() {
        assert!(Actor::Internal.can_access(UserId(1)));
        assert!(Actor::Internal.can_access(UserId(42)));
        assert_eq!(Actor::Internal.user_id(), None);
    }

    #[test]
    fn test_user_actor_sees_only_own_jobs() {
        let alice = Actor::user(1);
        assert!(alice.can_access(UserId(1)));
        assert!(!alice.can_access(UserId(2)));
        assert_eq!(alice.user_id(), Some(UserId(1)));
        assert_eq!(alice.to_string(), "user:1");
    }
}
