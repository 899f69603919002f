//! Error types for the session layer.
//!
//! Action-level failures (wrong password, policy denial) are NOT errors:
//! they come back as an [`ActionResponse`](crate::ActionResponse) with
//! `success == false`. The errors here are for operators and callers:
//! contract misuse, state disagreement with storage, and backend faults.

use std::fmt;

use warden_types::{CodecError, UserId};

/// Failures reported by a [`PersistenceGateway`](crate::PersistenceGateway).
///
/// `Clone` so one failed save can be reported to every caller that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The backend can't be reached right now.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// An insert collided with an existing record.
    #[error("record already exists for {0}")]
    Conflict(UserId),

    /// An update or lookup targeted a record that doesn't exist.
    #[error("no record for {0}")]
    NotFound(UserId),

    /// A stored record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Anything else the backend wants to report.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<CodecError> for GatewayError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Which way the in-memory and stored registration state disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMismatch {
    /// Storage has a profile, but the session thinks the player is
    /// unregistered.
    RegisteredInStore,
    /// The session thinks the player is registered, but storage has no
    /// profile.
    MissingFromStore,
}

impl fmt::Display for RefreshMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegisteredInStore => {
                write!(f, "profile exists in storage but session is unregistered")
            }
            Self::MissingFromStore => {
                write!(f, "session is registered but storage has no profile")
            }
        }
    }
}

/// Errors that can occur while operating on a player session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Saving was requested for a player without a credential.
    ///
    /// This is a caller bug: only registered profiles are persisted.
    /// No gateway call is made when this is returned.
    #[error("cannot save profile for {0}: player is not registered")]
    NotRegistered(UserId),

    /// Storage and the session disagree on whether the player is
    /// registered. The caller decides how to recover (usually by forcing
    /// the player to authenticate again).
    #[error("profile refresh failed for {user_id}: {mismatch}")]
    ProfileRefresh {
        user_id: UserId,
        mismatch: RefreshMismatch,
    },

    /// A gateway call failed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] GatewayError),

    /// The coordinator holds no session for this player.
    #[error("no session attached for {0}")]
    NotAttached(UserId),

    /// The coordinator already holds a session for this player.
    #[error("a session for {0} is already attached")]
    AlreadyAttached(UserId),

    /// The coordinator task has stopped.
    #[error("session coordinator is not running")]
    CoordinatorClosed,

    /// A worker job panicked before reporting its result.
    #[error("worker job for {0} was lost before reporting back")]
    WorkerLost(UserId),

    /// A closure run against the session on the coordinator panicked.
    /// The coordinator and the other sessions keep running.
    #[error("session task for {0} panicked")]
    TaskPanicked(UserId),
}
