//! Identity and mode types shared by every Warden crate.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// The durable, unique identity of a player.
///
/// A newtype over 128 bits so it can't be confused with any other number
/// floating around the server. It renders as a 32-character lowercase hex
/// string, which is also how it is serialized; hyphenated UUID text is
/// accepted when parsing.
///
/// Every persisted aggregate (profile, location, inventory) is keyed by
/// this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(u128);

impl UserId {
    /// Wraps a raw 128-bit value.
    pub const fn from_u128(raw: u128) -> Self {
        Self(raw)
    }

    /// Mints a random identity (128 bits of entropy).
    pub fn random() -> Self {
        Self(rand::rng().random())
    }

    /// The raw 128-bit value.
    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Returned when a string is not a valid [`UserId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid user id {0:?}: expected 32 hex digits")]
pub struct ParseUserIdError(pub String);

impl FromStr for UserId {
    type Err = ParseUserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != '-').collect();
        if digits.len() != 32 {
            return Err(ParseUserIdError(s.to_string()));
        }
        u128::from_str_radix(&digits, 16)
            .map(Self)
            .map_err(|_| ParseUserIdError(s.to_string()))
    }
}

impl TryFrom<String> for UserId {
    type Error = ParseUserIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// AuthMode
// ---------------------------------------------------------------------------

/// Whether a session may currently act.
///
/// [`AuthMode::Authenticated`] is the only value that grants "authorized"
/// status. The other two are equivalent as far as the session core is
/// concerned; concrete actions may use the distinction to decide which
/// prompt a player sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Has an account but hasn't logged in yet.
    #[default]
    Unauthenticated,
    /// Has no account yet.
    Unregistered,
    /// Logged in (or allowed to play without an account).
    Authenticated,
}

impl AuthMode {
    /// Returns `true` only for [`AuthMode::Authenticated`].
    pub fn is_authorized(self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::Unregistered => write!(f, "unregistered"),
            Self::Authenticated => write!(f, "authenticated"),
        }
    }
}
