//! Data model for Warden.
//!
//! This crate defines the durable state a player session wraps:
//!
//! - **Identity** ([`UserId`]): the stable key every aggregate is
//!   persisted under.
//! - **Mode** ([`AuthMode`]): whether a session may currently act.
//! - **Profile** ([`PlayerProfile`]): the per-player record with its
//!   optional [`LoginLocation`] and [`InventorySnapshot`] sub-aggregates.
//! - **Dirty tracking** ([`Tracked`], [`Lifecycle`]): the tri-state tag
//!   that decides whether an aggregate needs an insert, an update, or
//!   nothing at all.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how profiles are turned
//!   into bytes by storage backends.
//!
//! # Architecture
//!
//! ```text
//! Session (state machine)  ← owns one PlayerProfile + one AuthMode
//!     ↕
//! Types (this crate)  ← profile aggregates, lifecycle tags
//!     ↕
//! Storage (gateway impls)  ← encode profiles with a Codec
//! ```

mod codec;
mod error;
mod profile;
mod tracked;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::CodecError;
pub use profile::{
    Credential, InventorySnapshot, LoginLocation, PlayerProfile, ProfileRecord,
};
pub use tracked::{Lifecycle, Tracked};
pub use types::{AuthMode, ParseUserIdError, UserId};
