//! Storage backends for Warden.
//!
//! Right now there is one: [`MemoryGateway`], a [`PersistenceGateway`]
//! that keeps encoded records in process memory. It is what the demo runs
//! on and what the session tests assert against, so it also records
//! every call it receives and can be told to fail or to be slow.
//!
//! [`PersistenceGateway`]: warden_session::PersistenceGateway

mod memory;

pub use memory::{CallKind, GatewayCall, MemoryGateway};
