//! Live-player lookup.

/// A connected player, as the host's network layer knows them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerHandle {
    pub name: String,
    pub connection_id: u64,
}

/// Resolves a display name to a connected peer.
pub trait PeerLookup: Send + Sync + 'static {
    /// `None` if nobody with that name is connected right now.
    fn by_name(&self, name: &str) -> Option<PeerHandle>;
}

/// A [`PeerLookup`] for headless setups: nobody is ever online.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPeers;

impl PeerLookup for NoPeers {
    fn by_name(&self, _name: &str) -> Option<PeerHandle> {
        None
    }
}
