//! Per-connection channel bookkeeping.
//!
//! Each connection owns one [`ChannelTable`]. The local id handed out in
//! CHANNEL_OPEN_CONFIRMATION is chosen by a [`ChannelIdPolicy`]. Entries are
//! keyed by the peer's id, which the peer keeps unique among its open
//! channels, so a policy that hands out the same local id twice never
//! replaces a live channel.

use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// How local channel ids are assigned on CHANNEL_OPEN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ChannelIdPolicy {
    /// Local id equals the sender's id.
    #[default]
    #[value(alias = "mirror", alias = "mirror_peer")]
    MirrorPeer,
    /// Local id is always 0.
    #[value(alias = "zero", alias = "fixed_zero")]
    FixedZero,
}

impl ChannelIdPolicy {
    /// Chooses the local id for a channel the peer numbered `peer_id`.
    pub fn local_id_for(&self, peer_id: u32) -> u32 {
        match self {
            ChannelIdPolicy::MirrorPeer => peer_id,
            ChannelIdPolicy::FixedZero => 0,
        }
    }
}

/// One multiplexed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    peer_id: u32,
    local_id: u32,
    open: bool,
    /// Open order within the table.
    serial: u64,
}

impl Channel {
    /// Returns the peer's channel id.
    pub fn peer_id(&self) -> u32 {
        self.peer_id
    }

    /// Returns our channel id.
    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// Returns whether the channel is still open.
    pub fn is_open(&self) -> bool {
        self.open
    }
}

/// Channel id mapping for a single connection.
///
/// Lookups and closes address channels by local id, as the peer does in
/// every message after CHANNEL_OPEN. When several open channels share a
/// local id (only possible under [`ChannelIdPolicy::FixedZero`]) the one
/// opened first is addressed.
#[derive(Debug, Default)]
pub struct ChannelTable {
    policy: ChannelIdPolicy,
    channels: HashMap<u32, Channel>,
    next_serial: u64,
}

impl ChannelTable {
    /// Creates an empty table using `policy` for new channels.
    pub fn new(policy: ChannelIdPolicy) -> Self {
        Self {
            policy,
            channels: HashMap::new(),
            next_serial: 0,
        }
    }

    /// Returns the allocation policy.
    pub fn policy(&self) -> ChannelIdPolicy {
        self.policy
    }

    /// Registers a channel opened by the peer and returns its local id.
    ///
    /// An open mapping is never modified: if the peer reuses the id of a
    /// channel that is still open, the existing channel and its local id
    /// are kept.
    pub fn open(&mut self, peer_id: u32) -> u32 {
        if let Some(existing) = self.channels.get(&peer_id) {
            debug!(
                peer_id,
                local_id = existing.local_id(),
                "Peer reopened a live channel id"
            );
            return existing.local_id();
        }

        let local_id = self.policy.local_id_for(peer_id);
        if self.lookup(local_id).is_some() {
            debug!(local_id, peer_id, "Local channel id shared by several channels");
        }
        self.channels.insert(
            peer_id,
            Channel {
                peer_id,
                local_id,
                open: true,
                serial: self.next_serial,
            },
        );
        self.next_serial += 1;
        local_id
    }

    /// Looks up a channel by local id.
    pub fn lookup(&self, local_id: u32) -> Option<&Channel> {
        self.channels
            .values()
            .filter(|channel| channel.local_id == local_id)
            .min_by_key(|channel| channel.serial)
    }

    /// Looks up a channel by the peer's id.
    pub fn lookup_peer(&self, peer_id: u32) -> Option<&Channel> {
        self.channels.get(&peer_id)
    }

    /// Removes a channel by local id, returning it marked closed.
    pub fn close(&mut self, local_id: u32) -> Option<Channel> {
        let peer_id = self.lookup(local_id)?.peer_id;
        self.channels.remove(&peer_id).map(|mut channel| {
            channel.open = false;
            channel
        })
    }

    /// Number of open channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if no channel is open.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Iterates over open channels in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Drops every channel (connection teardown).
    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_policy() {
        let mut table = ChannelTable::new(ChannelIdPolicy::MirrorPeer);
        assert_eq!(table.open(7), 7);
        assert_eq!(table.open(8), 8);

        let channel = table.lookup(7).unwrap();
        assert_eq!(channel.peer_id(), 7);
        assert_eq!(channel.local_id(), 7);
        assert!(channel.is_open());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_fixed_zero_policy() {
        let mut table = ChannelTable::new(ChannelIdPolicy::FixedZero);
        assert_eq!(table.open(3), 0);
        assert_eq!(table.lookup(0).unwrap().peer_id(), 3);

        // second open shares local id 0 but leaves the first channel intact
        assert_eq!(table.open(5), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup_peer(3).map(Channel::local_id), Some(0));
        assert_eq!(table.lookup_peer(5).map(Channel::local_id), Some(0));
        assert_eq!(table.lookup(0).unwrap().peer_id(), 3);
    }

    #[test]
    fn test_fixed_zero_close_oldest_first() {
        let mut table = ChannelTable::new(ChannelIdPolicy::FixedZero);
        table.open(3);
        table.open(5);

        assert_eq!(table.close(0).map(|c| c.peer_id()), Some(3));
        assert_eq!(table.lookup(0).unwrap().peer_id(), 5);
        assert_eq!(table.close(0).map(|c| c.peer_id()), Some(5));
        assert!(table.is_empty());
    }

    #[test]
    fn test_reopen_keeps_mapping() {
        let mut table = ChannelTable::new(ChannelIdPolicy::MirrorPeer);
        assert_eq!(table.open(4), 4);
        assert_eq!(table.open(4), 4);
        assert_eq!(table.len(), 1);
        assert!(table.lookup(4).unwrap().is_open());
    }

    #[test]
    fn test_close_removes() {
        let mut table = ChannelTable::new(ChannelIdPolicy::MirrorPeer);
        table.open(3);

        let closed = table.close(3).unwrap();
        assert!(!closed.is_open());
        assert_eq!(closed.peer_id(), 3);
        assert!(table.lookup(3).is_none());
        assert!(table.is_empty());

        assert!(table.close(3).is_none());
    }

    #[test]
    fn test_lookup_unknown() {
        let table = ChannelTable::default();
        assert!(table.lookup(0).is_none());
        assert_eq!(table.policy(), ChannelIdPolicy::MirrorPeer);
    }

    #[test]
    fn test_clear_and_iter() {
        let mut table = ChannelTable::new(ChannelIdPolicy::MirrorPeer);
        table.open(1);
        table.open(2);
        let mut ids: Vec<u32> = table.iter().map(Channel::local_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);

        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_policy_cli_values() {
        use clap::ValueEnum;

        assert_eq!(
            ChannelIdPolicy::from_str("mirror", false),
            Ok(ChannelIdPolicy::MirrorPeer)
        );
        assert_eq!(
            ChannelIdPolicy::from_str("zero", false),
            Ok(ChannelIdPolicy::FixedZero)
        );
        assert_eq!(
            ChannelIdPolicy::from_str("fixed-zero", false),
            Ok(ChannelIdPolicy::FixedZero)
        );
        assert!(ChannelIdPolicy::from_str("random", false).is_err());
    }
}
