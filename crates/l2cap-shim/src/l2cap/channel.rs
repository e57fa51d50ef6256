//! Open channel bookkeeping
//!
//! [`ChannelTable`] maps each open CID to the PSM of the service owning it and
//! tracks which of those channels are closing at our request or already have
//! their closure being reported.

use std::collections::{BTreeMap, HashSet};

use super::types::{ChannelId, L2capChannelState};

/// CID to PSM map plus the set of locally closing CIDs.
///
/// A CID is present exactly while the transport engine considers the channel
/// open. A closing CID is always also present.
#[derive(Debug, Default)]
pub struct ChannelTable {
    channels: BTreeMap<ChannelId, u16>,
    closing: HashSet<ChannelId>,
    closed: HashSet<ChannelId>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, cid: ChannelId) -> bool {
        self.channels.contains_key(&cid)
    }

    /// PSM owning `cid`.
    ///
    /// # Panics
    ///
    /// Panics if `cid` is not open.
    pub fn psm_of(&self, cid: ChannelId) -> u16 {
        match self.channels.get(&cid) {
            Some(psm) => *psm,
            None => panic!("cid 0x{:04x} is not an open channel", cid),
        }
    }

    /// Non-panicking variant of [`ChannelTable::psm_of`]
    pub fn get(&self, cid: ChannelId) -> Option<u16> {
        self.channels.get(&cid).copied()
    }

    /// # Panics
    ///
    /// Panics if `cid` is already mapped; a CID is unique for the lifetime of
    /// one channel.
    pub fn insert(&mut self, cid: ChannelId, psm: u16) {
        if let Some(owner) = self.channels.get(&cid) {
            panic!("cid 0x{:04x} is already open (psm 0x{:04x})", cid, owner);
        }
        self.channels.insert(cid, psm);
    }

    /// Forget `cid`, clearing its closing and closure flags with it
    pub fn remove(&mut self, cid: ChannelId) -> Option<u16> {
        self.closing.remove(&cid);
        self.closed.remove(&cid);
        self.channels.remove(&cid)
    }

    /// # Panics
    ///
    /// Panics if `cid` is not open or already closing.
    pub fn mark_closing(&mut self, cid: ChannelId) {
        assert!(self.exists(cid), "cid 0x{:04x} is not an open channel", cid);
        assert!(
            self.closing.insert(cid),
            "cid 0x{:04x} is already closing",
            cid
        );
    }

    pub fn is_closing(&self, cid: ChannelId) -> bool {
        self.closing.contains(&cid)
    }

    pub fn clear_closing(&mut self, cid: ChannelId) {
        self.closing.remove(&cid);
    }

    /// Claim the closure report of an open `cid`.
    ///
    /// Returns `false` if `cid` is not open or its closure was already
    /// claimed; only one closure is reported per channel.
    pub fn claim_closure(&mut self, cid: ChannelId) -> bool {
        self.exists(cid) && self.closed.insert(cid)
    }

    pub fn state(&self, cid: ChannelId) -> L2capChannelState {
        if !self.exists(cid) {
            L2capChannelState::Closed
        } else if self.is_closing(cid) {
            L2capChannelState::WaitDisconnect
        } else {
            L2capChannelState::Open
        }
    }

    /// Open channels as `(cid, psm)`, in ascending CID order
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, u16)> + '_ {
        self.channels.iter().map(|(cid, psm)| (*cid, *psm))
    }

    /// Open channels owned by `psm`
    pub fn cids_for(&self, psm: u16) -> Vec<ChannelId> {
        self.iter()
            .filter(|(_, owner)| *owner == psm)
            .map(|(cid, _)| cid)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
