/// Vote aggregation buffers
///
/// `verified` holds signature-checked partial certificates until a quorum
/// forms; `pending` parks votes that arrived before their block did. At most
/// one vote per (signer, block) pair counts in either map.

use std::collections::HashMap;

use crate::chained::types::{PartialCert, View};
use crate::crypto::Hash;

pub(crate) struct VotePool {
    quorum_size: usize,
    verified: HashMap<Hash, Vec<PartialCert>>,
    pending: HashMap<Hash, Vec<PartialCert>>,
}

impl VotePool {
    pub fn new(quorum_size: usize) -> Self {
        Self {
            quorum_size,
            verified: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Records a signature-checked vote. Yields the full partial set exactly
    /// once, on the vote that first meets the quorum; the entry is removed so
    /// the same set cannot aggregate twice. Duplicate signers are discarded.
    pub fn record_verified(&mut self, cert: PartialCert) -> Option<Vec<PartialCert>> {
        let hash = *cert.block_hash();
        let entry = self.verified.entry(hash).or_default();
        if entry.iter().any(|c| c.signer() == cert.signer()) {
            return None;
        }
        entry.push(cert);
        if entry.len() < self.quorum_size {
            return None;
        }
        self.verified.remove(&hash)
    }

    /// Parks a vote whose block has not arrived. Returns true when this is
    /// the first vote parked for that hash, so the caller fetches at most
    /// once per block.
    pub fn park(&mut self, cert: PartialCert) -> bool {
        let entry = self.pending.entry(*cert.block_hash()).or_default();
        let first = entry.is_empty();
        if !entry.iter().any(|c| c.signer() == cert.signer()) {
            entry.push(cert);
        }
        first
    }

    /// Returns and removes every parked vote for the given hash.
    pub fn release(&mut self, hash: &Hash) -> Vec<PartialCert> {
        self.pending.remove(hash).unwrap_or_default()
    }

    /// Drops every parked vote. A new proposal supersedes them; the protocol
    /// relies on peers resending.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Drops verified entries whose block is unknown or whose view is not
    /// above `high_view`; a certificate at that height already exists.
    pub fn sweep<F>(&mut self, high_view: View, view_of: F)
    where
        F: Fn(&Hash) -> Option<View>,
    {
        self.verified
            .retain(|hash, _| matches!(view_of(hash), Some(view) if view > high_view));
    }

    #[cfg(test)]
    pub fn verified_count(&self, hash: &Hash) -> usize {
        self.verified.get(hash).map_or(0, Vec::len)
    }

    #[cfg(test)]
    pub fn pending_count(&self, hash: &Hash) -> usize {
        self.pending.get(hash).map_or(0, Vec::len)
    }
}
