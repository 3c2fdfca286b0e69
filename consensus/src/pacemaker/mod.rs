// Leader schedule and view advancement
//
// The pacemaker proper (timeout clocks, view changes) lives outside this
// core. The machine only needs to know who leads a view, and whom to tell
// when a fresh quorum certificate forms.

use crate::chained::types::{ReplicaId, SyncInfo, View};

/// Maps a view to the replica leading it.
pub trait LeaderRotation: Send + Sync {
    fn get_leader(&self, view: View) -> ReplicaId;
}

/// Deterministic rotation: view `v` is led by replica `v mod n`. Fair, and
/// every replica can compute the schedule locally.
pub struct RoundRobin {
    committee_size: usize,
}

impl RoundRobin {
    pub fn new(committee_size: usize) -> Self {
        assert!(committee_size > 0, "empty committee");
        Self { committee_size }
    }
}

impl LeaderRotation for RoundRobin {
    fn get_leader(&self, view: View) -> ReplicaId {
        (view % self.committee_size as u64) as ReplicaId
    }
}

/// Told about every quorum certificate this replica forms, so the external
/// pacemaker can advance the view without waiting for a timeout.
pub trait ViewSynchronizer: Send + Sync {
    fn advance_view(&self, sync: SyncInfo);
}
