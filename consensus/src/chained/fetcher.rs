/// Outstanding-fetch bookkeeping
///
/// The state machine spawns at most one fetch task at a time; this tracks the
/// task so a newer fetch, a fresh proposal, or the block's arrival can abort
/// it. Cancellation is cooperative: a response from an aborted fetch is
/// harmless because delivery is idempotent.

use tokio::task::AbortHandle;

use crate::crypto::Hash;

pub(crate) struct Fetcher {
    inflight: Option<(Hash, AbortHandle)>,
}

impl Fetcher {
    pub fn new() -> Self {
        Self { inflight: None }
    }

    /// Registers a fetch for `hash`, aborting whichever fetch was previously
    /// outstanding.
    pub fn begin(&mut self, hash: Hash, handle: AbortHandle) {
        if let Some((_, previous)) = self.inflight.replace((hash, handle)) {
            previous.abort();
        }
    }

    /// Aborts the outstanding fetch, if any.
    pub fn cancel(&mut self) {
        if let Some((_, handle)) = self.inflight.take() {
            handle.abort();
        }
    }

    /// Clears the bookkeeping once the block for `hash` has arrived. Fetches
    /// for other hashes keep running.
    pub fn complete(&mut self, hash: &Hash) {
        if matches!(&self.inflight, Some((pending, _)) if pending == hash) {
            self.cancel();
        }
    }
}
