// Chained HotStuff
//
// Three-chain BFT consensus: every block carries a quorum certificate for its
// predecessor, and a block is decided once it heads a chain of three direct
// parent links. A replica votes when the proposal passes the safety/liveness
// rules, the next leader aggregates votes into a QC, and the chain walker
// advances the high QC, the lock, and the executed prefix.

pub mod types;

mod fetcher;
mod votepool;

#[cfg(test)]
mod testing;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::blockchain::{BlockChain, ChainError};
use crate::crypto::{CryptoError, Hash, Signer, Verifier};
use crate::pacemaker::{LeaderRotation, ViewSynchronizer};
use fetcher::Fetcher;
use types::{Block, Command, PartialCert, QuorumCert, ReplicaId, SyncInfo, View};
use votepool::VotePool;

/// Supplies the next application payload to propose.
pub trait CommandQueue: Send + Sync {
    fn get_command(&self) -> Option<Command>;
}

/// Application-side filter for proposed commands (replay, validity).
pub trait Acceptor: Send + Sync {
    fn accept(&self, command: &Command) -> bool;
}

/// Applies decided commands to the application state machine.
pub trait Executor: Send + Sync {
    fn exec(&self, command: &Command);
}

/// Outbound side of the replica. Sends are best-effort: lost messages are
/// recovered through peer resends and pacemaker timeouts, never retried here.
#[async_trait]
pub trait Network: Send + Sync {
    /// Broadcast a proposal to the committee.
    async fn propose(&self, block: &Block);
    /// Send a partial certificate to the leader of the next view.
    async fn send_vote(&self, to: ReplicaId, cert: &PartialCert);
    /// Ask peers for a block we are missing.
    async fn fetch(&self, hash: Hash) -> Option<Block>;
}

#[derive(Error, Debug)]
pub enum ConsensusError {
    /// The proposal failed both the liveness rule and the safety rule.
    #[error("proposal at view {0} does not extend the locked block")]
    UnsafeBlock(View),
    #[error("old proposal: view {proposal} is not above last voted view {last_vote}")]
    OldProposal { proposal: View, last_vote: View },
    #[error("command rejected by the acceptor")]
    CommandRejected,
    #[error("stale vote: block view {block} is not above leaf view {leaf}")]
    StaleVote { block: View, leaf: View },
    #[error("invalid partial certificate from replica {0}")]
    InvalidPartialCert(ReplicaId),
    #[error("unverifiable quorum certificate for view {0}")]
    InvalidQuorumCert(View),
    #[error("block {0} is not available locally yet")]
    MissingBlock(Hash),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// The store no longer holds a block the protocol state refers to.
    /// Unrecoverable: the replica must abort rather than keep voting on a
    /// chain it cannot read.
    #[error("corrupt block store: missing {0}")]
    CorruptStore(Hash),
}

impl From<ChainError> for ConsensusError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::MissingBlock(hash) => ConsensusError::MissingBlock(hash),
        }
    }
}

/// The protocol variables plus the sub-states owned by the machine. One lock
/// guards the lot; it is never held across an await or a blocking
/// collaborator call.
struct ProtocolState {
    last_vote: View,
    locked: Block,
    executed: Block,
    leaf: Block,
    high_qc: QuorumCert,
    votes: VotePool,
    fetcher: Fetcher,
}

/// A replica's chained-HotStuff state machine over abstract collaborators.
///
/// Inbound events (`on_propose`, `on_vote`, `on_deliver`) may arrive
/// concurrently from any number of network threads; the state mutex
/// serializes their effects. Decisions happen under the lock, I/O happens
/// after it is released.
pub struct ChainedHotStuff {
    id: ReplicaId,
    store: Arc<dyn BlockChain>,
    signer: Arc<dyn Signer>,
    verifier: Arc<dyn Verifier>,
    commands: Arc<dyn CommandQueue>,
    acceptor: Arc<dyn Acceptor>,
    executor: Arc<dyn Executor>,
    network: Arc<dyn Network>,
    leaders: Arc<dyn LeaderRotation>,
    synchronizer: Arc<dyn ViewSynchronizer>,
    state: Mutex<ProtocolState>,
    // Taken while the state lock is still held, released after the follow-up
    // call completes. Decide batches reach the executor in commit order and
    // QCs reach the synchronizer in view order, without holding the state
    // lock across either callback.
    exec_mu: Mutex<()>,
    sync_mu: Mutex<()>,
}

impl ChainedHotStuff {
    /// Builds a replica over the given collaborators. The genesis block is
    /// installed in the store and its certificate, synthesized by the signer,
    /// becomes the initial high QC.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ReplicaId,
        quorum_size: usize,
        store: Arc<dyn BlockChain>,
        signer: Arc<dyn Signer>,
        verifier: Arc<dyn Verifier>,
        commands: Arc<dyn CommandQueue>,
        acceptor: Arc<dyn Acceptor>,
        executor: Arc<dyn Executor>,
        network: Arc<dyn Network>,
        leaders: Arc<dyn LeaderRotation>,
        synchronizer: Arc<dyn ViewSynchronizer>,
    ) -> Result<Arc<Self>, ConsensusError> {
        let genesis = Block::genesis();
        let high_qc = signer.create_quorum_cert(&genesis, &[])?;
        store.store(genesis.clone());

        Ok(Arc::new(Self {
            id,
            store,
            signer,
            verifier,
            commands,
            acceptor,
            executor,
            network,
            leaders,
            synchronizer,
            state: Mutex::new(ProtocolState {
                last_vote: 0,
                locked: genesis.clone(),
                executed: genesis.clone(),
                leaf: genesis,
                high_qc,
                votes: VotePool::new(quorum_size),
                fetcher: Fetcher::new(),
            }),
            exec_mu: Mutex::new(()),
            sync_mu: Mutex::new(()),
        }))
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    /// Highest view this replica has voted in.
    pub fn last_vote(&self) -> View {
        self.state.lock().unwrap().last_vote
    }

    /// Highest-view quorum certificate observed so far.
    pub fn high_qc(&self) -> QuorumCert {
        self.state.lock().unwrap().high_qc.clone()
    }

    /// Highest block known to extend the high QC.
    pub fn leaf(&self) -> Block {
        self.state.lock().unwrap().leaf.clone()
    }

    /// The block this replica will not vote against.
    pub fn locked_block(&self) -> Block {
        self.state.lock().unwrap().locked.clone()
    }

    /// The deepest block applied to the application state machine.
    pub fn executed_block(&self) -> Block {
        self.state.lock().unwrap().executed.clone()
    }

    /// Raises the highest voted view to at least `view`.
    pub fn increase_last_voted_view(&self, view: View) {
        let mut state = self.state.lock().unwrap();
        state.last_vote = state.last_vote.max(view);
    }

    /// Fills a skipped view with a placeholder so view numbers stay
    /// continuous. The dummy carries no certificate and is never executed.
    pub fn create_dummy(&self) {
        let mut state = self.state.lock().unwrap();
        let dummy = Block::dummy(&state.leaf, self.id);
        self.store.store(dummy.clone());
        debug!(view = dummy.view(), "created dummy block");
        state.leaf = dummy;
    }

    /// Adopts `qc` as the new high QC if it certifies a higher block than the
    /// current one. Certificates that fail verification are ignored.
    pub fn update_high_qc(&self, qc: QuorumCert) -> Result<(), ConsensusError> {
        if !self.verifier.verify_quorum_cert(&qc) {
            info!(view = qc.view(), "ignoring unverifiable quorum certificate");
            return Err(ConsensusError::InvalidQuorumCert(qc.view()));
        }
        let mut state = self.state.lock().unwrap();
        self.apply_high_qc(&mut state, &qc)
    }

    /// Leader entry point: build a block on the current leaf carrying the
    /// high QC, broadcast it, and run the proposal path locally (self-vote).
    pub async fn propose(self: Arc<Self>) -> Result<(), ConsensusError> {
        // An empty queue still yields a proposal; an empty block beats a
        // skipped view.
        let command = self.commands.get_command().unwrap_or_default();
        let block = {
            let state = self.state.lock().unwrap();
            Block::new(
                state.leaf.hash(),
                state.high_qc.clone(),
                state.leaf.view() + 1,
                self.id,
                command,
            )
        };
        self.store.store(block.clone());
        info!(view = block.view(), block = %block.hash(), "proposing");
        self.network.propose(&block).await;
        Arc::clone(&self).on_propose(block).await
    }

    /// Handles a proposal: evaluate the vote rules, sign a partial cert, walk
    /// the chain, and hand the cert to the leader of the next view.
    pub async fn on_propose(self: Arc<Self>, block: Block) -> Result<(), ConsensusError> {
        {
            let state = self.state.lock().unwrap();
            if let Err(err) = self.safe_to_vote(&state, &block) {
                info!(view = block.view(), %err, "dropping proposal");
                return Err(err);
            }
        }

        if !self.acceptor.accept(block.command()) {
            info!(view = block.view(), "acceptor refused the proposed command");
            return Err(ConsensusError::CommandRejected);
        }

        // A proposal supersedes whatever block we were fetching.
        self.state.lock().unwrap().fetcher.cancel();

        let cert = match self.signer.create_partial_cert(&block) {
            Ok(cert) => cert,
            Err(err) => {
                error!(view = block.view(), %err, "could not sign own vote");
                return Err(err.into());
            }
        };

        let qc_verified = match block.qc() {
            Some(qc) => self.verifier.verify_quorum_cert(qc),
            None => false,
        };
        if !qc_verified && block.qc().is_some() {
            info!(view = block.view(), "proposal carries an unverifiable certificate");
        }

        // Point of no return: record the vote, then walk the chain.
        let mut state = self.state.lock().unwrap();
        if block.view() <= state.last_vote {
            // A concurrent proposal won the race while we were signing; the
            // cert must not leave this replica.
            return Err(ConsensusError::OldProposal {
                proposal: block.view(),
                last_vote: state.last_vote,
            });
        }
        self.store.store(block.clone());
        state.last_vote = block.view();
        let batch = self.update(&mut state, &block, qc_verified)?;
        let parked = state.votes.release(&block.hash());
        state.votes.clear_pending();
        let exec_guard = self.exec_mu.lock().unwrap();
        drop(state);
        for decided in &batch {
            if decided.is_dummy() {
                continue;
            }
            self.executor.exec(decided.command());
        }
        drop(exec_guard);

        // Re-feed votes that arrived ahead of this block.
        for vote in parked {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = this.on_vote(vote).await {
                    debug!(%err, "parked vote dropped");
                }
            });
        }

        let next_leader = self.leaders.get_leader(block.view() + 1);
        if next_leader == self.id {
            Arc::clone(&self).on_vote(cert).await
        } else {
            self.network.send_vote(next_leader, &cert).await;
            Ok(())
        }
    }

    /// Handles one replica's vote. Parks it when its block has not arrived,
    /// drops stale or invalid votes, and forms a QC at quorum.
    pub async fn on_vote(self: Arc<Self>, cert: PartialCert) -> Result<(), ConsensusError> {
        let Some(block) = self.store.get(cert.block_hash()) else {
            let hash = *cert.block_hash();
            let first = self.state.lock().unwrap().votes.park(cert);
            if first {
                debug!(block = %hash, "vote for unknown block, fetching");
                let this = Arc::clone(&self);
                let task = tokio::spawn(async move {
                    if let Some(found) = this.network.fetch(hash).await {
                        this.on_deliver(found).await;
                    } else {
                        debug!(block = %hash, "fetch yielded nothing");
                    }
                });
                self.state
                    .lock()
                    .unwrap()
                    .fetcher
                    .begin(hash, task.abort_handle());
            }
            return Err(ConsensusError::MissingBlock(hash));
        };

        {
            let state = self.state.lock().unwrap();
            if block.view() <= state.leaf.view() {
                return Err(ConsensusError::StaleVote {
                    block: block.view(),
                    leaf: state.leaf.view(),
                });
            }
        }

        if !self.verifier.verify_partial_cert(&cert) {
            warn!(signer = cert.signer(), "invalid partial certificate");
            return Err(ConsensusError::InvalidPartialCert(cert.signer()));
        }

        let Some(partials) = self.state.lock().unwrap().votes.record_verified(cert) else {
            return Ok(());
        };

        let qc = self.signer.create_quorum_cert(&block, &partials)?;
        info!(view = qc.view(), block = %qc.block_hash(), "quorum certificate formed");

        let sync_guard;
        {
            let mut state = self.state.lock().unwrap();
            self.apply_high_qc(&mut state, &qc)?;
            sync_guard = self.sync_mu.lock().unwrap();
        }
        self.synchronizer.advance_view(SyncInfo { qc });
        drop(sync_guard);

        // With the certificate out the door, drop pool entries no newer QC
        // can form from.
        {
            let mut state = self.state.lock().unwrap();
            let horizon = state.leaf.view();
            state
                .votes
                .sweep(horizon, |hash| self.store.get(hash).map(|b| b.view()));
        }

        Ok(())
    }

    /// Handles the arrival of a previously-missing block: store it and
    /// re-feed any parked votes concurrently. Re-delivery is harmless.
    pub fn on_deliver(
        self: Arc<Self>,
        block: Block,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            let hash = block.hash();
            self.store.store(block);
            let parked = {
                let mut state = self.state.lock().unwrap();
                state.fetcher.complete(&hash);
                state.votes.release(&hash)
            };
            for vote in parked {
                let this = Arc::clone(&self);
                tokio::spawn(async move {
                    if let Err(err) = this.on_vote(vote).await {
                        debug!(%err, "parked vote dropped");
                    }
                });
            }
        })
    }

    // Safety and liveness rules for voting: the view rule, then the fast
    // liveness path on the carried certificate, then the ancestry fallback.
    fn safe_to_vote(&self, state: &ProtocolState, block: &Block) -> Result<(), ConsensusError> {
        if block.view() <= state.last_vote {
            return Err(ConsensusError::OldProposal {
                proposal: block.view(),
                last_vote: state.last_vote,
            });
        }
        if let Some(qc) = block.qc() {
            if let Some(justified) = self.store.get(qc.block_hash()) {
                if justified.view() > state.locked.view() {
                    return Ok(());
                }
            }
        }
        if self.store.extends(block, &state.locked)? {
            Ok(())
        } else {
            Err(ConsensusError::UnsafeBlock(block.view()))
        }
    }

    // The chain walker: pre-commit (advance the high QC), commit (advance the
    // lock), decide (three direct parent links). Returns the blocks ready for
    // execution, oldest first.
    fn update(
        &self,
        state: &mut ProtocolState,
        block: &Block,
        qc_verified: bool,
    ) -> Result<Vec<Block>, ConsensusError> {
        let Some(b1) = self.justified(block) else {
            return Ok(Vec::new());
        };
        if qc_verified {
            if let Some(qc) = block.qc() {
                self.apply_high_qc(state, qc)?;
            }
        }

        let Some(b2) = self.justified(&b1) else {
            return Ok(Vec::new());
        };
        if b2.view() > state.locked.view() {
            debug!(view = b2.view(), "locked block advanced");
            state.locked = b2.clone();
        }

        let Some(b3) = self.justified(&b2) else {
            return Ok(Vec::new());
        };
        if *b1.parent() == b2.hash()
            && *b2.parent() == b3.hash()
            && b3.view() > state.executed.view()
        {
            let batch = self.unexecuted_ancestors(state, &b3)?;
            info!(view = b3.view(), decided = batch.len(), "three-chain complete");
            state.executed = b3;
            return Ok(batch);
        }
        Ok(Vec::new())
    }

    // Resolves the block certified by `block`'s QC, if both exist locally.
    fn justified(&self, block: &Block) -> Option<Block> {
        block.qc().and_then(|qc| self.store.get(qc.block_hash()))
    }

    fn apply_high_qc(
        &self,
        state: &mut ProtocolState,
        qc: &QuorumCert,
    ) -> Result<(), ConsensusError> {
        let Some(block) = self.store.get(qc.block_hash()) else {
            // Cannot adopt a certificate whose block we do not hold; the
            // chain below the high QC must stay resolvable.
            return Ok(());
        };
        let current = self
            .store
            .get(state.high_qc.block_hash())
            .ok_or(ConsensusError::CorruptStore(*state.high_qc.block_hash()))?;
        if block.view() > current.view() {
            debug!(view = qc.view(), block = %qc.block_hash(), "high QC advanced");
            state.high_qc = qc.clone();
            state.leaf = block;
        }
        Ok(())
    }

    // Blocks between the executed block (exclusive) and `upto` (inclusive),
    // oldest first. A gap here means the store lost part of the executed
    // ancestor chain.
    fn unexecuted_ancestors(
        &self,
        state: &ProtocolState,
        upto: &Block,
    ) -> Result<Vec<Block>, ConsensusError> {
        let mut chain = Vec::new();
        let mut current = upto.clone();
        loop {
            if current.hash() == state.executed.hash() {
                break;
            }
            if current.view() <= state.executed.view() {
                return Err(ConsensusError::CorruptStore(current.hash()));
            }
            let parent = self
                .store
                .get(current.parent())
                .ok_or(ConsensusError::CorruptStore(*current.parent()))?;
            chain.push(current);
            current = parent;
        }
        chain.reverse();
        Ok(chain)
    }
}
