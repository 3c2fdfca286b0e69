// Mock collaborators and a committee harness shared by the machine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::types::{Block, Command, PartialCert, QuorumCert, ReplicaId, SyncInfo};
use super::{Acceptor, ChainedHotStuff, CommandQueue, Executor, Network};
use crate::blockchain::InMemoryBlockStore;
use crate::crypto::bls::{BlsCrypto, BlsPublicKey, BlsSecretKey};
use crate::crypto::{Hash, Signer};
use crate::pacemaker::{RoundRobin, ViewSynchronizer};

pub(crate) struct FifoQueue(Mutex<VecDeque<Command>>);

impl FifoQueue {
    pub fn new() -> Self {
        Self(Mutex::new(VecDeque::new()))
    }

    pub fn push(&self, command: Command) {
        self.0.lock().unwrap().push_back(command);
    }
}

impl CommandQueue for FifoQueue {
    fn get_command(&self) -> Option<Command> {
        self.0.lock().unwrap().pop_front()
    }
}

/// Accepts everything until told to refuse.
pub(crate) struct ToggleAcceptor(AtomicBool);

impl ToggleAcceptor {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn refuse(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Acceptor for ToggleAcceptor {
    fn accept(&self, _command: &Command) -> bool {
        !self.0.load(Ordering::SeqCst)
    }
}

pub(crate) struct RecordingExecutor {
    pub commands: Mutex<Vec<Command>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }
}

impl Executor for RecordingExecutor {
    fn exec(&self, command: &Command) {
        self.commands.lock().unwrap().push(command.clone());
    }
}

pub(crate) struct RecordingSynchronizer {
    pub certs: Mutex<Vec<QuorumCert>>,
}

impl RecordingSynchronizer {
    pub fn new() -> Self {
        Self {
            certs: Mutex::new(Vec::new()),
        }
    }

    pub fn advanced(&self) -> Vec<QuorumCert> {
        self.certs.lock().unwrap().clone()
    }
}

impl ViewSynchronizer for RecordingSynchronizer {
    fn advance_view(&self, sync: SyncInfo) {
        self.certs.lock().unwrap().push(sync.qc);
    }
}

/// Records outbound traffic; fetches answer with nothing.
pub(crate) struct TestNetwork {
    pub proposals: Mutex<Vec<Block>>,
    pub votes: Mutex<Vec<(ReplicaId, PartialCert)>>,
    pub fetches: Mutex<Vec<Hash>>,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self {
            proposals: Mutex::new(Vec::new()),
            votes: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl Network for TestNetwork {
    async fn propose(&self, block: &Block) {
        self.proposals.lock().unwrap().push(block.clone());
    }

    async fn send_vote(&self, to: ReplicaId, cert: &PartialCert) {
        self.votes.lock().unwrap().push((to, cert.clone()));
    }

    async fn fetch(&self, hash: Hash) -> Option<Block> {
        self.fetches.lock().unwrap().push(hash);
        None
    }
}

pub(crate) struct TestReplica {
    pub hs: Arc<ChainedHotStuff>,
    pub crypto: Arc<BlsCrypto>,
    pub store: Arc<InMemoryBlockStore>,
    pub queue: Arc<FifoQueue>,
    pub acceptor: Arc<ToggleAcceptor>,
    pub executor: Arc<RecordingExecutor>,
    pub synchronizer: Arc<RecordingSynchronizer>,
    pub network: Arc<TestNetwork>,
}

// Surfaces machine logs under RUST_LOG without clobbering a subscriber some
// other test already installed.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds `n` wired replicas sharing one committee of seeded BLS keys. Each
/// replica gets its own store, queue, and recording collaborators.
pub(crate) fn committee(n: usize, quorum_size: usize) -> Vec<TestReplica> {
    init_tracing();
    let secrets: Vec<BlsSecretKey> = (0..n)
        .map(|i| BlsSecretKey::from_seed(&testutil::seed(i as u64)))
        .collect();
    let public_keys: Vec<BlsPublicKey> = secrets.iter().map(BlsSecretKey::public_key).collect();

    secrets
        .into_iter()
        .enumerate()
        .map(|(i, secret)| {
            let id = i as ReplicaId;
            let crypto = Arc::new(BlsCrypto::new(id, secret, public_keys.clone(), quorum_size));
            let store = Arc::new(InMemoryBlockStore::new());
            let queue = Arc::new(FifoQueue::new());
            let acceptor = Arc::new(ToggleAcceptor::new());
            let executor = Arc::new(RecordingExecutor::new());
            let synchronizer = Arc::new(RecordingSynchronizer::new());
            let network = Arc::new(TestNetwork::new());
            let hs = ChainedHotStuff::new(
                id,
                quorum_size,
                store.clone(),
                crypto.clone(),
                crypto.clone(),
                queue.clone(),
                acceptor.clone(),
                executor.clone(),
                network.clone(),
                Arc::new(RoundRobin::new(n)),
                synchronizer.clone(),
            )
            .unwrap();
            TestReplica {
                hs,
                crypto,
                store,
                queue,
                acceptor,
                executor,
                synchronizer,
                network,
            }
        })
        .collect()
}

/// Aggregates a certificate for `block` from the given replicas' votes. With
/// no signers this yields the synthesized genesis certificate.
pub(crate) fn qc_for(replicas: &[TestReplica], block: &Block, signers: &[usize]) -> QuorumCert {
    let partials: Vec<PartialCert> = signers
        .iter()
        .map(|&i| replicas[i].crypto.create_partial_cert(block).unwrap())
        .collect();
    replicas[0]
        .crypto
        .create_quorum_cert(block, &partials)
        .unwrap()
}

/// Lets tasks spawned by the machine (parked-vote re-feeds, fetches) run to
/// completion on the test runtime.
pub(crate) async fn drain_tasks() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
