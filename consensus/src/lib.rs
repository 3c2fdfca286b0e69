/// HotChain Consensus Core
///
/// A chained-HotStuff replica: three-chain commit rule, one quorum
/// certificate per block, BLS aggregate signatures, and a single-writer
/// state machine over abstract collaborators (block store, crypto, command
/// queue, executor, network, leader rotation, view synchronizer).

pub mod blockchain;
pub mod chained;
pub mod crypto;
pub mod pacemaker;

pub use blockchain::{BlockChain, InMemoryBlockStore};
pub use chained::types::{Block, Command, PartialCert, QuorumCert, ReplicaId, SyncInfo, View};
pub use chained::{ChainedHotStuff, ConsensusError};
pub use crypto::Hash;
